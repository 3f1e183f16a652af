//! HTTP client for the Matrix client-server API.

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::MatrixConfig;
use crate::error::{MatrixApiError, MatrixError, MatrixResult};

/// `msgtype` used for every notification.
const MSGTYPE_TEXT: &str = "m.text";
/// `format` for HTML bodies.
const FORMAT_HTML: &str = "org.matrix.custom.html";

/// Body of a formatted `m.room.message` event.
#[derive(Debug, Clone, Serialize)]
struct FormattedMessage<'a> {
    msgtype: &'static str,
    body: &'a str,
    format: &'static str,
    formatted_body: &'a str,
}

#[derive(Debug, Deserialize)]
struct WhoamiResponse {
    user_id: String,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    event_id: String,
}

/// Matrix client bound to one account.
#[derive(Debug, Clone)]
pub struct MatrixClient {
    config: MatrixConfig,
    http: reqwest::Client,
}

impl MatrixClient {
    /// Create a client. Does not touch the network; call [`Self::whoami`] to
    /// verify the token.
    pub fn new(config: MatrixConfig) -> MatrixResult<Self> {
        config.validate()?;

        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| MatrixError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, http })
    }

    /// Resolve the user the access token belongs to.
    pub async fn whoami(&self) -> MatrixResult<String> {
        debug!("Checking Matrix access token...");

        let response: WhoamiResponse = self
            .api_call::<_, ()>(Method::GET, "/_matrix/client/v3/account/whoami", None)
            .await?;

        if response.user_id != self.config.user_id() {
            warn!(
                "Access token belongs to {} (configured as {})",
                response.user_id,
                self.config.user_id()
            );
        } else {
            info!("Authenticated to Matrix as {}", response.user_id);
        }

        Ok(response.user_id)
    }

    /// Send an `m.text` message with an HTML-formatted body. Returns the event id.
    pub async fn send_formatted(
        &self,
        room_id: &str,
        plain: &str,
        html: &str,
    ) -> MatrixResult<String> {
        let txn_id = uuid::Uuid::new_v4().simple().to_string();
        let path = format!(
            "/_matrix/client/v3/rooms/{}/send/m.room.message/{}",
            urlencoding::encode(room_id),
            txn_id
        );

        let body = FormattedMessage {
            msgtype: MSGTYPE_TEXT,
            body: plain,
            format: FORMAT_HTML,
            formatted_body: html,
        };

        let response: SendResponse = self.api_call(Method::PUT, &path, Some(&body)).await?;
        debug!("Sent event {} to {}", response.event_id, room_id);
        Ok(response.event_id)
    }

    /// Make an authenticated call against the homeserver.
    async fn api_call<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> MatrixResult<T> {
        let url = format!("{}{}", self.config.homeserver_url(), path);

        let mut request = self
            .http
            .request(method, &url)
            .bearer_auth(self.config.access_token());
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();

        if status.is_success() {
            let result: T = response.json().await?;
            return Ok(result);
        }

        let retry_after_header = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .map(|secs| secs * 1000);
        let text = response.text().await.unwrap_or_default();

        match serde_json::from_str::<MatrixApiError>(&text) {
            Ok(mut api_err) => {
                if status == StatusCode::TOO_MANY_REQUESTS && api_err.retry_after_ms.is_none() {
                    api_err.retry_after_ms = retry_after_header;
                }
                Err(api_err.into())
            }
            Err(_) if status == StatusCode::TOO_MANY_REQUESTS => Err(MatrixError::RateLimited {
                retry_after_ms: retry_after_header.unwrap_or(5_000),
            }),
            Err(_) if status == StatusCode::UNAUTHORIZED => Err(MatrixError::Auth(text)),
            Err(_) => Err(MatrixError::Api(format!("{}: {}", status, text))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> MatrixClient {
        let config = MatrixConfig::new(server.uri(), "@bot:example.org", "syt_token");
        MatrixClient::new(config).unwrap()
    }

    #[test]
    fn test_client_rejects_invalid_config() {
        let config = MatrixConfig::new("not-a-url", "@bot:example.org", "tok");
        tokio_test::assert_err!(MatrixClient::new(config));
    }

    #[tokio::test]
    async fn test_whoami() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/_matrix/client/v3/account/whoami"))
            .and(header("Authorization", "Bearer syt_token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"user_id": "@bot:example.org"})),
            )
            .mount(&server)
            .await;

        let user = client_for(&server).whoami().await.unwrap();
        assert_eq!(user, "@bot:example.org");
    }

    #[tokio::test]
    async fn test_whoami_unknown_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/_matrix/client/v3/account/whoami"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "errcode": "M_UNKNOWN_TOKEN",
                "error": "Invalid access token passed."
            })))
            .mount(&server)
            .await;

        let err = client_for(&server).whoami().await.unwrap_err();
        assert!(matches!(err, MatrixError::Auth(_)));
    }

    #[tokio::test]
    async fn test_send_formatted() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path_regex(
                r"^/_matrix/client/v3/rooms/%21room%3Aexample\.org/send/m\.room\.message/[0-9a-f]{32}$",
            ))
            .and(body_json(serde_json::json!({
                "msgtype": "m.text",
                "body": "[BOT STATUS]: Connected",
                "format": "org.matrix.custom.html",
                "formatted_body": "<b>[BOT STATUS]</b>: Connected"
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"event_id": "$abc"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let event_id = client_for(&server)
            .send_formatted(
                "!room:example.org",
                "[BOT STATUS]: Connected",
                "<b>[BOT STATUS]</b>: Connected",
            )
            .await
            .unwrap();
        assert_eq!(event_id, "$abc");
    }

    #[tokio::test]
    async fn test_send_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "errcode": "M_LIMIT_EXCEEDED",
                "error": "Too many requests",
                "retry_after_ms": 2000
            })))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .send_formatted("!room:example.org", "hi", "hi")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            MatrixError::RateLimited {
                retry_after_ms: 2000
            }
        ));
    }

    #[tokio::test]
    async fn test_send_server_error_without_body() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .send_formatted("!room:example.org", "hi", "hi")
            .await
            .unwrap_err();
        assert!(matches!(err, MatrixError::Api(_)));
    }
}
