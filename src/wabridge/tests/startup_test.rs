use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use wabridge::{Bridge, BridgeConfig, BridgeError};

const WHOAMI: &str = "/_matrix/client/v3/account/whoami";

fn config_for(server: &MockServer, dir: &TempDir) -> BridgeConfig {
    BridgeConfig::new(
        server.uri(),
        "@bot:example.org",
        "syt_token",
        "!room:example.org",
        dir.path().join("device.json"),
    )
}

#[tokio::test]
async fn test_rejected_token_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(WHOAMI))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "errcode": "M_UNKNOWN_TOKEN",
            "error": "Invalid access token passed."
        })))
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();

    let err = Bridge::build(&config_for(&server, &dir))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, BridgeError::Auth(_)));
    assert!(err.is_fatal());
    // Nothing else is touched once the login fails.
    assert!(!dir.path().join("device.json").exists());
}

#[tokio::test]
async fn test_build_opens_device_store() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(WHOAMI))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"user_id": "@bot:example.org"})),
        )
        .expect(1)
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();

    let bridge = Bridge::build(&config_for(&server, &dir)).await;
    assert!(bridge.is_ok());
    assert!(dir.path().join("device.json").exists());
}

#[tokio::test]
async fn test_invalid_homeserver_is_a_config_error() {
    let dir = TempDir::new().unwrap();
    let config = BridgeConfig::new(
        "matrix.example.org",
        "@bot:example.org",
        "syt_token",
        "!room:example.org",
        dir.path().join("device.json"),
    );

    let err = Bridge::build(&config).await.err().unwrap();
    assert!(matches!(err, BridgeError::Config(_)));
    assert!(err.is_fatal());
}
