//! Connection settings for the Matrix client.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::error::{MatrixError, MatrixResult};

/// Default timeout applied to every homeserver request.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for [`crate::MatrixClient`].
#[derive(Clone)]
pub struct MatrixConfig {
    /// Homeserver base URL, without trailing slash.
    homeserver_url: String,
    /// Fully-qualified user id (`@bot:example.org`).
    user_id: String,
    /// Access token.
    access_token: SecretString,
    /// Request timeout.
    timeout: Duration,
}

impl std::fmt::Debug for MatrixConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatrixConfig")
            .field("homeserver_url", &self.homeserver_url)
            .field("user_id", &self.user_id)
            .field("access_token", &"[REDACTED]")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl MatrixConfig {
    /// Create a new configuration.
    pub fn new(
        homeserver_url: impl Into<String>,
        user_id: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        let homeserver_url: String = homeserver_url.into();
        Self {
            homeserver_url: homeserver_url.trim_end_matches('/').to_string(),
            user_id: user_id.into(),
            access_token: SecretString::new(access_token.into().into()),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn homeserver_url(&self) -> &str {
        &self.homeserver_url
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn access_token(&self) -> &str {
        self.access_token.expose_secret()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Validate the configuration.
    pub fn validate(&self) -> MatrixResult<()> {
        if self.homeserver_url.is_empty() {
            return Err(MatrixError::Config("Homeserver URL is empty".to_string()));
        }
        if !self.homeserver_url.starts_with("http://") && !self.homeserver_url.starts_with("https://")
        {
            return Err(MatrixError::Config(
                "Homeserver URL must start with 'http://' or 'https://'".to_string(),
            ));
        }
        if !self.user_id.starts_with('@') {
            return Err(MatrixError::Config(
                "User id must start with '@'".to_string(),
            ));
        }
        if self.access_token.expose_secret().is_empty() {
            return Err(MatrixError::Config("Access token is empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_trims_trailing_slash() {
        let config = MatrixConfig::new("https://matrix.example.org/", "@bot:example.org", "tok");
        assert_eq!(config.homeserver_url(), "https://matrix.example.org");
        assert_eq!(config.timeout(), DEFAULT_TIMEOUT);
    }

    #[test]
    fn test_config_validate() {
        let config = MatrixConfig::new("https://matrix.example.org", "@bot:example.org", "tok");
        assert!(config.validate().is_ok());

        let config = MatrixConfig::new("matrix.example.org", "@bot:example.org", "tok");
        assert!(config.validate().is_err());

        let config = MatrixConfig::new("https://matrix.example.org", "bot:example.org", "tok");
        assert!(config.validate().is_err());

        let config = MatrixConfig::new("https://matrix.example.org", "@bot:example.org", "");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_debug_redacts_token() {
        let config = MatrixConfig::new("https://m.org", "@bot:m.org", "syt_super_secret");
        let debug_str = format!("{:?}", config);
        assert!(!debug_str.contains("syt_super_secret"));
        assert!(debug_str.contains("[REDACTED]"));
    }
}
