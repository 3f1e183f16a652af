//! Bridge configuration.
//!
//! Everything is read once at startup from the process environment (after an
//! optional `.env` file has been loaded by the binary).
//!
//! Required variables:
//! - `HOMESERVER_URL`
//! - `USER_ID`
//! - `ACCESS_TOKEN`
//! - `ROOM_ID`
//! - `DB_PATH`
//!
//! Optional variables:
//! - `WA_GATEWAY_URL` (default `ws://127.0.0.1:8765/ws`)
//! - `QR_IMAGE_PATH` (default `/tmp/wabridge-qrcode.png`)

use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use tracing::warn;
use wabridge_matrix::MatrixConfig;

use crate::error::{BridgeError, BridgeResult};

/// Default WebSocket endpoint of the inbound gateway.
pub const DEFAULT_GATEWAY_URL: &str = "ws://127.0.0.1:8765/ws";

/// Default location of the pairing QR image.
pub const DEFAULT_QR_IMAGE_PATH: &str = "/tmp/wabridge-qrcode.png";

/// Configuration for the bridge process.
#[derive(Clone)]
pub struct BridgeConfig {
    /// Matrix homeserver base URL.
    homeserver_url: String,
    /// Matrix user id of the bot account.
    user_id: String,
    /// Matrix access token.
    access_token: SecretString,
    /// Destination room.
    room_id: String,
    /// Device identity store location.
    db_path: PathBuf,
    /// Inbound gateway WebSocket URL.
    gateway_url: String,
    /// Where the pairing QR image is written.
    qr_image_path: PathBuf,
}

impl std::fmt::Debug for BridgeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeConfig")
            .field("homeserver_url", &self.homeserver_url)
            .field("user_id", &self.user_id)
            .field("access_token", &"[REDACTED]")
            .field("room_id", &self.room_id)
            .field("db_path", &self.db_path)
            .field("gateway_url", &self.gateway_url)
            .field("qr_image_path", &self.qr_image_path)
            .finish()
    }
}

impl BridgeConfig {
    /// Create a configuration with the required values and default optionals.
    pub fn new(
        homeserver_url: impl Into<String>,
        user_id: impl Into<String>,
        access_token: impl Into<String>,
        room_id: impl Into<String>,
        db_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            homeserver_url: homeserver_url.into(),
            user_id: user_id.into(),
            access_token: SecretString::new(access_token.into().into()),
            room_id: room_id.into(),
            db_path: db_path.into(),
            gateway_url: DEFAULT_GATEWAY_URL.to_string(),
            qr_image_path: PathBuf::from(DEFAULT_QR_IMAGE_PATH),
        }
    }

    /// Set the inbound gateway URL.
    pub fn with_gateway_url(mut self, url: impl Into<String>) -> Self {
        self.gateway_url = url.into();
        self
    }

    /// Set the pairing QR image path.
    pub fn with_qr_image_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.qr_image_path = path.into();
        self
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> BridgeResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> BridgeResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| BridgeError::Config(format!("{} not set", key)))
        };

        let homeserver_url = required("HOMESERVER_URL")?;
        let user_id = required("USER_ID")?;
        let access_token = required("ACCESS_TOKEN")?;
        let room_id = required("ROOM_ID")?;
        let db_path = required("DB_PATH")?;

        let mut config = Self::new(homeserver_url, user_id, access_token, room_id, db_path);

        if let Some(url) = lookup("WA_GATEWAY_URL").filter(|v| !v.is_empty()) {
            config = config.with_gateway_url(url);
        }
        if let Some(path) = lookup("QR_IMAGE_PATH").filter(|v| !v.is_empty()) {
            config = config.with_qr_image_path(path);
        }

        if !config.gateway_url.starts_with("wss://") {
            warn!("Gateway URL is not using TLS: {}", config.gateway_url);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn gateway_url(&self) -> &str {
        &self.gateway_url
    }

    pub fn qr_image_path(&self) -> &Path {
        &self.qr_image_path
    }

    /// Settings for the outbound Matrix client.
    pub fn matrix_config(&self) -> MatrixConfig {
        MatrixConfig::new(
            self.homeserver_url.clone(),
            self.user_id.clone(),
            self.access_token.expose_secret(),
        )
    }

    /// Validate the configuration.
    pub fn validate(&self) -> BridgeResult<()> {
        if !self.homeserver_url.starts_with("http://")
            && !self.homeserver_url.starts_with("https://")
        {
            return Err(BridgeError::Config(
                "HOMESERVER_URL must start with 'http://' or 'https://'".to_string(),
            ));
        }
        if !self.user_id.starts_with('@') {
            return Err(BridgeError::Config(
                "USER_ID must start with '@'".to_string(),
            ));
        }
        if self.access_token.expose_secret().is_empty() {
            return Err(BridgeError::Config("ACCESS_TOKEN is empty".to_string()));
        }
        if !self.room_id.starts_with('!') && !self.room_id.starts_with('#') {
            return Err(BridgeError::Config(
                "ROOM_ID must start with '!' or '#'".to_string(),
            ));
        }
        if self.db_path.as_os_str().is_empty() {
            return Err(BridgeError::Config("DB_PATH is empty".to_string()));
        }
        if !self.gateway_url.starts_with("ws://") && !self.gateway_url.starts_with("wss://") {
            return Err(BridgeError::Config(
                "WA_GATEWAY_URL must start with 'ws://' or 'wss://'".to_string(),
            ));
        }
        Ok(())
    }
}
