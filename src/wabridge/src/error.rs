//! Error types for the bridge.
//!
//! Errors split into two groups. Fatal ones ([`BridgeError::is_fatal`]) can
//! only surface during startup or the initial connect and stop the process.
//! Everything else is logged where it is detected and replaced by a fallback.

use thiserror::Error;
use wabridge_matrix::MatrixError;

/// Errors that can occur while running the bridge.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Configuration error (missing or invalid environment).
    #[error("Configuration error: {0}")]
    Config(String),

    /// The Matrix account could not be verified at startup.
    #[error("Matrix login failed: {0}")]
    Auth(MatrixError),

    /// The device identity store could not be opened or written.
    #[error("Device store error: {0}")]
    Store(String),

    /// The inbound connection could not be established.
    #[error("Connect error: {0}")]
    Connect(String),

    /// Protocol or transport error on the inbound gateway link.
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// A gateway request did not receive a response in time.
    #[error("Gateway request timed out: {0}")]
    Timeout(String),

    /// Contact or group lookup failed.
    #[error("Lookup error: {0}")]
    Lookup(String),

    /// A pairing code could not be turned into a QR code.
    #[error("QR code error: {0}")]
    Qr(String),

    /// Outbound (Matrix) failure.
    #[error("Outbound error: {0}")]
    Outbound(#[from] MatrixError),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(String),
}

impl BridgeError {
    /// Whether this error must stop the process.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BridgeError::Config(_)
                | BridgeError::Auth(_)
                | BridgeError::Store(_)
                | BridgeError::Connect(_)
        )
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::Json(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for BridgeError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        BridgeError::Gateway(err.to_string())
    }
}

impl From<std::env::VarError> for BridgeError {
    fn from(err: std::env::VarError) -> Self {
        BridgeError::Config(format!("Environment variable error: {}", err))
    }
}

/// Result type for bridge operations.
pub type BridgeResult<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BridgeError::Config("ROOM_ID not set".to_string());
        assert_eq!(err.to_string(), "Configuration error: ROOM_ID not set");

        let err = BridgeError::Outbound(MatrixError::Auth("bad token".to_string()));
        assert_eq!(
            err.to_string(),
            "Outbound error: Authentication error: bad token"
        );
    }

    #[test]
    fn test_fatal_classification() {
        assert!(BridgeError::Connect("refused".to_string()).is_fatal());
        assert!(BridgeError::Store("corrupt".to_string()).is_fatal());
        assert!(BridgeError::Auth(MatrixError::Auth("M_UNKNOWN_TOKEN".to_string())).is_fatal());
        // A failed delivery after startup only gets logged.
        assert!(!BridgeError::Outbound(MatrixError::Network("reset".to_string())).is_fatal());
        assert!(!BridgeError::Qr("data too long".to_string()).is_fatal());
        assert!(!BridgeError::Lookup("no such group".to_string()).is_fatal());
        assert!(!BridgeError::Timeout("get_contact".to_string()).is_fatal());
    }

    #[test]
    fn test_json_conversion() {
        let err: BridgeError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(err, BridgeError::Json(_)));
    }
}
