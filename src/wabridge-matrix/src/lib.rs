//! Matrix client for wabridge.
//!
//! Only the small slice of the client-server API the bridge needs is covered:
//! - `account/whoami` to verify the access token at startup
//! - `m.room.message` sends carrying both a plain and an HTML body
//!
//! # Example
//!
//! ```rust,ignore
//! use wabridge_matrix::{MatrixClient, MatrixConfig};
//!
//! let config = MatrixConfig::new("https://matrix.example.org", "@bot:example.org", "syt_...");
//! let client = MatrixClient::new(config)?;
//! client.whoami().await?;
//! client
//!     .send_formatted("!room:example.org", "[BOT STATUS]: Connected", "<b>[BOT STATUS]</b>: Connected")
//!     .await?;
//! ```

pub mod client;
pub mod config;
pub mod error;

pub use client::MatrixClient;
pub use config::MatrixConfig;
pub use error::{MatrixApiError, MatrixError, MatrixResult};
