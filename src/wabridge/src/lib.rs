//! One-way notification bridge from a mobile chat session into a Matrix room.
//!
//! Chat messages received by the linked account are posted into a single
//! Matrix room as `[context] sender: content` notifications, together with
//! `[BOT STATUS]` announcements when the session connects or disconnects.
//!
//! # Architecture
//!
//! - [`session::SessionController`] pairs or reconnects the inbound account
//!   and waits for shutdown
//! - [`translator::EventTranslator`] turns inbound events into
//!   [`notification::Notification`]s, resolving contact and group names
//! - [`dispatcher::Dispatcher`] renders and posts notifications, logging
//!   failed sends instead of propagating them
//! - [`gateway::GatewayClient`] is the inbound client, talking to a gateway
//!   process over WebSocket
//!
//! # Example
//!
//! ```rust,ignore
//! use wabridge::{BridgeConfig, Bridge};
//!
//! let config = BridgeConfig::from_env()?;
//! let bridge = Bridge::build(&config).await?;
//! bridge.controller().run().await?;
//! ```

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod gateway;
pub mod inbound;
pub mod notification;
pub mod qr;
pub mod session;
pub mod store;
pub mod translator;

use std::sync::Arc;

use tracing::info;
use wabridge_matrix::MatrixClient;

// Re-export main types
pub use config::BridgeConfig;
pub use dispatcher::{Dispatcher, RoomSender};
pub use error::{BridgeError, BridgeResult};
pub use events::{InboundEvent, Jid};
pub use gateway::GatewayClient;
pub use inbound::{Directory, InboundClient, InboundEventHandler, PairingEvent};
pub use notification::Notification;
pub use session::{SessionController, SessionState};
pub use store::DeviceStore;
pub use translator::EventTranslator;

/// Fully wired bridge.
pub struct Bridge {
    controller: SessionController,
}

impl Bridge {
    /// Build every component from configuration.
    ///
    /// Fails if the Matrix token is rejected or the device store cannot be
    /// opened; both are fatal.
    pub async fn build(config: &BridgeConfig) -> BridgeResult<Self> {
        info!("Logging in to Matrix...");
        let matrix = MatrixClient::new(config.matrix_config())
            .map_err(|e| BridgeError::Config(e.to_string()))?;
        matrix.whoami().await.map_err(BridgeError::Auth)?;

        let store = Arc::new(DeviceStore::open(config.db_path()).await?);
        let gateway = GatewayClient::new(config.gateway_url(), store);

        let dispatcher = Arc::new(Dispatcher::new(Arc::new(matrix), config.room_id()));
        let translator = Arc::new(EventTranslator::new(
            Arc::new(gateway.clone()),
            dispatcher.clone(),
        ));
        let display = Arc::new(qr::QrDisplay::new(config.qr_image_path()));

        let controller =
            SessionController::new(Arc::new(gateway), translator, dispatcher, display);

        Ok(Self { controller })
    }

    pub fn controller(&self) -> &SessionController {
        &self.controller
    }
}
