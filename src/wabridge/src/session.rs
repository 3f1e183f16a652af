//! Session lifecycle of the inbound account.
//!
//! ```text
//! Unauthenticated ──(no stored identity)──▶ Pairing ──(paired)──▶ Connected
//!        │                                     │                      │
//!        └──────(stored identity)──────────────┼──────────────────────┘
//!                                              ▼                      ▼
//!                                         Disconnected ◀──(shutdown)──┘
//! ```
//!
//! Reaching `Connected` and leaving it on shutdown are announced in the
//! destination room.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::signal;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::dispatcher::Dispatcher;
use crate::error::{BridgeError, BridgeResult};
use crate::inbound::{InboundClient, InboundEventHandler, PairingEvent};
use crate::notification::Notification;
use crate::qr::PairingDisplay;

/// State of the inbound session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing attempted yet.
    Unauthenticated,
    /// Waiting for a pairing code to be scanned.
    Pairing,
    /// Live session; events are being bridged.
    Connected,
    /// Session closed, or pairing gave up.
    Disconnected,
}

/// Drives the inbound session and announces its lifecycle.
pub struct SessionController {
    client: Arc<dyn InboundClient>,
    handler: Arc<dyn InboundEventHandler>,
    dispatcher: Arc<Dispatcher>,
    display: Arc<dyn PairingDisplay>,
    state: RwLock<SessionState>,
    shut_down: AtomicBool,
}

impl SessionController {
    pub fn new(
        client: Arc<dyn InboundClient>,
        handler: Arc<dyn InboundEventHandler>,
        dispatcher: Arc<Dispatcher>,
        display: Arc<dyn PairingDisplay>,
    ) -> Self {
        Self {
            client,
            handler,
            dispatcher,
            display,
            state: RwLock::new(SessionState::Unauthenticated),
            shut_down: AtomicBool::new(false),
        }
    }

    pub async fn state(&self) -> SessionState {
        *self.state.read().await
    }

    async fn set_state(&self, state: SessionState) {
        *self.state.write().await = state;
    }

    /// Bring the session up, then register the event handler.
    ///
    /// The handler is registered only once `Connected` has been announced, so
    /// the status always precedes relayed messages; the client queues events
    /// until then. Errors returned here are fatal: without a live connection
    /// the bridge has nothing to do.
    pub async fn start(&self) -> BridgeResult<()> {
        if self.client.has_stored_identity().await {
            info!("Connecting to existing account...");
            if let Err(e) = self.client.connect().await {
                self.set_state(SessionState::Disconnected).await;
                return Err(into_connect_error(e));
            }
            self.mark_connected().await;
            Ok(())
        } else {
            self.pair().await
        }
    }

    /// Link a new device: show pairing codes while connecting.
    async fn pair(&self) -> BridgeResult<()> {
        self.set_state(SessionState::Pairing).await;
        info!("No stored device identity, starting pairing...");

        let mut pairing = self
            .client
            .pairing_events()
            .await
            .map_err(into_connect_error)?;

        let display = self.display.clone();
        let pairing_task = tokio::spawn(async move {
            let mut paired = false;
            while let Some(event) = pairing.recv().await {
                match event {
                    PairingEvent::Code(code) => {
                        // Rendering and writing the image block.
                        let display = display.clone();
                        if let Err(e) =
                            tokio::task::spawn_blocking(move || display.show(&code)).await
                        {
                            error!("Pairing display failed: {}", e);
                        }
                    }
                    PairingEvent::Success => {
                        info!("Pairing successful");
                        paired = true;
                    }
                    other => info!("Login event: {:?}", other),
                }
            }
            paired
        });

        if let Err(e) = self.client.connect().await {
            pairing_task.abort();
            self.set_state(SessionState::Disconnected).await;
            return Err(into_connect_error(e));
        }

        let paired = match pairing_task.await {
            Ok(paired) => paired,
            Err(e) => {
                error!("Pairing task failed: {}", e);
                false
            }
        };

        if paired {
            self.mark_connected().await;
        } else {
            warn!("Pairing ended without linking a device");
            self.set_state(SessionState::Disconnected).await;
        }
        Ok(())
    }

    async fn mark_connected(&self) {
        self.set_state(SessionState::Connected).await;
        info!("Connected");
        self.dispatcher.deliver(&Notification::connected()).await;
        self.client.set_event_handler(self.handler.clone()).await;
    }

    /// Close the session and announce it. Only the first call has an effect.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }

        info!("Disconnecting from WhatsApp...");
        if let Err(e) = self.client.disconnect().await {
            warn!("Disconnect failed: {}", e);
        }
        self.set_state(SessionState::Disconnected).await;
        info!("Closed WhatsApp session");

        self.dispatcher.deliver(&Notification::disconnected()).await;
    }

    /// Start the session, wait for `shutdown`, then close the session.
    ///
    /// A shutdown arriving while the session is still coming up skips
    /// straight to closing it.
    pub async fn run_until<F>(&self, shutdown: F) -> BridgeResult<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let started = tokio::select! {
            result = self.start() => Some(result),
            _ = &mut shutdown => None,
        };

        match started {
            Some(Ok(())) => shutdown.await,
            Some(Err(e)) => return Err(e),
            None => info!("Shutdown requested while starting"),
        }

        self.shutdown().await;
        Ok(())
    }

    /// Run until SIGINT or SIGTERM.
    pub async fn run(&self) -> BridgeResult<()> {
        self.run_until(await_shutdown()).await
    }
}

fn into_connect_error(err: BridgeError) -> BridgeError {
    match err {
        BridgeError::Connect(_) => err,
        other => BridgeError::Connect(other.to_string()),
    }
}

/// Resolve on SIGINT (Ctrl+C) or, on unix, SIGTERM.
pub async fn await_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}
