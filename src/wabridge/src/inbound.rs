//! Interface to the inbound (mobile chat) client.
//!
//! The bridge never speaks the inbound protocol itself. It drives a client
//! through [`InboundClient`], resolves names through [`Directory`], and
//! receives events through an [`InboundEventHandler`] it registers.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::BridgeResult;
use crate::events::{InboundEvent, Jid};

/// Entry from the local contact directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    /// Whether the directory knows this account at all.
    #[serde(default)]
    pub found: bool,
    /// Name from the address book.
    #[serde(default)]
    pub full_name: String,
    /// Name the account advertises for itself.
    #[serde(default)]
    pub push_name: String,
}

/// Group metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupInfo {
    pub jid: Jid,
    /// Display name of the group.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
}

/// Items emitted on the pairing stream while no device identity exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingEvent {
    /// A code to be shown as a scannable QR.
    Code(String),
    /// The device has been linked.
    Success,
    /// No code was scanned in time.
    Timeout,
    /// Any other lifecycle notice (e.g. `error`, `client-outdated`).
    Other(String),
}

impl PairingEvent {
    /// Build from the event name and optional code used on the wire.
    pub fn from_wire(event: &str, code: Option<String>) -> Self {
        match (event, code) {
            ("code", Some(code)) => PairingEvent::Code(code),
            ("success", _) => PairingEvent::Success,
            ("timeout", _) => PairingEvent::Timeout,
            (other, _) => PairingEvent::Other(other.to_string()),
        }
    }
}

/// Consumer of inbound events.
///
/// The client invokes the handler once per event, in delivery order, and
/// waits for it to return before handing over the next one.
#[async_trait]
pub trait InboundEventHandler: Send + Sync {
    async fn handle_event(&self, event: InboundEvent);
}

/// Contact and group lookups.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Look up a contact. A missing contact is `Ok` with `found == false`.
    async fn contact(&self, jid: &Jid) -> BridgeResult<ContactInfo>;

    /// Fetch group metadata.
    async fn group_info(&self, jid: &Jid) -> BridgeResult<GroupInfo>;
}

/// Session operations of the inbound client.
#[async_trait]
pub trait InboundClient: Send + Sync {
    /// Whether a device identity from an earlier pairing is stored.
    async fn has_stored_identity(&self) -> bool;

    /// Register the event handler, replacing any previous one. Events that
    /// arrive while no handler is registered are held until one is.
    async fn set_event_handler(&self, handler: Arc<dyn InboundEventHandler>);

    /// Open the pairing stream. Must be called before [`Self::connect`];
    /// the stream closes once pairing succeeds or gives up.
    async fn pairing_events(&self) -> BridgeResult<mpsc::Receiver<PairingEvent>>;

    /// Establish the connection.
    async fn connect(&self) -> BridgeResult<()>;

    /// Close the connection.
    async fn disconnect(&self) -> BridgeResult<()>;
}
