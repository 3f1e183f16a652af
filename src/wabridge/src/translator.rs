//! Translation of inbound events into notifications.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::dispatcher::Dispatcher;
use crate::events::{ChatEvent, InboundEvent, Jid, PresenceEvent};
use crate::inbound::{Directory, InboundEventHandler};
use crate::notification::Notification;

/// Context used when group metadata cannot be fetched.
pub const UNKNOWN_GROUP: &str = "Unknown group";

/// Resolves display context for inbound events and forwards the resulting
/// notifications to the dispatcher.
pub struct EventTranslator {
    directory: Arc<dyn Directory>,
    dispatcher: Arc<Dispatcher>,
}

impl EventTranslator {
    pub fn new(directory: Arc<dyn Directory>, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            directory,
            dispatcher,
        }
    }

    /// Turn an event into a notification, if it should produce one.
    pub async fn translate(&self, event: &InboundEvent) -> Option<Notification> {
        match event {
            InboundEvent::Message(chat) => self.translate_chat(chat).await,
            InboundEvent::Presence(presence) => {
                log_presence(presence);
                None
            }
            InboundEvent::Other => None,
        }
    }

    async fn translate_chat(&self, chat: &ChatEvent) -> Option<Notification> {
        if chat.info.is_from_me {
            debug!("Skipping own message {}", chat.info.id);
            return None;
        }

        let sender = self.resolve_sender(&chat.info.sender).await;
        let context = if chat.info.is_group {
            self.resolve_group(&chat.info.chat).await
        } else {
            format!("DM {}", chat.info.sender.user)
        };

        Some(Notification::chat(context, sender, chat.message.text()))
    }

    /// `Full Name (+number)` for known contacts, `+number` otherwise.
    async fn resolve_sender(&self, jid: &Jid) -> String {
        let number = format!("+{}", jid.user);

        match self.directory.contact(jid).await {
            Ok(contact) if contact.found && !contact.full_name.is_empty() => {
                format!("{} ({})", contact.full_name, number)
            }
            Ok(_) => number,
            Err(e) => {
                warn!("Failed to get user info for {}: {}", jid, e);
                number
            }
        }
    }

    async fn resolve_group(&self, jid: &Jid) -> String {
        match self.directory.group_info(jid).await {
            Ok(group) => group.name,
            Err(e) => {
                warn!("Failed to get group info for {}: {}", jid, e);
                UNKNOWN_GROUP.to_string()
            }
        }
    }
}

fn log_presence(presence: &PresenceEvent) {
    let last_seen = presence
        .last_seen
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "-".to_string());
    info!(
        "[WA PRESENCE] {}: {} {}",
        presence.from.user, last_seen, presence.unavailable
    );
}

#[async_trait]
impl InboundEventHandler for EventTranslator {
    async fn handle_event(&self, event: InboundEvent) {
        if let Some(notification) = self.translate(&event).await {
            self.dispatcher.deliver(&notification).await;
        }
    }
}
