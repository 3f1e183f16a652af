//! Inbound events from the mobile chat session.
//!
//! The event vocabulary is fixed by the protocol, so it is modelled as a
//! closed enum. Kinds the bridge does not care about collapse into
//! [`InboundEvent::Other`].

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BridgeError;

/// Server part used by individual accounts.
pub const USER_SERVER: &str = "s.whatsapp.net";
/// Server part used by groups.
pub const GROUP_SERVER: &str = "g.us";

/// Address of an account or group (`user@server`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Jid {
    /// Numeric phone-style identifier (or group id).
    pub user: String,
    /// Server part.
    pub server: String,
}

impl Jid {
    pub fn new(user: impl Into<String>, server: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            server: server.into(),
        }
    }

    /// Individual account on the default server.
    pub fn user(user: impl Into<String>) -> Self {
        Self::new(user, USER_SERVER)
    }

    /// Group on the group server.
    pub fn group(id: impl Into<String>) -> Self {
        Self::new(id, GROUP_SERVER)
    }

    pub fn is_group(&self) -> bool {
        self.server == GROUP_SERVER
    }
}

impl fmt::Display for Jid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.user, self.server)
    }
}

impl FromStr for Jid {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('@') {
            // Device suffixes (`user:12@server`) address the same account.
            Some((user, server)) if !user.is_empty() && !server.is_empty() => {
                let user = user.split(':').next().unwrap_or(user);
                Ok(Jid::new(user, server))
            }
            _ => Err(BridgeError::Gateway(format!("Invalid JID: {}", s))),
        }
    }
}

impl TryFrom<String> for Jid {
    type Error = BridgeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Jid> for String {
    fn from(jid: Jid) -> Self {
        jid.to_string()
    }
}

/// Events delivered by the inbound client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    /// A chat message.
    Message(ChatEvent),
    /// A presence update.
    Presence(PresenceEvent),
    /// Anything else (receipts, typing, history sync...).
    #[serde(other)]
    Other,
}

/// A chat message event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatEvent {
    /// Metadata about the message.
    pub info: MessageInfo,
    /// Message payload.
    #[serde(default)]
    pub message: MessageContent,
}

/// Metadata attached to a chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageInfo {
    /// Message id.
    pub id: String,
    /// Conversation the message belongs to.
    pub chat: Jid,
    /// Author of the message.
    pub sender: Jid,
    /// Sent by this account (possibly from another linked device).
    #[serde(default)]
    pub is_from_me: bool,
    /// Sent in a group conversation.
    #[serde(default)]
    pub is_group: bool,
    /// Name the sender advertises for themselves.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Message payload. Only the textual parts are modelled.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageContent {
    /// Plain text message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation: Option<String>,
    /// Text message with link preview, quote or mentions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extended_text: Option<String>,
    /// Caption of an image, video or document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

impl MessageContent {
    /// Plain text body, or an empty string for media-only messages.
    pub fn text(&self) -> &str {
        self.conversation
            .as_deref()
            .or(self.extended_text.as_deref())
            .or(self.caption.as_deref())
            .unwrap_or("")
    }
}

/// A presence update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceEvent {
    /// Account the update is about.
    pub from: Jid,
    /// Whether the account went offline.
    #[serde(default)]
    pub unavailable: bool,
    /// Last time the account was seen online, if shared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jid_parse() {
        let jid: Jid = "5551234@s.whatsapp.net".parse().unwrap();
        assert_eq!(jid.user, "5551234");
        assert!(!jid.is_group());

        let jid: Jid = "5551234:7@s.whatsapp.net".parse().unwrap();
        assert_eq!(jid, Jid::user("5551234"));

        let group: Jid = "120363000000@g.us".parse().unwrap();
        assert!(group.is_group());

        assert!("no-at-sign".parse::<Jid>().is_err());
        assert!("@g.us".parse::<Jid>().is_err());
    }

    #[test]
    fn test_parse_message_event() {
        let json = serde_json::json!({
            "type": "message",
            "info": {
                "id": "3EB0",
                "chat": "120363000000@g.us",
                "sender": "5551234@s.whatsapp.net",
                "is_group": true,
                "timestamp": "2024-05-01T12:00:00Z"
            },
            "message": {"conversation": "hi"}
        });

        let event: InboundEvent = serde_json::from_value(json).unwrap();
        match event {
            InboundEvent::Message(chat) => {
                assert!(chat.info.is_group);
                assert!(!chat.info.is_from_me);
                assert_eq!(chat.info.sender.user, "5551234");
                assert_eq!(chat.message.text(), "hi");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_parse_presence_event() {
        let json = serde_json::json!({
            "type": "presence",
            "from": "5551234@s.whatsapp.net",
            "unavailable": true,
            "last_seen": "2024-05-01T12:00:00Z"
        });

        let event: InboundEvent = serde_json::from_value(json).unwrap();
        match event {
            InboundEvent::Presence(p) => {
                assert!(p.unavailable);
                assert!(p.last_seen.is_some());
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_parse_unknown_event() {
        let json = serde_json::json!({"type": "receipt", "ids": ["1"]});
        let event: InboundEvent = serde_json::from_value(json).unwrap();
        assert!(matches!(event, InboundEvent::Other));
    }

    #[test]
    fn test_message_text_fallbacks() {
        let content = MessageContent {
            extended_text: Some("look at this".to_string()),
            ..Default::default()
        };
        assert_eq!(content.text(), "look at this");

        let content = MessageContent {
            caption: Some("holiday".to_string()),
            ..Default::default()
        };
        assert_eq!(content.text(), "holiday");

        assert_eq!(MessageContent::default().text(), "");
    }
}
