//! Notifications posted into the destination room.
//!
//! Every notification renders to a plain-text body and an HTML body; the
//! Matrix message carries both.

use std::fmt;

/// Label prefixed to lifecycle notifications.
const STATUS_LABEL: &str = "[BOT STATUS]";

/// A notification bound for the destination room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// A relayed chat message.
    Chat {
        /// Conversation label (group name or DM marker).
        context: String,
        /// Display identity of the sender.
        sender: String,
        /// Message body.
        content: String,
    },
    /// A bridge lifecycle announcement.
    Status {
        /// Description of the lifecycle event.
        content: String,
    },
}

impl Notification {
    pub fn chat(
        context: impl Into<String>,
        sender: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Notification::Chat {
            context: context.into(),
            sender: sender.into(),
            content: content.into(),
        }
    }

    pub fn status(content: impl Into<String>) -> Self {
        Notification::Status {
            content: content.into(),
        }
    }

    /// Announced once the inbound session is live.
    pub fn connected() -> Self {
        Self::status("Connected")
    }

    /// Announced after the inbound session has been closed.
    pub fn disconnected() -> Self {
        Self::status("Disconnected")
    }

    /// Plain-text body.
    pub fn render_plain(&self) -> String {
        match self {
            Notification::Chat {
                context,
                sender,
                content,
            } => format!("[{}] {}: {}", context, sender, content),
            Notification::Status { content } => format!("{}: {}", STATUS_LABEL, content),
        }
    }

    /// HTML body. The message content is passed through untouched.
    pub fn render_rich(&self) -> String {
        match self {
            Notification::Chat {
                context,
                sender,
                content,
            } => format!("[<i>{}</i>] <b>{}</b>: {}", context, sender, content),
            Notification::Status { content } => format!("<b>{}</b>: {}", STATUS_LABEL, content),
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render_plain())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_render_plain() {
        let n = Notification::chat("Team", "Alice (+5551234)", "hi");
        assert_eq!(n.render_plain(), "[Team] Alice (+5551234): hi");
    }

    #[test]
    fn test_chat_render_rich() {
        let n = Notification::chat("Team", "Alice (+5551234)", "hi");
        assert_eq!(n.render_rich(), "[<i>Team</i>] <b>Alice (+5551234)</b>: hi");
    }

    #[test]
    fn test_chat_rich_leaves_content_unescaped() {
        let n = Notification::chat("DM 5551234", "+5551234", "<script> & friends");
        assert!(n.render_rich().ends_with(": <script> & friends"));
        assert_eq!(n.render_plain(), "[DM 5551234] +5551234: <script> & friends");
    }

    #[test]
    fn test_status_render() {
        let n = Notification::connected();
        assert_eq!(n.render_plain(), "[BOT STATUS]: Connected");
        assert_eq!(n.render_rich(), "<b>[BOT STATUS]</b>: Connected");

        let n = Notification::disconnected();
        assert_eq!(n.render_plain(), "[BOT STATUS]: Disconnected");
        assert_eq!(n.to_string(), "[BOT STATUS]: Disconnected");
    }

    #[test]
    fn test_empty_content() {
        let n = Notification::chat("Team", "+1", "");
        assert_eq!(n.render_plain(), "[Team] +1: ");
    }

    #[test]
    fn test_display_is_plain() {
        let n = Notification::status("Pairing");
        assert_eq!(n.to_string(), n.render_plain());
    }
}
