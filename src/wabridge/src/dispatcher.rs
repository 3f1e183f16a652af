//! Delivery of notifications into the destination room.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};
use wabridge_matrix::{MatrixClient, MatrixResult};

use crate::notification::Notification;

/// Outbound side: posts a message carrying a plain and an HTML body.
#[async_trait]
pub trait RoomSender: Send + Sync {
    /// Send one formatted message. Returns the id of the created event.
    async fn send_formatted(&self, room_id: &str, plain: &str, rich: &str)
    -> MatrixResult<String>;
}

#[async_trait]
impl RoomSender for MatrixClient {
    async fn send_formatted(
        &self,
        room_id: &str,
        plain: &str,
        rich: &str,
    ) -> MatrixResult<String> {
        MatrixClient::send_formatted(self, room_id, plain, rich).await
    }
}

/// Renders notifications and posts them to the configured room.
///
/// Delivery is fire-and-forget: a failed send is logged and dropped.
pub struct Dispatcher {
    sender: Arc<dyn RoomSender>,
    room_id: String,
}

impl Dispatcher {
    pub fn new(sender: Arc<dyn RoomSender>, room_id: impl Into<String>) -> Self {
        Self {
            sender,
            room_id: room_id.into(),
        }
    }

    /// Deliver a notification. Never fails and never retries.
    pub async fn deliver(&self, notification: &Notification) {
        let plain = notification.render_plain();
        let rich = notification.render_rich();

        info!("[NOTIFY] {}", plain);

        if let Err(e) = self
            .sender
            .send_formatted(&self.room_id, &plain, &rich)
            .await
        {
            error!("Failed to send Matrix message: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use wabridge_matrix::MatrixError;

    /// Records sends; fails the ones whose plain body contains `fail`.
    #[derive(Default)]
    struct RecordingSender {
        sent: Mutex<Vec<(String, String, String)>>,
    }

    #[async_trait]
    impl RoomSender for RecordingSender {
        async fn send_formatted(
            &self,
            room_id: &str,
            plain: &str,
            rich: &str,
        ) -> MatrixResult<String> {
            self.sent.lock().unwrap().push((
                room_id.to_string(),
                plain.to_string(),
                rich.to_string(),
            ));
            if plain.contains("fail") {
                return Err(MatrixError::Network("connection reset".to_string()));
            }
            Ok("$event".to_string())
        }
    }

    #[tokio::test]
    async fn test_deliver_sends_both_renderings() {
        let sender = Arc::new(RecordingSender::default());
        let dispatcher = Dispatcher::new(sender.clone(), "!room:example.org");

        dispatcher
            .deliver(&Notification::chat("Team", "Alice (+5551234)", "hi"))
            .await;

        let sent = sender.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "!room:example.org");
        assert_eq!(sent[0].1, "[Team] Alice (+5551234): hi");
        assert_eq!(sent[0].2, "[<i>Team</i>] <b>Alice (+5551234)</b>: hi");
    }

    #[tokio::test]
    async fn test_delivery_failure_does_not_block_next() {
        let sender = Arc::new(RecordingSender::default());
        let dispatcher = Dispatcher::new(sender.clone(), "!room:example.org");

        dispatcher
            .deliver(&Notification::chat("Team", "+1", "this will fail"))
            .await;
        dispatcher.deliver(&Notification::connected()).await;

        let sent = sender.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].1, "[BOT STATUS]: Connected");
    }
}
