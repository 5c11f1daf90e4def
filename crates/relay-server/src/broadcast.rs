use std::sync::Arc;

use filedrop_protocol::MessageType;
use serde::Serialize;

use crate::registry::ConnectionRegistry;

/// Fans events out to every connection but one.
#[derive(Clone)]
pub struct Notifier {
    registry: Arc<ConnectionRegistry>,
}

impl Notifier {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Sends `payload` as a `msg_type` event to every registered connection
    /// except `excluding`.
    ///
    /// Delivery failures (full buffer, closed peer) are skipped. Returns
    /// how many connections accepted the event.
    pub async fn notify_others<T: Serialize>(
        &self,
        excluding: &str,
        msg_type: MessageType,
        payload: &T,
    ) -> usize {
        let mut delivered = 0;
        for sender in self.registry.senders_except(excluding).await {
            match sender.send_event(msg_type, payload) {
                Ok(()) => delivered += 1,
                Err(_) => tracing::debug!(
                    connection_id = sender.connection_id(),
                    ?msg_type,
                    "broadcast not delivered"
                ),
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Sender;
    use filedrop_protocol::Message;
    use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;

    #[tokio::test]
    async fn excludes_originator_and_skips_dead_peers() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (s1, mut rx1) = Sender::channel("c1", 4);
        let (s2, mut rx2) = Sender::channel("c2", 4);
        let (s3, rx3) = Sender::channel("c3", 4);
        registry.register(s1).await;
        registry.register(s2).await;
        registry.register(s3).await;
        drop(rx3);

        let notifier = Notifier::new(Arc::clone(&registry));
        let payload = serde_json::json!({"userId": "c1", "status": "away"});
        let delivered = notifier
            .notify_others("c1", MessageType::UserUpdated, &payload)
            .await;
        assert_eq!(delivered, 1);

        let Some(WsMessage::Text(text)) = rx2.recv().await else {
            panic!("c2 should receive the event");
        };
        let msg: Message = serde_json::from_str(&text).unwrap();
        assert_eq!(msg.msg_type, MessageType::UserUpdated);
        assert!(rx1.try_recv().is_err());
    }

    #[tokio::test]
    async fn empty_registry_is_fine() {
        let notifier = Notifier::new(Arc::new(ConnectionRegistry::new()));
        let n = notifier
            .notify_others("c1", MessageType::FileUploaded, &serde_json::json!({}))
            .await;
        assert_eq!(n, 0);
    }
}
