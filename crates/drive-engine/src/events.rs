//! In-process event publishing for single-node deployments.

use async_trait::async_trait;
use tokio::sync::broadcast;

use drive_core::events::StorageEvent;
use drive_core::result::AppResult;
use drive_core::traits::events::EventPublisher;

/// Broadcast-channel [`EventPublisher`].
///
/// Each subscriber gets every event published after it subscribed. A slow
/// subscriber can lag and miss events; delivery is at-least-once only for
/// subscribers that keep up, which matches the engine's contract — the
/// external consumers deduplicate on `(file_id, version_number)`.
#[derive(Debug)]
pub struct BroadcastPublisher {
    tx: broadcast::Sender<StorageEvent>,
}

impl BroadcastPublisher {
    /// Create a publisher with the given channel capacity.
    pub fn new(buffer_size: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer_size);
        Self { tx }
    }

    /// Subscribe to all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastPublisher {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EventPublisher for BroadcastPublisher {
    async fn publish(&self, event: StorageEvent) -> AppResult<()> {
        // A send error only means there are no subscribers right now.
        let _ = self.tx.send(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drive_core::types::{FileId, OwnerId};

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let publisher = BroadcastPublisher::new(8);
        let mut rx = publisher.subscribe();

        let event = StorageEvent::FileDeleted {
            file_id: FileId::new(),
            owner_id: OwnerId::new(),
        };
        publisher.publish(event.clone()).await.unwrap();

        let received = rx.recv().await.unwrap();
        assert!(matches!(received, StorageEvent::FileDeleted { .. }));
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let publisher = BroadcastPublisher::new(8);
        publisher
            .publish(StorageEvent::FileDeleted {
                file_id: FileId::new(),
                owner_id: OwnerId::new(),
            })
            .await
            .unwrap();
    }
}
