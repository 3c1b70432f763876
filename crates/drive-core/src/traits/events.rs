//! Event publisher trait.

use async_trait::async_trait;

use crate::events::StorageEvent;
use crate::result::AppResult;

/// Publishes storage events to external consumers.
///
/// Implementations provide at-least-once delivery; the engine may publish
/// the same event again after a retried completion, and consumers dedupe
/// on `(file_id, version_number)`.
#[async_trait]
pub trait EventPublisher: Send + Sync + std::fmt::Debug + 'static {
    /// Publish a single event.
    async fn publish(&self, event: StorageEvent) -> AppResult<()>;
}
