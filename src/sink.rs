use std::time::Duration;

use async_trait::async_trait;

use crate::models::CustomEvent;

/// A telemetry backend accepting named custom events.
///
/// Events are recorded without waiting for the backend; they are only
/// guaranteed to leave the process once [`EventSink::shutdown`] returns.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Wait up to `timeout` for the backend to become reachable.
    async fn wait_for_connection(&self, timeout: Duration) -> anyhow::Result<()>;

    fn record_event(&self, event: CustomEvent);

    /// Deliver everything recorded so far, giving up after `timeout`.
    async fn shutdown(&self, timeout: Duration);
}
