use std::{future::Future, time::Duration};

use tokio::time::Instant;

/// The point in time by which an invocation must have finished its outbound
/// calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    /// No deadline: calls are bounded only by their own timeouts.
    pub fn none() -> Self {
        Self(None)
    }

    pub fn after(duration: Duration) -> Self {
        Self(Some(Instant::now() + duration))
    }

    /// Convert a wall-clock deadline given in milliseconds since the Unix epoch,
    /// as reported by the Lambda runtime.
    pub fn from_epoch_millis(deadline_ms: u64) -> Self {
        let now_ms = chrono::Utc::now().timestamp_millis();
        let remaining = i64::try_from(deadline_ms)
            .unwrap_or(i64::MAX)
            .saturating_sub(now_ms)
            .max(0);

        Self::after(Duration::from_millis(remaining as u64))
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.0
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Shorten `timeout` so it does not outlive the deadline.
    pub fn clamp(&self, timeout: Duration) -> Duration {
        self.remaining()
            .map_or(timeout, |remaining| remaining.min(timeout))
    }

    /// Drive `future` until it completes or the deadline passes, whichever
    /// comes first. Returns `None` when the deadline won.
    pub async fn bound<F: Future>(&self, future: F) -> Option<F::Output> {
        match self.0 {
            Some(deadline) => tokio::time::timeout_at(deadline, future).await.ok(),
            None => Some(future.await),
        }
    }
}
