use std::{panic::AssertUnwindSafe, time::Duration};

use futures::FutureExt;

use crate::{
    config::SwitchBotConfig,
    deadline::Deadline,
    error::RelayError,
    models::{self, CustomEvent},
    secrets::{self, SecretResolver},
    sensor::{self, SensorTransport, StatusRequest},
    sink::EventSink,
};

/// How long to wait for the event sink before emitting anyway.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// How long the sink gets to deliver pending events on exit.
pub const FLUSH_TIMEOUT: Duration = Duration::from_secs(10);

pub const SUCCESS_MESSAGE: &str = "Relay completed successfully";

/// The steps of a relay invocation, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Stage {
    Start,
    ResolvingSecret,
    Fetching,
    Decoding,
    Emitting,
}

/// Relays one sensor reading per invocation from the SwitchBot API to an
/// event sink.
pub struct Pipeline<S, T, E> {
    config: SwitchBotConfig,
    secrets: S,
    transport: T,
    sink: E,
}

impl<S, T, E> Pipeline<S, T, E>
where
    S: SecretResolver,
    T: SensorTransport,
    E: EventSink,
{
    pub fn new(config: SwitchBotConfig, secrets: S, transport: T, sink: E) -> Self {
        Self {
            config,
            secrets,
            transport,
            sink,
        }
    }

    /// Run a single invocation.
    ///
    /// The sink is flushed exactly once after the relay stages, whether they
    /// succeed, fail or panic; a panic is re-raised after the flush. The flush
    /// is skipped only if this future itself is dropped before completing, so
    /// callers must drive it to the end.
    #[tracing::instrument(skip_all, fields(device_id = ?self.config.device_id()))]
    pub async fn run(&self, deadline: Deadline) -> Result<String, RelayError> {
        tracing::info!("Starting relay");
        self.wait_for_sink(&deadline).await;

        let outcome = AssertUnwindSafe(self.relay(&deadline))
            .catch_unwind()
            .await;

        self.sink.shutdown(deadline.clamp(FLUSH_TIMEOUT)).await;

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(panic) => {
                tracing::error!("Relay panicked");
                std::panic::resume_unwind(panic)
            }
        };

        match &outcome {
            Ok(_) => tracing::info!("Relay has completed"),
            Err(e) => tracing::error!(
                error.cause_chain = ?e,
                error.message = %e,
                stage = %e.stage(),
                "Relay failed"
            ),
        }
        outcome
    }

    /// Failing to reach the sink is not fatal; it is expected to deliver once
    /// connected.
    async fn wait_for_sink(&self, deadline: &Deadline) {
        tracing::debug!("Waiting for event sink connection");
        match deadline
            .bound(self.sink.wait_for_connection(CONNECT_TIMEOUT))
            .await
        {
            Some(Ok(())) => tracing::debug!("Event sink connected"),
            Some(Err(e)) => tracing::warn!(
                error.message = %e,
                "Failed to connect to event sink, emitting anyway"
            ),
            None => tracing::warn!("Invocation deadline passed while waiting for event sink"),
        }
    }

    async fn relay(&self, deadline: &Deadline) -> Result<String, RelayError> {
        let device_id = self.config.require_device_id()?;

        tracing::debug!(stage = %Stage::ResolvingSecret);
        let token =
            secrets::resolve_credential(&self.secrets, self.config.token(), deadline).await?;

        tracing::debug!(stage = %Stage::Fetching);
        let request = StatusRequest::new(self.config.api_base(), device_id, token);
        let response = sensor::fetch(&self.transport, &request, deadline).await?;
        tracing::info!(
            status = response.status,
            body = %String::from_utf8_lossy(&response.body),
            "Received sensor response"
        );
        let body = response.into_success_body()?;

        tracing::debug!(stage = %Stage::Decoding);
        let reading = models::decode(&body)?;
        tracing::info!(?reading, "Decoded reading");

        tracing::debug!(stage = %Stage::Emitting);
        let event = CustomEvent::from(&reading);
        tracing::info!(attributes = ?event.attributes(), "Recording sensor event");
        self.sink.record_event(event);

        Ok(SUCCESS_MESSAGE.to_string())
    }
}
