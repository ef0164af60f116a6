use anyhow::Context;
use tracing::{subscriber::set_global_default, Level, Subscriber};
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_subscriber::{
    filter::Targets, fmt::MakeWriter, prelude::__tracing_subscriber_SubscriberExt,
    registry::LookupSpan, Registry,
};

/// Setup telemetry for the relay and output it to a given sink.
///
/// Spans and events from the relay library and from `binary` are kept at
/// `DEBUG`; everything else, including the AWS SDK and HTTP clients, is
/// reduced to `WARN`.
pub fn create_subscriber<Sink>(
    binary: &str,
    sink: Sink,
) -> impl Subscriber + Send + Sync + for<'span> LookupSpan<'span>
where
    Sink: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let filter = Targets::new()
        .with_target(env!("CARGO_CRATE_NAME"), Level::DEBUG)
        .with_target(binary.replace('-', "_"), Level::DEBUG)
        .with_default(Level::WARN);

    let formatting_layer = BunyanFormattingLayer::new(binary.to_string(), sink);

    Registry::default()
        .with(filter)
        .with(JsonStorageLayer)
        .with(formatting_layer)
}

/// Install `subscriber` as the process-wide default. Can only succeed once.
pub fn init_subscriber(subscriber: impl Subscriber + Send + Sync) -> anyhow::Result<()> {
    set_global_default(subscriber).context("Failed to setup log subscriber")
}
