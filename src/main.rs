use anyhow::Context;
use lambda_runtime::{service_fn, LambdaEvent};
use serde_json::Value;

use switchbot_relay::{
    config::Config,
    deadline::Deadline,
    newrelic::NewRelicSink,
    pipeline::Pipeline,
    secrets::{self, ParameterStore},
    sensor::HttpTransport,
    telemetry,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = telemetry::create_subscriber(env!("CARGO_BIN_NAME"), std::io::stdout);
    telemetry::init_subscriber(subscriber)?;

    let config = Config::from_env();
    tracing::info!(region = %config.region(), "Starting relay function");

    let store = ParameterStore::connect(config.region()).await;

    let new_relic = config.new_relic();
    let app_name = new_relic.require_app_name()?;
    let endpoint = new_relic.require_events_endpoint()?;
    let license_key =
        secrets::resolve_credential(&store, new_relic.license_key(), &Deadline::none())
            .await
            .context("Failed to obtain New Relic license key")?;
    let sink = NewRelicSink::new(app_name, license_key, endpoint)?;

    let pipeline = Pipeline::new(
        config.switchbot().clone(),
        store,
        HttpTransport::default(),
        sink,
    );

    let pipeline = &pipeline;
    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| async move {
        let deadline = Deadline::from_epoch_millis(event.context.deadline);
        pipeline
            .run(deadline)
            .await
            .map_err(lambda_runtime::Error::from)
    }))
    .await
    .map_err(|e| anyhow::anyhow!(e))
    .context("Lambda runtime has exited")?;

    Ok(())
}
