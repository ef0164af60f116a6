//! Local stand-in for the SwitchBot API and the New Relic Event API.

use std::{net::SocketAddr, str::FromStr};

use anyhow::Context;
use axum::{
    extract::{Path, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

use switchbot_relay::telemetry;

const DEFAULT_PORT: u16 = 8080;

/// Measurements served for every device.
#[derive(Debug, Clone)]
struct MockReading {
    temperature: f64,
    humidity: i64,
    battery: i64,
}

impl MockReading {
    /// Defaults overridable through `MOCK_*` variables; values that do not
    /// parse are ignored.
    fn from_env() -> Self {
        Self {
            temperature: env_or("MOCK_TEMPERATURE", 25.5),
            humidity: env_or("MOCK_HUMIDITY", 60),
            battery: env_or("MOCK_BATTERY", 100),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

fn router(reading: MockReading) -> Router {
    Router::new()
        .route("/v1.1/devices/:device_id/status", get(device_status))
        .route("/v1/accounts/:account_id/events", post(record_events))
        .route("/health", get(|| async { "OK" }))
        .with_state(reading)
}

#[tracing::instrument(skip(reading, headers))]
async fn device_status(
    State(reading): State<MockReading>,
    Path(device_id): Path<String>,
    headers: HeaderMap,
) -> impl IntoResponse {
    if !headers.contains_key(AUTHORIZATION) {
        tracing::warn!("Rejecting request without authorization");
        return (StatusCode::UNAUTHORIZED, "Authorization header required").into_response();
    }

    let response = json!({
        "statusCode": 100,
        "message": "success",
        "body": {
            "deviceId": device_id,
            "deviceType": "Meter",
            "hubDeviceId": "hub-123",
            "humidity": reading.humidity,
            "temperature": reading.temperature,
            "version": "V4.2",
            "battery": reading.battery,
            "temperatureScale": "c",
        }
    });
    tracing::info!(%response, "Sending status");

    Json(response).into_response()
}

#[tracing::instrument(skip(body))]
async fn record_events(Path(account_id): Path<String>, body: String) -> Json<Value> {
    tracing::info!(%body, "Received events");
    Json(json!({ "success": true }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = telemetry::create_subscriber(env!("CARGO_BIN_NAME"), std::io::stdout);
    telemetry::init_subscriber(subscriber)?;

    let port = env_or("MOCK_PORT", DEFAULT_PORT);
    let address = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .with_context(|| format!("Failed to bind {address}"))?;
    tracing::info!(
        "SwitchBot API mock: http://localhost:{port}/v1.1/devices/{{deviceId}}/status"
    );
    tracing::info!("New Relic API mock: http://localhost:{port}/v1/accounts/{{accountId}}/events");

    axum::serve(listener, router(MockReading::from_env()))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error.message = %e, "Failed to listen for shutdown signal");
            }
        })
        .await
        .context("Mock server failed")?;

    tracing::info!("Mock server has exited");
    Ok(())
}

#[cfg(test)]
mod tests {
    use switchbot_relay::{
        deadline::Deadline,
        models,
        sensor::{self, HttpTransport, StatusRequest},
    };

    use super::*;

    async fn serve(reading: MockReading) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router(reading)).await });
        format!("http://{address}")
    }

    fn reading() -> MockReading {
        MockReading {
            temperature: 21.5,
            humidity: 40,
            battery: 90,
        }
    }

    #[tokio::test]
    async fn serves_decodable_status() {
        let base = serve(reading()).await;
        let request = StatusRequest::new(&base, "D1", "T1".into());

        let response = sensor::fetch(&HttpTransport::default(), &request, &Deadline::none())
            .await
            .unwrap();
        let reading = models::decode(&response.into_success_body().unwrap()).unwrap();

        assert_eq!(reading, models::Reading::new("D1".into(), 21.5, 40, 90));
    }

    #[tokio::test]
    async fn rejects_missing_authorization() {
        let base = serve(reading()).await;

        let response = reqwest::get(format!("{base}/v1.1/devices/D1/status"))
            .await
            .unwrap();

        assert_eq!(response.status().as_u16(), 401);
        assert_eq!(
            response.text().await.unwrap(),
            "Authorization header required"
        );
    }

    #[tokio::test]
    async fn accepts_events_and_reports_health() {
        let base = serve(reading()).await;
        let client = reqwest::Client::new();

        let events: Value = client
            .post(format!("{base}/v1/accounts/1/events"))
            .body(r#"[{"eventType":"SwitchBotSensor"}]"#)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let health = client
            .get(format!("{base}/health"))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();

        assert_eq!(events, json!({ "success": true }));
        assert_eq!(health, "OK");
    }

    #[test]
    fn unset_override_falls_back_to_default() {
        assert_eq!(env_or("MOCK_RELAY_TEST_UNSET", 60), 60);
    }
}
