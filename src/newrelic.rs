use std::{
    sync::{Mutex, PoisonError},
    time::Duration,
};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Url};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::net::TcpStream;

use crate::{models::CustomEvent, sink::EventSink};

const API_KEY_HEADER: &str = "Api-Key";

/// Event sink for the New Relic Event API.
///
/// Recorded events are buffered in memory and posted as one batch on
/// [`EventSink::shutdown`].
#[derive(Debug)]
pub struct NewRelicSink {
    client: reqwest::Client,
    endpoint: Url,
    license_key: String,
    pending: Mutex<Vec<CustomEvent>>,
}

/// One element of the JSON array accepted by the Event API.
#[derive(Debug, Serialize)]
struct EventPayload<'a> {
    #[serde(rename = "eventType")]
    event_type: &'a str,
    #[serde(flatten)]
    attributes: &'a Map<String, Value>,
}

impl NewRelicSink {
    pub fn new(app_name: &str, license_key: String, endpoint: &str) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .with_context(|| format!("Invalid New Relic events endpoint {endpoint}"))?;
        let client = reqwest::Client::builder()
            .user_agent(format!(
                "{app_name} {}/{}",
                env!("CARGO_PKG_NAME"),
                env!("CARGO_PKG_VERSION")
            ))
            .build()
            .context("Failed to build New Relic HTTP client")?;

        Ok(Self {
            client,
            endpoint,
            license_key,
            pending: Mutex::new(Vec::new()),
        })
    }

    fn take_pending(&self) -> Vec<CustomEvent> {
        std::mem::take(&mut *self.pending.lock().unwrap_or_else(PoisonError::into_inner))
    }

    async fn post(&self, events: &[CustomEvent]) -> Result<()> {
        let payload: Vec<EventPayload> = events
            .iter()
            .map(|event| EventPayload {
                event_type: event.event_type(),
                attributes: event.attributes(),
            })
            .collect();

        let response = self
            .client
            .post(self.endpoint.clone())
            .header(API_KEY_HEADER, &self.license_key)
            .header(CONTENT_TYPE, "application/json")
            .json(&payload)
            .send()
            .await
            .context("Failed to send events")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Event API returned {status}: {body}"));
        }

        Ok(())
    }
}

#[async_trait]
impl EventSink for NewRelicSink {
    #[tracing::instrument(skip(self), fields(endpoint = %self.endpoint))]
    async fn wait_for_connection(&self, timeout: Duration) -> Result<()> {
        let host = self
            .endpoint
            .host_str()
            .context("Events endpoint has no host")?;
        let port = self
            .endpoint
            .port_or_known_default()
            .context("Events endpoint has no port")?;

        tokio::time::timeout(timeout, TcpStream::connect((host, port)))
            .await
            .with_context(|| format!("Timed out after {timeout:?} connecting to {host}:{port}"))?
            .with_context(|| format!("Failed to connect to {host}:{port}"))?;

        Ok(())
    }

    fn record_event(&self, event: CustomEvent) {
        tracing::debug!(event_type = %event.event_type(), "Recording event");
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    #[tracing::instrument(skip(self))]
    async fn shutdown(&self, timeout: Duration) {
        let events = self.take_pending();
        if events.is_empty() {
            tracing::debug!("No events to flush");
            return;
        }

        match tokio::time::timeout(timeout, self.post(&events)).await {
            Ok(Ok(())) => tracing::info!(count = events.len(), "Flushed events"),
            Ok(Err(e)) => tracing::error!(
                error.cause_chain = ?e,
                error.message = %e,
                count = events.len(),
                "Failed to flush events"
            ),
            Err(_) => tracing::error!(
                count = events.len(),
                "Timed out after {timeout:?} flushing events"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::{
        matchers::{body_json, header, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;
    use crate::models::Reading;

    fn sink(server: &MockServer) -> NewRelicSink {
        NewRelicSink::new(
            "test-app",
            "license".into(),
            &format!("{}/v1/accounts/1/events", server.uri()),
        )
        .unwrap()
    }

    #[test]
    fn rejects_invalid_endpoint() {
        assert!(NewRelicSink::new("test-app", "license".into(), "not a url").is_err());
    }

    #[tokio::test]
    async fn shutdown_posts_buffered_events_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/accounts/1/events"))
            .and(header("Api-Key", "license"))
            .and(body_json(json!([
                {
                    "eventType": "SwitchBotSensor",
                    "deviceId": "D1",
                    "temperature": 25.5,
                    "humidity": 60,
                    "battery": 100
                }
            ])))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .expect(1)
            .mount(&server)
            .await;
        let sink = sink(&server);

        sink.record_event(CustomEvent::from(&Reading::new("D1".into(), 25.5, 60, 100)));
        sink.shutdown(Duration::from_secs(10)).await;
        sink.shutdown(Duration::from_secs(10)).await;

        assert!(sink.take_pending().is_empty());
    }

    #[tokio::test]
    async fn shutdown_without_events_sends_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        sink(&server).shutdown(Duration::from_secs(10)).await;
    }

    #[tokio::test]
    async fn rejected_batch_is_dropped() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("invalid key"))
            .expect(1)
            .mount(&server)
            .await;
        let sink = sink(&server);
        sink.record_event(CustomEvent::from(&Reading::new("D1".into(), 1.0, 2, 3)));

        sink.shutdown(Duration::from_secs(10)).await;

        assert!(sink.take_pending().is_empty());
    }

    #[tokio::test]
    async fn waits_for_reachable_endpoint() {
        let server = MockServer::start().await;

        sink(&server)
            .wait_for_connection(Duration::from_secs(5))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn unreachable_endpoint_fails_to_connect() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let endpoint = format!("http://{}/v1/accounts/1/events", listener.local_addr().unwrap());
        drop(listener);
        let sink = NewRelicSink::new("test-app", "license".into(), &endpoint).unwrap();

        assert!(sink
            .wait_for_connection(Duration::from_secs(5))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn connection_wait_gives_up_after_timeout() {
        // Bound but never accepting; the connect cannot complete within a zero budget.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let endpoint = format!("http://{}/v1/accounts/1/events", listener.local_addr().unwrap());
        let sink = NewRelicSink::new("test-app", "license".into(), &endpoint).unwrap();

        let error = sink
            .wait_for_connection(Duration::ZERO)
            .await
            .unwrap_err();

        assert!(error.to_string().starts_with("Timed out after"), "{error:#}");
        drop(listener);
    }
}
