use async_trait::async_trait;
use bytes::Bytes;
use derive_getters::Getters;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};

use crate::{
    deadline::Deadline,
    error::{ApiError, TransportError},
};

/// An authenticated device status request.
#[derive(Debug, Clone, PartialEq, Eq, Getters)]
pub struct StatusRequest {
    url: String,
    token: String,
}

impl StatusRequest {
    pub fn new(api_base: &str, device_id: &str, token: String) -> Self {
        Self {
            url: format!("{api_base}/v1.1/devices/{device_id}/status"),
            token,
        }
    }
}

/// Status code and fully buffered body of a sensor API response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: Bytes,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Anything but 200 is an API error carrying the body as-is.
    pub fn into_success_body(self) -> Result<Bytes, ApiError> {
        if self.status == 200 {
            Ok(self.body)
        } else {
            Err(ApiError {
                status: self.status,
                body: String::from_utf8_lossy(&self.body).into_owned(),
            })
        }
    }
}

/// Issues requests against the sensor API.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SensorTransport: Send + Sync {
    async fn get(&self, request: &StatusRequest) -> Result<RawResponse, TransportError>;
}

/// Sensor transport backed by a `reqwest` client.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SensorTransport for HttpTransport {
    #[tracing::instrument(skip_all, fields(url = %request.url))]
    async fn get(&self, request: &StatusRequest) -> Result<RawResponse, TransportError> {
        let response = self
            .client
            .get(&request.url)
            .header(AUTHORIZATION, &request.token)
            .header(CONTENT_TYPE, "application/json")
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;

        Ok(RawResponse { status, body })
    }
}

/// Send `request` and wait for the whole response, giving up once the
/// deadline passes.
pub async fn fetch<T>(
    transport: &T,
    request: &StatusRequest,
    deadline: &Deadline,
) -> Result<RawResponse, TransportError>
where
    T: SensorTransport + ?Sized,
{
    deadline
        .bound(transport.get(request))
        .await
        .ok_or(TransportError::DeadlineExceeded)?
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use wiremock::{
        matchers::{header, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;

    #[test]
    fn status_url_is_built_from_device_id() {
        let request = StatusRequest::new("https://api.switch-bot.com", "D1", "T1".into());

        assert_eq!(
            request.url(),
            "https://api.switch-bot.com/v1.1/devices/D1/status"
        );
        assert_eq!(request.token(), "T1");
    }

    #[test]
    fn non_200_keeps_raw_body() {
        let body = r#"{"statusCode":400,"message":"Bad Request"}"#;

        let error = RawResponse::new(400, body).into_success_body().unwrap_err();

        assert_eq!(error.status, 400);
        assert_eq!(error.body, body);
        assert!(error.to_string().contains(body));
    }

    #[test]
    fn other_success_codes_are_still_errors() {
        assert!(RawResponse::new(204, "").into_success_body().is_err());
        assert_eq!(
            RawResponse::new(200, "ok").into_success_body().unwrap(),
            Bytes::from_static(b"ok")
        );
    }

    #[tokio::test]
    async fn sends_authorized_json_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1.1/devices/D1/status"))
            .and(header("Authorization", "T1"))
            .and(header("Content-Type", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"statusCode":100}"#))
            .expect(1)
            .mount(&server)
            .await;
        let request = StatusRequest::new(&server.uri(), "D1", "T1".into());

        let response = fetch(&HttpTransport::default(), &request, &Deadline::none())
            .await
            .unwrap();

        assert_eq!(response, RawResponse::new(200, r#"{"statusCode":100}"#));
    }

    #[tokio::test]
    async fn error_status_is_returned_not_raised() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
            .mount(&server)
            .await;
        let request = StatusRequest::new(&server.uri(), "D1", "bad".into());

        let response = fetch(&HttpTransport::default(), &request, &Deadline::none())
            .await
            .unwrap();

        assert_eq!(response.status, 401);
        assert_eq!(response.body, Bytes::from_static(b"Unauthorized"));
    }

    #[tokio::test]
    async fn slow_response_is_cancelled_by_deadline() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;
        let request = StatusRequest::new(&server.uri(), "D1", "T1".into());

        let error = fetch(
            &HttpTransport::default(),
            &request,
            &Deadline::after(Duration::from_millis(100)),
        )
        .await
        .unwrap_err();

        assert!(matches!(error, TransportError::DeadlineExceeded));
    }

    #[tokio::test]
    async fn connection_refused_is_a_transport_error() {
        // Grab a free port, then close it so nothing is listening.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let api_base = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);
        let request = StatusRequest::new(&api_base, "D1", "T1".into());

        let error = fetch(&HttpTransport::default(), &request, &Deadline::none())
            .await
            .unwrap_err();

        assert!(matches!(error, TransportError::Http(_)));
    }
}
