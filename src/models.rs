use derive_getters::Getters;
use serde::{
    de::{DeserializeOwned, Error as _, Unexpected},
    Deserialize, Deserializer,
};
use serde_json::{Map, Value};

use crate::error::DecodeError;

/// Envelope returned by the SwitchBot device status endpoint.
#[derive(Debug, Default, Deserialize, Getters)]
#[serde(default, rename_all = "camelCase")]
pub struct StatusEnvelope {
    status_code: Option<i64>,
    message: Option<String>,
    #[serde(deserialize_with = "object_or_null")]
    body: Option<DeviceStatus>,
}

/// The measurement object inside the envelope.
///
/// Every field is optional on the wire. Absent and `null` values decode to the
/// zero value of the field once converted into a [`Reading`].
#[derive(Debug, Default, Deserialize, Getters)]
#[serde(default, rename_all = "camelCase")]
pub struct DeviceStatus {
    device_id: Option<String>,
    device_type: Option<String>,
    hub_device_id: Option<String>,
    humidity: Option<i64>,
    temperature: Option<f64>,
    version: Option<String>,
    battery: Option<i64>,
    temperature_scale: Option<String>,
}

/// A normalized sensor measurement.
#[derive(Debug, Clone, PartialEq, Getters)]
#[cfg_attr(test, derive(fake::Dummy))]
pub struct Reading {
    device_id: String,
    temperature: f64,
    humidity: i64,
    battery: i64,
}

impl Reading {
    pub fn new(device_id: String, temperature: f64, humidity: i64, battery: i64) -> Self {
        Self {
            device_id,
            temperature,
            humidity,
            battery,
        }
    }
}

impl From<DeviceStatus> for Reading {
    fn from(status: DeviceStatus) -> Self {
        Self {
            device_id: status.device_id.unwrap_or_default(),
            temperature: status.temperature.unwrap_or_default(),
            humidity: status.humidity.unwrap_or_default(),
            battery: status.battery.unwrap_or_default(),
        }
    }
}

/// Accept only a JSON object, or `null` for the default value.
///
/// Derived struct visitors also take positional arrays, which the status
/// endpoint never sends.
fn object_or_null<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(T::default()),
        object @ Value::Object(_) => T::deserialize(object).map_err(D::Error::custom),
        other => Err(D::Error::invalid_type(unexpected(&other), &"a JSON object")),
    }
}

fn unexpected(value: &Value) -> Unexpected<'_> {
    match value {
        Value::Null => Unexpected::Unit,
        Value::Bool(b) => Unexpected::Bool(*b),
        Value::Number(_) => Unexpected::Other("number"),
        Value::String(s) => Unexpected::Str(s),
        Value::Array(_) => Unexpected::Seq,
        Value::Object(_) => Unexpected::Map,
    }
}

/// Parse a raw status response into a [`Reading`].
pub fn decode(body: &[u8]) -> Result<Reading, DecodeError> {
    let value: Value = serde_json::from_slice(body)?;
    let envelope: StatusEnvelope = object_or_null(value)?;
    tracing::debug!(
        status_code = ?envelope.status_code,
        message = ?envelope.message,
        "Decoded status envelope"
    );

    Ok(envelope.body.unwrap_or_default().into())
}

/// A named custom event handed to an [`EventSink`](crate::sink::EventSink).
#[derive(Debug, Clone, PartialEq, Getters)]
pub struct CustomEvent {
    event_type: String,
    attributes: Map<String, Value>,
}

impl CustomEvent {
    pub const SENSOR_EVENT_TYPE: &'static str = "SwitchBotSensor";

    pub fn new(event_type: impl Into<String>, attributes: Map<String, Value>) -> Self {
        Self {
            event_type: event_type.into(),
            attributes,
        }
    }
}

impl From<&Reading> for CustomEvent {
    fn from(reading: &Reading) -> Self {
        let mut attributes = Map::new();
        attributes.insert("deviceId".into(), Value::from(reading.device_id.clone()));
        attributes.insert("temperature".into(), Value::from(reading.temperature));
        attributes.insert("humidity".into(), Value::from(reading.humidity));
        attributes.insert("battery".into(), Value::from(reading.battery));

        Self::new(Self::SENSOR_EVENT_TYPE, attributes)
    }
}
