//! Relays SwitchBot sensor readings to New Relic as custom events.

pub mod config;
pub mod deadline;
pub mod error;
pub mod models;
pub mod newrelic;
pub mod pipeline;
pub mod secrets;
pub mod sensor;
pub mod sink;
pub mod telemetry;
