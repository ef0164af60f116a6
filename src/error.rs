use thiserror::Error;

use crate::pipeline::Stage;

/// A required setting is absent from the environment.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("environment variable {0} is not set")]
    Missing(&'static str),

    #[error("neither {0} nor {1} is set")]
    MissingEither(&'static str, &'static str),
}

/// The secret store could not produce a value.
#[derive(Error, Debug)]
#[error("failed to fetch parameter {name}: {message}")]
pub struct SecretError {
    pub name: String,
    pub message: String,
}

impl SecretError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// The sensor API could not be reached.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("request cancelled: invocation deadline exceeded")]
    DeadlineExceeded,

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

/// The sensor API answered with a non-success status.
#[derive(Error, Debug)]
#[error("sensor API returned {status}: {body}")]
pub struct ApiError {
    pub status: u16,
    pub body: String,
}

/// The sensor API answered 200 with a body that is not JSON.
#[derive(Error, Debug)]
#[error("failed to parse sensor response: {0}")]
pub struct DecodeError(#[from] pub serde_json::Error);

/// Failure of a single relay invocation.
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("invalid configuration: {0}")]
    Configuration(#[from] ConfigError),

    #[error("secret resolution failed: {0}")]
    Secret(#[from] SecretError),

    #[error("sensor request failed: {0}")]
    Transport(#[from] TransportError),

    #[error("sensor API error: {0}")]
    Api(#[from] ApiError),

    #[error("invalid sensor response: {0}")]
    Decode(#[from] DecodeError),
}

impl RelayError {
    /// The pipeline stage the invocation failed in.
    pub fn stage(&self) -> Stage {
        match self {
            Self::Configuration(_) => Stage::Start,
            Self::Secret(_) => Stage::ResolvingSecret,
            Self::Transport(_) | Self::Api(_) => Stage::Fetching,
            Self::Decode(_) => Stage::Decoding,
        }
    }
}
