use derive_getters::Getters;

use crate::error::ConfigError;

pub const DEVICE_ID_VAR: &str = "SWITCHBOT_DEVICE_ID";
pub const TOKEN_VAR: &str = "SWITCHBOT_TOKEN";
pub const TOKEN_PARAMETER_VAR: &str = "SWITCHBOT_TOKEN_PARAMETER";
pub const API_BASE_VAR: &str = "SWITCHBOT_API_BASE";
pub const APP_NAME_VAR: &str = "NEW_RELIC_APP_NAME";
pub const LICENSE_KEY_VAR: &str = "NEW_RELIC_LICENSE_KEY";
pub const LICENSE_KEY_PARAMETER_VAR: &str = "NEW_RELIC_LICENSE_KEY_PARAMETER";
pub const ACCOUNT_ID_VAR: &str = "NEW_RELIC_ACCOUNT_ID";
pub const EVENTS_ENDPOINT_VAR: &str = "NEW_RELIC_EVENTS_ENDPOINT";
pub const REGION_VAR: &str = "AWS_REGION";

pub const DEFAULT_API_BASE: &str = "https://api.switch-bot.com";
pub const DEFAULT_REGION: &str = "ap-northeast-1";
const NEW_RELIC_COLLECTOR: &str = "https://insights-collector.newrelic.com";

/// Where a secret value comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    /// The value itself was supplied.
    Literal(String),
    /// Name of an encrypted parameter holding the value.
    Parameter(String),
    /// Neither was supplied.
    Missing {
        literal_var: &'static str,
        parameter_var: &'static str,
    },
}

impl Credential {
    fn from_lookup(
        lookup: &impl Fn(&str) -> Option<String>,
        literal_var: &'static str,
        parameter_var: &'static str,
    ) -> Self {
        if let Some(value) = non_empty(lookup, literal_var) {
            Self::Literal(value)
        } else if let Some(name) = non_empty(lookup, parameter_var) {
            Self::Parameter(name)
        } else {
            Self::Missing {
                literal_var,
                parameter_var,
            }
        }
    }
}

/// Settings for talking to the SwitchBot API.
///
/// The device and token are validated per invocation so that a missing value
/// still results in a flushed, reported failure.
#[derive(Debug, Clone, Getters)]
pub struct SwitchBotConfig {
    device_id: Option<String>,
    token: Credential,
    api_base: String,
}

impl SwitchBotConfig {
    pub fn new(device_id: Option<String>, token: Credential, api_base: impl Into<String>) -> Self {
        Self {
            device_id,
            token,
            api_base: api_base.into(),
        }
    }

    pub fn require_device_id(&self) -> Result<&str, ConfigError> {
        self.device_id
            .as_deref()
            .ok_or(ConfigError::Missing(DEVICE_ID_VAR))
    }
}

/// Settings for the New Relic event sink.
#[derive(Debug, Clone, Getters)]
pub struct NewRelicConfig {
    app_name: Option<String>,
    license_key: Credential,
    events_endpoint: Option<String>,
}

impl NewRelicConfig {
    pub fn require_app_name(&self) -> Result<&str, ConfigError> {
        self.app_name
            .as_deref()
            .ok_or(ConfigError::Missing(APP_NAME_VAR))
    }

    pub fn require_events_endpoint(&self) -> Result<&str, ConfigError> {
        self.events_endpoint
            .as_deref()
            .ok_or(ConfigError::MissingEither(ACCOUNT_ID_VAR, EVENTS_ENDPOINT_VAR))
    }
}

/// Process-wide configuration, read once at startup.
#[derive(Debug, Clone, Getters)]
pub struct Config {
    switchbot: SwitchBotConfig,
    new_relic: NewRelicConfig,
    region: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source. Empty values
    /// count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let switchbot = SwitchBotConfig::new(
            non_empty(&lookup, DEVICE_ID_VAR),
            Credential::from_lookup(&lookup, TOKEN_VAR, TOKEN_PARAMETER_VAR),
            non_empty(&lookup, API_BASE_VAR)
                .map(|base| base.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
        );

        let events_endpoint = non_empty(&lookup, EVENTS_ENDPOINT_VAR).or_else(|| {
            non_empty(&lookup, ACCOUNT_ID_VAR)
                .map(|account| format!("{NEW_RELIC_COLLECTOR}/v1/accounts/{account}/events"))
        });
        let new_relic = NewRelicConfig {
            app_name: non_empty(&lookup, APP_NAME_VAR),
            license_key: Credential::from_lookup(&lookup, LICENSE_KEY_VAR, LICENSE_KEY_PARAMETER_VAR),
            events_endpoint,
        };

        Self {
            switchbot,
            new_relic,
            region: non_empty(&lookup, REGION_VAR).unwrap_or_else(|| DEFAULT_REGION.to_string()),
        }
    }
}

fn non_empty(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key).filter(|value| !value.trim().is_empty())
}
