use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_ssm::error::DisplayErrorContext;

use crate::{
    config::Credential,
    deadline::Deadline,
    error::{ConfigError, RelayError, SecretError},
};

/// Key-value store holding encrypted configuration.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SecretResolver: Send + Sync {
    /// Fetch the value stored under `name`.
    async fn resolve(&self, name: &str, decrypt: bool) -> Result<String, SecretError>;
}

/// AWS SSM Parameter Store.
#[derive(Debug, Clone)]
pub struct ParameterStore {
    client: aws_sdk_ssm::Client,
}

impl ParameterStore {
    pub async fn connect(region: &str) -> Self {
        tracing::debug!(region, "Loading AWS configuration");
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;

        Self {
            client: aws_sdk_ssm::Client::new(&sdk_config),
        }
    }
}

#[async_trait]
impl SecretResolver for ParameterStore {
    #[tracing::instrument(skip(self))]
    async fn resolve(&self, name: &str, decrypt: bool) -> Result<String, SecretError> {
        let output = self
            .client
            .get_parameter()
            .name(name)
            .with_decryption(decrypt)
            .send()
            .await
            .map_err(|e| SecretError::new(name, DisplayErrorContext(&e).to_string()))?;

        let value = output
            .parameter()
            .and_then(|parameter| parameter.value())
            .ok_or_else(|| SecretError::new(name, "parameter has no value"))?;
        tracing::debug!("Fetched parameter");

        Ok(value.to_string())
    }
}

/// Produce the value of `credential`, consulting the secret store only when a
/// parameter name was configured. Secrets are always requested decrypted.
pub async fn resolve_credential<S>(
    resolver: &S,
    credential: &Credential,
    deadline: &Deadline,
) -> Result<String, RelayError>
where
    S: SecretResolver + ?Sized,
{
    match credential {
        Credential::Literal(value) => Ok(value.clone()),
        Credential::Parameter(name) => {
            let value = deadline
                .bound(resolver.resolve(name, true))
                .await
                .ok_or_else(|| SecretError::new(name.as_str(), "invocation deadline exceeded"))??;
            Ok(value)
        }
        Credential::Missing {
            literal_var,
            parameter_var,
        } => Err(ConfigError::MissingEither(*literal_var, *parameter_var).into()),
    }
}
