/// Secret providers resolving secret references of config items.
///
/// Supports AWS Secrets Manager, HashiCorp Vault (KV v2) and a local map for
/// development and tests.
use async_trait::async_trait;
use aws_sdk_secretsmanager::operation::get_secret_value::{
    GetSecretValueError, GetSecretValueOutput,
};
use cs_core::SecretProvider;
use errors::SecretError;
use std::collections::HashMap;
use tracing::{debug, warn};

/// AWS Secrets Manager provider; returns the `SecretString` of the current
/// version.
pub struct AwsSecretProvider {
    client: aws_sdk_secretsmanager::Client,
}

impl AwsSecretProvider {
    pub async fn new(region: String, endpoint: Option<String>) -> Self {
        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_sdk_secretsmanager::config::Region::new(region))
            .load()
            .await;

        let mut client_config = aws_sdk_secretsmanager::config::Builder::from(&config);
        if let Some(ep) = endpoint {
            client_config = client_config.endpoint_url(ep);
        }

        Self {
            client: aws_sdk_secretsmanager::Client::from_conf(client_config.build()),
        }
    }
}

fn map_aws_error(secret_id: &str, error: GetSecretValueError) -> SecretError {
    if error.is_resource_not_found_exception() {
        SecretError::NotFound(secret_id.to_string())
    } else {
        SecretError::RetrievalFailed(error.to_string())
    }
}

/// Only text secrets can be substituted into JSON; binary-only secrets are
/// rejected.
fn secret_text(secret_id: &str, output: GetSecretValueOutput) -> Result<String, SecretError> {
    match output.secret_string() {
        Some(value) => Ok(value.to_string()),
        None => {
            warn!(secret = secret_id, "Secret has no SecretString");
            Err(SecretError::FormatError(format!(
                "secret {} has no text value",
                secret_id
            )))
        }
    }
}

#[async_trait]
impl SecretProvider for AwsSecretProvider {
    async fn get_secret(&self, secret_id: &str) -> Result<String, SecretError> {
        // TODO: accept a version stage per secret reference instead of always AWSCURRENT
        let output = self
            .client
            .get_secret_value()
            .secret_id(secret_id)
            .send()
            .await
            .map_err(|e| map_aws_error(secret_id, e.into_service_error()))?;

        secret_text(secret_id, output)
    }

    async fn is_available(&self) -> bool {
        self.client.list_secrets().max_results(1).send().await.is_ok()
    }
}

/// Local development secret provider
pub struct LocalSecretProvider {
    secrets: HashMap<String, String>,
}

impl LocalSecretProvider {
    pub fn new(secrets: HashMap<String, String>) -> Self {
        Self { secrets }
    }
}

impl<K, V> FromIterator<(K, V)> for LocalSecretProvider
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::new(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

#[async_trait]
impl SecretProvider for LocalSecretProvider {
    async fn get_secret(&self, secret_id: &str) -> Result<String, SecretError> {
        self.secrets
            .get(secret_id)
            .cloned()
            .ok_or_else(|| SecretError::NotFound(secret_id.to_string()))
    }

    async fn is_available(&self) -> bool {
        true
    }
}

/// HashiCorp Vault secret provider (KV v2 engine).
///
/// The plaintext is read from the `value` field of the secret's data.
pub struct VaultSecretProvider {
    client: reqwest::Client,
    address: String,
    token: String,
    mount_path: String,
}

impl VaultSecretProvider {
    pub fn new(address: String, token: String, mount_path: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            address: address.trim_end_matches('/').to_string(),
            token,
            mount_path: mount_path.trim_matches('/').to_string(),
        }
    }

    fn secret_url(&self, secret_id: &str) -> String {
        format!("{}/v1/{}/data/{}", self.address, self.mount_path, secret_id)
    }
}

#[async_trait]
impl SecretProvider for VaultSecretProvider {
    async fn get_secret(&self, secret_id: &str) -> Result<String, SecretError> {
        let url = self.secret_url(secret_id);
        debug!(secret = secret_id, "Reading secret from Vault");

        let response = self
            .client
            .get(&url)
            .header("X-Vault-Token", &self.token)
            .send()
            .await
            .map_err(|e| SecretError::ConnectionFailed(e.to_string()))?;

        match response.status() {
            status if status.is_success() => {
                let body: serde_json::Value = response
                    .json::<serde_json::Value>()
                    .await
                    .map_err(|e| SecretError::FormatError(e.to_string()))?;
                let value = body["data"]["data"]["value"].as_str().ok_or_else(|| {
                    SecretError::FormatError(format!("Vault secret {} has no value", secret_id))
                })?;
                Ok(value.to_string())
            }
            reqwest::StatusCode::NOT_FOUND => Err(SecretError::NotFound(secret_id.to_string())),
            reqwest::StatusCode::FORBIDDEN | reqwest::StatusCode::UNAUTHORIZED => Err(
                SecretError::AuthFailed(format!("Vault rejected token for {}", secret_id)),
            ),
            status => Err(SecretError::RetrievalFailed(format!(
                "Vault returned error: {}",
                status
            ))),
        }
    }

    async fn is_available(&self) -> bool {
        let url = format!("{}/v1/sys/health", self.address);
        self.client
            .get(&url)
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}
