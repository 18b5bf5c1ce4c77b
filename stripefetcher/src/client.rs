use std::time::Duration;

use reqwest::StatusCode;
use serde_json::Value as JsonValue;
use syncstore::{EntityKind, Record};

use crate::error::{ClientError, Result};

pub const DEFAULT_BASE_URL: &str = "https://api.stripe.com";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct ClientConfig {
    pub secret_key: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(secret_key: impl Into<String>) -> Self {
        Self {
            secret_key: secret_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

// keeps the secret out of logs
impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Read-only client for the provider's REST API.
#[derive(Clone, Debug)]
pub struct StripeClient {
    http_client: reqwest::Client,
    config: ClientConfig,
}

impl StripeClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.secret_key.trim().is_empty() {
            return Err(ClientError::InvalidParam("secret key is empty".into()));
        }
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            http_client,
            config,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// `{base_url}/v1/{api_path}/{id}`
    pub fn object_url(&self, kind: EntityKind, id: &str) -> Result<String> {
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(ClientError::InvalidParam(format!("malformed {kind} id '{id}'")));
        }
        Ok(format!(
            "{}/v1/{}/{}",
            self.config.base_url.trim_end_matches('/'),
            kind.api_path(),
            id
        ))
    }

    /// Retrieves a single object. Subscriptions come back with their first
    /// page of items inline.
    pub async fn retrieve(&self, kind: EntityKind, id: &str) -> Result<Record> {
        let url = self.object_url(kind, id)?;
        log::debug!("GET {}", url);

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(&self.config.secret_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &url, body));
        }

        let data: JsonValue = response.json().await?;
        match data {
            JsonValue::Object(record) => Ok(record),
            other => Err(ClientError::InvalidBody(format!(
                "expected an object from {url}, got {other}"
            ))),
        }
    }
}

fn status_error(status: StatusCode, url: &str, body: String) -> ClientError {
    if status == StatusCode::NOT_FOUND {
        ClientError::NotFound(url.to_string())
    } else {
        ClientError::Status {
            status: status.as_u16(),
            body,
        }
    }
}
