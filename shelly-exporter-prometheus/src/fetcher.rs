//! Retrieval of device documents over HTTP.

use std::time::Duration;

use serde_json::Value;
use shelly_common::{DeviceAddress, SettingsDocument, StatusDocument};
use thiserror::Error;
use tracing::{debug, error};

use crate::config::FetchConfig;

/// Why a device could not be read.
///
/// The display text doubles as the scrape error comment, so it reads
/// `<reason> while fetching metrics from <address>`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("Timeout while fetching metrics from {address}")]
    Timeout { address: String },
    #[error("HTTP error while fetching metrics from {address}: {message}")]
    Http { address: String, message: String },
    #[error("Internal error while fetching metrics from {address}: {message}")]
    Internal { address: String, message: String },
}

impl FetchError {
    /// The device address the failure belongs to.
    pub fn address(&self) -> &str {
        match self {
            FetchError::Timeout { address }
            | FetchError::Http { address, .. }
            | FetchError::Internal { address, .. } => address,
        }
    }

    /// Single-line exposition comment standing in for the device's metrics.
    pub fn to_comment(&self) -> String {
        let text: String = self
            .to_string()
            .chars()
            .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
            .collect();
        format!("# Error: {}", text)
    }

    fn http(address: &DeviceAddress, message: impl Into<String>) -> Self {
        FetchError::Http {
            address: address.to_string(),
            message: message.into(),
        }
    }

    fn internal(address: &DeviceAddress, message: impl Into<String>) -> Self {
        FetchError::Internal {
            address: address.to_string(),
            message: message.into(),
        }
    }

    fn timeout(address: &DeviceAddress) -> Self {
        FetchError::Timeout {
            address: address.to_string(),
        }
    }

    /// Map a client error onto the fetch error taxonomy.
    fn from_reqwest(address: &DeviceAddress, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::timeout(address)
        } else if err.is_body() || err.is_decode() {
            Self::http(address, err.to_string())
        } else {
            Self::internal(address, err.to_string())
        }
    }
}

/// Both documents of one device.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceDocuments {
    pub status: StatusDocument,
    pub settings: SettingsDocument,
}

/// Fetches `/settings` and `/status` from devices.
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl Fetcher {
    /// Build a fetcher with its own HTTP client.
    ///
    /// Redirects are not followed; a device answering 3xx is reported as an
    /// HTTP error.
    pub fn new(config: &FetchConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.as_str())
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self::from_client(client, config.timeout()))
    }

    /// Wrap an existing client.
    pub fn from_client(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Retrieve both documents of a device concurrently.
    ///
    /// Never panics on device misbehavior: every failure is returned as a
    /// [`FetchError`]. When both requests fail the settings error is reported.
    pub async fn fetch(&self, address: &DeviceAddress) -> Result<DeviceDocuments, FetchError> {
        let (settings, status) = tokio::join!(
            self.get_document(address, "settings"),
            self.get_document(address, "status"),
        );

        let result = settings.and_then(|settings| {
            status.map(|status| DeviceDocuments { status, settings })
        });

        match &result {
            Ok(_) => debug!(device = %address, "Fetched device documents"),
            Err(e) => error!(device = %address, error = %e, "Failed to fetch device documents"),
        }

        result
    }

    async fn get_document(
        &self,
        address: &DeviceAddress,
        endpoint: &str,
    ) -> Result<serde_json::Map<String, Value>, FetchError> {
        let url = address.endpoint(endpoint);
        debug!(url = %url, "Requesting device document");

        let request = async {
            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| FetchError::from_reqwest(address, e))?;

            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::http(address, format!("HTTP status {}", status)));
            }

            response
                .bytes()
                .await
                .map_err(|e| FetchError::from_reqwest(address, e))
        };

        let body = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| FetchError::timeout(address))??;

        let value: Value = serde_json::from_slice(&body)
            .map_err(|e| FetchError::http(address, format!("invalid JSON from {}: {}", url, e)))?;

        match value {
            Value::Object(document) => Ok(document),
            other => Err(FetchError::http(
                address,
                format!("expected a JSON object from {}, got {}", url, json_kind(&other)),
            )),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
