//! Shelly device addressing and document types.
//!
//! A Shelly device exposes two JSON documents that the exporter reads on
//! every scrape: `/settings` (identity and configuration) and `/status`
//! (live readings). Neither has a schema the exporter can rely on, so both
//! are kept as loose JSON objects and every field is treated as optional.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Value used for device identity fields the device did not report.
pub const UNKNOWN: &str = "unknown";

/// Live readings from a device's `/status` endpoint.
pub type StatusDocument = Map<String, Value>;

/// Identity and configuration from a device's `/settings` endpoint.
pub type SettingsDocument = Map<String, Value>;

/// A device base address, always carrying a URL scheme.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceAddress(String);

impl DeviceAddress {
    /// Create an address from user input, normalizing it.
    pub fn new(raw: &str) -> Self {
        Self(normalize_address(raw))
    }

    /// The normalized address as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// URL of an endpoint below this address, e.g. `endpoint("status")`.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.0, path.trim_start_matches('/'))
    }

    /// Host name used for the `target` label.
    pub fn hostname(&self) -> String {
        target_hostname(&self.0)
    }
}

impl std::fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceAddress {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

/// Prepend `http://` unless the address already has an http(s) scheme.
///
/// Surrounding whitespace and trailing slashes are dropped so endpoint
/// paths can be appended directly. Normalizing twice is a no-op.
pub fn normalize_address(raw: &str) -> String {
    let trimmed = raw.trim();
    let mut address = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    };

    let scheme_end = address.find("://").map_or(0, |i| i + 3);
    let kept = address[scheme_end..].trim_end_matches('/').len();
    address.truncate(scheme_end + kept);
    address
}

/// Extract the host part of an address, falling back to the raw string.
pub fn target_hostname(address: &str) -> String {
    url::Url::parse(address)
        .ok()
        .and_then(|url| {
            url.host_str()
                .map(|host| host.trim_start_matches('[').trim_end_matches(']').to_string())
        })
        .filter(|host| !host.is_empty())
        .unwrap_or_else(|| address.to_string())
}

/// Render a JSON scalar as a label value.
///
/// Strings are used verbatim, numbers and booleans as their JSON text.
/// `null`, arrays and objects have no label representation.
pub fn label_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Identity of a device, derived from its settings document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Model identifier (e.g. "SHPLG-S").
    #[serde(rename = "type")]
    pub device_type: String,
    pub mac: String,
    pub hostname: String,
    pub firmware: String,
}

impl DeviceInfo {
    /// Extract device identity from `/settings`.
    ///
    /// `type`, `mac` and `hostname` come from the nested `device` object,
    /// `firmware` from the top-level `fw` field.
    pub fn from_settings(settings: &SettingsDocument) -> Self {
        let device = settings.get("device").and_then(Value::as_object);
        let device_field = |key: &str| {
            device
                .and_then(|d| d.get(key))
                .and_then(label_text)
                .unwrap_or_else(|| UNKNOWN.to_string())
        };

        Self {
            device_type: device_field("type"),
            mac: device_field("mac"),
            hostname: device_field("hostname"),
            firmware: settings
                .get("fw")
                .and_then(label_text)
                .unwrap_or_else(|| UNKNOWN.to_string()),
        }
    }
}
