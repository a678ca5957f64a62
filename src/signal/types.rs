//! Signal records.

use crate::signal::payload::Payload;
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// One telemetry event, ready for the queue and the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signal {
    /// When the signal was built (millisecond precision)
    #[serde(with = "timestamp_millis")]
    pub received_at: DateTime<Utc>,
    /// Owning application identifier
    #[serde(rename = "appID")]
    pub app_id: String,
    /// Salted, hashed user identifier
    pub client_user: String,
    /// Session active when the signal was built
    #[serde(rename = "sessionID", default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Dot-namespaced event name
    #[serde(rename = "type")]
    pub signal_type: String,
    /// Flattened `key:value` parameters
    pub payload: Vec<String>,
    /// `"true"` or `"false"`
    pub is_test_mode: String,
    /// Optional numeric measurement
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub float_value: Option<f64>,
}

impl Signal {
    /// Current time truncated to what the wire format can carry.
    pub fn now() -> DateTime<Utc> {
        Utc::now().trunc_subsecs(3)
    }

    /// Parse the flattened payload back into a map.
    pub fn parameters(&self) -> Payload {
        Payload::from_flattened(&self.payload)
    }

    /// Returns true if this signal was marked as a test signal.
    pub fn is_test(&self) -> bool {
        self.is_test_mode == "true"
    }
}

/// What a caller asks the pipeline to record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SignalRequest {
    /// Event name
    pub signal_type: String,
    /// Explicit per-call user, overriding the configured default
    pub client_user: Option<String>,
    /// Caller-supplied parameters
    pub parameters: Payload,
    /// Optional numeric measurement
    pub float_value: Option<f64>,
}

impl SignalRequest {
    /// Create a request for the given signal type.
    pub fn new(signal_type: impl Into<String>) -> Self {
        Self {
            signal_type: signal_type.into(),
            ..Self::default()
        }
    }

    /// Add a parameter.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key, value);
        self
    }

    /// Replace all parameters.
    pub fn parameters(mut self, parameters: Payload) -> Self {
        self.parameters = parameters;
        self
    }

    /// Attach a numeric measurement.
    pub fn float_value(mut self, value: f64) -> Self {
        self.float_value = Some(value);
        self
    }

    /// Record the signal for an explicit user.
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.client_user = Some(user.into());
        self
    }
}

/// Mutable staging record between enrichment and identity resolution.
///
/// The user is still raw here. It is resolved and hashed only after every
/// transform has run.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalTransform {
    pub signal_type: String,
    pub client_user: Option<String>,
    pub additional_payload: Payload,
    pub float_value: Option<f64>,
}

/// Serde support for ISO-8601 UTC timestamps with milliseconds and a `Z` suffix.
mod timestamp_millis {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

    pub fn serialize<S>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&ts.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
