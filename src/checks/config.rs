//! Check configuration records
//!
//! A check definition is a kind tag plus a flat key/value record. Every key a
//! parser reads is taken out of the record, so whatever is left once the kind
//! constructor returns is an unknown key.

use std::collections::BTreeSet;
use std::net::IpAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Default number of failures needed to raise an alert
pub const DEFAULT_MIN_FAILURES: u32 = 1;
/// Default trailing window over which failures are counted
pub const DEFAULT_FAILURE_WINDOW_SECS: i64 = 120;
/// Default upper bound for a single probe execution
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Alerting thresholds carried by every check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertParams {
    /// Failures within the window required to alert
    pub min_failures: u32,
    /// Trailing window in seconds
    pub failure_window_secs: i64,
}

impl Default for AlertParams {
    fn default() -> Self {
        Self {
            min_failures: DEFAULT_MIN_FAILURES,
            failure_window_secs: DEFAULT_FAILURE_WINDOW_SECS,
        }
    }
}

impl AlertParams {
    pub fn new(min_failures: u32, failure_window_secs: i64) -> Self {
        Self {
            min_failures,
            failure_window_secs,
        }
    }

    /// Window actually applied under a ceiling of `max_window_secs`
    pub fn effective_window(&self, max_window_secs: i64) -> i64 {
        self.failure_window_secs.clamp(1, max_window_secs.max(1))
    }

    /// Take the settings shared by all kinds out of a record.
    pub fn extract(config: &mut CheckConfig) -> Result<CommonSettings, ConfigError> {
        let mut params = AlertParams::default();
        let mut consumed = BTreeSet::new();

        if let Some(min) = config.take_u64("minFailures")? {
            if min < 1 || min > u32::MAX as u64 {
                return Err(config.invalid("minFailures", "must be at least 1"));
            }
            params.min_failures = min as u32;
            consumed.insert("minFailures".to_string());
        }

        if let Some(window) = config.take_u64("failureWindow")? {
            if window < 1 || window > i64::MAX as u64 {
                return Err(config.invalid("failureWindow", "must be at least 1 second"));
            }
            params.failure_window_secs = window as i64;
            consumed.insert("failureWindow".to_string());
        }

        let subject = config.take_str("subject")?;
        if subject.is_some() {
            consumed.insert("subject".to_string());
        }

        Ok(CommonSettings {
            params,
            subject,
            consumed,
        })
    }
}

/// Result of [`AlertParams::extract`]
#[derive(Debug, Clone)]
pub struct CommonSettings {
    pub params: AlertParams,
    /// Display label used in notifications
    pub subject: Option<String>,
    /// Keys removed from the record
    pub consumed: BTreeSet<String>,
}

/// One check definition
#[derive(Debug, Clone)]
pub struct CheckConfig {
    kind: String,
    record: Map<String, JsonValue>,
    consumed: BTreeSet<String>,
}

impl CheckConfig {
    pub fn new(kind: impl Into<String>, record: Map<String, JsonValue>) -> Self {
        Self {
            kind: kind.into(),
            record,
            consumed: BTreeSet::new(),
        }
    }

    /// Build from a JSON object carrying its kind under `"kind"`.
    pub fn from_json(value: JsonValue) -> Result<Self, ConfigError> {
        let JsonValue::Object(mut record) = value else {
            return Err(ConfigError::NotAnObject);
        };
        let kind = match record.remove("kind") {
            Some(JsonValue::String(kind)) => kind,
            Some(_) => {
                return Err(ConfigError::InvalidValue {
                    kind: "?".to_string(),
                    key: "kind".to_string(),
                    reason: "must be a string".to_string(),
                })
            }
            None => return Err(ConfigError::MissingKind),
        };
        Ok(Self::new(kind, record))
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Keys taken out of the record so far
    pub fn consumed(&self) -> &BTreeSet<String> {
        &self.consumed
    }

    /// Keys still present in the record
    pub fn remaining(&self) -> Vec<String> {
        self.record.keys().cloned().collect()
    }

    /// Fail if any key was left unread.
    pub fn ensure_consumed(&self) -> Result<(), ConfigError> {
        if self.record.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::UnknownKeys {
                kind: self.kind.clone(),
                keys: self.remaining(),
            })
        }
    }

    pub fn take(&mut self, key: &str) -> Option<JsonValue> {
        let value = self.record.remove(key)?;
        self.consumed.insert(key.to_string());
        Some(value)
    }

    pub fn take_str(&mut self, key: &str) -> Result<Option<String>, ConfigError> {
        match self.take(key) {
            None => Ok(None),
            Some(JsonValue::String(s)) => Ok(Some(s)),
            Some(_) => Err(self.invalid(key, "expected a string")),
        }
    }

    pub fn require_str(&mut self, key: &str) -> Result<String, ConfigError> {
        self.take_str(key)?.ok_or_else(|| self.missing(key))
    }

    pub fn take_u64(&mut self, key: &str) -> Result<Option<u64>, ConfigError> {
        match self.take(key) {
            None => Ok(None),
            Some(JsonValue::Number(n)) => n
                .as_u64()
                .map(Some)
                .ok_or_else(|| self.invalid(key, "expected a non-negative integer")),
            Some(_) => Err(self.invalid(key, "expected a non-negative integer")),
        }
    }

    pub fn take_bool(&mut self, key: &str) -> Result<Option<bool>, ConfigError> {
        match self.take(key) {
            None => Ok(None),
            Some(JsonValue::Bool(b)) => Ok(Some(b)),
            Some(_) => Err(self.invalid(key, "expected a boolean")),
        }
    }

    /// A list of strings. A single string is accepted as a one-element list.
    pub fn take_str_list(&mut self, key: &str) -> Result<Option<Vec<String>>, ConfigError> {
        match self.take(key) {
            None => Ok(None),
            Some(JsonValue::String(s)) => Ok(Some(vec![s])),
            Some(JsonValue::Array(items)) => items
                .into_iter()
                .map(|item| match item {
                    JsonValue::String(s) => Ok(s),
                    _ => Err(self.invalid(key, "expected a list of strings")),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Some),
            Some(_) => Err(self.invalid(key, "expected a list of strings")),
        }
    }

    pub fn require_str_list(&mut self, key: &str) -> Result<Vec<String>, ConfigError> {
        let list = self.take_str_list(key)?.ok_or_else(|| self.missing(key))?;
        if list.is_empty() {
            return Err(self.invalid(key, "must not be empty"));
        }
        Ok(list)
    }

    pub fn require_ip_list(&mut self, key: &str) -> Result<Vec<IpAddr>, ConfigError> {
        self.require_str_list(key)?
            .iter()
            .map(|s| {
                s.parse::<IpAddr>()
                    .map_err(|e| self.invalid(key, &format!("{}: {}", s, e)))
            })
            .collect()
    }

    pub fn require_port_list(&mut self, key: &str) -> Result<Vec<u16>, ConfigError> {
        let value = self.take(key).ok_or_else(|| self.missing(key))?;
        let items = match value {
            JsonValue::Array(items) => items,
            single @ JsonValue::Number(_) => vec![single],
            _ => return Err(self.invalid(key, "expected a list of ports")),
        };
        if items.is_empty() {
            return Err(self.invalid(key, "must not be empty"));
        }
        items
            .iter()
            .map(|item| {
                item.as_u64()
                    .filter(|p| (1..=u16::MAX as u64).contains(p))
                    .map(|p| p as u16)
                    .ok_or_else(|| self.invalid(key, &format!("{} is not a valid port", item)))
            })
            .collect()
    }

    /// Per-probe timeout in seconds, falling back to [`DEFAULT_PROBE_TIMEOUT`].
    pub fn take_timeout(&mut self) -> Result<Duration, ConfigError> {
        match self.take_u64("timeout")? {
            None => Ok(DEFAULT_PROBE_TIMEOUT),
            Some(0) => Err(self.invalid("timeout", "must be at least 1 second")),
            Some(secs) => Ok(Duration::from_secs(secs)),
        }
    }

    pub fn missing(&self, key: &str) -> ConfigError {
        ConfigError::MissingKey {
            kind: self.kind.clone(),
            key: key.to_string(),
        }
    }

    pub fn invalid(&self, key: &str, reason: &str) -> ConfigError {
        ConfigError::InvalidValue {
            kind: self.kind.clone(),
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Check configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("check definition must be an object")]
    NotAnObject,

    #[error("check definition has no kind")]
    MissingKind,

    #[error("unknown check kind: {0}")]
    UnknownKind(String),

    #[error("{kind} check: missing required key {key}")]
    MissingKey { kind: String, key: String },

    #[error("{kind} check: invalid value for {key}: {reason}")]
    InvalidValue {
        kind: String,
        key: String,
        reason: String,
    },

    #[error("{kind} check: unknown keys {keys:?}")]
    UnknownKeys { kind: String, keys: Vec<String> },
}
