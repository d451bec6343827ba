//! Declarative check definitions
//!
//! The checks file is a JSON document:
//!
//! ```json
//! {
//!   "notifiers": [{"type": "log"}, {"type": "ntfy", "topic": "ops"}],
//!   "checks": [
//!     {"kind": "https", "url": "https://example.com/", "minFailures": 2},
//!     {"kind": "tcpportclosed", "servers": ["192.0.2.1"], "ports": [23]}
//!   ]
//! }
//! ```
//!
//! Every check receives the notifiers declared in the file.

use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use crate::alerts::{Notifier, NotifierConfig, NotifierError};
use crate::checks::{Check, CheckConfig, CheckRegistry, ConfigError};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChecksFile {
    #[serde(default)]
    pub notifiers: Vec<NotifierConfig>,
    #[serde(default)]
    pub checks: Vec<serde_json::Value>,
}

/// Checks and notifiers built from a checks file
pub struct LoadedChecks {
    pub notifiers: Vec<Arc<dyn Notifier>>,
    pub checks: Vec<Arc<Check>>,
}

impl ChecksFile {
    pub fn from_json_str(contents: &str) -> Result<Self, LoadError> {
        Ok(serde_json::from_str(contents)?)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    /// Build every check. The first invalid definition aborts loading.
    pub fn build(self, registry: &CheckRegistry) -> Result<LoadedChecks, LoadError> {
        let notifiers = self
            .notifiers
            .iter()
            .enumerate()
            .map(|(index, config)| {
                config
                    .build()
                    .map_err(|source| LoadError::Notifier { index, source })
            })
            .collect::<Result<Vec<Arc<dyn Notifier>>, _>>()?;
        if notifiers.is_empty() {
            tracing::warn!("No notifiers configured, alerts will only be logged by the runner");
        }

        let checks = self
            .checks
            .into_iter()
            .enumerate()
            .map(|(index, definition)| {
                CheckConfig::from_json(definition)
                    .and_then(|config| registry.build(config, &notifiers))
                    .map_err(|source| LoadError::Check { index, source })
            })
            .collect::<Result<Vec<_>, _>>()?;

        tracing::info!(
            checks = checks.len(),
            notifiers = notifiers.len(),
            "Loaded check definitions"
        );
        Ok(LoadedChecks { notifiers, checks })
    }
}

/// Checks file errors
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid checks file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("notifier #{index}: {source}")]
    Notifier {
        index: usize,
        #[source]
        source: NotifierError,
    },

    #[error("check #{index}: {source}")]
    Check {
        index: usize,
        #[source]
        source: ConfigError,
    },
}
