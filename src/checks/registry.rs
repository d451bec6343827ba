//! Mapping from kind tag to probe constructor

use std::collections::HashMap;
use std::sync::Arc;

use super::check::{Check, Probe};
use super::config::{AlertParams, CheckConfig, ConfigError};
use super::kinds;
use crate::alerts::Notifier;

/// Builds a probe from the kind-specific part of a record
pub type ProbeConstructor = fn(&mut CheckConfig) -> Result<Box<dyn Probe>, ConfigError>;

/// Registry of known check kinds
#[derive(Default)]
pub struct CheckRegistry {
    constructors: HashMap<String, ProbeConstructor>,
    /// Ceiling the alert filter applies to failure windows
    max_window_secs: Option<i64>,
}

impl CheckRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with every built-in kind registered
    pub fn with_builtin_kinds() -> Self {
        let mut registry = Self::new();
        registry.register("dns", kinds::dns::from_config);
        registry.register("tcpportclosed", kinds::tcp::closed_from_config);
        registry.register("tcpportopen", kinds::tcp::open_from_config);
        registry.register("https", kinds::https::from_config);
        registry.register("redir", kinds::redir::from_config);
        registry
    }

    /// Warn about checks whose window the alert filter will cap
    pub fn with_max_window(mut self, max_window_secs: i64) -> Self {
        self.max_window_secs = Some(max_window_secs);
        self
    }

    /// True when `params` asks for a longer window than the filter allows
    pub fn window_is_capped(&self, params: &AlertParams) -> bool {
        self.max_window_secs
            .map(|max| params.effective_window(max) < params.failure_window_secs)
            .unwrap_or(false)
    }

    /// Register a kind, replacing any previous constructor for it
    pub fn register(&mut self, kind: impl Into<String>, constructor: ProbeConstructor) {
        self.constructors.insert(kind.into(), constructor);
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.constructors.contains_key(kind)
    }

    /// Registered kind names, sorted
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.constructors.keys().cloned().collect();
        kinds.sort();
        kinds
    }

    /// Build a check, attaching a snapshot of `notifiers`.
    ///
    /// Fails if the kind is unknown, the record is malformed, or any key is
    /// left over once the kind constructor has read what it needs.
    pub fn build(
        &self,
        mut config: CheckConfig,
        notifiers: &[Arc<dyn Notifier>],
    ) -> Result<Arc<Check>, ConfigError> {
        let constructor = self
            .constructors
            .get(config.kind())
            .ok_or_else(|| ConfigError::UnknownKind(config.kind().to_string()))?;

        let common = AlertParams::extract(&mut config)?;
        let probe = constructor(&mut config)?;
        config.ensure_consumed()?;

        let check = Check::new(common.params, common.subject, probe, notifiers.to_vec());
        if let Some(max) = self.max_window_secs.filter(|_| self.window_is_capped(&check.params())) {
            tracing::warn!(
                check = %check.id(),
                failure_window = check.params().failure_window_secs,
                max_window = max,
                "Failure window exceeds the filter ceiling and will be capped"
            );
        }
        tracing::debug!(
            check = %check.id(),
            kind = check.checker_name(),
            keys = ?config.consumed(),
            "Built check: {}",
            check.description()
        );
        Ok(Arc::new(check))
    }
}
