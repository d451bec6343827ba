//! The check abstraction: a probe plus its alerting parameters and status

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::config::AlertParams;
use super::result::{CheckId, CheckResult};
use crate::alerts::Notifier;
use crate::data::Value;

/// Kind-specific probe logic
#[async_trait]
pub trait Probe: Send + Sync {
    /// Execute the probe once. Errors are reported as a failed result, never raised.
    async fn perform(&self, telemetry: &mut Telemetry) -> CheckResult;

    /// Human-readable description of what is being probed
    fn description(&self) -> String;

    /// Short kind name, also used as the telemetry table name
    fn kind(&self) -> &'static str;
}

/// Measurements collected during one execution
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Telemetry {
    pub attributes: BTreeMap<String, Value>,
    pub named_results: BTreeMap<String, BTreeMap<String, Value>>,
}

impl Telemetry {
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(key.into(), value.into());
    }

    /// Record a value under a named sub-metric
    pub fn set_named(
        &mut self,
        name: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) {
        self.named_results
            .entry(name.into())
            .or_default()
            .insert(key.into(), value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty() && self.named_results.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
struct LastStatus {
    result: CheckResult,
    checked_at: Option<i64>,
}

/// A configured, named probe instance
pub struct Check {
    id: CheckId,
    params: AlertParams,
    subject: Option<String>,
    probe: Box<dyn Probe>,
    notifiers: Vec<Arc<dyn Notifier>>,
    status: Mutex<LastStatus>,
    in_flight: AtomicBool,
}

impl Check {
    /// Create a check. `notifiers` is captured as-is; later changes to the
    /// caller's list do not affect this check.
    pub fn new(
        params: AlertParams,
        subject: Option<String>,
        probe: Box<dyn Probe>,
        notifiers: Vec<Arc<dyn Notifier>>,
    ) -> Self {
        Self {
            id: CheckId::next(),
            params,
            subject,
            probe,
            notifiers,
            status: Mutex::new(LastStatus::default()),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> CheckId {
        self.id
    }

    pub fn params(&self) -> AlertParams {
        self.params
    }

    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    pub fn description(&self) -> String {
        self.probe.description()
    }

    pub fn checker_name(&self) -> &'static str {
        self.probe.kind()
    }

    /// Label used in notifications: the subject if configured, else the description
    pub fn label(&self) -> String {
        match &self.subject {
            Some(subject) => subject.clone(),
            None => self.description(),
        }
    }

    pub fn notifiers(&self) -> &[Arc<dyn Notifier>] {
        &self.notifiers
    }

    /// Run the probe. Does not touch the recorded status.
    pub async fn perform(&self) -> (CheckResult, Telemetry) {
        let mut telemetry = Telemetry::default();
        let result = self.probe.perform(&mut telemetry).await;
        (result, telemetry)
    }

    /// Last recorded result; success before the first execution
    pub fn status(&self) -> CheckResult {
        self.status.lock().result.clone()
    }

    /// Unix timestamp of the last recorded result
    pub fn last_checked(&self) -> Option<i64> {
        self.status.lock().checked_at
    }

    pub fn has_run(&self) -> bool {
        self.last_checked().is_some()
    }

    pub fn set_status(&self, result: CheckResult, checked_at: i64) {
        let mut status = self.status.lock();
        status.result = result;
        status.checked_at = Some(checked_at);
    }

    /// Mark the check as executing. Returns `None` if an execution is already in flight.
    pub fn try_begin(self: &Arc<Self>) -> Option<InFlight> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight {
                check: Arc::clone(self),
            })
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }
}

impl fmt::Debug for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Check")
            .field("id", &self.id)
            .field("kind", &self.checker_name())
            .field("params", &self.params)
            .field("subject", &self.subject)
            .finish()
    }
}

/// Exclusive execution slot for a check, released on drop
pub struct InFlight {
    check: Arc<Check>,
}

impl InFlight {
    pub fn check(&self) -> &Arc<Check> {
        &self.check
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.check.in_flight.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticProbe(&'static str);

    #[async_trait]
    impl Probe for StaticProbe {
        async fn perform(&self, telemetry: &mut Telemetry) -> CheckResult {
            telemetry.set("answer", 42i64);
            telemetry.set_named("sub", "open", true);
            CheckResult::from(self.0)
        }

        fn description(&self) -> String {
            "static probe".to_string()
        }

        fn kind(&self) -> &'static str {
            "static"
        }
    }

    fn make_check(reason: &'static str) -> Arc<Check> {
        Arc::new(Check::new(
            AlertParams::default(),
            None,
            Box::new(StaticProbe(reason)),
            Vec::new(),
        ))
    }

    #[tokio::test]
    async fn test_perform_does_not_set_status() {
        let check = make_check("broken");
        let (result, telemetry) = check.perform().await;

        assert_eq!(result.reason(), "broken");
        assert_eq!(telemetry.attributes.get("answer"), Some(&Value::Int64(42)));
        assert_eq!(
            telemetry.named_results["sub"].get("open"),
            Some(&Value::Bool(true))
        );
        assert!(check.status().is_ok());
        assert!(!check.has_run());
    }

    #[test]
    fn test_status_roundtrip() {
        let check = make_check("");
        check.set_status(CheckResult::failed("timeout"), 100);
        assert_eq!(check.status().reason(), "timeout");
        assert_eq!(check.last_checked(), Some(100));

        check.set_status(CheckResult::ok(), 160);
        assert!(check.status().is_ok());
    }

    #[test]
    fn test_label_prefers_subject() {
        let check = Check::new(
            AlertParams::default(),
            Some("frontpage".to_string()),
            Box::new(StaticProbe("")),
            Vec::new(),
        );
        assert_eq!(check.label(), "frontpage");
        assert_eq!(make_check("").label(), "static probe");
    }

    #[test]
    fn test_single_execution_slot() {
        let check = make_check("");
        let slot = check.try_begin().expect("first slot");
        assert!(check.is_in_flight());
        assert!(check.try_begin().is_none());

        drop(slot);
        assert!(!check.is_in_flight());
        assert!(check.try_begin().is_some());
    }

    #[test]
    fn test_concurrent_status_reads_see_whole_values() {
        let check = make_check("");
        let a = CheckResult::failed("a".repeat(64));
        let b = CheckResult::failed("b".repeat(64));

        std::thread::scope(|scope| {
            let writer = {
                let check = &check;
                let (a, b) = (a.clone(), b.clone());
                scope.spawn(move || {
                    for i in 0..2000 {
                        let next = if i % 2 == 0 { a.clone() } else { b.clone() };
                        check.set_status(next, i);
                    }
                })
            };
            for _ in 0..4 {
                let check = &check;
                let (a, b) = (a.clone(), b.clone());
                scope.spawn(move || {
                    for _ in 0..2000 {
                        let seen = check.status();
                        assert!(seen.is_ok() || seen == a || seen == b);
                    }
                });
            }
            writer.join().unwrap();
        });
    }
}
