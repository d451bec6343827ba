//! Cycle driver and edge detection
//!
//! Each cycle executes every idle check, records its status and telemetry,
//! feeds failures to the [`AlertFilter`], then diffs the filtered set against
//! the previous cycle. Only transitions reach the notifiers: one raise when a
//! pair appears, one clear when it disappears.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::time;

use super::filter::{AlertFilter, AlertKey};
use super::notifier::{AlertEdge, NotifierError, DEFAULT_NOTIFY_TIMEOUT};
use crate::checks::{Check, CheckId, CheckResult, InFlight};
use crate::storage::{TelemetryRow, TelemetrySink};

/// Default bound on how long a cycle waits for its executions
pub const DEFAULT_CYCLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Summary of one evaluation cycle
#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleReport {
    /// Unix timestamp the cycle evaluated at
    pub at: i64,
    /// Executions started this cycle
    pub started: usize,
    /// Executions that finished before the cycle deadline
    pub completed: usize,
    /// Checks skipped because a previous execution was still running
    pub skipped: Vec<CheckId>,
    pub raised: Vec<AlertKey>,
    pub cleared: Vec<AlertKey>,
    /// Size of the active alert set after this cycle
    pub active: usize,
}

/// Drives a fixed set of checks
pub struct Runner {
    checks: Vec<Arc<Check>>,
    by_id: HashMap<CheckId, Arc<Check>>,
    filter: Arc<AlertFilter>,
    sink: Option<Arc<dyn TelemetrySink>>,
    active: RwLock<HashSet<AlertKey>>,
    cycle_lock: tokio::sync::Mutex<()>,
    cycle_timeout: Duration,
    notify_timeout: Duration,
    running: AtomicBool,
}

impl Runner {
    pub fn new(checks: Vec<Arc<Check>>, filter: Arc<AlertFilter>) -> Self {
        let by_id = checks
            .iter()
            .map(|check| (check.id(), Arc::clone(check)))
            .collect();
        Self {
            checks,
            by_id,
            filter,
            sink: None,
            active: RwLock::new(HashSet::new()),
            cycle_lock: tokio::sync::Mutex::new(()),
            cycle_timeout: DEFAULT_CYCLE_TIMEOUT,
            notify_timeout: DEFAULT_NOTIFY_TIMEOUT,
            running: AtomicBool::new(false),
        }
    }

    /// Record telemetry for every completed execution
    pub fn with_sink(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Set how long a cycle waits for its executions before evaluating
    pub fn with_cycle_timeout(mut self, timeout: Duration) -> Self {
        self.cycle_timeout = timeout;
        self
    }

    /// Set the bound on each individual notification send
    pub fn with_notify_timeout(mut self, timeout: Duration) -> Self {
        self.notify_timeout = timeout;
        self
    }

    pub fn checks(&self) -> &[Arc<Check>] {
        &self.checks
    }

    pub fn check(&self, id: CheckId) -> Option<&Arc<Check>> {
        self.by_id.get(&id)
    }

    pub fn filter(&self) -> &Arc<AlertFilter> {
        &self.filter
    }

    /// Alerts active as of the last completed cycle, sorted
    pub fn active_alerts(&self) -> Vec<AlertKey> {
        let mut alerts: Vec<AlertKey> = self.active.read().iter().cloned().collect();
        alerts.sort();
        alerts
    }

    /// Run one cycle at the current wall-clock time
    pub async fn run_cycle(&self) -> CycleReport {
        self.run_cycle_at(chrono::Utc::now().timestamp()).await
    }

    /// Run one cycle, stamping observations and evaluating the window at `now`.
    ///
    /// Cycles are serialized. Executions still running at the deadline keep
    /// going and report whenever they finish; their check is skipped until then.
    pub async fn run_cycle_at(&self, now: i64) -> CycleReport {
        let _cycle = self.cycle_lock.lock().await;
        let mut report = CycleReport {
            at: now,
            ..Default::default()
        };

        let mut handles = Vec::with_capacity(self.checks.len());
        let mut started = Vec::with_capacity(self.checks.len());
        for check in &self.checks {
            match check.try_begin() {
                Some(slot) => {
                    started.push(Arc::clone(check));
                    handles.push(tokio::spawn(execute(
                        slot,
                        Arc::clone(&self.filter),
                        self.sink.clone(),
                        now,
                    )));
                }
                None => {
                    tracing::debug!(check = %check.id(), "Previous execution still running, skipping");
                    report.skipped.push(check.id());
                }
            }
        }
        report.started = handles.len();

        match time::timeout(self.cycle_timeout, join_all(handles)).await {
            Ok(results) => report.completed = results.len(),
            Err(_) => {
                report.completed = started.iter().filter(|c| !c.is_in_flight()).count();
                tracing::warn!(
                    started = report.started,
                    completed = report.completed,
                    "Cycle deadline reached with executions still running"
                );
            }
        }

        let current = self.filter.filtered_results(now);
        let (raised, cleared) = {
            let mut active = self.active.write();
            let mut raised: Vec<AlertKey> = current.difference(&active).cloned().collect();
            let mut cleared: Vec<AlertKey> = active.difference(&current).cloned().collect();
            raised.sort();
            cleared.sort();
            *active = current;
            report.active = active.len();
            (raised, cleared)
        };

        for key in &raised {
            self.dispatch(AlertEdge::Raised, key).await;
        }
        for key in &cleared {
            self.dispatch(AlertEdge::Cleared, key).await;
        }

        report.raised = raised;
        report.cleared = cleared;
        report
    }

    /// Fan one edge out to the owning check's notifiers
    async fn dispatch(&self, edge: AlertEdge, key: &AlertKey) {
        let Some(check) = self.by_id.get(&key.check) else {
            tracing::warn!(check = %key.check, reason = %key.reason, "Alert for unknown check");
            return;
        };
        let label = check.label();
        tracing::info!(
            check = %key.check,
            event = edge.as_str(),
            reason = %key.reason,
            "{}",
            label
        );

        // Each send is bounded so a stalled endpoint cannot hold the cycle lock.
        let limit = self.notify_timeout;
        let sends = check.notifiers().iter().map(|notifier| {
            let label = label.as_str();
            async move {
                let send = async {
                    match edge {
                        AlertEdge::Raised => notifier.notify(label, &key.reason).await,
                        AlertEdge::Cleared => notifier.clear(label, &key.reason).await,
                    }
                };
                let result = time::timeout(limit, send)
                    .await
                    .unwrap_or(Err(NotifierError::Timeout(limit)));
                if let Err(e) = result {
                    tracing::error!(
                        notifier = notifier.name(),
                        check = %key.check,
                        error = %e,
                        "Failed to send notification"
                    );
                }
            }
        });
        join_all(sends).await;
    }

    /// Start the periodic cycle loop
    pub fn start(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);

        tokio::spawn(async move {
            tracing::info!(
                checks = self.checks.len(),
                "Runner started with interval {:?}",
                interval
            );

            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

            while self.running.load(Ordering::SeqCst) {
                ticker.tick().await;
                if !self.running.load(Ordering::SeqCst) {
                    break;
                }
                let report = self.run_cycle().await;
                tracing::debug!(
                    started = report.started,
                    skipped = report.skipped.len(),
                    raised = report.raised.len(),
                    cleared = report.cleared.len(),
                    active = report.active,
                    "Cycle complete"
                );
            }

            tracing::info!("Runner stopped");
        })
    }

    /// Stop the loop after the current cycle
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Execute one check and record its outcome. The slot is released on return.
async fn execute(
    slot: InFlight,
    filter: Arc<AlertFilter>,
    sink: Option<Arc<dyn TelemetrySink>>,
    at: i64,
) {
    let check = Arc::clone(slot.check());
    let probe = {
        let check = Arc::clone(&check);
        tokio::spawn(async move { check.perform().await })
    };
    let (result, telemetry) = match probe.await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!(check = %check.id(), error = %e, "Probe task failed");
            let reason = if e.is_panic() {
                "probe panicked"
            } else {
                "probe cancelled"
            };
            (CheckResult::failed(reason), Default::default())
        }
    };

    check.set_status(result.clone(), at);
    if !result.is_ok() {
        tracing::debug!(check = %check.id(), reason = %result.reason(), "Check failed");
        filter.report_check(&check, result.reason(), at);
    }

    if let Some(sink) = sink {
        let row = TelemetryRow::new(&check, at, &result, telemetry);
        // Sinks may do file I/O; keep it off the async workers.
        match tokio::task::spawn_blocking(move || sink.record(&row)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::error!(check = %check.id(), error = %e, "Failed to record telemetry");
            }
            Err(e) => {
                tracing::error!(check = %check.id(), error = %e, "Telemetry task failed");
            }
        }
    }

    drop(slot);
}
