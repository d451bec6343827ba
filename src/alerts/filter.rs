//! Flap suppression
//!
//! Failure observations are kept per (check, reason) as a set of timestamps.
//! A pair is alerting while the number of observations inside the trailing
//! window reaches the check's `min_failures`. Recovery happens only by
//! failures ageing out of the window; successes are never recorded.

use std::collections::{BTreeSet, HashMap, HashSet};

use parking_lot::Mutex;
use serde::Serialize;

use crate::checks::{AlertParams, Check, CheckId};

/// Default ceiling for any check's failure window (one hour)
pub const DEFAULT_MAX_WINDOW_SECS: i64 = 3600;

/// A (check, failure reason) pair that currently warrants an alert
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct AlertKey {
    pub check: CheckId,
    pub reason: String,
}

impl AlertKey {
    pub fn new(check: CheckId, reason: impl Into<String>) -> Self {
        Self {
            check,
            reason: reason.into(),
        }
    }
}

#[derive(Debug)]
struct CheckReports {
    params: AlertParams,
    reasons: HashMap<String, BTreeSet<i64>>,
}

/// Turns timestamped failure observations into a stable alert set
#[derive(Debug)]
pub struct AlertFilter {
    max_window_secs: i64,
    /// Single lock over the whole structure: pruning a key races with
    /// insertion into the same key otherwise.
    reports: Mutex<HashMap<CheckId, CheckReports>>,
}

impl Default for AlertFilter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_WINDOW_SECS)
    }
}

impl AlertFilter {
    pub fn new(max_window_secs: i64) -> Self {
        Self {
            max_window_secs: max_window_secs.max(1),
            reports: Mutex::new(HashMap::new()),
        }
    }

    pub fn max_window_secs(&self) -> i64 {
        self.max_window_secs
    }

    /// Record one failure observation at unix time `at`.
    ///
    /// An empty reason is a success and is ignored.
    pub fn report(&self, check: CheckId, params: AlertParams, reason: &str, at: i64) {
        if reason.is_empty() {
            return;
        }
        let mut reports = self.reports.lock();
        let entry = reports.entry(check).or_insert_with(|| CheckReports {
            params,
            reasons: HashMap::new(),
        });
        entry.params = params;
        entry
            .reasons
            .entry(reason.to_string())
            .or_default()
            .insert(at);
    }

    /// Record a failure for `check` using its own alert parameters
    pub fn report_check(&self, check: &Check, reason: &str, at: i64) {
        self.report(check.id(), check.params(), reason, at);
    }

    /// Window applied to a check: its own window, capped by the filter ceiling
    fn window_for(&self, params: &AlertParams) -> i64 {
        params.effective_window(self.max_window_secs)
    }

    /// Prune observations outside each pair's window as of `now` and return
    /// every pair whose surviving count reaches its threshold.
    ///
    /// An observation at `t` survives while `t > now - window`, so a single
    /// failure stops counting once evaluated at `t + window` or later.
    pub fn filtered_results(&self, now: i64) -> HashSet<AlertKey> {
        let mut active = HashSet::new();
        let mut reports = self.reports.lock();

        reports.retain(|check, entry| {
            let window = self.window_for(&entry.params);
            let cutoff = now - window;
            let threshold = entry.params.min_failures.max(1) as usize;

            entry.reasons.retain(|reason, stamps| {
                *stamps = stamps.split_off(&(cutoff + 1));
                debug_assert!(stamps.iter().all(|t| *t > cutoff));

                if stamps.len() >= threshold {
                    active.insert(AlertKey::new(*check, reason.clone()));
                }
                !stamps.is_empty()
            });
            !entry.reasons.is_empty()
        });

        active
    }

    /// Drop all history for a check
    pub fn forget(&self, check: CheckId) {
        self.reports.lock().remove(&check);
    }

    /// Number of (check, reason) pairs with retained observations
    pub fn tracked_pairs(&self) -> usize {
        self.reports
            .lock()
            .values()
            .map(|entry| entry.reasons.len())
            .sum()
    }

    /// Retained observation count for one pair, without pruning
    pub fn observation_count(&self, check: CheckId, reason: &str) -> usize {
        self.reports
            .lock()
            .get(&check)
            .and_then(|entry| entry.reasons.get(reason))
            .map(|stamps| stamps.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn filter() -> AlertFilter {
        AlertFilter::new(DEFAULT_MAX_WINDOW_SECS)
    }

    #[test]
    fn test_threshold_scenario() {
        let filter = filter();
        let check = CheckId::next();
        let params = AlertParams::new(3, 120);

        for t in [0, 30, 70, 125] {
            filter.report(check, params, "timeout", t);
        }

        let active = filter.filtered_results(125);
        assert!(active.contains(&AlertKey::new(check, "timeout")));
        assert_eq!(filter.observation_count(check, "timeout"), 3);

        let active = filter.filtered_results(260);
        assert!(active.is_empty());
        assert_eq!(filter.tracked_pairs(), 0);
    }

    #[test]
    fn test_below_threshold_never_alerts() {
        let filter = filter();
        let check = CheckId::next();
        let params = AlertParams::new(3, 120);

        filter.report(check, params, "timeout", 0);
        filter.report(check, params, "timeout", 100);
        assert!(filter.filtered_results(100).is_empty());

        // The first failure has aged out by the time the third arrives.
        filter.report(check, params, "timeout", 121);
        assert!(filter.filtered_results(121).is_empty());
    }

    #[test]
    fn test_single_failure_expires_at_window_boundary() {
        let filter = filter();
        let check = CheckId::next();
        let params = AlertParams::new(1, 120);

        filter.report(check, params, "refused", 1000);
        assert_eq!(filter.filtered_results(1000).len(), 1);
        assert_eq!(filter.filtered_results(1119).len(), 1);
        assert!(filter.filtered_results(1120).is_empty());
    }

    #[test]
    fn test_reasons_are_tracked_independently() {
        let filter = filter();
        let check = CheckId::next();
        let params = AlertParams::new(2, 120);

        filter.report(check, params, "timeout", 10);
        filter.report(check, params, "wrong answer", 10);
        filter.report(check, params, "wrong answer", 20);

        let active = filter.filtered_results(20);
        assert_eq!(active.len(), 1);
        assert!(active.contains(&AlertKey::new(check, "wrong answer")));
        assert_eq!(filter.tracked_pairs(), 2);

        filter.report(check, params, "timeout", 30);
        let active = filter.filtered_results(30);
        assert_eq!(active.len(), 2);
    }

    #[test]
    fn test_duplicate_timestamps_collapse() {
        let filter = filter();
        let check = CheckId::next();
        let params = AlertParams::new(2, 120);

        filter.report(check, params, "timeout", 50);
        filter.report(check, params, "timeout", 50);
        assert!(filter.filtered_results(50).is_empty());
    }

    #[test]
    fn test_window_is_capped_by_ceiling() {
        let filter = AlertFilter::new(60);
        let check = CheckId::next();
        let params = AlertParams::new(1, 600);

        filter.report(check, params, "timeout", 0);
        assert_eq!(filter.filtered_results(59).len(), 1);
        assert!(filter.filtered_results(60).is_empty());
    }

    #[test]
    fn test_empty_reason_is_ignored() {
        let filter = filter();
        filter.report(CheckId::next(), AlertParams::default(), "", 0);
        assert_eq!(filter.tracked_pairs(), 0);
    }

    #[test]
    fn test_forget() {
        let filter = filter();
        let check = CheckId::next();
        filter.report(check, AlertParams::default(), "timeout", 0);
        filter.forget(check);
        assert!(filter.filtered_results(0).is_empty());
    }

    #[test]
    fn test_concurrent_reports() {
        let filter = Arc::new(filter());
        let checks: Vec<CheckId> = (0..8).map(|_| CheckId::next()).collect();
        let params = AlertParams::new(100, 1000);

        let handles: Vec<_> = checks
            .iter()
            .map(|check| {
                let filter = Arc::clone(&filter);
                let check = *check;
                std::thread::spawn(move || {
                    for t in 0..100 {
                        filter.report(check, params, "timeout", t);
                        if t % 10 == 0 {
                            filter.filtered_results(t);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(filter.filtered_results(99).len(), checks.len());
    }
}
