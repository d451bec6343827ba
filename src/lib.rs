//! Lookout: active monitoring with flap-suppressed, edge-triggered alerts
//!
//! Periodically executes heterogeneous health checks, decides when repeated
//! failures constitute a real incident, and notifies exactly once when an
//! incident is raised and once when it clears.
//!
//! # Features
//!
//! - **Pluggable probes**: DNS, TCP port state, HTTPS and redirect checks, or
//!   any type implementing [`checks::Probe`]
//! - **Flap suppression**: per-check failure count within a trailing window
//! - **Edge-triggered alerts**: one raise and one clear per incident
//! - **Notifiers**: log, webhook and ntfy transports
//! - **Telemetry**: one row per probe execution, in memory or JSON lines
//! - **Status surface**: read-only HTTP API over checks and active alerts
//!
//! # Example
//!
//! ```no_run
//! use lookout::alerts::{AlertFilter, LogNotifier, Notifier, Runner};
//! use lookout::checks::{CheckConfig, CheckRegistry};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = CheckRegistry::with_builtin_kinds();
//! let notifiers: Vec<Arc<dyn Notifier>> = vec![Arc::new(LogNotifier)];
//!
//! let config = CheckConfig::from_json(serde_json::json!({
//!     "kind": "https",
//!     "url": "https://example.com/",
//!     "minFailures": 3,
//!     "failureWindow": 300
//! }))?;
//! let check = registry.build(config, &notifiers)?;
//!
//! let runner = Runner::new(vec![check], Arc::new(AlertFilter::default()));
//! let report = runner.run_cycle().await;
//! println!("raised: {:?}", report.raised);
//! # Ok(())
//! # }
//! ```

pub mod alerts;
pub mod api;
pub mod checks;
pub mod config;
pub mod data;
pub mod storage;

// Re-export commonly used types
pub use alerts::{AlertFilter, AlertKey, Notifier, Runner};
pub use checks::{Check, CheckId, CheckRegistry, CheckResult, Probe};
pub use data::Value;
