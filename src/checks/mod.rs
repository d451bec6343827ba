//! Checks: configured probe instances with their own alerting thresholds
//!
//! A [`Check`] wraps kind-specific [`Probe`] logic together with its
//! [`AlertParams`], its last recorded [`CheckResult`], and the notifiers it
//! alerts through. Checks are built from declarative records by a
//! [`CheckRegistry`].

pub mod check;
pub mod config;
pub mod kinds;
pub mod registry;
pub mod result;

pub use check::{Check, InFlight, Probe, Telemetry};
pub use config::{
    AlertParams, CheckConfig, CommonSettings, ConfigError, DEFAULT_FAILURE_WINDOW_SECS,
    DEFAULT_MIN_FAILURES, DEFAULT_PROBE_TIMEOUT,
};
pub use registry::{CheckRegistry, ProbeConstructor};
pub use result::{CheckId, CheckResult};
