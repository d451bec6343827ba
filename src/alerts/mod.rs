//! Alerting: flap suppression, edge detection and notification fan-out
//!
//! The [`Runner`] executes checks, feeds failures into the [`AlertFilter`],
//! and notifies only on transitions of the filtered alert set.

pub mod filter;
pub mod notifier;
pub mod runner;

pub use filter::{AlertFilter, AlertKey, DEFAULT_MAX_WINDOW_SECS};
pub use notifier::{
    AlertEdge, LogNotifier, Notifier, NotifierConfig, NotifierError, NtfyNotifier,
    WebhookNotifier, DEFAULT_NOTIFY_TIMEOUT,
};
pub use runner::{CycleReport, Runner, DEFAULT_CYCLE_TIMEOUT};
