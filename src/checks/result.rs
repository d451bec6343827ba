use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Outcome of one probe execution. An empty reason means success.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CheckResult {
    reason: String,
}

impl CheckResult {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.reason.is_empty()
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl From<&str> for CheckResult {
    fn from(reason: &str) -> Self {
        Self::failed(reason)
    }
}

impl From<String> for CheckResult {
    fn from(reason: String) -> Self {
        Self::failed(reason)
    }
}

impl fmt::Display for CheckResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ok() {
            write!(f, "OK")
        } else {
            write!(f, "{}", self.reason)
        }
    }
}

static NEXT_CHECK_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a configured check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckId(u64);

impl CheckId {
    pub(crate) fn next() -> Self {
        Self(NEXT_CHECK_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CheckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
