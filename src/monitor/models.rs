use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::time::Duration;

/// Outcome of a single probe execution.
///
/// `error` is `Some` exactly when `success` is `false`; build values through
/// [`CheckResult::up`] and [`CheckResult::down`] to keep that true.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckResult {
    pub target: String,
    /// When the probe started.
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    #[serde(rename = "latency_ms", serialize_with = "serialize_millis")]
    pub latency: Duration,
    pub error: Option<String>,
}

impl CheckResult {
    pub fn up(target: impl Into<String>, timestamp: DateTime<Utc>, latency: Duration) -> Self {
        Self {
            target: target.into(),
            timestamp,
            success: true,
            latency,
            error: None,
        }
    }

    pub fn down(
        target: impl Into<String>,
        timestamp: DateTime<Utc>,
        latency: Duration,
        error: impl Into<String>,
    ) -> Self {
        Self {
            target: target.into(),
            timestamp,
            success: false,
            latency,
            error: Some(error.into()),
        }
    }

    pub fn latency_ms(&self) -> u64 {
        self.latency.as_millis().try_into().unwrap_or(u64::MAX)
    }
}

fn serialize_millis<S: Serializer>(latency: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(latency.as_millis().try_into().unwrap_or(u64::MAX))
}

/// An up/down flip between two consecutive recorded observations of a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub target: String,
    pub is_up: bool,
    pub was_up: bool,
}
