//! Snapshot freshness classification

use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Cache state of one dataset file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum Freshness {
    /// No file on disk
    Missing,
    /// Older than the window, or unreadable
    Stale {
        /// Age in milliseconds; `None` when the timestamp could not be read
        age_ms: Option<i64>,
    },
    /// Within the window
    Fresh {
        /// Age in milliseconds
        age_ms: i64,
    },
}

impl Freshness {
    /// Whether the dataset can be served without regenerating it
    pub fn is_fresh(&self) -> bool {
        matches!(self, Freshness::Fresh { .. })
    }

    /// Age of the snapshot, if known
    pub fn age(&self) -> Option<Duration> {
        let age_ms = match self {
            Freshness::Missing => None,
            Freshness::Stale { age_ms } => *age_ms,
            Freshness::Fresh { age_ms } => Some(*age_ms),
        }?;
        u64::try_from(age_ms).ok().map(Duration::from_millis)
    }

    /// State name without the age
    pub fn label(&self) -> &'static str {
        match self {
            Freshness::Missing => "missing",
            Freshness::Stale { .. } => "stale",
            Freshness::Fresh { .. } => "fresh",
        }
    }
}

impl fmt::Display for Freshness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Classify the snapshot at `path` against `window`, as of `now_ms`.
///
/// Fresh iff `0 <= now_ms - timestamp < window`. A file that cannot be
/// read, does not parse, or has no integer `timestamp` counts as stale, as
/// does a timestamp ahead of `now_ms`.
pub fn classify(path: &Path, window: Duration, now_ms: i64) -> Freshness {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Freshness::Missing,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Snapshot unreadable");
            return Freshness::Stale { age_ms: None };
        }
    };

    let timestamp = serde_json::from_slice::<Value>(&bytes)
        .ok()
        .and_then(|doc| doc.get("timestamp").and_then(Value::as_i64));
    let Some(timestamp) = timestamp else {
        debug!(path = %path.display(), "Snapshot has no readable timestamp");
        return Freshness::Stale { age_ms: None };
    };

    let age_ms = now_ms.saturating_sub(timestamp);
    let window_ms = i64::try_from(window.as_millis()).unwrap_or(i64::MAX);
    if (0..window_ms).contains(&age_ms) {
        Freshness::Fresh { age_ms }
    } else {
        Freshness::Stale {
            age_ms: Some(age_ms),
        }
    }
}

/// Current wall-clock time in epoch milliseconds
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
