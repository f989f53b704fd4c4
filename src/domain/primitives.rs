//! Domain primitives: MemberId, TimeMs, Period.

use serde::{Deserialize, Serialize};

/// Time in milliseconds since Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeMs(pub i64);

impl TimeMs {
    /// Create a TimeMs from milliseconds.
    pub fn new(ms: i64) -> Self {
        TimeMs(ms)
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        TimeMs(chrono::Utc::now().timestamp_millis())
    }

    /// Get the underlying milliseconds value.
    pub fn as_ms(&self) -> i64 {
        self.0
    }

    pub fn saturating_sub_ms(&self, ms: i64) -> Self {
        TimeMs(self.0.saturating_sub(ms))
    }

    /// Next UTC midnight, or `self` when it already falls on one.
    pub fn ceil_to_utc_day(&self) -> Self {
        match self.0.rem_euclid(DAY_MS) {
            0 => *self,
            past => TimeMs(self.0.saturating_add(DAY_MS - past)),
        }
    }
}

const DAY_MS: i64 = 86_400_000;

/// Platform member identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberId(pub String);

impl MemberId {
    /// Create a MemberId from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        MemberId(id.into())
    }

    /// Get the id as a string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MemberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for MemberId {
    fn from(value: String) -> Self {
        MemberId(value)
    }
}

impl From<&str> for MemberId {
    fn from(value: &str) -> Self {
        MemberId(value.to_string())
    }
}

/// Inclusive time window `[start, end]` used as the volume snapshot key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Period {
    pub start: TimeMs,
    pub end: TimeMs,
}

impl Period {
    /// Create a period. Returns None when `start > end`.
    pub fn new(start: TimeMs, end: TimeMs) -> Option<Self> {
        (start <= end).then_some(Period { start, end })
    }

    /// Rolling window of `days` ending at `end`.
    pub fn trailing_days(end: TimeMs, days: u32) -> Self {
        Period {
            start: end.saturating_sub_ms(i64::from(days) * DAY_MS),
            end,
        }
    }

    pub fn contains(&self, at: TimeMs) -> bool {
        self.start <= at && at <= self.end
    }
}
