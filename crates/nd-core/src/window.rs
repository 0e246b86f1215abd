//! Time scopes for a resolution pass.

use crate::error::{NdError, Result};
use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Caller-facing window selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Window {
    /// Since local midnight in the configured timezone.
    Today,
    /// The trailing `n` hours.
    Hours(u32),
}

impl Window {
    /// Parse `today`, `24h`, `<n>h` or a bare hour count.
    ///
    /// An absent selector falls back to `hours` (default 24).
    pub fn parse(selector: Option<&str>, hours: Option<u32>) -> Result<Self> {
        let sel = selector.map(|s| s.trim().to_ascii_lowercase()).unwrap_or_default();
        if sel == "today" {
            return Ok(Window::Today);
        }
        if sel.is_empty() {
            return match hours.unwrap_or(24) {
                0 => Err(NdError::InvalidRequest("hours must be at least 1".into())),
                n => Ok(Window::Hours(n)),
            };
        }
        let digits = sel.strip_suffix('h').unwrap_or(&sel);
        match digits.parse::<u32>() {
            Ok(0) | Err(_) => Err(NdError::InvalidRequest(format!("unknown window: {sel:?}"))),
            Ok(n) => Ok(Window::Hours(n)),
        }
    }

    /// Epoch seconds at which the window opens.
    pub fn start(&self, now: DateTime<Utc>, timezone: &str) -> Result<i64> {
        match self {
            Window::Hours(n) => Ok(now.timestamp() - i64::from(*n) * 3600),
            Window::Today => {
                let tz: Tz = timezone
                    .parse()
                    .map_err(|e| NdError::Config(format!("invalid timezone {timezone:?}: {e}")))?;
                let local_date = now.with_timezone(&tz).date_naive();
                let midnight = local_date.and_time(NaiveTime::MIN);
                // A DST gap at midnight has no local instant; the earliest valid one is used.
                let start = tz
                    .from_local_datetime(&midnight)
                    .earliest()
                    .unwrap_or_else(|| tz.from_utc_datetime(&midnight));
                Ok(start.timestamp())
            }
        }
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Window::Today => write!(f, "today"),
            Window::Hours(n) => write!(f, "{n}h"),
        }
    }
}

/// What the store is asked for: members scored at or after `since`, newest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanWindow {
    pub since: Option<i64>,
    pub limit: usize,
}

impl ScanWindow {
    pub fn since(since: i64, limit: usize) -> Self {
        Self { since: Some(since), limit }
    }

    pub fn newest(limit: usize) -> Self {
        Self { since: None, limit }
    }

    pub fn admits(&self, score: i64) -> bool {
        self.since.map_or(true, |s| score >= s)
    }
}
