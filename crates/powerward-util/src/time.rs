//! Time utilities for powerward
//!
//! The reconciliation loop reads the wall clock through [`now`] so the
//! schedule can be exercised without waiting for real evening hours.
//!
//! # Mock Time for Development
//!
//! In debug builds, the `POWERWARD_MOCK_TIME` environment variable shifts
//! the clock to the given RFC 3339 instant at process start. Mock time then
//! advances at the real rate.
//!
//! Example:
//! ```bash
//! POWERWARD_MOCK_TIME="2025-12-25T16:59:30Z" cargo run -p powerwardd
//! ```

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;
use std::time::Duration;

/// Environment variable name for mock time (debug builds only)
pub const MOCK_TIME_ENV_VAR: &str = "POWERWARD_MOCK_TIME";

static MOCK_TIME_OFFSET: OnceLock<Option<chrono::Duration>> = OnceLock::new();

fn mock_time_offset() -> Option<chrono::Duration> {
    *MOCK_TIME_OFFSET.get_or_init(|| {
        #[cfg(debug_assertions)]
        {
            let raw = std::env::var(MOCK_TIME_ENV_VAR).ok()?;
            match parse_mock_time(&raw) {
                Some(mock) => {
                    let offset = mock.signed_duration_since(Utc::now());
                    tracing::info!(
                        mock_time = %raw,
                        offset_secs = offset.num_seconds(),
                        "Mock time enabled"
                    );
                    Some(offset)
                }
                None => {
                    tracing::warn!(
                        mock_time = %raw,
                        expected_format = "RFC 3339",
                        "Invalid mock time, using the real clock"
                    );
                    None
                }
            }
        }
        #[cfg(not(debug_assertions))]
        {
            None
        }
    })
}

/// Parse a mock-time value. Only RFC 3339 is accepted so the instant is
/// never ambiguous across timezones.
pub fn parse_mock_time(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Returns whether mock time is currently active.
pub fn is_mock_time_active() -> bool {
    mock_time_offset().is_some()
}

/// Current instant, respecting `POWERWARD_MOCK_TIME` in debug builds.
pub fn now() -> DateTime<Utc> {
    let real_now = Utc::now();
    match mock_time_offset() {
        Some(offset) => real_now + offset,
        None => real_now,
    }
}

/// A time of day with minute resolution, as written in the config (`HH:MM`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WallClock {
    pub hour: u8,
    pub minute: u8,
}

impl WallClock {
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        if hour < 24 && minute < 60 {
            Some(Self { hour, minute })
        } else {
            None
        }
    }

    pub fn to_naive_time(self) -> NaiveTime {
        // hour/minute are range-checked by `new`
        NaiveTime::from_hms_opt(u32::from(self.hour), u32::from(self.minute), 0)
            .unwrap_or(NaiveTime::MIN)
    }

    /// Returns seconds since midnight
    pub fn as_seconds_from_midnight(&self) -> u32 {
        u32::from(self.hour) * 3600 + u32::from(self.minute) * 60
    }
}

impl PartialOrd for WallClock {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for WallClock {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.as_seconds_from_midnight()
            .cmp(&other.as_seconds_from_midnight())
    }
}

impl fmt::Display for WallClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// Helper to format durations in human-readable form
pub fn format_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone};

    #[test]
    fn wall_clock_ordering() {
        let morning = WallClock::new(8, 0).unwrap();
        let evening = WallClock::new(17, 0).unwrap();
        let late = WallClock::new(20, 0).unwrap();

        assert!(morning < evening);
        assert!(evening < late);
    }

    #[test]
    fn wall_clock_rejects_out_of_range() {
        assert!(WallClock::new(24, 0).is_none());
        assert!(WallClock::new(12, 60).is_none());
        assert!(WallClock::new(23, 59).is_some());
    }

    #[test]
    fn wall_clock_display_is_zero_padded() {
        assert_eq!(WallClock::new(7, 5).unwrap().to_string(), "07:05");
    }

    #[test]
    fn wall_clock_to_naive_time() {
        let wc = WallClock::new(17, 30).unwrap();
        assert_eq!(wc.to_naive_time(), NaiveTime::from_hms_opt(17, 30, 0).unwrap());
    }

    #[test]
    fn mock_time_accepts_rfc3339_only() {
        let parsed = parse_mock_time("2025-12-25T16:59:00+00:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2025, 12, 25, 16, 59, 0).unwrap());

        let offset = parse_mock_time("2025-06-01T18:00:00+01:00").unwrap();
        assert_eq!(offset, Utc.with_ymd_and_hms(2025, 6, 1, 17, 0, 0).unwrap());

        assert!(parse_mock_time("2025-12-25 16:59:00").is_none());
        assert!(parse_mock_time("not a date").is_none());
    }

    #[test]
    fn format_duration_units() {
        assert_eq!(format_duration(Duration::from_secs(30)), "30s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
        assert_eq!(format_duration(Duration::from_secs(3661)), "1h 1m 1s");
    }

    #[test]
    fn now_returns_plausible_time() {
        let t = now();
        assert!(t.year() >= 2020);
    }
}
