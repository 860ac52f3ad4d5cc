//! Schedule oracle: desired power state as a pure function of time

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use powerward_api::{PowerState, ScheduleInfo};
use powerward_config::ScheduleSettings;
use powerward_util::WallClock;
use tracing::warn;

/// Fixed daily operating window in a named timezone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    start: WallClock,
    end: WallClock,
    timezone: String,
}

impl Schedule {
    pub fn new(start: WallClock, end: WallClock, timezone: impl Into<String>) -> Self {
        Self {
            start,
            end,
            timezone: timezone.into(),
        }
    }

    pub fn from_settings(settings: &ScheduleSettings) -> Self {
        Self::new(settings.start, settings.end, settings.timezone.clone())
    }

    /// Whether the host should be online at `now`.
    ///
    /// Local time of day in the configured zone must satisfy
    /// `start <= t < end`. An unresolvable zone or an empty window yields
    /// `false`.
    pub fn desired_online(&self, now: DateTime<Utc>) -> bool {
        let tz: Tz = match self.timezone.parse() {
            Ok(tz) => tz,
            Err(_) => {
                warn!(timezone = %self.timezone, "Cannot resolve timezone, host not wanted");
                return false;
            }
        };

        if self.start >= self.end {
            return false;
        }

        let local = now.with_timezone(&tz).time();
        self.start.to_naive_time() <= local && local < self.end.to_naive_time()
    }

    pub fn desired_state(&self, now: DateTime<Utc>) -> PowerState {
        PowerState::from_online(self.desired_online(now))
    }

    pub fn info(&self) -> ScheduleInfo {
        ScheduleInfo {
            start: self.start,
            end: self.end,
            timezone: self.timezone.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn london_evening() -> Schedule {
        Schedule::new(
            WallClock::new(17, 0).unwrap(),
            WallClock::new(20, 0).unwrap(),
            "Europe/London",
        )
    }

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
    }

    #[test]
    fn inside_and_outside_the_window() {
        let schedule = london_evening();
        // January: London is on GMT
        assert!(schedule.desired_online(utc(2025, 1, 15, 18, 30, 0)));
        assert!(!schedule.desired_online(utc(2025, 1, 15, 9, 0, 0)));
        assert!(!schedule.desired_online(utc(2025, 1, 15, 23, 0, 0)));
    }

    #[test]
    fn start_inclusive_end_exclusive() {
        let schedule = london_evening();
        assert!(!schedule.desired_online(utc(2025, 1, 15, 16, 59, 59)));
        assert!(schedule.desired_online(utc(2025, 1, 15, 17, 0, 0)));
        assert!(schedule.desired_online(utc(2025, 1, 15, 19, 59, 59)));
        assert!(!schedule.desired_online(utc(2025, 1, 15, 20, 0, 0)));
    }

    #[test]
    fn window_uses_each_days_own_offset() {
        let schedule = london_evening();

        // 16:30 UTC is 16:30 GMT in winter but 17:30 BST in summer
        assert!(!schedule.desired_online(utc(2025, 1, 15, 16, 30, 0)));
        assert!(schedule.desired_online(utc(2025, 7, 15, 16, 30, 0)));

        // 19:30 UTC is inside the window in winter, after it in summer
        assert!(schedule.desired_online(utc(2025, 1, 15, 19, 30, 0)));
        assert!(!schedule.desired_online(utc(2025, 7, 15, 19, 30, 0)));
    }

    #[test]
    fn consecutive_days_evaluate_independently() {
        let schedule = london_evening();
        assert!(schedule.desired_online(utc(2025, 3, 10, 17, 0, 0)));
        assert!(!schedule.desired_online(utc(2025, 3, 10, 20, 0, 0)));
        assert!(!schedule.desired_online(utc(2025, 3, 11, 16, 59, 0)));
        assert!(schedule.desired_online(utc(2025, 3, 11, 17, 0, 0)));
    }

    #[test]
    fn unknown_timezone_fails_safe() {
        let schedule = Schedule::new(
            WallClock::new(0, 0).unwrap(),
            WallClock::new(23, 59).unwrap(),
            "Mars/Olympus_Mons",
        );
        assert!(!schedule.desired_online(utc(2025, 1, 15, 12, 0, 0)));
        assert_eq!(
            schedule.desired_state(utc(2025, 1, 15, 12, 0, 0)),
            PowerState::Offline
        );
    }

    #[test]
    fn empty_window_is_never_online() {
        let schedule = Schedule::new(
            WallClock::new(20, 0).unwrap(),
            WallClock::new(17, 0).unwrap(),
            "Europe/London",
        );
        assert!(!schedule.desired_online(utc(2025, 1, 15, 18, 0, 0)));
        assert!(!schedule.desired_online(utc(2025, 1, 15, 21, 0, 0)));
    }

    #[test]
    fn info_describes_window() {
        assert_eq!(london_evening().info().to_string(), "17:00-20:00 Europe/London");
    }
}
