//! Airing windows
//!
//! Windows are anchored on Tokyo calendar days: the start is midnight in
//! Tokyo of the day containing the requested start instant. The end is
//! either `start + days` or an explicit end instant, with no implicit
//! extra day. Intervals are half-open.

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::jst::{JST, start_of_day};

pub const DEFAULT_AIRING_LIMIT: usize = 10;
pub const DEFAULT_AIRING_DAYS: u32 = 7;

/// Half-open interval `[start, end)` in Tokyo time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AiringWindow {
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
}

impl AiringWindow {
    #[must_use]
    pub fn new(start: DateTime<Utc>, days: u32, end: Option<DateTime<Utc>>) -> Self {
        let start = start_of_day(start, JST);
        let end = match end {
            Some(end) => end.with_timezone(&JST),
            None => start + Duration::days(i64::from(days)),
        };
        Self { start, end }
    }

    #[must_use]
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start_utc() && instant < self.end_utc()
    }

    #[must_use]
    pub fn start_utc(&self) -> DateTime<Utc> {
        self.start.with_timezone(&Utc)
    }

    #[must_use]
    pub fn end_utc(&self) -> DateTime<Utc> {
        self.end.with_timezone(&Utc)
    }
}

/// Parameters of a currently-airing query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiringRequest {
    pub limit: usize,
    /// Defaults to `now`.
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub days: u32,
}

impl Default for AiringRequest {
    fn default() -> Self {
        Self {
            limit: DEFAULT_AIRING_LIMIT,
            start: None,
            end: None,
            days: DEFAULT_AIRING_DAYS,
        }
    }
}

impl AiringRequest {
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn window(&self, now: DateTime<Utc>) -> AiringWindow {
        AiringWindow::new(self.start.unwrap_or(now), self.days, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_seven_day_window_bounds() {
        let start = Utc.with_ymd_and_hms(2025, 9, 26, 0, 0, 0).unwrap();
        let window = AiringWindow::new(start, 7, None);

        assert_eq!(window.start_utc(), Utc.with_ymd_and_hms(2025, 9, 25, 15, 0, 0).unwrap());
        assert_eq!(window.end_utc(), Utc.with_ymd_and_hms(2025, 10, 2, 15, 0, 0).unwrap());
        assert!(window.contains(Utc.with_ymd_and_hms(2025, 9, 27, 15, 30, 0).unwrap()));
        assert!(!window.contains(Utc.with_ymd_and_hms(2025, 10, 3, 0, 0, 1).unwrap()));
        assert!(!window.contains(window.end_utc()));
        assert!(window.contains(window.start_utc()));
    }

    #[test]
    fn test_explicit_end_is_not_extended() {
        let start = Utc.with_ymd_and_hms(2025, 9, 26, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 9, 28, 0, 0, 0).unwrap();
        let window = AiringWindow::new(start, 7, Some(end));
        assert_eq!(window.end_utc(), end);
        assert!(!window.contains(end));
    }

    #[test]
    fn test_request_defaults_to_now() {
        let now = Utc.with_ymd_and_hms(2025, 9, 26, 16, 0, 0).unwrap();
        let window = AiringRequest::default().window(now);
        assert_eq!(window.start.to_rfc3339(), "2025-09-27T00:00:00+09:00");
    }
}
