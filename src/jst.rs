//! Japan Standard Time helpers
//!
//! Instants are `DateTime<Utc>` everywhere in the crate. Storage keeps the
//! legacy naive `YYYY-MM-DD HH:MM:SS` strings in Japan local time; the
//! conversion happens here and nowhere else.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Asia::Tokyo;
use chrono_tz::Tz;

/// Zone used for broadcast schedules and airing windows.
pub const JST: Tz = Tokyo;

/// Format of persisted Japan-local timestamps.
pub const PERSISTED_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse a persisted Japan-local timestamp.
///
/// Date-only values (`YYYY-MM-DD`) are read as local midnight.
#[must_use]
pub fn parse_jst(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    let naive = NaiveDateTime::parse_from_str(raw, PERSISTED_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
        .or_else(|_| {
            chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map(|date| date.and_hms_opt(0, 0, 0).unwrap_or_default())
        })
        .ok()?;
    // JST has no DST, so every local time maps to exactly one instant.
    JST.from_local_datetime(&naive)
        .single()
        .map(|local| local.with_timezone(&Utc))
}

/// Render an instant as a persisted Japan-local timestamp.
#[must_use]
pub fn format_jst(instant: DateTime<Utc>) -> String {
    instant.with_timezone(&JST).format(PERSISTED_FORMAT).to_string()
}

/// Midnight of the calendar day of `instant` in `tz`.
#[must_use]
pub fn start_of_day(instant: DateTime<Utc>, tz: Tz) -> DateTime<Tz> {
    let local_date = instant.with_timezone(&tz).date_naive();
    let midnight = local_date.and_hms_opt(0, 0, 0).unwrap_or_default();
    tz.from_local_datetime(&midnight)
        .earliest()
        .unwrap_or_else(|| instant.with_timezone(&tz))
}
