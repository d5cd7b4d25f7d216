//! Broadcast-slot and episode-duration parsing
//!
//! Broadcast strings look like `"Wednesdays at 01:29 (JST)"`. Only the
//! time of day and the zone tag matter; the weekday is implied by the
//! episode's `aired` date. A string that cannot be parsed never fails the
//! request: the air time falls back to `aired` unchanged.

use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use regex::Regex;
use tracing::debug;

use crate::error::ParseError;
use crate::jst::JST;

/// Episode length assumed when the duration is missing or unparseable.
pub const DEFAULT_EPISODE_MINUTES: u32 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastZone {
    Jst,
    Utc,
}

/// Time-of-day slot parsed from a broadcast string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastSlot {
    pub hour: u32,
    pub minute: u32,
    pub zone: BroadcastZone,
}

impl BroadcastSlot {
    /// Air instant of this slot on the calendar day `date` (in the slot's
    /// own zone).
    #[must_use]
    pub fn on(&self, date: NaiveDate) -> Option<DateTime<Utc>> {
        let local = date.and_hms_opt(self.hour, self.minute, 0)?;
        match self.zone {
            BroadcastZone::Jst => JST
                .from_local_datetime(&local)
                .single()
                .map(|t| t.with_timezone(&Utc)),
            BroadcastZone::Utc => Some(Utc.from_utc_datetime(&local)),
        }
    }
}

/// Parse the `HH:MM` slot and zone tag of a broadcast string.
///
/// The time is the token between `" at "` and `" ("`; without `" at "` the
/// first bare `HH:MM` is used. The zone is UTC only when tagged `(UTC)`.
///
/// # Errors
///
/// Returns `ParseError::Broadcast` when no valid time of day is present.
pub fn parse_broadcast(raw: &str) -> Result<BroadcastSlot, ParseError> {
    let invalid = || ParseError::Broadcast(raw.to_string());
    if !raw.contains(':') {
        return Err(invalid());
    }

    let token = match raw.split_once(" at ") {
        Some((_, rest)) => rest.split_once(" (").map_or(rest, |(time, _)| time).trim(),
        None => bare_time(raw).ok_or_else(invalid)?,
    };

    let (hh, mm) = token.split_once(':').ok_or_else(invalid)?;
    let hour: u32 = hh.trim().parse().map_err(|_| invalid())?;
    let minute: u32 = mm.trim().parse().map_err(|_| invalid())?;
    if hour > 23 || minute > 59 {
        return Err(invalid());
    }

    let zone = if raw.contains("(UTC)") {
        BroadcastZone::Utc
    } else {
        BroadcastZone::Jst
    };

    Ok(BroadcastSlot { hour, minute, zone })
}

fn bare_time(raw: &str) -> Option<&str> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"\b\d{1,2}:\d{2}\b").expect("Invalid regex"));
    re.find(raw).map(|m| m.as_str())
}

/// Authoritative air time of an episode.
///
/// JST slots take the calendar date of `aired` in Japan, UTC slots the
/// calendar date of `aired` in UTC. The slot's own zone decides the day:
/// an `aired` of 20:00 UTC is already the next day in Japan, so a JST slot
/// lands on that next JST day even when the result is earlier than
/// `aired`. Unparseable or missing broadcasts return `aired` unchanged.
#[must_use]
pub fn compute_air_time(aired: DateTime<Utc>, broadcast: Option<&str>) -> DateTime<Utc> {
    let Some(raw) = broadcast else {
        return aired;
    };
    let slot = match parse_broadcast(raw) {
        Ok(slot) => slot,
        Err(e) => {
            debug!(error = %e, "Falling back to raw aired timestamp");
            return aired;
        }
    };
    let date = match slot.zone {
        BroadcastZone::Jst => aired.with_timezone(&JST).date_naive(),
        BroadcastZone::Utc => aired.date_naive(),
    };
    slot.on(date).unwrap_or(aired)
}

/// Leading integer of a duration string, in minutes.
///
/// # Errors
///
/// Returns `ParseError::Duration` when there is no positive leading integer.
pub fn parse_duration_minutes(raw: &str) -> Result<u32, ParseError> {
    let digits = raw
        .trim_start()
        .split(|c: char| !c.is_ascii_digit())
        .next()
        .unwrap_or_default();
    match digits.parse::<u32>() {
        Ok(minutes) if minutes > 0 => Ok(minutes),
        _ => Err(ParseError::Duration(raw.to_string())),
    }
}

/// Episode length, defaulting to 24 minutes.
#[must_use]
pub fn episode_duration(raw: Option<&str>) -> chrono::Duration {
    let minutes = raw
        .and_then(|raw| parse_duration_minutes(raw).ok())
        .unwrap_or(DEFAULT_EPISODE_MINUTES);
    chrono::Duration::minutes(i64::from(minutes))
}
