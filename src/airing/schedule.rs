//! Airing-state classification and display text

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::broadcast::compute_air_time;
use crate::jst::JST;
use crate::models::AnimeEpisode;

/// How long after its end an episode still counts as "just aired".
pub const JUST_AIRED_WINDOW: Duration = Duration::days(7);

/// How far ahead an episode counts as "upcoming today".
pub const UPCOMING_WINDOW: Duration = Duration::hours(24);

/// How far back an episode may have aired and still be the next one.
pub const NEXT_EPISODE_GRACE: Duration = Duration::hours(24);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AiringState {
    /// `air_time <= now <= air_time + duration`
    AiringNow,
    /// Ended at most seven days ago.
    JustAired,
    /// Starts within the next 24 hours.
    UpcomingToday,
    /// Starts later than 24 hours from now.
    Scheduled,
    /// Ended more than seven days ago.
    Finished,
}

/// Classify an episode relative to `now`.
#[must_use]
pub fn classify(now: DateTime<Utc>, air_time: DateTime<Utc>, duration: Duration) -> AiringState {
    if now < air_time {
        return if air_time - now <= UPCOMING_WINDOW {
            AiringState::UpcomingToday
        } else {
            AiringState::Scheduled
        };
    }

    let end = air_time + duration;
    if now <= end {
        AiringState::AiringNow
    } else if now - end <= JUST_AIRED_WINDOW {
        AiringState::JustAired
    } else {
        AiringState::Finished
    }
}

/// Short countdown label for `state`.
#[must_use]
pub fn countdown_text(
    state: AiringState,
    now: DateTime<Utc>,
    air_time: DateTime<Utc>,
    duration: Duration,
) -> String {
    match state {
        AiringState::AiringNow => {
            let remaining = air_time + duration - now;
            if remaining > Duration::zero() && remaining < Duration::hours(1) {
                format!("{}m left", remaining.num_minutes())
            } else {
                "AIRING NOW".to_string()
            }
        }
        AiringState::UpcomingToday => {
            let until = air_time - now;
            if until < Duration::hours(1) {
                format!("{}m", until.num_minutes())
            } else {
                format!("{}h", until.num_hours())
            }
        }
        AiringState::JustAired | AiringState::Finished => "JUST AIRED".to_string(),
        AiringState::Scheduled => String::new(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayVariant {
    Airing,
    Countdown,
    Aired,
    Scheduled,
}

/// Badge shown next to an airing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AirTimeDisplayInfo {
    pub show: bool,
    pub text: String,
    pub variant: DisplayVariant,
}

impl AirTimeDisplayInfo {
    #[must_use]
    pub fn compute(now: DateTime<Utc>, air_time: DateTime<Utc>, duration: Duration) -> Self {
        let state = classify(now, air_time, duration);
        let text = countdown_text(state, now, air_time, duration);
        match state {
            AiringState::AiringNow => Self {
                show: true,
                text,
                variant: DisplayVariant::Airing,
            },
            AiringState::UpcomingToday => Self {
                show: true,
                text,
                variant: DisplayVariant::Countdown,
            },
            AiringState::JustAired => Self {
                show: true,
                text,
                variant: DisplayVariant::Aired,
            },
            AiringState::Scheduled => Self {
                show: true,
                text: air_time.with_timezone(&JST).format("%a %H:%M JST").to_string(),
                variant: DisplayVariant::Scheduled,
            },
            AiringState::Finished => Self {
                show: false,
                text,
                variant: DisplayVariant::Aired,
            },
        }
    }
}

/// First episode, in list order, whose air time is in the future or at
/// most 24 hours in the past. Episodes without an `aired` date are skipped.
#[must_use]
pub fn select_next_episode<'a>(
    episodes: &'a [AnimeEpisode],
    broadcast: Option<&str>,
    now: DateTime<Utc>,
) -> Option<(&'a AnimeEpisode, DateTime<Utc>)> {
    episodes.iter().find_map(|episode| {
        let air_time = compute_air_time(episode.aired?, broadcast);
        (air_time > now || now - air_time <= NEXT_EPISODE_GRACE).then_some((episode, air_time))
    })
}
