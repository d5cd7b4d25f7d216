//! Currently-airing engine
//!
//! Turns anime rows (with their episodes) into a ranked, capped list of
//! anime with a computed next episode and display badge. Every step is a
//! pure function of its inputs and `now`; nothing here touches storage.

mod broadcast;
mod ranking;
mod schedule;
mod window;

pub use broadcast::{
    BroadcastSlot, BroadcastZone, DEFAULT_EPISODE_MINUTES, compute_air_time, episode_duration,
    parse_broadcast, parse_duration_minutes,
};
pub use ranking::{MAX_RECENT, RECENT_WINDOW, rank_currently_airing};
pub use schedule::{
    AirTimeDisplayInfo, AiringState, DisplayVariant, JUST_AIRED_WINDOW, NEXT_EPISODE_GRACE,
    UPCOMING_WINDOW, classify, countdown_text, select_next_episode,
};
pub use window::{AiringRequest, AiringWindow, DEFAULT_AIRING_DAYS, DEFAULT_AIRING_LIMIT};

use chrono::{DateTime, Utc};

use crate::models::{Anime, AnimeWithNextEpisode, Episode};

/// Attach the next episode and display badge to `anime`.
///
/// The episode list is consumed; the returned value carries only the
/// selected episode.
#[must_use]
pub fn with_next_episode(mut anime: Anime, now: DateTime<Utc>) -> AnimeWithNextEpisode {
    let episodes = anime.take_episodes();
    let duration = episode_duration(anime.duration.as_deref());

    let next = select_next_episode(&episodes, anime.broadcast.as_deref(), now);
    let (next_episode, air_time_display) = match next {
        Some((row, air_time)) => (
            Some(Episode::from_row(row, air_time)),
            Some(AirTimeDisplayInfo::compute(now, air_time, duration)),
        ),
        None => (None, None),
    };

    AnimeWithNextEpisode {
        anime,
        next_episode,
        air_time_display,
    }
}

/// Currently-airing list for `window`.
///
/// Upcoming episodes must fall inside the window; recently aired ones are
/// kept regardless so an episode that started just before midnight still
/// shows up.
#[must_use]
pub fn currently_airing(
    anime: Vec<Anime>,
    window: &AiringWindow,
    now: DateTime<Utc>,
    limit: usize,
) -> Vec<AnimeWithNextEpisode> {
    let candidates = anime
        .into_iter()
        .map(|anime| with_next_episode(anime, now))
        .filter(|candidate| {
            candidate
                .next_air_time()
                .is_some_and(|air_time| air_time <= now || window.contains(air_time))
        })
        .collect();

    rank_currently_airing(candidates, now, limit)
}
