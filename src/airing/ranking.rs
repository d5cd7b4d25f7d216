//! Currently-airing ranking
//!
//! Blends at most two episodes that started in the last 30 minutes (most
//! recent first) with upcoming episodes (soonest first), then caps the
//! list. Anything else is dropped.

use chrono::{DateTime, Duration, Utc};

use crate::models::AnimeWithNextEpisode;

/// Look-back for the "recently aired" group.
pub const RECENT_WINDOW: Duration = Duration::minutes(30);

/// Size cap of the "recently aired" group.
pub const MAX_RECENT: usize = 2;

#[must_use]
pub fn rank_currently_airing(
    candidates: Vec<AnimeWithNextEpisode>,
    now: DateTime<Utc>,
    limit: usize,
) -> Vec<AnimeWithNextEpisode> {
    let mut recent = Vec::new();
    let mut future = Vec::new();

    for candidate in candidates {
        let Some(air_time) = candidate.next_air_time() else {
            continue;
        };
        if air_time > now {
            future.push((air_time, candidate));
        } else if air_time < now && air_time >= now - RECENT_WINDOW {
            recent.push((air_time, candidate));
        }
    }

    recent.sort_by(|a, b| b.0.cmp(&a.0));
    recent.truncate(MAX_RECENT);
    future.sort_by(|a, b| a.0.cmp(&b.0));

    recent
        .into_iter()
        .chain(future)
        .map(|(_, candidate)| candidate)
        .take(limit)
        .collect()
}
