//! Catalog domain types
//!
//! JSON field names are the stable snake_case names below; they double as
//! the keys the pruning rules refer to.

mod anime;
mod episode;
mod season;
mod tag;

pub use anime::{Anime, AnimeWithNextEpisode};
pub use episode::{AnimeEpisode, Episode};
pub use season::{AnimeSeason, Season, SeasonKind, SeasonStatus};
pub use tag::Tag;

use crate::pruning::{EntityKind, EntityShape};

const ANIME_EPISODE_SHAPE: EntityShape = EntityShape::leaf(EntityKind::AnimeEpisode);
const EPISODE_SHAPE: EntityShape = EntityShape::leaf(EntityKind::Episode);
const ANIME_SEASON_SHAPE: EntityShape = EntityShape::leaf(EntityKind::AnimeSeason);
const TAG_SHAPE: EntityShape = EntityShape::leaf(EntityKind::Tag);

const ANIME_SHAPE: EntityShape = EntityShape {
    kind: EntityKind::Anime,
    children: &[("anime_episodes", &ANIME_EPISODE_SHAPE)],
};

const ANIME_WITH_NEXT_EPISODE_SHAPE: EntityShape = EntityShape {
    kind: EntityKind::Anime,
    children: &[
        ("anime_episodes", &ANIME_EPISODE_SHAPE),
        ("next_episode", &EPISODE_SHAPE),
    ],
};
