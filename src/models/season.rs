use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::{DateTime, Datelike, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::ANIME_SEASON_SHAPE;
use crate::error::ParseError;
use crate::jst::JST;
use crate::pruning::{CacheEntity, EntityShape};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SeasonKind {
    Spring,
    Summer,
    Fall,
    Winter,
}

impl SeasonKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Spring => "SPRING",
            Self::Summer => "SUMMER",
            Self::Fall => "FALL",
            Self::Winter => "WINTER",
        }
    }
}

/// Validated season identifier, canonical form `SPRING_2024`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Season {
    pub kind: SeasonKind,
    pub year: u16,
}

impl Season {
    #[must_use]
    pub fn new(kind: SeasonKind, year: u16) -> Self {
        Self { kind, year }
    }

    /// Parse a season string; anything but the canonical upper-case form
    /// is rejected.
    ///
    /// # Errors
    ///
    /// Returns `ParseError::Season` for malformed input.
    pub fn parse(raw: &str) -> Result<Self, ParseError> {
        static RE: OnceLock<Regex> = OnceLock::new();
        let re = RE.get_or_init(|| {
            Regex::new(r"^(SPRING|SUMMER|FALL|WINTER)_(\d{4})$").expect("Invalid regex")
        });

        let invalid = || ParseError::Season(raw.to_string());
        let caps = re.captures(raw).ok_or_else(invalid)?;
        let kind = match caps.get(1).map(|m| m.as_str()) {
            Some("SPRING") => SeasonKind::Spring,
            Some("SUMMER") => SeasonKind::Summer,
            Some("FALL") => SeasonKind::Fall,
            Some("WINTER") => SeasonKind::Winter,
            _ => return Err(invalid()),
        };
        let year = caps
            .get(2)
            .and_then(|m| m.as_str().parse().ok())
            .ok_or_else(invalid)?;
        Ok(Self { kind, year })
    }

    /// Broadcast season containing `instant`, by the Japan calendar.
    #[must_use]
    pub fn containing(instant: DateTime<Utc>) -> Self {
        let local = instant.with_timezone(&JST);
        let kind = match local.month() {
            1..=3 => SeasonKind::Winter,
            4..=6 => SeasonKind::Spring,
            7..=9 => SeasonKind::Summer,
            _ => SeasonKind::Fall,
        };
        let year = u16::try_from(local.year()).unwrap_or_default();
        Self { kind, year }
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{:04}", self.kind.as_str(), self.year)
    }
}

impl FromStr for Season {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Status of an anime's season assignment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeasonStatus {
    #[default]
    Unknown,
    Confirmed,
    Announced,
    Cancelled,
}

impl SeasonStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Confirmed => "confirmed",
            Self::Announced => "announced",
            Self::Cancelled => "cancelled",
        }
    }
}

impl FromStr for SeasonStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unknown" => Ok(Self::Unknown),
            "confirmed" => Ok(Self::Confirmed),
            "announced" => Ok(Self::Announced),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(ParseError::SeasonStatus(other.to_string())),
        }
    }
}

/// Row of `anime_seasons`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimeSeason {
    pub id: String,
    pub season: String,
    pub status: SeasonStatus,
    pub episode_count: Option<i64>,
    pub notes: Option<String>,
    pub anime_id: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl CacheEntity for AnimeSeason {
    const SHAPE: &'static EntityShape = &ANIME_SEASON_SHAPE;
}
