//! Cache key schema
//!
//! Every key is colon separated and starts with a fixed namespace
//! (`anime-api` by default). Keys are case sensitive.
//!
//! | Family | Template |
//! |---|---|
//! | Anime by id | `<ns>:anime:id:<id>` |
//! | Anime with episodes | `<ns>:anime:detail:<id>` (+ `:episodes`) |
//! | Season bucket | `<ns>:anime:season:<season>:(all\|fields:<csv>\|episodes)` |
//! | Episodes by anime | `<ns>:episodes:anime:<animeId>` |
//! | Episode by id | `<ns>:episode:id:<id>` |
//! | Ranked lists | `<ns>:anime:<top_rated\|most_popular\|newest>:<limit>:<offset>` |
//! | Currently airing | `<ns>:airing:<limit>:<start>:<end>:<days>` |

use chrono::{DateTime, Utc};

/// Namespace used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "anime-api";

/// Suffix of the advisory rebuild lock derived from a cache key.
pub const LOCK_SUFFIX: &str = ":lock";

/// Suffix of the key holding a separated child collection.
pub const SEPARATED_CHILDREN_SUFFIX: &str = ":episodes";

const KEY_TIME_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Ranked anime lists, each cached under its own key family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RankedList {
    TopRated,
    MostPopular,
    Newest,
}

impl RankedList {
    pub const ALL: [Self; 3] = [Self::TopRated, Self::MostPopular, Self::Newest];

    #[must_use]
    pub fn segment(self) -> &'static str {
        match self {
            Self::TopRated => "top_rated",
            Self::MostPopular => "most_popular",
            Self::Newest => "newest",
        }
    }
}

/// Builds cache keys and glob patterns under one namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBuilder {
    namespace: String,
}

impl Default for KeyBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

impl KeyBuilder {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    #[must_use]
    pub fn anime_by_id(&self, id: &str) -> String {
        format!("{}:anime:id:{id}", self.namespace)
    }

    /// Parent entry written through the separation layer; its episodes
    /// live under [`separated_children_key`] of this key.
    #[must_use]
    pub fn anime_detail(&self, id: &str) -> String {
        format!("{}:anime:detail:{id}", self.namespace)
    }

    /// Season bucket key. An empty field list addresses the `all` bucket;
    /// otherwise fields are sorted and de-duplicated so the same set always
    /// maps to the same key.
    #[must_use]
    pub fn anime_season(&self, season: &str, fields: &[String]) -> String {
        if fields.is_empty() {
            return format!("{}:anime:season:{season}:all", self.namespace);
        }
        let mut sorted: Vec<&str> = fields.iter().map(String::as_str).collect();
        sorted.sort_unstable();
        sorted.dedup();
        format!(
            "{}:anime:season:{season}:fields:{}",
            self.namespace,
            sorted.join(",")
        )
    }

    /// Season bucket holding anime with their episodes.
    #[must_use]
    pub fn anime_season_with_episodes(&self, season: &str) -> String {
        format!("{}:anime:season:{season}:episodes", self.namespace)
    }

    #[must_use]
    pub fn anime_season_pattern(&self, season: &str) -> String {
        format!("{}:anime:season:{season}:*", self.namespace)
    }

    /// Every season bucket of every season.
    #[must_use]
    pub fn all_seasons_pattern(&self) -> String {
        format!("{}:anime:season:*", self.namespace)
    }

    #[must_use]
    pub fn episodes_by_anime(&self, anime_id: &str) -> String {
        format!("{}:episodes:anime:{anime_id}", self.namespace)
    }

    #[must_use]
    pub fn episode_by_id(&self, id: &str) -> String {
        format!("{}:episode:id:{id}", self.namespace)
    }

    #[must_use]
    pub fn all_anime_pattern(&self) -> String {
        format!("{}:anime:*", self.namespace)
    }

    #[must_use]
    pub fn all_episodes_pattern(&self) -> String {
        format!("{}:episode*", self.namespace)
    }

    /// Any key that mentions `anime` in a segment and ends with the id.
    #[must_use]
    pub fn anime_invalidation_pattern(&self, anime_id: &str) -> String {
        format!("{}:*anime*:{anime_id}*", self.namespace)
    }

    #[must_use]
    pub fn ranked(&self, list: RankedList, limit: u32, offset: u32) -> String {
        format!("{}:anime:{}:{limit}:{offset}", self.namespace, list.segment())
    }

    #[must_use]
    pub fn ranked_pattern(&self, list: RankedList) -> String {
        format!("{}:anime:{}:*", self.namespace, list.segment())
    }

    /// Search results; the query is percent-encoded so glob metacharacters
    /// and separators in user input cannot alter the key shape.
    #[must_use]
    pub fn search(&self, query: &str, limit: u32) -> String {
        format!(
            "{}:anime:search:{}:{limit}",
            self.namespace,
            urlencoding::encode(query)
        )
    }

    #[must_use]
    pub fn anime_by_tag(&self, tag: &str, limit: u32) -> String {
        format!(
            "{}:anime:tag:{}:{limit}",
            self.namespace,
            urlencoding::encode(tag)
        )
    }

    #[must_use]
    pub fn currently_airing(
        &self,
        limit: usize,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        days: u32,
    ) -> String {
        format!(
            "{}:airing:{limit}:{}:{}:{days}",
            self.namespace,
            start.format(KEY_TIME_FORMAT),
            end.format(KEY_TIME_FORMAT)
        )
    }

    #[must_use]
    pub fn airing_pattern(&self) -> String {
        format!("{}:airing:*", self.namespace)
    }

    /// Matches every key in the store, namespaced or not.
    #[must_use]
    pub fn everything_pattern(&self) -> String {
        "*".to_string()
    }
}

/// Advisory rebuild lock key for a cache key.
#[must_use]
pub fn lock_key(key: &str) -> String {
    format!("{key}{LOCK_SUFFIX}")
}

/// Key holding the child collection detached from the parent at `key`.
#[must_use]
pub fn separated_children_key(key: &str) -> String {
    format!("{key}{SEPARATED_CHILDREN_SUFFIX}")
}

/// Redis-compatible glob matching.
///
/// Supports `*` (any sequence), `?` (any single character), `[abc]`,
/// `[a-z]`, `[^abc]` classes and `\` escapes.
#[must_use]
pub fn glob_match(pattern: &str, key: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let key: Vec<char> = key.chars().collect();
    match_from(&pattern, &key)
}

fn match_from(pattern: &[char], key: &[char]) -> bool {
    let (mut p, mut k) = (0usize, 0usize);
    // Last `*` seen and the key position it was tried at, for backtracking.
    let mut star: Option<(usize, usize)> = None;

    while k < key.len() {
        let step = match pattern.get(p) {
            Some('*') => {
                star = Some((p, k));
                p += 1;
                continue;
            }
            Some('?') => Some(1),
            Some('[') => match_class(pattern, p, key.get(k).copied()),
            Some('\\') => match (pattern.get(p + 1), key.get(k)) {
                (Some(escaped), Some(c)) if escaped == c => Some(2),
                (None, Some('\\')) => Some(1),
                _ => None,
            },
            Some(c) if key.get(k) == Some(c) => Some(1),
            _ => None,
        };

        if let Some(consumed) = step {
            p += consumed;
            k += 1;
        } else if let Some((star_p, star_k)) = star {
            p = star_p + 1;
            k = star_k + 1;
            star = Some((star_p, star_k + 1));
        } else {
            return false;
        }
    }

    pattern.get(p..).is_some_and(|rest| rest.iter().all(|c| *c == '*'))
}

/// Matches a `[...]` class starting at `pattern[start]`; returns the number
/// of pattern characters consumed on success.
fn match_class(pattern: &[char], start: usize, c: Option<char>) -> Option<usize> {
    let c = c?;
    let mut i = start + 1;
    let negate = pattern.get(i) == Some(&'^');
    if negate {
        i += 1;
    }

    let mut matched = false;
    loop {
        match pattern.get(i) {
            // Unterminated class: treat `[` as a literal.
            None => return (c == '[').then_some(1),
            Some(']') => break,
            Some('\\') => {
                if pattern.get(i + 1) == Some(&c) {
                    matched = true;
                }
                i += 2;
            }
            Some(&lo) if pattern.get(i + 1) == Some(&'-') && pattern.get(i + 2).is_some_and(|hi| *hi != ']') => {
                let hi = pattern.get(i + 2).copied().unwrap_or(lo);
                let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
                if (lo..=hi).contains(&c) {
                    matched = true;
                }
                i += 3;
            }
            Some(&other) => {
                if other == c {
                    matched = true;
                }
                i += 1;
            }
        }
    }

    (matched != negate).then_some(i + 1 - start)
}
