//! Article identity, timestamps, and the records derived from them.

use std::fmt;
use std::str::FromStr;

use chrono::{Duration, Local, NaiveDateTime, Timelike};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::BoardError;

/// Timestamp layout shared by sidecars and the index.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Directory number identifying an article container. Always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct Dir(u64);

impl Dir {
    /// The first directory number handed out on an empty board.
    pub const FIRST: Dir = Dir(1);

    /// Wrap a positive integer. Returns `None` for zero.
    #[must_use]
    pub fn new(n: u64) -> Option<Self> {
        (n > 0).then_some(Self(n))
    }

    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }

    /// The following directory number.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Allocation`] on overflow.
    pub fn next(self) -> Result<Self, BoardError> {
        self.0
            .checked_add(1)
            .map(Self)
            .ok_or_else(|| BoardError::Allocation("directory number space exhausted".to_string()))
    }

    /// Parse a container name. Only canonical positive decimals are
    /// accepted (`"7"`, not `"07"`, `"+7"`, `" 7"` or `"0"`), so every
    /// accepted name maps back to itself through `to_string`.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        if name.is_empty() || name.starts_with('0') || !name.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        name.parse::<u64>().ok().and_then(Self::new)
    }
}

impl fmt::Display for Dir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Dir {
    type Err = BoardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s.trim())
            .ok_or_else(|| BoardError::Validation(format!("invalid article number: {s:?}")))
    }
}

impl TryFrom<u64> for Dir {
    type Error = String;

    fn try_from(n: u64) -> Result<Self, Self::Error> {
        Self::new(n).ok_or_else(|| "article number must be positive".to_string())
    }
}

impl From<Dir> for u64 {
    fn from(dir: Dir) -> u64 {
        dir.0
    }
}

/// Wall-clock instant with whole-second precision, stored as
/// `YYYY-MM-DD HH:MM:SS` local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(NaiveDateTime);

impl Timestamp {
    #[must_use]
    pub fn now() -> Self {
        Self::from_naive(Local::now().naive_local())
    }

    /// Truncate to whole seconds.
    #[must_use]
    pub fn from_naive(t: NaiveDateTime) -> Self {
        Self(t.with_nanosecond(0).unwrap_or(t))
    }

    #[must_use]
    pub fn naive(self) -> NaiveDateTime {
        self.0
    }

    /// The current time, forced strictly past `previous`.
    ///
    /// Recency must grow on every mutation even when two happen within the
    /// same second or the clock steps backwards.
    #[must_use]
    pub fn now_after(previous: Timestamp) -> Self {
        let now = Self::now();
        if now > previous {
            now
        } else {
            Self(previous.0 + Duration::seconds(1))
        }
    }

    /// Parse the `YYYY-MM-DD HH:MM:SS` form.
    ///
    /// # Errors
    ///
    /// Returns [`BoardError::Serialization`] if the text does not match.
    pub fn parse(s: &str) -> Result<Self, BoardError> {
        NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
            .map(Self)
            .map_err(|e| BoardError::Serialization(format!("bad timestamp {s:?}: {e}")))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(TIMESTAMP_FORMAT))
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Timestamp::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// An article's identity and listing fields.
///
/// The same shape is persisted as the container sidecar (`metadata.json`)
/// and as the index row, so the index can always be rebuilt from sidecars.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub dir: Dir,
    pub subject: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Article {
    /// A freshly created article: both timestamps are `now`.
    #[must_use]
    pub fn new(dir: Dir, subject: impl Into<String>, now: Timestamp) -> Self {
        Self {
            dir,
            subject: subject.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Sidecar record. Identical to [`Article`]; the alias names the role.
pub type Sidecar = Article;

/// What the listing needs from each index row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListedArticle {
    pub dir: Dir,
    pub subject: String,
}
