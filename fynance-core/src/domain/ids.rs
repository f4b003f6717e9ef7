//! Entity identifiers and timestamps

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::result::{Error, Result};

/// Identifier shared by every persisted entity
///
/// Backed by a UUIDv7, so ids generated later compare greater, both as
/// values and in their hyphenated text form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(Uuid);

impl EntityId {
    /// Generate a fresh time-ordered id
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Parse a hyphenated (or simple) UUID string
    pub fn parse(s: &str) -> Result<Self> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| Error::validation(format!("invalid id '{}'", s)))
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for EntityId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Current time at the precision timestamps are persisted with (microseconds)
pub fn timestamp_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Fixed-width RFC 3339 text, sorts chronologically as a string
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::validation(format!("invalid timestamp '{}': {}", s, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_ids_are_time_ordered() {
        let first = EntityId::new();
        thread::sleep(Duration::from_millis(2));
        let second = EntityId::new();

        assert!(first < second);
        assert!(first.to_string() < second.to_string());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let err = EntityId::parse("not-an-id").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let id = EntityId::new();
        assert_eq!(EntityId::parse(&id.to_string()).unwrap(), id);
    }

    #[test]
    fn test_timestamp_text_is_stable() {
        let now = timestamp_now();
        let text = format_timestamp(&now);
        assert!(text.ends_with('Z'));
        assert_eq!(parse_timestamp(&text).unwrap(), now);
    }
}
