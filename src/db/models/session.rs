//! Session records as the ingestion side writes them.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::sensing::timestamp::parse_instant;

/// Epoch values at or above this are milliseconds.
const EPOCH_MILLIS_FLOOR: i64 = 100_000_000_000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    Active,
    Ended,
    #[default]
    Unknown,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Ended => "ended",
            SessionStatus::Unknown => "unknown",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "active" => SessionStatus::Active,
            "ended" => SessionStatus::Ended,
            _ => SessionStatus::Unknown,
        }
    }
}

/// A stored point in time in whichever encoding its producer used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordTime {
    Epoch(i64),
    Text(String),
}

impl RecordTime {
    pub fn instant(&self) -> Option<DateTime<Utc>> {
        match self {
            RecordTime::Epoch(value) if *value >= EPOCH_MILLIS_FLOOR => {
                DateTime::from_timestamp_millis(*value)
            }
            RecordTime::Epoch(value) => DateTime::from_timestamp(*value, 0),
            RecordTime::Text(text) => parse_instant(text.trim(), None),
        }
    }

    /// Recency ordering: instants when both sides resolve to one, otherwise
    /// plain text comparison, with unresolvable values ranking older than
    /// resolvable ones.
    pub fn cmp_recency(&self, other: &Self) -> Ordering {
        match (self.instant(), other.instant()) {
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (None, None) => self.as_text().cmp(&other.as_text()),
        }
    }

    pub fn as_text(&self) -> String {
        match self {
            RecordTime::Epoch(value) => value.to_string(),
            RecordTime::Text(text) => text.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub session_id: String,
    pub started_at: Option<RecordTime>,
    pub last_seen: Option<RecordTime>,
    pub status: SessionStatus,
}

impl SessionRecord {
    /// Placeholder for a session pinned by configuration rather than read
    /// from the store.
    pub fn pinned(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            started_at: None,
            last_seen: None,
            status: SessionStatus::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_units() {
        let secs = RecordTime::Epoch(1_735_732_800);
        let millis = RecordTime::Epoch(1_735_732_800_000);
        assert_eq!(secs.instant(), millis.instant());
        assert_eq!(secs.cmp_recency(&millis), Ordering::Equal);
    }

    #[test]
    fn text_against_epoch() {
        let iso = RecordTime::Text("2025-01-01T12:00:01Z".into());
        let epoch = RecordTime::Epoch(1_735_732_800);
        assert_eq!(iso.cmp_recency(&epoch), Ordering::Greater);

        let junk = RecordTime::Text("yesterday".into());
        assert_eq!(junk.cmp_recency(&epoch), Ordering::Less);
    }

    #[test]
    fn untagged_json() {
        let parsed: Vec<RecordTime> =
            serde_json::from_str(r#"[1735732800, "2025-01-01T12:00:00Z"]"#).unwrap();
        assert_eq!(parsed[0], RecordTime::Epoch(1_735_732_800));
        assert_eq!(parsed[1], RecordTime::Text("2025-01-01T12:00:00Z".into()));
    }

    #[test]
    fn status_parsing_is_lenient() {
        assert_eq!(SessionStatus::parse("ACTIVE"), SessionStatus::Active);
        assert_eq!(SessionStatus::parse("ended"), SessionStatus::Ended);
        assert_eq!(SessionStatus::parse("stale"), SessionStatus::Unknown);
    }
}
