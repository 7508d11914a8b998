//! Sample timestamp parsing.
//!
//! Accepted encodings, tried in order:
//! 1. compact ISO `YYYYMMDDTHHMMSSZ`
//! 2. bare epoch, 10 digits (seconds) or 13 digits (milliseconds)
//! 3. `HHMMSS`, anchored on the session's date
//! 4. anything `chrono` can read as a date/time (RFC 3339 and a few naive forms)
//!
//! Values matching none of these keep their verbatim text and order by it.

use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const COMPACT_ISO: &str = "%Y%m%dT%H%M%SZ";

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y%m%d%H%M%S",
    "%Y/%m/%d %H:%M:%S",
];

/// A sample's timestamp: the text it arrived with plus the instant it names,
/// when one could be determined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleTime {
    pub raw: String,
    pub instant: Option<DateTime<Utc>>,
}

impl SampleTime {
    pub fn parse(raw: &str, anchor: Option<NaiveDate>) -> Self {
        let raw = raw.trim();
        Self {
            raw: raw.to_string(),
            instant: parse_instant(raw, anchor),
        }
    }

    pub fn from_json(value: Option<&Value>, anchor: Option<NaiveDate>) -> Self {
        match value {
            Some(Value::String(text)) => Self::parse(text, anchor),
            Some(Value::Number(number)) => {
                let text = match (number.as_i64(), number.as_f64()) {
                    (Some(whole), _) => whole.to_string(),
                    (None, Some(float)) if float.is_finite() => (float.trunc() as i64).to_string(),
                    _ => number.to_string(),
                };
                Self::parse(&text, anchor)
            }
            _ => Self::missing(),
        }
    }

    pub fn missing() -> Self {
        Self {
            raw: String::new(),
            instant: None,
        }
    }

    pub fn is_missing(&self) -> bool {
        self.raw.is_empty() && self.instant.is_none()
    }

    /// Identity used when merging duplicate samples. Missing timestamps never
    /// merge with anything.
    pub fn dedup_key(&self) -> Option<DedupKey> {
        match (&self.instant, self.is_missing()) {
            (Some(instant), _) => Some(DedupKey::Instant(*instant)),
            (None, false) => Some(DedupKey::Verbatim(self.raw.clone())),
            (None, true) => None,
        }
    }

    /// Newest first: parsed instants descending, then unparseable text
    /// descending, then missing timestamps.
    pub fn cmp_newest_first(&self, other: &Self) -> Ordering {
        match (&self.instant, &other.instant) {
            (Some(a), Some(b)) => b.cmp(a),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => match (self.is_missing(), other.is_missing()) {
                (false, false) => other.raw.cmp(&self.raw),
                (false, true) => Ordering::Less,
                (true, false) => Ordering::Greater,
                (true, true) => Ordering::Equal,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DedupKey {
    Instant(DateTime<Utc>),
    Verbatim(String),
}

pub fn parse_instant(raw: &str, anchor: Option<NaiveDate>) -> Option<DateTime<Utc>> {
    if raw.is_empty() {
        return None;
    }
    parse_compact_iso(raw)
        .or_else(|| parse_epoch(raw))
        .or_else(|| parse_time_of_day(raw, anchor))
        .or_else(|| parse_generic(raw))
}

/// Session ids start with `YYYYMMDD`; that prefix dates `HHMMSS` samples.
pub fn anchor_from_session_id(session_id: &str) -> Option<NaiveDate> {
    let prefix = session_id.get(..8)?;
    if !prefix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveDate::parse_from_str(prefix, "%Y%m%d").ok()
}

fn parse_compact_iso(raw: &str) -> Option<DateTime<Utc>> {
    let bytes = raw.as_bytes();
    if bytes.len() != 16 || bytes[8] != b'T' || bytes[15] != b'Z' {
        return None;
    }
    NaiveDateTime::parse_from_str(raw, COMPACT_ISO)
        .ok()
        .map(|naive| naive.and_utc())
}

fn parse_epoch(raw: &str) -> Option<DateTime<Utc>> {
    if !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let value: i64 = raw.parse().ok()?;
    match raw.len() {
        10 => Utc.timestamp_opt(value, 0).single(),
        13 => Utc.timestamp_millis_opt(value).single(),
        _ => None,
    }
}

fn parse_time_of_day(raw: &str, anchor: Option<NaiveDate>) -> Option<DateTime<Utc>> {
    if raw.len() != 6 || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let date = anchor?;
    let time = NaiveTime::parse_from_str(raw, "%H%M%S").ok()?;
    Some(date.and_time(time).and_utc())
}

fn parse_generic(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = DateTime::parse_from_rfc2822(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
