use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::db::models::RecordTime;

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

/// Record times are stored as JSON so numbers and strings round-trip
/// distinctly.
pub fn encode_record_time(value: Option<&RecordTime>) -> Result<Option<String>> {
    value
        .map(|time| serde_json::to_string(time).context("failed to encode record time"))
        .transpose()
}

pub fn decode_record_time(value: Option<String>, field: &str) -> Result<Option<RecordTime>> {
    value
        .map(|raw| {
            serde_json::from_str(&raw).with_context(|| format!("failed to decode {field}"))
        })
        .transpose()
}

/// Adapts an `anyhow` failure for use inside a `rusqlite` row mapper.
pub fn to_sql_error(err: anyhow::Error) -> rusqlite::Error {
    rusqlite::Error::ToSqlConversionFailure(Box::new(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        err.to_string(),
    )))
}
