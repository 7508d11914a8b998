//! Sensor sample shapes: the raw record as stored, and the normalized form
//! every consumer works with.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::channels::{canonical_key, RESERVED_FIELDS};
use super::timestamp::SampleTime;

/// Placeholder firmware writes when a channel is not reporting.
pub const SENTINEL: f64 = -999.0;

/// One channel reading after sanitization. Gaps stay gaps; they are never
/// rendered or compared as zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "Option<f64>", into = "Option<f64>")]
pub enum Reading {
    Value(f64),
    NoData,
}

impl Reading {
    pub fn from_number(value: f64) -> Self {
        if !value.is_finite() || value == SENTINEL {
            Reading::NoData
        } else {
            Reading::Value(value)
        }
    }

    /// Interprets one JSON field. `None` means the field is not a channel
    /// (text, flags, nested objects).
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(Reading::NoData),
            Value::Number(number) => Some(number.as_f64().map_or(Reading::NoData, Self::from_number)),
            Value::String(text) => text.trim().parse::<f64>().ok().map(Self::from_number),
            _ => None,
        }
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            Reading::Value(v) => Some(*v),
            Reading::NoData => None,
        }
    }

    pub fn has_data(&self) -> bool {
        matches!(self, Reading::Value(_))
    }

    /// Re-applies the sentinel policy; a no-op on already clean readings.
    pub fn sanitized(self) -> Self {
        match self {
            Reading::Value(v) => Self::from_number(v),
            Reading::NoData => Reading::NoData,
        }
    }
}

impl From<Option<f64>> for Reading {
    fn from(value: Option<f64>) -> Self {
        value.map_or(Reading::NoData, Reading::from_number)
    }
}

impl From<Reading> for Option<f64> {
    fn from(reading: Reading) -> Self {
        reading.value()
    }
}

/// A sample record exactly as ingestion stored it. Only `timestamp` is
/// lifted out; every other field stays in `fields`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Value>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl RawSample {
    /// The session id as text. Some producers write it as a number.
    pub fn session_key(&self) -> Option<String> {
        match self.session_id.as_ref()? {
            Value::String(text) => Some(text.trim().to_string()),
            Value::Number(number) => Some(number.to_string()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorSample {
    pub session_id: String,
    pub timestamp: SampleTime,
    pub channels: BTreeMap<String, Reading>,
}

impl SensorSample {
    /// `fallback_session` fills in records stored without their session id.
    pub fn from_raw(raw: &RawSample, fallback_session: &str, anchor: Option<NaiveDate>) -> Self {
        let mut channels = BTreeMap::new();
        for (key, value) in &raw.fields {
            if RESERVED_FIELDS.contains(&key.as_str()) {
                continue;
            }
            let Some(reading) = Reading::from_json(value) else {
                continue;
            };
            let canonical = canonical_key(key);
            // The canonical key wins over a legacy alias when both are present.
            if canonical != key && channels.contains_key(canonical) {
                continue;
            }
            channels.insert(canonical.to_string(), reading);
        }

        Self {
            session_id: raw
                .session_key()
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| fallback_session.to_string()),
            timestamp: SampleTime::from_json(raw.timestamp.as_ref(), anchor),
            channels,
        }
    }

    pub fn reading(&self, channel: &str) -> Reading {
        self.channels.get(channel).copied().unwrap_or(Reading::NoData)
    }

    pub fn value(&self, channel: &str) -> Option<f64> {
        self.reading(channel).value()
    }
}
