use std::collections::HashMap;

use chrono::NaiveDate;

use crate::db::{RecordTime, SessionRecord};

use super::sample::{RawSample, SensorSample};
use super::timestamp::{anchor_from_session_id, DedupKey};

/// Per-session inputs the normalizer needs to interpret raw records.
#[derive(Debug, Clone, Default)]
pub struct NormalizeContext {
    pub session_id: String,
    /// Date that anchors bare `HHMMSS` timestamps.
    pub anchor: Option<NaiveDate>,
}

impl NormalizeContext {
    /// Anchors on the session id's `YYYYMMDD` prefix, falling back to the
    /// session's start date.
    pub fn for_session(session_id: &str, started_on: Option<NaiveDate>) -> Self {
        Self {
            session_id: session_id.to_string(),
            anchor: anchor_from_session_id(session_id).or(started_on),
        }
    }

    pub fn for_record(session: &SessionRecord) -> Self {
        let started_on = session
            .started_at
            .as_ref()
            .and_then(RecordTime::instant)
            .map(|at| at.date_naive());
        Self::for_session(&session.session_id, started_on)
    }
}

/// Converts raw records and normalizes them in one pass.
pub fn normalize_raw(raw: &[RawSample], ctx: &NormalizeContext) -> Vec<SensorSample> {
    let samples = raw
        .iter()
        .map(|record| SensorSample::from_raw(record, &ctx.session_id, ctx.anchor))
        .collect();
    normalize(samples)
}

/// Merges duplicates, re-applies the sentinel policy and sorts newest first.
///
/// Samples naming the same instant collapse into the earliest one in scan
/// order; channels it lacks data for are filled from the later duplicates.
/// Ties in the sort keep scan order. Running this on its own output returns
/// the same sequence.
pub fn normalize(samples: Vec<SensorSample>) -> Vec<SensorSample> {
    let mut merged: Vec<(usize, SensorSample)> = Vec::with_capacity(samples.len());
    let mut slots: HashMap<DedupKey, usize> = HashMap::new();

    for (index, mut sample) in samples.into_iter().enumerate() {
        for reading in sample.channels.values_mut() {
            *reading = reading.sanitized();
        }

        let Some(key) = sample.timestamp.dedup_key() else {
            merged.push((index, sample));
            continue;
        };

        match slots.get(&key) {
            Some(&slot) => fill_gaps(&mut merged[slot].1, sample),
            None => {
                slots.insert(key, merged.len());
                merged.push((index, sample));
            }
        }
    }

    merged.sort_by(|(ia, a), (ib, b)| {
        a.timestamp
            .cmp_newest_first(&b.timestamp)
            .then(ia.cmp(ib))
    });
    merged.into_iter().map(|(_, sample)| sample).collect()
}

fn fill_gaps(primary: &mut SensorSample, duplicate: SensorSample) {
    for (channel, reading) in duplicate.channels {
        let slot = primary.channels.entry(channel).or_insert(reading);
        if !slot.has_data() && reading.has_data() {
            *slot = reading;
        }
    }
}
