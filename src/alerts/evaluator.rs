//! Threshold breach detection with per-episode de-duplication.
//!
//! An episode opens the first time a probe reading crosses one of its
//! thresholds and stays open while the breach persists, so a steady breach
//! notifies once rather than on every poll. It closes when the reading comes
//! back within bounds or the threshold is cleared or changed.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::display::format_number;
use crate::sensing::{Reading, SensorSample};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BreachKind {
    BelowMin,
    AboveMax,
}

impl BreachKind {
    const ALL: [BreachKind; 2] = [BreachKind::BelowMin, BreachKind::AboveMax];

    fn limit(self, thresholds: &ProbeThresholds) -> Option<f64> {
        match self {
            BreachKind::BelowMin => thresholds.min_alert,
            BreachKind::AboveMax => thresholds.max_alert,
        }
    }

    fn is_breached(self, reading: f64, limit: f64) -> bool {
        match self {
            BreachKind::BelowMin => reading < limit,
            BreachKind::AboveMax => reading > limit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProbeThresholds {
    pub name: String,
    pub min_alert: Option<f64>,
    pub max_alert: Option<f64>,
    pub mobile_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertEpisode {
    pub id: Uuid,
    pub probe_id: String,
    pub probe_name: String,
    pub kind: BreachKind,
    pub threshold: f64,
    pub reading: f64,
    pub first_breach_at: DateTime<Utc>,
    pub destination: Option<String>,
}

impl AlertEpisode {
    pub fn message(&self) -> String {
        let reading = format_number(self.reading);
        let threshold = format_number(self.threshold);
        match self.kind {
            BreachKind::BelowMin => format!(
                "Alert for {}: Temperature {reading} is below the minimum threshold of {threshold}.",
                self.probe_name
            ),
            BreachKind::AboveMax => format!(
                "Alert for {}: Temperature {reading} exceeds the maximum threshold of {threshold}.",
                self.probe_name
            ),
        }
    }
}

#[derive(Debug, Default)]
pub struct AlertEvaluator {
    open: HashMap<(String, BreachKind), AlertEpisode>,
}

impl AlertEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn evaluate(
        &mut self,
        latest: &SensorSample,
        thresholds: &BTreeMap<String, ProbeThresholds>,
        now: DateTime<Utc>,
    ) -> Vec<AlertEpisode> {
        self.open.retain(|(probe_id, kind), episode| {
            thresholds
                .get(probe_id)
                .and_then(|config| kind.limit(config))
                .is_some_and(|limit| limit == episode.threshold)
        });

        let observed_at = latest.timestamp.instant.unwrap_or(now);
        let mut raised = Vec::new();

        for (probe_id, config) in thresholds {
            let Reading::Value(reading) = latest.reading(probe_id) else {
                continue;
            };

            for kind in BreachKind::ALL {
                let Some(limit) = kind.limit(config) else {
                    continue;
                };
                let key = (probe_id.clone(), kind);

                if !kind.is_breached(reading, limit) {
                    self.open.remove(&key);
                    continue;
                }
                if self.open.contains_key(&key) {
                    continue;
                }

                let episode = AlertEpisode {
                    id: Uuid::new_v4(),
                    probe_id: probe_id.clone(),
                    probe_name: config.name.clone(),
                    kind,
                    threshold: limit,
                    reading,
                    first_breach_at: observed_at,
                    destination: config.mobile_number.clone(),
                };
                self.open.insert(key, episode.clone());
                raised.push(episode);
            }
        }

        raised
    }

    pub fn open_episodes(&self) -> Vec<AlertEpisode> {
        let mut episodes: Vec<_> = self.open.values().cloned().collect();
        episodes.sort_by(|a, b| a.probe_id.cmp(&b.probe_id).then(a.first_breach_at.cmp(&b.first_breach_at)));
        episodes
    }

    /// Forgets every open episode, e.g. when polling moves to a new session.
    pub fn reset(&mut self) {
        self.open.clear();
    }
}
