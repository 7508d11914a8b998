//! Probe assignment data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What is on a probe and when to alert about it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProbeAssignment {
    pub session_id: String,
    pub probe_id: String,
    pub item_type: String,
    pub item_weight: Option<f64>,
    pub min_alert: Option<f64>,
    pub max_alert: Option<f64>,
    pub mobile_number: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl ProbeAssignment {
    pub fn has_thresholds(&self) -> bool {
        self.min_alert.is_some() || self.max_alert.is_some()
    }
}
