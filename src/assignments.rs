//! Probe assignments: what is on each probe and its alert thresholds.

use std::collections::BTreeMap;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::alerts::ProbeThresholds;
use crate::db::{Database, ProbeAssignment};
use crate::error::{MonitorError, MonitorResult};
use crate::sensing::channels::probe_label;

#[async_trait]
pub trait AssignmentSource: Send + Sync {
    async fn list_assignments(&self, session_id: &str) -> anyhow::Result<Vec<ProbeAssignment>>;
}

#[async_trait]
impl AssignmentSource for Database {
    async fn list_assignments(&self, session_id: &str) -> anyhow::Result<Vec<ProbeAssignment>> {
        Database::list_assignments(self, session_id).await
    }
}

/// An assignment as submitted by a client. Numbers may arrive as strings and
/// blank strings mean "not set".
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AssignmentInput {
    #[serde(alias = "session_id")]
    pub session_id: Option<Value>,
    #[serde(alias = "probe_id")]
    pub probe_id: Option<Value>,
    #[serde(alias = "item_type")]
    pub item_type: Option<String>,
    #[serde(alias = "weight", alias = "item_weight")]
    pub item_weight: Option<Value>,
    #[serde(alias = "min_alert")]
    pub min_alert: Option<Value>,
    #[serde(alias = "max_alert")]
    pub max_alert: Option<Value>,
    #[serde(alias = "mobile_number")]
    pub mobile_number: Option<Value>,
}

impl AssignmentInput {
    pub fn validate(&self, now: DateTime<Utc>) -> MonitorResult<ProbeAssignment> {
        let session_id = required_text(self.session_id.as_ref(), "sessionId")?;
        let probe_id = required_text(self.probe_id.as_ref(), "probeId")?;

        let min_alert = optional_number(self.min_alert.as_ref(), "minAlert")?;
        let max_alert = optional_number(self.max_alert.as_ref(), "maxAlert")?;
        if let (Some(min), Some(max)) = (min_alert, max_alert) {
            if min > max {
                return Err(MonitorError::InvalidArgument(format!(
                    "minAlert {min} is above maxAlert {max}"
                )));
            }
        }

        Ok(ProbeAssignment {
            session_id,
            probe_id,
            item_type: self.item_type.as_deref().unwrap_or_default().trim().to_string(),
            item_weight: optional_number(self.item_weight.as_ref(), "itemWeight")?,
            min_alert,
            max_alert,
            mobile_number: optional_text(self.mobile_number.as_ref()),
            updated_at: now,
        })
    }
}

fn optional_text(value: Option<&Value>) -> Option<String> {
    let text = match value? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn required_text(value: Option<&Value>, field: &str) -> MonitorResult<String> {
    optional_text(value).ok_or_else(|| MonitorError::InvalidArgument(format!("{field} is required")))
}

fn optional_number(value: Option<&Value>, field: &str) -> MonitorResult<Option<f64>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_f64()),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(Some)
            .ok_or_else(|| MonitorError::InvalidArgument(format!("{field} is not a number: {s}"))),
        Some(other) => Err(MonitorError::InvalidArgument(format!(
            "{field} is not a number: {other}"
        ))),
    }
}

/// Validates `input` and stores it, replacing any earlier assignment of the
/// same probe in the same session.
pub async fn save_assignment(
    db: &Database,
    input: &AssignmentInput,
    now: DateTime<Utc>,
) -> anyhow::Result<ProbeAssignment> {
    let assignment = input.validate(now)?;
    db.upsert_assignment(&assignment)
        .await
        .context("failed to store probe assignment")?;
    Ok(assignment)
}

pub fn thresholds_from_assignments(
    assignments: &[ProbeAssignment],
) -> BTreeMap<String, ProbeThresholds> {
    assignments
        .iter()
        .filter(|assignment| assignment.has_thresholds())
        .map(|assignment| {
            let label = probe_label(&assignment.probe_id);
            let name = if assignment.item_type.is_empty() {
                label
            } else {
                format!("{label} ({})", assignment.item_type)
            };
            (
                assignment.probe_id.clone(),
                ProbeThresholds {
                    name,
                    min_alert: assignment.min_alert,
                    max_alert: assignment.max_alert,
                    mobile_number: assignment.mobile_number.clone(),
                },
            )
        })
        .collect()
}
