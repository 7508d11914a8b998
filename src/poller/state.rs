use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::alerts::AlertEpisode;
use crate::db::SessionRecord;
use crate::sensing::SensorSample;
use crate::sessions::Liveness;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum PollerStatus {
    #[default]
    Idle,
    Polling,
    Stopped,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TickOutcome {
    /// Another tick was in flight; nothing was fetched.
    Skipped,
    Published,
    NoSession,
    Failed,
    /// The poller was stopped before the results could be applied.
    Discarded,
}

#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PollerState {
    pub status: PollerStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub ticks: u64,
    pub skipped_ticks: u64,
    pub last_outcome: Option<TickOutcome>,
    pub last_tick_at: Option<DateTime<Utc>>,
}

impl PollerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self, now: DateTime<Utc>) {
        *self = Self {
            status: PollerStatus::Polling,
            started_at: Some(now),
            ..Self::default()
        };
    }

    pub fn record_tick(&mut self, outcome: TickOutcome, now: DateTime<Utc>) {
        self.ticks = self.ticks.saturating_add(1);
        if outcome == TickOutcome::Skipped {
            self.skipped_ticks = self.skipped_ticks.saturating_add(1);
        }
        self.last_outcome = Some(outcome);
        self.last_tick_at = Some(now);
    }

    pub fn stop(&mut self, now: DateTime<Utc>) {
        self.status = PollerStatus::Stopped;
        self.stopped_at = Some(now);
    }
}

/// Non-fatal condition shown next to the last good data.
#[derive(Debug, Clone, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase", tag = "kind", content = "message")]
pub enum StatusFlag {
    #[default]
    Loading,
    Ok,
    NoSession,
    Unavailable(String),
}

#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DisplaySnapshot {
    pub status: StatusFlag,
    pub session: Option<SessionRecord>,
    pub liveness: Option<Liveness>,
    pub samples: Vec<SensorSample>,
    pub open_alerts: Vec<AlertEpisode>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl DisplaySnapshot {
    pub fn latest(&self) -> Option<&SensorSample> {
        self.samples.first()
    }
}
