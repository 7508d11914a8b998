use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, PoisonError,
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::alerts::{dispatch_episodes, AlertEpisode, AlertEvaluator, Notifier};
use crate::assignments::{thresholds_from_assignments, AssignmentSource};
use crate::db::{ProbeAssignment, SessionRecord};
use crate::error::{MonitorError, MonitorResult};
use crate::sensing::{normalize_raw, NormalizeContext, SampleFetcher, SampleStore, SensorSample};
use crate::sessions::{classify_liveness, SessionResolver, SessionStore};
use crate::settings::MonitorSettings;

use super::state::{DisplaySnapshot, StatusFlag, TickOutcome};

const ASSIGNMENT_TIMEOUT: Duration = Duration::from_secs(10);
const NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct PollerDeps {
    pub sessions: Arc<dyn SessionStore>,
    pub samples: Arc<dyn SampleStore>,
    pub assignments: Arc<dyn AssignmentSource>,
    pub notifier: Arc<dyn Notifier>,
}

struct AlertState {
    session_id: Option<String>,
    evaluator: AlertEvaluator,
}

/// Held from gathering through publishing; a second tick that cannot take
/// it is dropped.
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct Gathered {
    session: SessionRecord,
    samples: Vec<SensorSample>,
    assignments: Option<Vec<ProbeAssignment>>,
}

pub struct Poller {
    resolver: SessionResolver,
    fetcher: SampleFetcher,
    assignments: Arc<dyn AssignmentSource>,
    notifier: Arc<dyn Notifier>,
    sample_limit: usize,
    session_gap: chrono::Duration,
    in_flight: AtomicBool,
    cancel: CancellationToken,
    alerts: Mutex<AlertState>,
    snapshot_tx: watch::Sender<DisplaySnapshot>,
}

impl Poller {
    pub fn new(deps: PollerDeps, settings: &MonitorSettings) -> Self {
        let (snapshot_tx, _) = watch::channel(DisplaySnapshot::default());
        Self {
            resolver: SessionResolver::new(deps.sessions)
                .with_pinned(settings.session_override.clone()),
            fetcher: SampleFetcher::new(deps.samples),
            assignments: deps.assignments,
            notifier: deps.notifier,
            sample_limit: settings.sample_limit,
            session_gap: settings.session_gap(),
            in_flight: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            alerts: Mutex::new(AlertState {
                session_id: None,
                evaluator: AlertEvaluator::new(),
            }),
            snapshot_tx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<DisplaySnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn snapshot(&self) -> DisplaySnapshot {
        self.snapshot_tx.borrow().clone()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stops publishing for good. A tick in flight finishes without
    /// touching the snapshot.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub async fn tick(&self) -> TickOutcome {
        if self.cancel.is_cancelled() {
            return TickOutcome::Discarded;
        }
        let Some(guard) = InFlightGuard::acquire(&self.in_flight) else {
            debug!("poll tick skipped: previous tick still in flight");
            return TickOutcome::Skipped;
        };

        let gathered = tokio::select! {
            _ = self.cancel.cancelled() => return TickOutcome::Discarded,
            gathered = self.gather() => gathered,
        };
        if self.cancel.is_cancelled() {
            debug!("poller stopped mid-tick; discarding results");
            return TickOutcome::Discarded;
        }

        let raised = match gathered {
            Ok(gathered) => self.publish(gathered),
            Err(MonitorError::NotFound) => {
                debug!("no session recorded yet");
                self.flag(StatusFlag::NoSession);
                return TickOutcome::NoSession;
            }
            Err(err) => {
                if err.is_transient() {
                    warn!("poll tick failed: {err}");
                } else {
                    error!("poll tick failed: {err}");
                }
                self.flag(StatusFlag::Unavailable(err.to_string()));
                return TickOutcome::Failed;
            }
        };

        // Deliveries must not hold the in-flight guard.
        drop(guard);
        if !raised.is_empty() {
            let delivered =
                dispatch_episodes(self.notifier.as_ref(), &raised, NOTIFY_TIMEOUT).await;
            info!("raised {} alert(s), delivered {delivered}", raised.len());
        }
        TickOutcome::Published
    }

    async fn gather(&self) -> MonitorResult<Gathered> {
        let session = self.resolver.resolve_latest_session().await?;
        let raw = self
            .fetcher
            .fetch_samples(&session.session_id, self.sample_limit)
            .await?;

        let samples = normalize_raw(&raw, &NormalizeContext::for_record(&session));

        let assignments = match tokio::time::timeout(
            ASSIGNMENT_TIMEOUT,
            self.assignments.list_assignments(&session.session_id),
        )
        .await
        {
            Ok(Ok(assignments)) => Some(assignments),
            Ok(Err(err)) => {
                error!(
                    "failed to load probe assignments for {}; skipping alerts: {err:#}",
                    session.session_id
                );
                None
            }
            Err(_) => {
                error!(
                    "probe assignments for {} timed out after {ASSIGNMENT_TIMEOUT:?}; skipping alerts",
                    session.session_id
                );
                None
            }
        };

        Ok(Gathered {
            session,
            samples,
            assignments,
        })
    }

    fn publish(&self, gathered: Gathered) -> Vec<AlertEpisode> {
        let Gathered {
            session,
            samples,
            assignments,
        } = gathered;
        let now = Utc::now();

        let liveness = classify_liveness(
            samples.first().and_then(|sample| sample.timestamp.instant),
            now,
            self.session_gap,
        );
        let (raised, open_alerts) =
            self.evaluate_alerts(&session.session_id, samples.first(), assignments.as_deref(), now);

        debug!(
            "published {} samples for {} ({liveness:?})",
            samples.len(),
            session.session_id
        );
        self.snapshot_tx.send_replace(DisplaySnapshot {
            status: StatusFlag::Ok,
            session: Some(session),
            liveness: Some(liveness),
            samples,
            open_alerts,
            updated_at: Some(now),
        });
        raised
    }

    fn evaluate_alerts(
        &self,
        session_id: &str,
        latest: Option<&SensorSample>,
        assignments: Option<&[ProbeAssignment]>,
        now: DateTime<Utc>,
    ) -> (Vec<AlertEpisode>, Vec<AlertEpisode>) {
        let mut alerts = self.alerts.lock().unwrap_or_else(PoisonError::into_inner);
        if alerts.session_id.as_deref() != Some(session_id) {
            alerts.evaluator.reset();
            alerts.session_id = Some(session_id.to_string());
        }

        let raised = match (latest, assignments) {
            (Some(latest), Some(assignments)) => {
                let thresholds = thresholds_from_assignments(assignments);
                alerts.evaluator.evaluate(latest, &thresholds, now)
            }
            _ => Vec::new(),
        };
        (raised, alerts.evaluator.open_episodes())
    }

    fn flag(&self, status: StatusFlag) {
        self.snapshot_tx.send_modify(|snapshot| {
            snapshot.status = status;
            snapshot.updated_at = Some(Utc::now());
        });
    }
}
