use std::{cmp::Ordering, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use serde::Serialize;

use crate::db::{Database, RecordTime, SessionRecord};
use crate::error::{MonitorError, MonitorResult};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Read side of the session table. Implementations return every session;
/// there is no "latest" index to lean on.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn list_sessions(&self) -> anyhow::Result<Vec<SessionRecord>>;
}

#[async_trait]
impl SessionStore for Database {
    async fn list_sessions(&self) -> anyhow::Result<Vec<SessionRecord>> {
        Database::list_sessions(self).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Liveness {
    Active,
    Stale,
}

pub struct SessionResolver {
    store: Arc<dyn SessionStore>,
    pinned: Option<String>,
    request_timeout: Duration,
}

impl SessionResolver {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            store,
            pinned: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Always resolve to `session_id` without consulting the store.
    pub fn with_pinned(mut self, session_id: Option<String>) -> Self {
        self.pinned = session_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub async fn resolve_latest_session(&self) -> MonitorResult<SessionRecord> {
        if let Some(session_id) = &self.pinned {
            return Ok(SessionRecord::pinned(session_id));
        }

        let sessions = tokio::time::timeout(self.request_timeout, self.store.list_sessions())
            .await
            .map_err(|_| {
                MonitorError::ResolverUnavailable(format!(
                    "session scan timed out after {:?}",
                    self.request_timeout
                ))
            })?
            .map_err(|err| MonitorError::ResolverUnavailable(format!("{err:#}")))?;

        let count = sessions.len();
        let latest = select_latest(sessions).ok_or(MonitorError::NotFound)?;
        debug!(
            "resolved session {} out of {} candidates",
            latest.session_id, count
        );
        Ok(latest)
    }
}

/// The session with the greatest `last_seen`. Equal values keep the one
/// seen first; sessions without a `last_seen` rank below all others.
pub fn select_latest(sessions: Vec<SessionRecord>) -> Option<SessionRecord> {
    let mut latest: Option<SessionRecord> = None;
    for session in sessions {
        if session.session_id.trim().is_empty() {
            continue;
        }
        let newer = match &latest {
            None => true,
            Some(current) => {
                cmp_last_seen(session.last_seen.as_ref(), current.last_seen.as_ref())
                    == Ordering::Greater
            }
        };
        if newer {
            latest = Some(session);
        }
    }
    latest
}

fn cmp_last_seen(a: Option<&RecordTime>, b: Option<&RecordTime>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp_recency(b),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => Ordering::Equal,
    }
}

/// A session is active while its newest sample is within `gap` of `now`.
/// Without a dated sample there is nothing to vouch for it.
pub fn classify_liveness(
    newest_sample: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    gap: chrono::Duration,
) -> Liveness {
    match newest_sample {
        Some(at) if now.signed_duration_since(at) <= gap => Liveness::Active,
        _ => Liveness::Stale,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SessionStatus;
    use anyhow::anyhow;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    struct FixedStore {
        sessions: Vec<SessionRecord>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SessionStore for FixedStore {
        async fn list_sessions(&self) -> anyhow::Result<Vec<SessionRecord>> {
            self.calls.fetch_add(1, AtomicOrdering::SeqCst);
            Ok(self.sessions.clone())
        }
    }

    struct DownStore;

    #[async_trait]
    impl SessionStore for DownStore {
        async fn list_sessions(&self) -> anyhow::Result<Vec<SessionRecord>> {
            Err(anyhow!("connection refused"))
        }
    }

    fn session(id: &str, last_seen: Option<RecordTime>) -> SessionRecord {
        SessionRecord {
            session_id: id.into(),
            started_at: None,
            last_seen,
            status: SessionStatus::Active,
        }
    }

    fn fixed(sessions: Vec<SessionRecord>) -> Arc<FixedStore> {
        Arc::new(FixedStore {
            sessions,
            calls: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn picks_max_last_seen() {
        let store = fixed(vec![
            session("a", Some(RecordTime::Text("2025-01-01T10:00:00Z".into()))),
            session("b", Some(RecordTime::Text("2025-01-01T12:00:00Z".into()))),
            session("c", Some(RecordTime::Text("2025-01-01T11:00:00Z".into()))),
            session("d", None),
        ]);
        let resolver = SessionResolver::new(store);

        let latest = resolver.resolve_latest_session().await.unwrap();
        assert_eq!(latest.session_id, "b");
    }

    #[tokio::test]
    async fn empty_collection_is_not_found() {
        let resolver = SessionResolver::new(fixed(Vec::new()));
        assert_eq!(
            resolver.resolve_latest_session().await,
            Err(MonitorError::NotFound)
        );
    }

    #[tokio::test]
    async fn store_failure_is_resolver_unavailable() {
        let resolver = SessionResolver::new(Arc::new(DownStore));
        let err = resolver.resolve_latest_session().await.unwrap_err();
        assert!(matches!(err, MonitorError::ResolverUnavailable(msg) if msg.contains("refused")));
    }

    #[tokio::test]
    async fn pinned_session_skips_the_store() {
        let store = fixed(vec![session("a", None)]);
        let resolver =
            SessionResolver::new(store.clone()).with_pinned(Some(" 20250101 ".into()));

        let latest = resolver.resolve_latest_session().await.unwrap();
        assert_eq!(latest.session_id, "20250101");
        assert_eq!(store.calls.load(AtomicOrdering::SeqCst), 0);
    }

    #[test]
    fn ties_keep_scan_order() {
        let picked = select_latest(vec![
            session("first", Some(RecordTime::Epoch(1_735_732_800))),
            session("second", Some(RecordTime::Epoch(1_735_732_800))),
        ])
        .unwrap();
        assert_eq!(picked.session_id, "first");
    }

    #[test]
    fn numeric_and_text_last_seen_compare_as_instants() {
        let picked = select_latest(vec![
            session("epoch", Some(RecordTime::Epoch(1_735_732_800))),
            session("iso", Some(RecordTime::Text("2025-01-01T11:59:59Z".into()))),
            session("millis", Some(RecordTime::Epoch(1_735_732_801_000))),
        ])
        .unwrap();
        assert_eq!(picked.session_id, "millis");
    }

    #[test]
    fn blank_ids_are_ignored() {
        assert!(select_latest(vec![session("  ", Some(RecordTime::Epoch(1)))]).is_none());
    }

    #[test]
    fn liveness_window() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 12, 30, 0).unwrap();
        let gap = chrono::Duration::minutes(30);

        assert_eq!(
            classify_liveness(Some(now - chrono::Duration::minutes(30)), now, gap),
            Liveness::Active
        );
        assert_eq!(
            classify_liveness(Some(now - chrono::Duration::minutes(31)), now, gap),
            Liveness::Stale
        );
        assert_eq!(classify_liveness(None, now, gap), Liveness::Stale);
    }
}
