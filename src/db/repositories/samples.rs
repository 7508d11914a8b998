use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::params;

use crate::db::{connection::Database, helpers::encode_record_time, models::RecordTime};
use crate::sensing::sample::RawSample;

/// Session ids start with `YYYYMMDDHHMMSS`.
fn start_from_session_id(session_id: &str) -> Option<i64> {
    let prefix = session_id.get(..14)?;
    NaiveDateTime::parse_from_str(prefix, "%Y%m%d%H%M%S")
        .ok()
        .map(|naive| naive.and_utc().timestamp())
}

impl Database {
    /// Ingestion path: stores one raw sample and marks its session active.
    ///
    /// `started_at` is only set when the session is new; `last_seen` always
    /// moves to `received_at`.
    pub async fn record_sample(&self, sample: &RawSample, received_at: DateTime<Utc>) -> Result<i64> {
        let session_id = sample
            .session_key()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| anyhow!("sample has no session_id"))?;
        let payload = serde_json::to_string(sample).context("failed to encode sample payload")?;
        let started_at = RecordTime::Epoch(
            start_from_session_id(&session_id).unwrap_or_else(|| received_at.timestamp()),
        );
        let last_seen = RecordTime::Epoch(received_at.timestamp());

        self.execute(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO sensor_samples (session_id, payload, received_at)
                 VALUES (?1, ?2, ?3)",
                params![session_id, payload, received_at.to_rfc3339()],
            )
            .context("failed to insert sensor sample")?;
            let id = tx.last_insert_rowid();

            tx.execute(
                "INSERT INTO sessions (session_id, started_at, last_seen, status)
                 VALUES (?1, ?2, ?3, 'active')
                 ON CONFLICT(session_id) DO UPDATE SET
                     started_at = COALESCE(sessions.started_at, excluded.started_at),
                     last_seen = excluded.last_seen,
                     status = 'active',
                     ended_at = NULL",
                params![
                    session_id,
                    encode_record_time(Some(&started_at))?,
                    encode_record_time(Some(&last_seen))?,
                ],
            )
            .context("failed to upsert session heartbeat")?;

            tx.commit()?;
            Ok(id)
        })
        .await
    }

    /// Up to `limit` samples for a session, most recently received first.
    pub async fn query_samples(&self, session_id: &str, limit: usize) -> Result<Vec<RawSample>> {
        let session_id = session_id.to_string();
        let limit = i64::try_from(limit).map_err(|_| anyhow!("limit {limit} out of range"))?;
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT payload
                 FROM sensor_samples
                 WHERE session_id = ?1
                 ORDER BY id DESC
                 LIMIT ?2",
            )?;

            let payloads = stmt
                .query_map(params![session_id, limit], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;

            payloads
                .iter()
                .map(|payload| {
                    serde_json::from_str(payload).context("failed to decode stored sample")
                })
                .collect()
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::SessionStatus;
    use chrono::TimeZone;
    use serde_json::json;

    fn raw(value: serde_json::Value) -> RawSample {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn records_and_queries_newest_first() {
        let db = Database::open_in_memory().unwrap();
        let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();

        for (i, ts) in ["120000", "120005", "120010"].iter().enumerate() {
            db.record_sample(
                &raw(json!({"session_id": "20250101115500", "timestamp": ts, "top_temp": i})),
                t0 + chrono::Duration::seconds(i as i64 * 5),
            )
            .await
            .unwrap();
        }

        let samples = db.query_samples("20250101115500", 2).await.unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].timestamp, Some(json!("120010")));
        assert_eq!(samples[1].timestamp, Some(json!("120005")));

        let session = db.get_session("20250101115500").await.unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Active);
        assert_eq!(
            session.started_at,
            Some(RecordTime::Epoch(Utc.with_ymd_and_hms(2025, 1, 1, 11, 55, 0).unwrap().timestamp()))
        );
        assert_eq!(session.last_seen, Some(RecordTime::Epoch(t0.timestamp() + 10)));
    }

    #[tokio::test]
    async fn rejects_samples_without_session() {
        let db = Database::open_in_memory().unwrap();
        let result = db
            .record_sample(&raw(json!({"top_temp": 200})), Utc::now())
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn unknown_session_has_no_samples() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.query_samples("ghost", 10).await.unwrap().is_empty());
    }
}
