use anyhow::Result;
use chrono::{DateTime, Utc};
use log::debug;
use rusqlite::{params, OptionalExtension, Row};

use crate::db::{
    connection::Database,
    helpers::{decode_record_time, encode_record_time, to_sql_error},
    models::{SessionRecord, SessionStatus},
};

fn row_to_session(row: &Row) -> Result<SessionRecord, rusqlite::Error> {
    let started_at: Option<String> = row.get("started_at")?;
    let last_seen: Option<String> = row.get("last_seen")?;
    let status: String = row.get("status")?;

    Ok(SessionRecord {
        session_id: row.get("session_id")?,
        started_at: decode_record_time(started_at, "started_at").map_err(to_sql_error)?,
        last_seen: decode_record_time(last_seen, "last_seen").map_err(to_sql_error)?,
        status: SessionStatus::parse(&status),
    })
}

impl Database {
    /// Every session in insertion order.
    pub async fn list_sessions(&self) -> Result<Vec<SessionRecord>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT session_id, started_at, last_seen, status
                 FROM sessions
                 ORDER BY rowid ASC",
            )?;

            let sessions = stmt
                .query_map([], row_to_session)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(sessions)
        })
        .await
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let session = conn
                .query_row(
                    "SELECT session_id, started_at, last_seen, status
                     FROM sessions
                     WHERE session_id = ?1",
                    params![session_id],
                    row_to_session,
                )
                .optional()?;
            Ok(session)
        })
        .await
    }

    /// Marks active sessions whose `last_seen` is more than `gap` before
    /// `now` as ended and returns their ids. Sessions without a readable
    /// `last_seen` are left alone.
    pub async fn end_stale_sessions(
        &self,
        now: DateTime<Utc>,
        gap: chrono::Duration,
    ) -> Result<Vec<String>> {
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            let active = {
                let mut stmt = tx.prepare(
                    "SELECT session_id, started_at, last_seen, status
                     FROM sessions
                     WHERE status = 'active'",
                )?;
                let rows = stmt
                    .query_map([], row_to_session)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            };

            let mut ended = Vec::new();
            for session in active {
                let Some(last_seen) = session.last_seen.as_ref().and_then(|t| t.instant()) else {
                    debug!("session {} has no readable last_seen", session.session_id);
                    continue;
                };
                if now.signed_duration_since(last_seen) <= gap {
                    continue;
                }
                tx.execute(
                    "UPDATE sessions
                     SET status = 'ended',
                         ended_at = ?1
                     WHERE session_id = ?2",
                    params![now.to_rfc3339(), session.session_id],
                )?;
                ended.push(session.session_id);
            }

            tx.commit()?;
            Ok(ended)
        })
        .await
    }

    /// Inserts or replaces a session row as given.
    pub async fn upsert_session(&self, session: &SessionRecord) -> Result<()> {
        let record = session.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO sessions (session_id, started_at, last_seen, status)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(session_id) DO UPDATE SET
                     started_at = excluded.started_at,
                     last_seen = excluded.last_seen,
                     status = excluded.status",
                params![
                    record.session_id,
                    encode_record_time(record.started_at.as_ref())?,
                    encode_record_time(record.last_seen.as_ref())?,
                    record.status.as_str(),
                ],
            )?;
            Ok(())
        })
        .await
    }
}
