use anyhow::Result;
use rusqlite::{params, Row};

use crate::db::{
    connection::Database,
    helpers::{parse_datetime, to_sql_error},
    models::ProbeAssignment,
};

fn row_to_assignment(row: &Row) -> Result<ProbeAssignment, rusqlite::Error> {
    let updated_at: String = row.get("updated_at")?;

    Ok(ProbeAssignment {
        session_id: row.get("session_id")?,
        probe_id: row.get("probe_id")?,
        item_type: row.get("item_type")?,
        item_weight: row.get("item_weight")?,
        min_alert: row.get("min_alert")?,
        max_alert: row.get("max_alert")?,
        mobile_number: row.get("mobile_number")?,
        updated_at: parse_datetime(&updated_at, "updated_at").map_err(to_sql_error)?,
    })
}

impl Database {
    /// One row per (session, probe); a later write replaces the earlier one.
    pub async fn upsert_assignment(&self, assignment: &ProbeAssignment) -> Result<()> {
        let record = assignment.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO probe_assignments (
                    session_id, probe_id, item_type, item_weight,
                    min_alert, max_alert, mobile_number, updated_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(session_id, probe_id) DO UPDATE SET
                     item_type = excluded.item_type,
                     item_weight = excluded.item_weight,
                     min_alert = excluded.min_alert,
                     max_alert = excluded.max_alert,
                     mobile_number = excluded.mobile_number,
                     updated_at = excluded.updated_at",
                params![
                    record.session_id,
                    record.probe_id,
                    record.item_type,
                    record.item_weight,
                    record.min_alert,
                    record.max_alert,
                    record.mobile_number,
                    record.updated_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn list_assignments(&self, session_id: &str) -> Result<Vec<ProbeAssignment>> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT session_id, probe_id, item_type, item_weight,
                        min_alert, max_alert, mobile_number, updated_at
                 FROM probe_assignments
                 WHERE session_id = ?1
                 ORDER BY probe_id ASC",
            )?;

            let assignments = stmt
                .query_map(params![session_id], row_to_assignment)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(assignments)
        })
        .await
    }
}
