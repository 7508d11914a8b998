use anyhow::{bail, Context, Result};
use log::info;
use rusqlite::Connection;

/// Schema steps in ascending `user_version` order.
const MIGRATIONS: &[(i32, &str)] = &[
    (1, include_str!("schemas/schema_v1.sql")),
    (2, include_str!("schemas/schema_v2.sql")),
    (3, include_str!("schemas/schema_v3.sql")),
];

fn latest_version() -> i32 {
    MIGRATIONS.last().map_or(0, |(version, _)| *version)
}

fn schema_version(conn: &Connection) -> Result<i32> {
    conn.pragma_query_value(None, "user_version", |row| row.get(0))
        .context("failed to read user_version pragma")
}

/// Applies every step newer than the stored version, each in its own
/// transaction. Returns the resulting version.
pub fn run_migrations(conn: &mut Connection) -> Result<i32> {
    let current = schema_version(conn)?;
    let latest = latest_version();
    if current > latest {
        bail!("database schema v{current} is newer than this build supports (v{latest})");
    }

    for (version, sql) in MIGRATIONS.iter().filter(|(version, _)| *version > current) {
        let tx = conn
            .transaction()
            .with_context(|| format!("failed to begin schema v{version}"))?;
        tx.execute_batch(sql)
            .with_context(|| format!("schema v{version} failed"))?;
        tx.pragma_update(None, "user_version", version)
            .with_context(|| format!("failed to record schema v{version}"))?;
        tx.commit()
            .with_context(|| format!("failed to commit schema v{version}"))?;
        info!("Database schema upgraded to v{version}");
    }

    Ok(latest)
}
