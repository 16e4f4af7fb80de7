//! Schema versions of the SQLite metadata store.
//!
//! The store keeps one row per identity-record key in `seal_metadata`.
//! Applied versions are tracked in `seal_schema`; a database written by a
//! newer release is refused rather than silently downgraded.

use rusqlite::{params, Connection};
use tracing::debug;

use crate::error::{Result, StoreError};

/// Ordered schema steps. Entry `i` moves the schema to version `i + 1`.
const STEPS: &[&str] = &[
    // v1: identity record as key/value rows. Values are base64url or `null`.
    "CREATE TABLE seal_metadata (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        updated_at INTEGER NOT NULL
    );",
];

/// Version the current release writes.
pub const CURRENT_VERSION: u32 = STEPS.len() as u32;

/// Bring the metadata schema up to [`CURRENT_VERSION`].
///
/// All pending steps run in one transaction. Safe to call on every open.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS seal_schema (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let found = schema_version(conn)?;
    if found > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "metadata schema v{found} was written by a newer release (this one reads up to v{CURRENT_VERSION})"
        )));
    }
    if found == CURRENT_VERSION {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for (index, sql) in STEPS.iter().enumerate().skip(found as usize) {
        let version = index as u32 + 1;
        tx.execute_batch(sql)
            .map_err(|e| StoreError::Migration(format!("step to v{version} failed: {e}")))?;
        tx.execute(
            "INSERT INTO seal_schema (version, applied_at) VALUES (?1, ?2)",
            params![version, now_millis()],
        )?;
    }
    tx.commit()?;

    debug!(from = found, to = CURRENT_VERSION, "metadata schema upgraded");
    Ok(())
}

/// Highest applied version; 0 for a fresh database.
pub fn schema_version(conn: &Connection) -> Result<u32> {
    let version: Option<u32> =
        conn.query_row("SELECT MAX(version) FROM seal_schema", [], |row| row.get(0))?;
    Ok(version.unwrap_or(0))
}

pub(crate) fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}
