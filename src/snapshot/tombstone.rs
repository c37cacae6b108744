use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;

pub(crate) fn record(conn: &Connection, kind: &str, identifier: &str, version: i64) -> Result<()> {
    conn.execute(
        "INSERT INTO snapshot_tombstones (kind, identifier, version, deleted_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (kind, identifier) DO UPDATE SET
            version = MAX(version, excluded.version),
            deleted_at = excluded.deleted_at",
        params![kind, identifier, version, Utc::now().timestamp_millis()],
    )?;
    Ok(())
}

pub(crate) fn version(conn: &Connection, kind: &str, identifier: &str) -> Result<Option<i64>> {
    let version = conn
        .query_row(
            "SELECT version FROM snapshot_tombstones WHERE kind = ?1 AND identifier = ?2",
            params![kind, identifier],
            |row| row.get(0),
        )
        .optional()?;
    Ok(version)
}
