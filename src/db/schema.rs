use rusqlite::Connection;

use crate::error::Result;

/// Create the runtime tables if they do not exist yet.
pub fn install(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS outbox_events (
            sequence_id INTEGER PRIMARY KEY AUTOINCREMENT,
            trace_header_key TEXT NOT NULL,
            trace_header_value TEXT NOT NULL,
            partition_number INTEGER NOT NULL,
            key_bytes BLOB NOT NULL,
            payload_bytes BLOB,
            transaction_id TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            attempts INTEGER NOT NULL DEFAULT 0,
            locked_by TEXT,
            locked_until INTEGER,
            last_error TEXT,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_outbox_events_status
            ON outbox_events (status, sequence_id);

        CREATE TABLE IF NOT EXISTS queued_transaction_events (
            transaction_id TEXT NOT NULL,
            event_processor_name TEXT NOT NULL,
            event_offset INTEGER NOT NULL,
            key_bytes BLOB NOT NULL,
            payload_bytes BLOB NOT NULL,
            inserted_at INTEGER NOT NULL,
            UNIQUE (transaction_id, event_processor_name, event_offset)
        );

        CREATE TABLE IF NOT EXISTS snapshots (
            kind TEXT NOT NULL,
            identifier TEXT NOT NULL,
            version INTEGER NOT NULL,
            created_by TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            last_modified_by TEXT NOT NULL,
            last_modified_at INTEGER NOT NULL,
            body TEXT NOT NULL,
            PRIMARY KEY (kind, identifier)
        );

        CREATE TABLE IF NOT EXISTS snapshot_tombstones (
            kind TEXT NOT NULL,
            identifier TEXT NOT NULL,
            version INTEGER NOT NULL,
            deleted_at INTEGER NOT NULL,
            PRIMARY KEY (kind, identifier)
        );",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        install(&conn).unwrap();
        install(&conn).unwrap();
    }

    #[test]
    fn queued_events_are_unique_per_offset() {
        let conn = Connection::open_in_memory().unwrap();
        install(&conn).unwrap();

        let insert = "INSERT INTO queued_transaction_events
            (transaction_id, event_processor_name, event_offset, key_bytes, payload_bytes, inserted_at)
            VALUES ('tx', 'p', 1, x'00', x'00', 0)";
        conn.execute(insert, []).unwrap();
        assert!(conn.execute(insert, []).is_err());
    }
}
