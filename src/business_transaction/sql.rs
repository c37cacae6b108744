use chrono::{DateTime, Utc};
use rusqlite::params;

use super::{QueuedEvent, QueuedEventStore};
use crate::db::Tx;
use crate::error::{EventStoreError, Result};
use crate::message::EventRecord;

/// Buffer kept in the `queued_transaction_events` table, written in the
/// consumer's transaction.
#[derive(Clone, Copy, Debug, Default)]
pub struct SqlQueuedEventStore;

impl SqlQueuedEventStore {
    pub fn new() -> Self {
        SqlQueuedEventStore
    }
}

impl QueuedEventStore for SqlQueuedEventStore {
    fn save(
        &self,
        tx: &Tx<'_>,
        transaction_id: &str,
        event_processor_name: &str,
        record: &EventRecord,
    ) -> Result<()> {
        let payload = record.payload.as_deref().ok_or_else(|| {
            EventStoreError::IllegalArgument("cannot buffer a tombstone".to_string())
        })?;

        tx.conn().execute(
            "INSERT INTO queued_transaction_events
                (transaction_id, event_processor_name, event_offset, key_bytes, payload_bytes, inserted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (transaction_id, event_processor_name, event_offset) DO UPDATE SET
                key_bytes = excluded.key_bytes,
                payload_bytes = excluded.payload_bytes,
                inserted_at = excluded.inserted_at",
            params![
                transaction_id,
                event_processor_name,
                record.offset,
                record.key,
                payload,
                Utc::now().timestamp_millis(),
            ],
        )?;
        Ok(())
    }

    fn read(
        &self,
        tx: &Tx<'_>,
        transaction_id: &str,
        event_processor_name: &str,
    ) -> Result<Vec<QueuedEvent>> {
        let mut stmt = tx.conn().prepare(
            "SELECT event_offset, key_bytes, payload_bytes, inserted_at
             FROM queued_transaction_events
             WHERE transaction_id = ?1 AND event_processor_name = ?2
             ORDER BY event_offset",
        )?;
        let events = stmt
            .query_map(params![transaction_id, event_processor_name], |row| {
                let inserted_at: i64 = row.get(3)?;
                Ok(QueuedEvent {
                    transaction_id: transaction_id.to_string(),
                    event_processor_name: event_processor_name.to_string(),
                    offset: row.get(0)?,
                    key: row.get(1)?,
                    payload: row.get(2)?,
                    inserted_at: DateTime::<Utc>::from_timestamp_millis(inserted_at)
                        .unwrap_or_default(),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(events)
    }

    fn remove(
        &self,
        tx: &Tx<'_>,
        transaction_id: &str,
        event_processor_name: &str,
    ) -> Result<usize> {
        let removed = tx.conn().execute(
            "DELETE FROM queued_transaction_events
             WHERE transaction_id = ?1 AND event_processor_name = ?2",
            params![transaction_id, event_processor_name],
        )?;
        Ok(removed)
    }
}
