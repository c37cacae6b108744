use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use tracing::debug;

use super::{NewOutboxRecord, OutboxRecord, OutboxStatus};
use crate::db::Database;
use crate::error::{EventStoreError, Result};

const SELECT_COLUMNS: &str = "sequence_id, trace_header_key, trace_header_value, partition_number,
    key_bytes, payload_bytes, transaction_id, status, attempts, locked_by, locked_until,
    last_error, created_at";

/// Access to the `outbox_events` table.
///
/// Records are inserted inside the emitting transaction with [`insert`](Self::insert);
/// publication bookkeeping (claim, complete, release, fail) runs on its own.
#[derive(Clone)]
pub struct OutboxRepository {
    db: Database,
}

impl OutboxRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn insert(conn: &Connection, record: &NewOutboxRecord) -> Result<i64> {
        conn.execute(
            "INSERT INTO outbox_events
                (trace_header_key, trace_header_value, partition_number, key_bytes, payload_bytes, transaction_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.trace_header_key,
                record.trace_header_value,
                record.partition,
                record.key,
                record.payload,
                record.transaction_id,
                Utc::now().timestamp_millis(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Lease up to `limit` publishable records to `worker_id`, in sequence order.
    ///
    /// A record is publishable when it is pending (or its lease expired) and no
    /// earlier record of the same partition is leased by someone else or failed.
    pub fn claim(&self, worker_id: &str, limit: usize, lease: Duration) -> Result<Vec<OutboxRecord>> {
        let now = Utc::now().timestamp_millis();
        let locked_until = now + lease.as_millis() as i64;

        self.db.with_connection(|conn| {
            let tx = conn.unchecked_transaction()?;
            let ids: Vec<i64> = {
                let mut stmt = tx.prepare(
                    "SELECT o.sequence_id FROM outbox_events o
                     WHERE (o.status = 'pending' OR (o.status = 'in_flight' AND o.locked_until < ?1))
                       AND NOT EXISTS (
                         SELECT 1 FROM outbox_events e
                         WHERE e.partition_number = o.partition_number
                           AND e.sequence_id < o.sequence_id
                           AND (e.status = 'failed'
                                OR (e.status = 'in_flight' AND e.locked_until >= ?1))
                       )
                     ORDER BY o.sequence_id
                     LIMIT ?2",
                )?;
                let ids = stmt
                    .query_map(params![now, limit as i64], |row| row.get(0))?
                    .collect::<rusqlite::Result<Vec<i64>>>()?;
                ids
            };

            for id in &ids {
                tx.execute(
                    "UPDATE outbox_events
                     SET status = 'in_flight', locked_by = ?1, locked_until = ?2, attempts = attempts + 1
                     WHERE sequence_id = ?3",
                    params![worker_id, locked_until, id],
                )?;
            }

            let mut claimed = Vec::with_capacity(ids.len());
            {
                let sql = format!("SELECT {} FROM outbox_events WHERE sequence_id = ?1", SELECT_COLUMNS);
                let mut stmt = tx.prepare(&sql)?;
                for id in &ids {
                    claimed.push(stmt.query_row([id], read_record)?);
                }
            }
            tx.commit()?;

            if !claimed.is_empty() {
                debug!(worker_id, count = claimed.len(), "claimed outbox records");
            }
            Ok(claimed)
        })
    }

    pub fn complete(&self, sequence_id: i64) -> Result<()> {
        self.set_status(sequence_id, OutboxStatus::Published, None)
    }

    /// Hand a record back for another attempt.
    pub fn release(&self, sequence_id: i64, error: &str) -> Result<()> {
        self.set_status(sequence_id, OutboxStatus::Pending, Some(error))
    }

    pub fn fail(&self, sequence_id: i64, error: &str) -> Result<()> {
        self.set_status(sequence_id, OutboxStatus::Failed, Some(error))
    }

    /// Put a failed record back in line with a fresh attempt budget, which also
    /// unblocks the rest of its partition.
    pub fn retry(&self, sequence_id: i64) -> Result<()> {
        self.db.with_connection(|conn| {
            conn.execute(
                "UPDATE outbox_events
                 SET status = 'pending', attempts = 0, locked_by = NULL, locked_until = NULL
                 WHERE sequence_id = ?1 AND status = 'failed'",
                [sequence_id],
            )?;
            Ok(())
        })
    }

    /// Return a claimed record that was never attempted.
    pub fn unclaim(&self, sequence_id: i64) -> Result<()> {
        self.db.with_connection(|conn| {
            conn.execute(
                "UPDATE outbox_events
                 SET status = 'pending', locked_by = NULL, locked_until = NULL, attempts = MAX(attempts - 1, 0)
                 WHERE sequence_id = ?1",
                [sequence_id],
            )?;
            Ok(())
        })
    }

    pub fn pending_count(&self) -> Result<usize> {
        self.db.with_connection(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM outbox_events WHERE status IN ('pending', 'in_flight')",
                [],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
    }

    pub fn find_all(&self) -> Result<Vec<OutboxRecord>> {
        self.db.with_connection(|conn| {
            let sql = format!("SELECT {} FROM outbox_events ORDER BY sequence_id", SELECT_COLUMNS);
            let mut stmt = conn.prepare(&sql)?;
            let records = stmt
                .query_map([], read_record)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(records)
        })
    }

    fn set_status(&self, sequence_id: i64, status: OutboxStatus, error: Option<&str>) -> Result<()> {
        self.db.with_connection(|conn| {
            let updated = conn.execute(
                "UPDATE outbox_events
                 SET status = ?1, last_error = COALESCE(?2, last_error), locked_by = NULL, locked_until = NULL
                 WHERE sequence_id = ?3",
                params![status.as_str(), error, sequence_id],
            )?;
            if updated == 0 {
                return Err(EventStoreError::IllegalArgument(format!(
                    "no outbox record with sequence id {}",
                    sequence_id
                )));
            }
            Ok(())
        })
    }
}

fn millis(raw: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(raw).unwrap_or_default()
}

fn read_record(row: &Row<'_>) -> rusqlite::Result<OutboxRecord> {
    let status: String = row.get(7)?;
    let status = OutboxStatus::parse(&status).map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(7, Type::Text, Box::new(err))
    })?;
    let attempts: i64 = row.get(8)?;
    let locked_until: Option<i64> = row.get(10)?;

    Ok(OutboxRecord {
        sequence_id: row.get(0)?,
        trace_header_key: row.get(1)?,
        trace_header_value: row.get(2)?,
        partition: row.get(3)?,
        key: row.get(4)?,
        payload: row.get(5)?,
        transaction_id: row.get(6)?,
        status,
        attempts: attempts.max(0) as u32,
        locked_by: row.get(9)?,
        locked_until: locked_until.map(millis),
        last_error: row.get(11)?,
        created_at: millis(row.get(12)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_record(partition: i32, key: &str) -> NewOutboxRecord {
        NewOutboxRecord {
            trace_header_key: "X-B3-TraceId".into(),
            trace_header_value: "trace".into(),
            partition,
            key: key.as_bytes().to_vec(),
            payload: Some(vec![1, 2, 3]),
            transaction_id: None,
        }
    }

    fn repository_with(records: &[NewOutboxRecord]) -> OutboxRepository {
        let db = Database::in_memory().unwrap();
        db.with_connection(|conn| {
            for record in records {
                OutboxRepository::insert(conn, record)?;
            }
            Ok(())
        })
        .unwrap();
        OutboxRepository::new(db)
    }

    #[test]
    fn sequence_ids_increase() {
        let db = Database::in_memory().unwrap();
        let (a, b) = db
            .with_connection(|conn| {
                Ok((
                    OutboxRepository::insert(conn, &new_record(0, "a"))?,
                    OutboxRepository::insert(conn, &new_record(0, "b"))?,
                ))
            })
            .unwrap();
        assert!(b > a);
    }

    #[test]
    fn claim_leases_in_sequence_order() {
        let repo = repository_with(&[new_record(0, "a"), new_record(1, "b"), new_record(0, "c")]);

        let claimed = repo.claim("w1", 10, Duration::from_secs(60)).unwrap();
        let keys: Vec<&[u8]> = claimed.iter().map(|r| r.key.as_slice()).collect();
        assert_eq!(keys, vec![&b"a"[..], &b"b"[..], &b"c"[..]]);
        assert!(claimed.iter().all(|r| r.status == OutboxStatus::InFlight));
        assert!(claimed.iter().all(|r| r.attempts == 1));
        assert!(claimed.iter().all(|r| r.locked_by.as_deref() == Some("w1")));

        assert!(repo.claim("w2", 10, Duration::from_secs(60)).unwrap().is_empty());
    }

    #[test]
    fn leased_record_blocks_later_records_of_same_partition() {
        let repo = repository_with(&[new_record(0, "a")]);
        let first = repo.claim("w1", 1, Duration::from_secs(60)).unwrap();
        assert_eq!(first.len(), 1);

        repo.db
            .with_connection(|conn| {
                OutboxRepository::insert(conn, &new_record(0, "b"))?;
                OutboxRepository::insert(conn, &new_record(1, "c"))?;
                Ok(())
            })
            .unwrap();

        let second = repo.claim("w2", 10, Duration::from_secs(60)).unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].key, b"c".to_vec());
    }

    #[test]
    fn failed_record_blocks_later_records_of_same_partition() {
        let repo = repository_with(&[new_record(0, "a"), new_record(0, "b"), new_record(1, "c")]);
        let first = repo.claim("w1", 1, Duration::from_secs(60)).unwrap();
        repo.fail(first[0].sequence_id, "rejected").unwrap();

        let claimed = repo.claim("w1", 10, Duration::from_secs(60)).unwrap();
        let keys: Vec<&[u8]> = claimed.iter().map(|r| r.key.as_slice()).collect();
        assert_eq!(keys, vec![&b"c"[..]]);

        repo.retry(first[0].sequence_id).unwrap();
        let retried = repo.claim("w1", 10, Duration::from_secs(60)).unwrap();
        let keys: Vec<&[u8]> = retried.iter().map(|r| r.key.as_slice()).collect();
        assert_eq!(keys, vec![&b"a"[..], &b"b"[..]]);
        assert_eq!(retried[0].attempts, 1);
    }

    #[test]
    fn expired_lease_can_be_reclaimed() {
        let repo = repository_with(&[new_record(0, "a")]);
        repo.claim("w1", 10, Duration::from_millis(0)).unwrap();
        std::thread::sleep(Duration::from_millis(5));

        let reclaimed = repo.claim("w2", 10, Duration::from_secs(60)).unwrap();
        assert_eq!(reclaimed.len(), 1);
        assert_eq!(reclaimed[0].attempts, 2);
        assert_eq!(reclaimed[0].locked_by.as_deref(), Some("w2"));
    }

    #[test]
    fn complete_release_and_fail() {
        let repo = repository_with(&[new_record(0, "a"), new_record(1, "b"), new_record(2, "c")]);
        let claimed = repo.claim("w1", 10, Duration::from_secs(60)).unwrap();

        repo.complete(claimed[0].sequence_id).unwrap();
        repo.release(claimed[1].sequence_id, "broker down").unwrap();
        repo.fail(claimed[2].sequence_id, "poison").unwrap();

        let all = repo.find_all().unwrap();
        assert_eq!(all[0].status, OutboxStatus::Published);
        assert_eq!(all[1].status, OutboxStatus::Pending);
        assert_eq!(all[1].last_error.as_deref(), Some("broker down"));
        assert_eq!(all[2].status, OutboxStatus::Failed);
        assert_eq!(repo.pending_count().unwrap(), 1);
    }

    #[test]
    fn unclaim_restores_attempts() {
        let repo = repository_with(&[new_record(0, "a")]);
        let claimed = repo.claim("w1", 10, Duration::from_secs(60)).unwrap();
        repo.unclaim(claimed[0].sequence_id).unwrap();

        let all = repo.find_all().unwrap();
        assert_eq!(all[0].status, OutboxStatus::Pending);
        assert_eq!(all[0].attempts, 0);
    }

    #[test]
    fn tombstones_keep_null_payload() {
        let mut tombstone = new_record(0, "a");
        tombstone.payload = None;
        let repo = repository_with(&[tombstone]);

        let all = repo.find_all().unwrap();
        assert!(all[0].is_tombstone());
    }

    #[test]
    fn unknown_sequence_id_is_rejected() {
        let repo = repository_with(&[]);
        assert!(matches!(
            repo.complete(42),
            Err(EventStoreError::IllegalArgument(_))
        ));
    }
}
