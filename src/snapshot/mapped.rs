use std::marker::PhantomData;

use rusqlite::{params, OptionalExtension};
use tracing::debug;

use super::{tombstone, SnapshotEvent, SnapshotStore, VersionedSnapshot};
use crate::db::Tx;
use crate::error::{EventStoreError, Result};

/// Snapshot store that maps whole snapshots onto rows of the shared
/// `snapshots` table, serialized as JSON documents.
///
/// Loaded snapshots are kept in the [`Tx`] cache, so repeated lookups of the
/// same aggregate in one unit of work read the database once.
pub struct MappedSnapshotStore<S> {
    _snapshot: PhantomData<fn() -> S>,
}

impl<S: VersionedSnapshot> MappedSnapshotStore<S> {
    pub fn new() -> Self {
        Self {
            _snapshot: PhantomData,
        }
    }

    fn load(&self, tx: &Tx<'_>, identifier: &str) -> Result<Option<S>> {
        let body: Option<String> = tx
            .conn()
            .query_row(
                "SELECT body FROM snapshots WHERE kind = ?1 AND identifier = ?2",
                params![S::KIND, identifier],
                |row| row.get(0),
            )
            .optional()?;

        body.map(|body| serde_json::from_str::<S>(&body).map_err(EventStoreError::from))
            .transpose()
    }

    fn stored_version(&self, tx: &Tx<'_>, identifier: &str) -> Result<i64> {
        let version = tx
            .conn()
            .query_row(
                "SELECT version FROM snapshots WHERE kind = ?1 AND identifier = ?2",
                params![S::KIND, identifier],
                |row| row.get(0),
            )
            .optional()?;
        Ok(version.unwrap_or(-1))
    }

    fn insert(&self, tx: &Tx<'_>, snapshot: &S) -> Result<()> {
        let audit = snapshot.auditing();
        tx.conn().execute(
            "INSERT INTO snapshots
                (kind, identifier, version, created_by, created_at, last_modified_by, last_modified_at, body)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                S::KIND,
                snapshot.identifier(),
                snapshot.version(),
                audit.created_by,
                audit.created_at.timestamp_millis(),
                audit.last_modified_by,
                audit.last_modified_at.timestamp_millis(),
                serde_json::to_string(snapshot)?,
            ],
        )?;
        Ok(())
    }

    fn update(&self, tx: &Tx<'_>, snapshot: &S, expected: i64) -> Result<()> {
        let audit = snapshot.auditing();
        let updated = tx.conn().execute(
            "UPDATE snapshots
             SET version = ?1, last_modified_by = ?2, last_modified_at = ?3, body = ?4
             WHERE kind = ?5 AND identifier = ?6 AND version = ?7",
            params![
                snapshot.version(),
                audit.last_modified_by,
                audit.last_modified_at.timestamp_millis(),
                serde_json::to_string(snapshot)?,
                S::KIND,
                snapshot.identifier(),
                expected,
            ],
        )?;
        self.expect_one_row(tx, snapshot.identifier(), expected, updated)
    }

    fn delete(&self, tx: &Tx<'_>, identifier: &str, expected: i64, version: i64) -> Result<()> {
        let deleted = tx.conn().execute(
            "DELETE FROM snapshots WHERE kind = ?1 AND identifier = ?2 AND version = ?3",
            params![S::KIND, identifier, expected],
        )?;
        self.expect_one_row(tx, identifier, expected, deleted)?;
        tombstone::record(tx.conn(), S::KIND, identifier, version)
    }

    fn expect_one_row(&self, tx: &Tx<'_>, identifier: &str, expected: i64, rows: usize) -> Result<()> {
        if rows == 1 {
            return Ok(());
        }
        tx.cache().evict(S::KIND, identifier);
        Err(EventStoreError::OptimisticConcurrencyConflict {
            kind: S::KIND.to_string(),
            identifier: identifier.to_string(),
            expected,
            actual: self.stored_version(tx, identifier)?,
        })
    }
}

impl<S: VersionedSnapshot> Default for MappedSnapshotStore<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: VersionedSnapshot> SnapshotStore<S> for MappedSnapshotStore<S> {
    fn find_or_ignore(&self, tx: &Tx<'_>, identifier: &str) -> Result<Option<S>> {
        if let Some(cached) = tx.cache().get::<S>(S::KIND, identifier) {
            return Ok(Some(cached));
        }

        let loaded = self.load(tx, identifier)?;
        if let Some(snapshot) = &loaded {
            tx.cache().put(S::KIND, identifier, snapshot.clone());
        }
        Ok(loaded)
    }

    fn tombstone_version(&self, tx: &Tx<'_>, identifier: &str) -> Result<Option<i64>> {
        tombstone::version(tx.conn(), S::KIND, identifier)
    }

    fn update_internal(
        &self,
        tx: &Tx<'_>,
        event: &SnapshotEvent<S>,
        current: Option<&S>,
    ) -> Result<i64> {
        let snapshot = event.snapshot();
        let identifier = snapshot.identifier();

        match (event, current) {
            (SnapshotEvent::Created(_), _) => {
                self.insert(tx, snapshot)?;
                tx.cache().put(S::KIND, identifier, snapshot.clone());
            }
            (SnapshotEvent::Updated { .. }, Some(current)) => {
                self.update(tx, snapshot, current.version())?;
                tx.cache().put(S::KIND, identifier, snapshot.clone());
            }
            (SnapshotEvent::Deleted(_), Some(current)) => {
                self.delete(tx, identifier, current.version(), snapshot.version())?;
                tx.cache().evict(S::KIND, identifier);
            }
            (_, None) => {
                return Err(EventStoreError::IllegalState(format!(
                    "{} of {} {} needs a current snapshot",
                    event.name(),
                    S::KIND,
                    identifier
                )))
            }
        }

        debug!(kind = S::KIND, identifier, version = snapshot.version(), "stored snapshot");
        Ok(snapshot.version())
    }

    fn remove_internal(&self, tx: &Tx<'_>, current: &S, version: i64) -> Result<()> {
        self.delete(tx, current.identifier(), current.version(), version)?;
        tx.cache().evict(S::KIND, current.identifier());
        Ok(())
    }
}
