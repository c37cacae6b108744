use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, OptionalExtension, Row};
use tracing::debug;

use super::{tombstone, AuditingInformation, SnapshotEvent, SnapshotStore, VersionedSnapshot};
use crate::db::{Database, Tx};
use crate::error::{EventStoreError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SqlColumn {
    pub name: &'static str,
    pub sql_type: &'static str,
}

impl SqlColumn {
    pub const fn new(name: &'static str, sql_type: &'static str) -> Self {
        Self { name, sql_type }
    }
}

/// Columns shared by every snapshot table, decoded before the aggregate columns.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SnapshotHeader {
    pub identifier: String,
    pub version: i64,
    pub auditing: AuditingInformation,
}

/// Maps one snapshot type onto its own table.
///
/// The store owns the `identifier`, `version` and audit columns; the mapping
/// declares the aggregate columns and converts values in declaration order.
pub trait SqlMapping<S>: Send + Sync + 'static {
    fn table(&self) -> &str;

    fn columns(&self) -> &[SqlColumn];

    fn to_values(&self, snapshot: &S) -> Vec<Value>;

    /// Build a snapshot from a row whose aggregate columns start at `first_column`.
    fn from_row(&self, header: SnapshotHeader, row: &Row<'_>, first_column: usize)
        -> rusqlite::Result<S>;
}

const HEADER_COLUMNS: [&str; 6] = [
    "identifier",
    "version",
    "created_by",
    "created_at",
    "last_modified_by",
    "last_modified_at",
];

/// Snapshot store writing each event with hand-built parameterized statements.
///
/// There is no identity cache: every lookup reads the row.
pub struct SqlSnapshotStore<S, M> {
    mapping: M,
    select_sql: String,
    insert_sql: String,
    update_sql: String,
    delete_sql: String,
    _snapshot: std::marker::PhantomData<fn() -> S>,
}

impl<S, M> SqlSnapshotStore<S, M>
where
    S: VersionedSnapshot,
    M: SqlMapping<S>,
{
    pub fn new(mapping: M) -> Self {
        let table = mapping.table().to_string();
        let custom: Vec<&str> = mapping.columns().iter().map(|c| c.name).collect();
        let all: Vec<&str> = HEADER_COLUMNS.iter().copied().chain(custom.iter().copied()).collect();

        let placeholders = (1..=all.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");

        // version, last_modified_by, last_modified_at, custom columns..., then identifier and expected version
        let mut assignments = vec![
            "version = ?1".to_string(),
            "last_modified_by = ?2".to_string(),
            "last_modified_at = ?3".to_string(),
        ];
        assignments.extend(
            custom
                .iter()
                .enumerate()
                .map(|(i, name)| format!("{} = ?{}", name, i + 4)),
        );
        let identifier_index = custom.len() + 4;

        Self {
            select_sql: format!(
                "SELECT {} FROM {} WHERE identifier = ?1",
                all.join(", "),
                table
            ),
            insert_sql: format!(
                "INSERT INTO {} ({}) VALUES ({})",
                table,
                all.join(", "),
                placeholders
            ),
            update_sql: format!(
                "UPDATE {} SET {} WHERE identifier = ?{} AND version = ?{}",
                table,
                assignments.join(", "),
                identifier_index,
                identifier_index + 1
            ),
            delete_sql: format!("DELETE FROM {} WHERE identifier = ?1 AND version = ?2", table),
            mapping,
            _snapshot: std::marker::PhantomData,
        }
    }

    pub fn mapping(&self) -> &M {
        &self.mapping
    }

    /// Create the table of this mapping if it does not exist.
    pub fn install(&self, db: &Database) -> Result<()> {
        let columns = self
            .mapping
            .columns()
            .iter()
            .map(|c| format!(",\n    {} {}", c.name, c.sql_type))
            .collect::<String>();
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {} (
    identifier TEXT PRIMARY KEY NOT NULL,
    version INTEGER NOT NULL,
    created_by TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    last_modified_by TEXT NOT NULL,
    last_modified_at INTEGER NOT NULL{}
)",
            self.mapping.table(),
            columns
        );
        db.with_connection(|conn| {
            conn.execute_batch(&ddl)?;
            Ok(())
        })
    }

    fn stored_version(&self, tx: &Tx<'_>, identifier: &str) -> Result<i64> {
        let sql = format!("SELECT version FROM {} WHERE identifier = ?1", self.mapping.table());
        let version = tx
            .conn()
            .query_row(&sql, [identifier], |row| row.get(0))
            .optional()?;
        Ok(version.unwrap_or(-1))
    }

    fn conflict(&self, tx: &Tx<'_>, identifier: &str, expected: i64) -> Result<()> {
        Err(EventStoreError::OptimisticConcurrencyConflict {
            kind: S::KIND.to_string(),
            identifier: identifier.to_string(),
            expected,
            actual: self.stored_version(tx, identifier)?,
        })
    }

    fn insert(&self, tx: &Tx<'_>, snapshot: &S) -> Result<()> {
        let audit = snapshot.auditing();
        let mut values = vec![
            Value::Text(snapshot.identifier().to_string()),
            Value::Integer(snapshot.version()),
            Value::Text(audit.created_by.clone()),
            Value::Integer(audit.created_at.timestamp_millis()),
            Value::Text(audit.last_modified_by.clone()),
            Value::Integer(audit.last_modified_at.timestamp_millis()),
        ];
        values.extend(self.mapping.to_values(snapshot));

        tx.conn()
            .execute(&self.insert_sql, params_from_iter(values))?;
        Ok(())
    }

    fn update(&self, tx: &Tx<'_>, snapshot: &S, expected: i64) -> Result<()> {
        let audit = snapshot.auditing();
        let mut values = vec![
            Value::Integer(snapshot.version()),
            Value::Text(audit.last_modified_by.clone()),
            Value::Integer(audit.last_modified_at.timestamp_millis()),
        ];
        values.extend(self.mapping.to_values(snapshot));
        values.push(Value::Text(snapshot.identifier().to_string()));
        values.push(Value::Integer(expected));

        let updated = tx
            .conn()
            .execute(&self.update_sql, params_from_iter(values))?;
        if updated != 1 {
            return self.conflict(tx, snapshot.identifier(), expected);
        }
        Ok(())
    }

    fn delete(&self, tx: &Tx<'_>, identifier: &str, expected: i64, version: i64) -> Result<()> {
        let deleted = tx.conn().execute(
            &self.delete_sql,
            params_from_iter([Value::Text(identifier.to_string()), Value::Integer(expected)]),
        )?;
        if deleted != 1 {
            return self.conflict(tx, identifier, expected);
        }
        tombstone::record(tx.conn(), S::KIND, identifier, version)
    }
}

fn timestamp(index: usize, millis: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(index, millis))
}

fn read_header(row: &Row<'_>) -> rusqlite::Result<SnapshotHeader> {
    Ok(SnapshotHeader {
        identifier: row.get(0)?,
        version: row.get(1)?,
        auditing: AuditingInformation {
            created_by: row.get(2)?,
            created_at: timestamp(3, row.get(3)?)?,
            last_modified_by: row.get(4)?,
            last_modified_at: timestamp(5, row.get(5)?)?,
        },
    })
}

impl<S, M> SnapshotStore<S> for SqlSnapshotStore<S, M>
where
    S: VersionedSnapshot,
    M: SqlMapping<S>,
{
    fn find_or_ignore(&self, tx: &Tx<'_>, identifier: &str) -> Result<Option<S>> {
        let snapshot = tx
            .conn()
            .query_row(&self.select_sql, [identifier], |row| {
                let header = read_header(row)?;
                self.mapping.from_row(header, row, HEADER_COLUMNS.len())
            })
            .optional()?;
        Ok(snapshot)
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

        match (event, current) {
            (SnapshotEvent::Created(_), _) => self.insert(tx, snapshot)?,
            (SnapshotEvent::Updated { .. }, Some(current)) => {
                self.update(tx, snapshot, current.version())?
            }
            (SnapshotEvent::Deleted(_), Some(current)) => self.delete(
                tx,
                snapshot.identifier(),
                current.version(),
                snapshot.version(),
            )?,
            (_, None) => {
                return Err(EventStoreError::IllegalState(format!(
                    "{} of {} {} needs a current snapshot",
                    event.name(),
                    S::KIND,
                    snapshot.identifier()
                )))
            }
        }

        debug!(
            kind = S::KIND,
            table = self.mapping.table(),
            identifier = snapshot.identifier(),
            version = snapshot.version(),
            "stored snapshot"
        );
        Ok(snapshot.version())
    }

    fn remove_internal(&self, tx: &Tx<'_>, current: &S, version: i64) -> Result<()> {
        self.delete(tx, current.identifier(), current.version(), version)
    }
}
