//! SQLite access: the shared connection, the schema, and scoped transactions.

mod cache;
pub mod schema;
mod transaction;

use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::{Connection, OpenFlags};
use tracing::debug;

use crate::config::DatabaseConfig;
use crate::error::{EventStoreError, Result};

pub use cache::SnapshotCache;
pub use transaction::{TransactionTemplate, Tx, DEFAULT_USER};

/// Shared handle to the service database.
///
/// Cloning is cheap; all clones use the same connection. SQLite allows a single
/// writer, so transactions are serialized on the connection mutex.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(config: &DatabaseConfig) -> Result<Self> {
        let conn = match &config.path {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        EventStoreError::Config(format!(
                            "cannot create database directory {}: {}",
                            parent.display(),
                            e
                        ))
                    })?;
                }
                let conn = Connection::open_with_flags(
                    path,
                    OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
                )?;
                if config.wal_mode {
                    conn.pragma_update(None, "journal_mode", "WAL")?;
                }
                conn
            }
            None => Connection::open_in_memory()?,
        };

        conn.busy_timeout(config.busy_timeout())?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        schema::install(&conn)?;

        debug!(path = ?config.path, "opened database");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> Result<Self> {
        Self::open(&DatabaseConfig::default())
    }

    /// Run `f` against the connection outside of any explicit transaction.
    pub fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.lock("with_connection")?;
        f(&conn)
    }

    pub(crate) fn lock(&self, operation: &'static str) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| EventStoreError::LockPoisoned(operation))
    }
}
