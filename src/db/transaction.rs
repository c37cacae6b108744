use std::cell::RefCell;
use std::sync::MutexGuard;

use rusqlite::Connection;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{Database, SnapshotCache};
use crate::business_transaction::ActiveBusinessTransaction;
use crate::error::{EventStoreError, Result};

pub const DEFAULT_USER: &str = "system";

type CompletionHook = Box<dyn FnOnce() + Send>;

/// One unit of work against the database.
///
/// Holds the connection for its whole lifetime. Everything written through it
/// (snapshots, outbox records, queued events) commits together. Dropping a `Tx`
/// without committing rolls it back, including on early `?` returns and panics.
pub struct Tx<'a> {
    conn: MutexGuard<'a, Connection>,
    id: Uuid,
    open: bool,
    cache: SnapshotCache,
    trace_id: String,
    user: String,
    business_transaction: RefCell<Option<ActiveBusinessTransaction>>,
    after_commit: RefCell<Vec<CompletionHook>>,
    after_rollback: RefCell<Vec<CompletionHook>>,
}

impl<'a> Tx<'a> {
    fn begin(conn: MutexGuard<'a, Connection>, trace_id: String, user: String) -> Result<Self> {
        conn.execute_batch("BEGIN IMMEDIATE TRANSACTION")?;
        Ok(Self {
            conn,
            id: Uuid::new_v4(),
            open: true,
            cache: SnapshotCache::default(),
            trace_id,
            user,
            business_transaction: RefCell::new(None),
            after_commit: RefCell::new(Vec::new()),
            after_rollback: RefCell::new(Vec::new()),
        })
    }

    /// Unique per unit of work, unlike the trace id which may be inherited.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Identity cache for snapshots loaded in this unit of work.
    pub fn cache(&self) -> &SnapshotCache {
        &self.cache
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    /// The user recorded in audit columns of snapshots written here.
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Register a callback that runs once the commit succeeded.
    pub fn after_commit(&self, hook: impl FnOnce() + Send + 'static) {
        self.after_commit.borrow_mut().push(Box::new(hook));
    }

    /// Register a callback that runs if this unit of work is rolled back,
    /// while the connection is still held.
    pub fn after_rollback(&self, hook: impl FnOnce() + Send + 'static) {
        self.after_rollback.borrow_mut().push(Box::new(hook));
    }

    pub fn business_transaction_id(&self) -> Option<String> {
        self.business_transaction
            .borrow()
            .as_ref()
            .map(|active| active.transaction_id.clone())
    }

    pub(crate) fn business_transaction(&self) -> &RefCell<Option<ActiveBusinessTransaction>> {
        &self.business_transaction
    }

    fn commit(mut self) -> Result<Vec<CompletionHook>> {
        let still_open = self.business_transaction_id();
        if let Some(transaction_id) = still_open {
            return Err(EventStoreError::IllegalState(format!(
                "business transaction {} is still active at commit",
                transaction_id
            )));
        }

        self.conn.execute_batch("COMMIT")?;
        self.open = false;
        Ok(self.after_commit.take())
    }
}

impl Drop for Tx<'_> {
    fn drop(&mut self) {
        if self.open {
            debug!(trace_id = %self.trace_id, "rolling back transaction");
            if let Err(err) = self.conn.execute_batch("ROLLBACK") {
                warn!(error = %err, "rollback failed");
            }
            for hook in self.after_rollback.take() {
                hook();
            }
        }
    }
}

/// Runs closures inside a [`Tx`], committing on `Ok` and rolling back on `Err`.
///
/// Transactions must not be nested: pass the `Tx` you have instead of calling
/// `execute` again from inside the closure.
#[derive(Clone)]
pub struct TransactionTemplate {
    db: Database,
    user: String,
}

impl TransactionTemplate {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            user: DEFAULT_USER.to_string(),
        }
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn execute<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Tx<'_>) -> Result<T>,
    {
        self.execute_traced(Uuid::new_v4().to_string(), f)
    }

    /// Like [`execute`](Self::execute) but continues an existing trace.
    pub fn execute_traced<T, F>(&self, trace_id: impl Into<String>, f: F) -> Result<T>
    where
        F: FnOnce(&Tx<'_>) -> Result<T>,
    {
        let (value, hooks) = {
            let conn = self.db.lock("transaction")?;
            let tx = Tx::begin(conn, trace_id.into(), self.user.clone())?;
            let value = f(&tx)?;
            let hooks = tx.commit()?;
            (value, hooks)
        };

        for hook in hooks {
            hook();
        }
        Ok(value)
    }
}
