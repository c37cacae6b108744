use std::sync::Arc;

use sourced_runtime::config::{OutboxConfig, SnapshotBackendKind};
use sourced_runtime::snapshot::snapshot_store;
use sourced_runtime::{
    CommandHandler, Database, EventKind, LocalEventBus, OutboxRepository, Result, SnapshotStore,
    TransactionTemplate, Tx,
};

use super::task::{Task, TaskMapping};

pub const TOPIC: &str = "project";
pub const PARTITIONS: u32 = 3;

pub const BACKENDS: [SnapshotBackendKind; 2] = [SnapshotBackendKind::Mapped, SnapshotBackendKind::Sql];

/// One service instance: its database, task store, bus and outbox.
pub struct TaskService {
    pub db: Database,
    pub template: TransactionTemplate,
    pub store: Arc<dyn SnapshotStore<Task>>,
    pub bus: LocalEventBus,
    pub outbox: OutboxRepository,
}

impl TaskService {
    pub fn new(backend: SnapshotBackendKind) -> Self {
        super::init_tracing();
        let db = Database::in_memory().unwrap();
        let store = snapshot_store(backend, &db, TaskMapping).unwrap();
        let bus = LocalEventBus::new(&OutboxConfig::new(TOPIC, PARTITIONS))
            .with_snapshot_store(store.clone());
        Self {
            template: TransactionTemplate::new(db.clone()),
            outbox: OutboxRepository::new(db.clone()),
            store,
            bus,
            db,
        }
    }

    pub fn create(&self, tx: &Tx<'_>, id: &str, project: &str, title: &str) -> Result<Task> {
        CommandHandler::of(Task::new(id, project, title))
            .emit_event(EventKind::Created)
            .to(&self.bus, tx)
    }

    pub fn rename(&self, tx: &Tx<'_>, id: &str, title: &str) -> Result<Task> {
        let task = self.store.find_or_fail(tx, id)?;
        CommandHandler::of(task)
            .check_precondition(|t| !t.done)
            .on_failure_fail("task is done")?
            .apply_changes(|t| t.title = title.to_string())
            .emit_event(EventKind::Updated("RENAMED"))
            .if_snapshot_was_changed()
            .to(&self.bus, tx)
    }

    pub fn complete(&self, tx: &Tx<'_>, id: &str) -> Result<Task> {
        let task = self.store.find_or_fail(tx, id)?;
        CommandHandler::of(task)
            .apply_changes(|t| t.done = true)
            .emit_event(EventKind::Updated("COMPLETED"))
            .to(&self.bus, tx)
    }

    pub fn delete(&self, tx: &Tx<'_>, id: &str) -> Result<Task> {
        let task = self.store.find_or_fail(tx, id)?;
        CommandHandler::of(task)
            .emit_event(EventKind::Deleted)
            .to(&self.bus, tx)
    }

    pub fn find(&self, id: &str) -> Option<Task> {
        self.template
            .execute(|tx| self.store.find_or_ignore(tx, id))
            .unwrap()
    }
}
