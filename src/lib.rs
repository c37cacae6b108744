//! Event-sourcing runtime for services that keep current-state snapshots of
//! their aggregates and publish every change through a transactional outbox.
//!
//! A command loads a snapshot, checks preconditions, mutates it and emits an
//! event on the [`LocalEventBus`]. The emission updates the snapshot store and
//! writes an outbox record in the same database transaction; an
//! [`OutboxWorker`] later publishes the record to the partitioned log, where
//! other services consume it through an [`EventDispatcher`] or rebuild their
//! databases from it through the [`restore`] module.

pub mod bus;
pub mod business_transaction;
pub mod config;
pub mod consumer;
pub mod db;
mod error;
pub mod log;
pub mod message;
pub mod outbox;
pub mod restore;
pub mod snapshot;

pub use bus::{CommandHandler, EventKind, LocalEventBus};
pub use business_transaction::{
    BusinessTransactionAware, BusinessTransactionAwareListener, BusinessTransactionManager,
    BusinessTransactionMarker, ProducerBusinessTransactionManager, Propagation,
};
pub use config::RuntimeConfig;
pub use consumer::{Acknowledgment, EventDispatcher, PartitionConsumer};
pub use db::{Database, TransactionTemplate, Tx};
pub use error::{EventStoreError, Result};
pub use message::{AggregateIdentifier, EventRecord, MessageKey};
pub use outbox::{OutboxRepository, OutboxWorker, OutboxWorkerThread};
pub use restore::{OffsetSynchronizationManager, RestoreDbStrategyDispatcher, RestoreEventListener};
pub use snapshot::{
    AuditingInformation, EventSource, SnapshotEvent, SnapshotStore, VersionedSnapshot,
    INITIAL_SNAPSHOT_VERSION,
};
