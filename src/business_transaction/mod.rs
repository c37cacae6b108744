//! Business transactions: multi-step operations whose events certain consumers
//! must only see once the whole operation finished.
//!
//! Producers bracket their emissions with started/finished markers
//! ([`ProducerBusinessTransactionManager`]). Consumers buffer tagged records per
//! processor until the finished marker arrives ([`BusinessTransactionAwareListener`]).

mod document;
mod listener;
mod manager;
mod producer;
mod sql;
mod store;

use std::sync::Arc;

pub use document::DocumentQueuedEventStore;
pub use listener::{BusinessTransactionAware, BusinessTransactionAwareListener, DeferredDispatch};
pub use manager::BusinessTransactionManager;
pub use producer::{BusinessTransactionMarker, Propagation, ProducerBusinessTransactionManager};
pub(crate) use producer::ActiveBusinessTransaction;
pub use sql::SqlQueuedEventStore;
pub use store::{QueuedEvent, QueuedEventStore};

use crate::config::QueuedEventBackendKind;

/// Build the configured buffer backend.
pub fn queued_event_store(backend: QueuedEventBackendKind) -> Arc<dyn QueuedEventStore> {
    match backend {
        QueuedEventBackendKind::Relational => Arc::new(SqlQueuedEventStore::new()),
        QueuedEventBackendKind::Document => Arc::new(DocumentQueuedEventStore::new()),
    }
}
