use std::sync::Arc;

use tracing::debug;

use crate::config::OutboxConfig;
use crate::db::Tx;
use crate::error::{EventStoreError, Result};
use crate::message::{partition_for, MessageKey, TRACE_HEADER_KEY};
use crate::outbox::{NewOutboxRecord, OutboxRepository, OutboxWaker};
use crate::snapshot::{
    handler, EventSource, MessageHandler, SnapshotEvent, SnapshotStore, VersionedSnapshot,
};

/// Emits events of one service.
///
/// Every emission writes one outbox record and synchronously applies the event
/// to each registered store whose predicate matches, all inside the given
/// [`Tx`]. Publication happens later, from the outbox.
#[derive(Clone)]
pub struct LocalEventBus {
    handlers: Vec<Arc<dyn MessageHandler>>,
    partitions: u32,
    waker: Option<OutboxWaker>,
}

impl LocalEventBus {
    pub fn new(config: &OutboxConfig) -> Self {
        Self {
            handlers: Vec::new(),
            partitions: config.partitions.max(1),
            waker: None,
        }
    }

    pub fn register(mut self, handler: Arc<dyn MessageHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn with_snapshot_store<S: VersionedSnapshot>(self, store: Arc<dyn SnapshotStore<S>>) -> Self {
        self.register(handler(store))
    }

    /// Wake this outbox worker after each commit that emitted something.
    pub fn with_waker(mut self, waker: OutboxWaker) -> Self {
        self.waker = Some(waker);
        self
    }

    pub fn handlers(&self) -> &[Arc<dyn MessageHandler>] {
        &self.handlers
    }

    pub fn emit<S: VersionedSnapshot>(&self, tx: &Tx<'_>, event: &SnapshotEvent<S>) -> Result<i64> {
        let snapshot = event.snapshot();
        let key = MessageKey::aggregate(
            S::KIND,
            snapshot.identifier(),
            snapshot.version(),
            snapshot.root_context_identifier(),
        );
        let payload = event.encode()?;
        self.emit_raw(tx, &key, Some(&payload))
    }

    /// Emit an already encoded record; returns its outbox sequence id.
    pub fn emit_raw(&self, tx: &Tx<'_>, key: &MessageKey, payload: Option<&[u8]>) -> Result<i64> {
        let handlers: Vec<&Arc<dyn MessageHandler>> = self
            .handlers
            .iter()
            .filter(|handler| handler.handles_message(key, payload))
            .collect();

        if key.aggregate_identifier().is_some() && handlers.is_empty() {
            return Err(EventStoreError::IllegalArgument(format!(
                "No snapshot store registered for aggregate type: {}",
                key.type_name()
            )));
        }

        let sequence_id = OutboxRepository::insert(
            tx.conn(),
            &NewOutboxRecord {
                trace_header_key: TRACE_HEADER_KEY.to_string(),
                trace_header_value: tx.trace_id().to_string(),
                partition: partition_for(key.root_context_identifier(), self.partitions),
                key: key.encode()?,
                payload: payload.map(<[u8]>::to_vec),
                transaction_id: tx.business_transaction_id(),
            },
        )?;

        for handler in handlers {
            handler.handle_message(tx, key, payload, EventSource::Online)?;
        }

        if let Some(waker) = &self.waker {
            let waker = waker.clone();
            tx.after_commit(move || waker.wake());
        }

        debug!(key = %key, sequence_id, tombstone = payload.is_none(), "emitted event");
        Ok(sequence_id)
    }
}
