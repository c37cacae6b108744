use tracing::info;

use super::{BusinessTransactionManager, QueuedEvent};
use crate::consumer::EventDispatcher;
use crate::db::Tx;
use crate::error::{EventStoreError, Result};
use crate::message::{EventRecord, MessageKey};
use crate::snapshot::EventSource;

/// A consumer that wants to see business transactions as a whole.
///
/// Only `processor_name` is required; it isolates this consumer's buffer from
/// other consumers of the same records.
pub trait BusinessTransactionAware: Send + Sync {
    fn processor_name(&self) -> &str;

    fn on_transaction_started(&self, _tx: &Tx<'_>, _started: &EventRecord) -> Result<()> {
        Ok(())
    }

    /// Called on every delivery of a transactional record while its transaction
    /// is open, duplicates included.
    fn on_transactional_event(&self, _tx: &Tx<'_>, _record: &EventRecord) -> Result<()> {
        Ok(())
    }

    /// Called once with the deduplicated events between the markers, in offset order.
    fn on_transaction_finished(
        &self,
        _tx: &Tx<'_>,
        _started: &QueuedEvent,
        _events: &[QueuedEvent],
        _finished: &QueuedEvent,
    ) -> Result<()> {
        Ok(())
    }

    fn on_non_transactional_event(&self, _tx: &Tx<'_>, _record: &EventRecord) -> Result<()> {
        Ok(())
    }
}

/// Feeds incoming records to a [`BusinessTransactionAware`] processor,
/// buffering transactional ones until the finished marker.
pub struct BusinessTransactionAwareListener<P> {
    manager: BusinessTransactionManager,
    processor: P,
}

impl<P: BusinessTransactionAware> BusinessTransactionAwareListener<P> {
    pub fn new(manager: BusinessTransactionManager, processor: P) -> Self {
        Self { manager, processor }
    }

    pub fn processor(&self) -> &P {
        &self.processor
    }

    pub fn process(&self, tx: &Tx<'_>, record: &EventRecord) -> Result<()> {
        let key = record.message_key()?;
        let name = self.processor.processor_name();

        match &key {
            MessageKey::BusinessTransactionStarted {
                transaction_identifier,
                ..
            } => {
                let buffered = self
                    .manager
                    .read_events_from_database(tx, transaction_identifier, name)?;
                if find_started(&buffered)?.is_some() {
                    info!(transaction_id = %transaction_identifier, processor = name, "duplicate started marker, skipping");
                    return Ok(());
                }
                self.manager.save_event_to_database(tx, record, name)?;
                self.processor.on_transaction_started(tx, record)
            }
            MessageKey::BusinessTransactionFinished {
                transaction_identifier,
                ..
            } => {
                let buffered = self
                    .manager
                    .read_events_from_database(tx, transaction_identifier, name)?;
                if find_started(&buffered)?.is_none() {
                    info!(transaction_id = %transaction_identifier, processor = name, "no open business transaction for finished marker, skipping");
                    return Ok(());
                }

                self.manager.save_event_to_database(tx, record, name)?;
                let buffered = self
                    .manager
                    .read_events_from_database(tx, transaction_identifier, name)?;
                self.finish(tx, transaction_identifier, &buffered)?;
                self.manager
                    .remove_events_from_database(tx, transaction_identifier, name)
            }
            MessageKey::Aggregate { .. } => match record.business_transaction_id(&key) {
                Some(transaction_id) => {
                    let buffered = self
                        .manager
                        .read_events_from_database(tx, &transaction_id, name)?;
                    if find_started(&buffered)?.is_none() {
                        info!(transaction_id = %transaction_id, processor = name, offset = record.offset, "no open business transaction for event, skipping");
                        return Ok(());
                    }
                    self.manager.save_event_to_database(tx, record, name)?;
                    self.processor.on_transactional_event(tx, record)
                }
                None => self.processor.on_non_transactional_event(tx, record),
            },
        }
    }

    fn finish(&self, tx: &Tx<'_>, transaction_id: &str, buffered: &[QueuedEvent]) -> Result<()> {
        let mut started = None;
        let mut finished = None;
        let mut events = Vec::with_capacity(buffered.len());

        for event in buffered {
            match event.message_key()? {
                MessageKey::BusinessTransactionStarted { .. } => started = Some(event),
                MessageKey::BusinessTransactionFinished { .. } => finished = Some(event),
                MessageKey::Aggregate { .. } => events.push(event.clone()),
            }
        }

        match (started, finished) {
            (Some(started), Some(finished)) => {
                self.processor
                    .on_transaction_finished(tx, started, &events, finished)
            }
            _ => Err(EventStoreError::IllegalState(format!(
                "business transaction {} is missing its started or finished marker",
                transaction_id
            ))),
        }
    }
}

fn find_started(buffered: &[QueuedEvent]) -> Result<Option<&QueuedEvent>> {
    for event in buffered {
        if let MessageKey::BusinessTransactionStarted { .. } = event.message_key()? {
            return Ok(Some(event));
        }
    }
    Ok(None)
}

/// Processor that applies a business transaction's events to snapshot stores
/// only once the transaction finished. Other records are applied right away.
pub struct DeferredDispatch {
    name: String,
    dispatcher: EventDispatcher,
}

impl DeferredDispatch {
    pub fn new(name: impl Into<String>, dispatcher: EventDispatcher) -> Self {
        Self {
            name: name.into(),
            dispatcher,
        }
    }
}

impl BusinessTransactionAware for DeferredDispatch {
    fn processor_name(&self) -> &str {
        &self.name
    }

    fn on_transaction_finished(
        &self,
        tx: &Tx<'_>,
        _started: &QueuedEvent,
        events: &[QueuedEvent],
        _finished: &QueuedEvent,
    ) -> Result<()> {
        for event in events {
            let key = event.message_key()?;
            self.dispatcher
                .dispatch_key(tx, &key, Some(event.payload.as_slice()), EventSource::Restore)?;
        }
        Ok(())
    }

    fn on_non_transactional_event(&self, tx: &Tx<'_>, record: &EventRecord) -> Result<()> {
        self.dispatcher.dispatch(tx, record, EventSource::Restore)
    }
}
