use std::sync::Arc;

use tracing::debug;

use super::{QueuedEvent, QueuedEventStore};
use crate::db::Tx;
use crate::error::{EventStoreError, Result};
use crate::message::EventRecord;

/// Consumer-side buffer operations on top of a [`QueuedEventStore`].
#[derive(Clone)]
pub struct BusinessTransactionManager {
    store: Arc<dyn QueuedEventStore>,
}

impl BusinessTransactionManager {
    pub fn new(store: Arc<dyn QueuedEventStore>) -> Self {
        Self { store }
    }

    /// Buffer `record` for `event_processor_name`. Saving an offset twice keeps one record.
    pub fn save_event_to_database(
        &self,
        tx: &Tx<'_>,
        record: &EventRecord,
        event_processor_name: &str,
    ) -> Result<()> {
        if record.is_tombstone() {
            return Err(EventStoreError::IllegalArgument(format!(
                "tombstone at offset {} cannot be part of a business transaction",
                record.offset
            )));
        }

        let key = record.message_key()?;
        let transaction_id = record.business_transaction_id(&key).ok_or_else(|| {
            EventStoreError::IllegalArgument(format!(
                "record {} at offset {} has no business transaction id",
                key, record.offset
            ))
        })?;

        self.store
            .save(tx, &transaction_id, event_processor_name, record)?;
        debug!(
            transaction_id = %transaction_id,
            processor = event_processor_name,
            offset = record.offset,
            "buffered business transaction event"
        );
        Ok(())
    }

    pub fn read_events_from_database(
        &self,
        tx: &Tx<'_>,
        transaction_id: &str,
        event_processor_name: &str,
    ) -> Result<Vec<QueuedEvent>> {
        self.store.read(tx, transaction_id, event_processor_name)
    }

    pub fn remove_events_from_database(
        &self,
        tx: &Tx<'_>,
        transaction_id: &str,
        event_processor_name: &str,
    ) -> Result<()> {
        let removed = self.store.remove(tx, transaction_id, event_processor_name)?;
        debug!(
            transaction_id,
            processor = event_processor_name,
            removed,
            "purged business transaction buffer"
        );
        Ok(())
    }
}
