use chrono::{DateTime, Utc};

use crate::db::Tx;
use crate::error::Result;
use crate::message::{EventRecord, MessageKey};

/// One buffered record of an open business transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueuedEvent {
    pub transaction_id: String,
    pub event_processor_name: String,
    pub offset: i64,
    pub key: Vec<u8>,
    pub payload: Vec<u8>,
    pub inserted_at: DateTime<Utc>,
}

impl QueuedEvent {
    pub fn message_key(&self) -> Result<MessageKey> {
        MessageKey::decode(&self.key)
    }
}

/// Storage of business-transaction buffers, unique per
/// `(transaction_id, event_processor_name, offset)`.
///
/// Saving an offset again replaces the stored record. Reads return records in
/// offset order.
pub trait QueuedEventStore: Send + Sync {
    /// `record.payload` is known to be present.
    fn save(
        &self,
        tx: &Tx<'_>,
        transaction_id: &str,
        event_processor_name: &str,
        record: &EventRecord,
    ) -> Result<()>;

    fn read(
        &self,
        tx: &Tx<'_>,
        transaction_id: &str,
        event_processor_name: &str,
    ) -> Result<Vec<QueuedEvent>>;

    /// Returns the number of removed records.
    fn remove(&self, tx: &Tx<'_>, transaction_id: &str, event_processor_name: &str)
        -> Result<usize>;
}
