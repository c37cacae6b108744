use std::sync::Arc;

use tracing::debug;

use crate::db::Tx;
use crate::error::Result;
use crate::message::{EventRecord, MessageKey};
use crate::snapshot::{EventSource, MessageHandler};

/// Applies replayed records of some aggregate kinds to the local database.
pub trait RestoreStrategy: Send + Sync {
    fn can_handle(&self, key: &MessageKey, record: &EventRecord) -> bool;

    fn handle(&self, tx: &Tx<'_>, key: &MessageKey, record: &EventRecord) -> Result<()>;
}

/// Replays records into a snapshot store with restore semantics: already
/// applied versions are skipped.
pub struct SnapshotRestoreStrategy {
    handler: Arc<dyn MessageHandler>,
}

impl SnapshotRestoreStrategy {
    pub fn new(handler: Arc<dyn MessageHandler>) -> Self {
        Self { handler }
    }
}

impl RestoreStrategy for SnapshotRestoreStrategy {
    fn can_handle(&self, key: &MessageKey, record: &EventRecord) -> bool {
        self.handler.handles_message(key, record.payload.as_deref())
    }

    fn handle(&self, tx: &Tx<'_>, key: &MessageKey, record: &EventRecord) -> Result<()> {
        self.handler
            .handle_message(tx, key, record.payload.as_deref(), EventSource::Restore)
    }
}

/// Skips business transaction markers. They only matter to buffering
/// consumers; snapshot state is carried by the aggregate records between them.
#[derive(Clone, Copy, Debug, Default)]
pub struct BusinessTransactionMarkerStrategy;

impl RestoreStrategy for BusinessTransactionMarkerStrategy {
    fn can_handle(&self, key: &MessageKey, _record: &EventRecord) -> bool {
        key.transaction_identifier().is_some()
    }

    fn handle(&self, _tx: &Tx<'_>, key: &MessageKey, record: &EventRecord) -> Result<()> {
        debug!(key = %key, offset = record.offset, "skipping business transaction marker");
        Ok(())
    }
}
