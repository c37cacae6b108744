use std::sync::Arc;

use tracing::debug;

use crate::db::Tx;
use crate::error::{EventStoreError, Result};
use crate::message::{EventRecord, MessageKey};
use crate::snapshot::{handler, EventSource, MessageHandler, SnapshotStore, VersionedSnapshot};

/// Routes incoming records to the snapshot stores of a bounded context.
#[derive(Clone, Default)]
pub struct EventDispatcher {
    handlers: Vec<Arc<dyn MessageHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, handler: Arc<dyn MessageHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn with_snapshot_store<S: VersionedSnapshot>(self, store: Arc<dyn SnapshotStore<S>>) -> Self {
        self.register(handler(store))
    }

    pub fn handles(&self, key: &MessageKey, payload: Option<&[u8]>) -> bool {
        self.handlers
            .iter()
            .any(|handler| handler.handles_message(key, payload))
    }

    pub fn dispatch(&self, tx: &Tx<'_>, record: &EventRecord, source: EventSource) -> Result<()> {
        let key = record.message_key()?;
        self.dispatch_key(tx, &key, record.payload.as_deref(), source)
    }

    pub fn dispatch_key(
        &self,
        tx: &Tx<'_>,
        key: &MessageKey,
        payload: Option<&[u8]>,
        source: EventSource,
    ) -> Result<()> {
        let mut handled = false;
        for handler in self.handlers.iter().filter(|h| h.handles_message(key, payload)) {
            handler.handle_message(tx, key, payload, source)?;
            handled = true;
        }

        if !handled {
            return Err(EventStoreError::IllegalArgument(format!(
                "No snapshot store found to handle event of type: {}",
                key.type_name()
            )));
        }
        debug!(key = %key, ?source, "dispatched record");
        Ok(())
    }
}
