use std::sync::Arc;

use super::{EventSource, SnapshotStore, VersionedSnapshot};
use crate::db::Tx;
use crate::error::Result;
use crate::message::MessageKey;

/// Type-erased view of a snapshot store, so stores of different snapshot types
/// can be registered side by side on a bus or dispatcher.
pub trait MessageHandler: Send + Sync {
    /// Aggregate kind handled, for logs.
    fn kind(&self) -> &str;

    fn handles_message(&self, key: &MessageKey, payload: Option<&[u8]>) -> bool;

    /// Apply one record. A `None` payload is a tombstone.
    fn handle_message(
        &self,
        tx: &Tx<'_>,
        key: &MessageKey,
        payload: Option<&[u8]>,
        source: EventSource,
    ) -> Result<()>;
}

pub struct SnapshotStoreHandler<S> {
    store: Arc<dyn SnapshotStore<S>>,
}

impl<S: VersionedSnapshot> SnapshotStoreHandler<S> {
    pub fn new(store: Arc<dyn SnapshotStore<S>>) -> Self {
        Self { store }
    }
}

impl<S: VersionedSnapshot> MessageHandler for SnapshotStoreHandler<S> {
    fn kind(&self) -> &str {
        S::KIND
    }

    fn handles_message(&self, key: &MessageKey, payload: Option<&[u8]>) -> bool {
        self.store.handles_message(key, payload)
    }

    fn handle_message(
        &self,
        tx: &Tx<'_>,
        key: &MessageKey,
        payload: Option<&[u8]>,
        source: EventSource,
    ) -> Result<()> {
        match payload {
            Some(payload) => self.store.handle_message(tx, key, payload, source),
            None => self.store.handle_tombstone(tx, key),
        }
    }
}

/// Wrap a typed store for registration.
pub fn handler<S: VersionedSnapshot>(store: Arc<dyn SnapshotStore<S>>) -> Arc<dyn MessageHandler> {
    Arc::new(SnapshotStoreHandler::new(store))
}
