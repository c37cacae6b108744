use std::sync::Arc;

use tracing::{debug, info};

use super::{BusinessTransactionMarkerStrategy, RestoreStrategy, SnapshotRestoreStrategy};
use crate::db::{TransactionTemplate, Tx};
use crate::error::{EventStoreError, Result};
use crate::message::{EventRecord, MessageKey};
use crate::snapshot::{handler, SnapshotStore, VersionedSnapshot};

/// Routes replayed records to the first strategy that accepts them, each
/// record or batch in its own transaction.
#[derive(Clone)]
pub struct RestoreDbStrategyDispatcher {
    template: TransactionTemplate,
    strategies: Vec<Arc<dyn RestoreStrategy>>,
}

impl RestoreDbStrategyDispatcher {
    /// Business transaction markers are skipped out of the box.
    pub fn new(template: TransactionTemplate) -> Self {
        Self {
            template,
            strategies: vec![
                Arc::new(BusinessTransactionMarkerStrategy) as Arc<dyn RestoreStrategy>
            ],
        }
    }

    pub fn with_strategy(mut self, strategy: Arc<dyn RestoreStrategy>) -> Self {
        self.strategies.push(strategy);
        self
    }

    pub fn with_snapshot_store<S: VersionedSnapshot>(self, store: Arc<dyn SnapshotStore<S>>) -> Self {
        self.with_strategy(Arc::new(SnapshotRestoreStrategy::new(handler(store))))
    }

    pub fn dispatch(&self, record: &EventRecord) -> Result<()> {
        self.template
            .execute_traced(trace_of(record), |tx| self.apply(tx, record))
    }

    /// Apply `records` in one transaction; any failure rolls back the whole batch.
    pub fn dispatch_batch(&self, records: &[EventRecord]) -> Result<()> {
        let Some(first) = records.first() else {
            return Ok(());
        };
        self.template.execute_traced(trace_of(first), |tx| {
            for record in records {
                self.apply(tx, record)?;
            }
            Ok(())
        })?;
        info!(count = records.len(), "restored batch");
        Ok(())
    }

    fn apply(&self, tx: &Tx<'_>, record: &EventRecord) -> Result<()> {
        let key = record.message_key()?;
        let strategy = self
            .strategies
            .iter()
            .find(|strategy| strategy.can_handle(&key, record))
            .ok_or_else(|| missing_strategy(&key))?;

        strategy.handle(tx, &key, record)?;
        debug!(
            key = %key,
            topic = %record.topic,
            partition = record.partition,
            offset = record.offset,
            "restored record"
        );
        Ok(())
    }
}

fn missing_strategy(key: &MessageKey) -> EventStoreError {
    EventStoreError::IllegalArgument(format!(
        "No strategy found to handle event of type: {}",
        key.type_name()
    ))
}

fn trace_of(record: &EventRecord) -> String {
    record
        .trace_id()
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}
