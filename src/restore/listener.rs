use std::sync::Arc;

use super::{OffsetSynchronizationManager, RestoreDbStrategyDispatcher};
use crate::consumer::Acknowledgment;
use crate::error::Result;
use crate::message::EventRecord;

/// Consumer callback of a restore instance.
///
/// A record is acknowledged only after it passed the watermark and was
/// committed; otherwise it stays on the partition for the next poll.
#[derive(Clone)]
pub struct RestoreEventListener {
    offsets: Arc<OffsetSynchronizationManager>,
    dispatcher: RestoreDbStrategyDispatcher,
}

impl RestoreEventListener {
    pub fn new(offsets: Arc<OffsetSynchronizationManager>, dispatcher: RestoreDbStrategyDispatcher) -> Self {
        Self { offsets, dispatcher }
    }

    pub fn listen(&self, record: &EventRecord, ack: &Acknowledgment) -> Result<()> {
        self.offsets
            .check(&record.topic, record.partition, record.offset)?;
        self.dispatcher.dispatch(record)?;
        ack.acknowledge();
        Ok(())
    }
}
