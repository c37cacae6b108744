use tracing::{debug, warn};

use super::Acknowledgment;
use crate::error::Result;
use crate::log::LogReader;
use crate::message::EventRecord;

/// Sequential consumer of one topic partition.
///
/// The position only moves past a record once the handler acknowledged it, so
/// failed or unacknowledged records are delivered again on the next poll.
#[derive(Debug, Clone)]
pub struct PartitionConsumer {
    topic: String,
    partition: i32,
    position: i64,
    max_poll_records: usize,
}

impl PartitionConsumer {
    pub fn new(topic: impl Into<String>, partition: i32) -> Self {
        Self {
            topic: topic.into(),
            partition,
            position: 0,
            max_poll_records: 500,
        }
    }

    pub fn starting_at(mut self, offset: i64) -> Self {
        self.position = offset;
        self
    }

    pub fn with_max_poll_records(mut self, max: usize) -> Self {
        self.max_poll_records = max.max(1);
        self
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn partition(&self) -> i32 {
        self.partition
    }

    /// Offset of the next record to be delivered.
    pub fn position(&self) -> i64 {
        self.position
    }

    /// Deliver available records to `handler` in offset order; returns how many
    /// were acknowledged.
    pub fn poll<R, F>(&mut self, reader: &R, mut handler: F) -> Result<usize>
    where
        R: LogReader + ?Sized,
        F: FnMut(&EventRecord, &Acknowledgment) -> Result<()>,
    {
        let records = reader.read(&self.topic, self.partition, self.position, self.max_poll_records)?;
        let mut acknowledged = 0;

        for record in &records {
            let ack = Acknowledgment::new();
            if let Err(err) = handler(record, &ack) {
                warn!(
                    topic = %self.topic,
                    partition = self.partition,
                    offset = record.offset,
                    error = %err,
                    "record not processed, pausing partition"
                );
                return Err(err);
            }
            if !ack.is_acknowledged() {
                debug!(offset = record.offset, "record not acknowledged, will be redelivered");
                break;
            }
            self.position = record.offset + 1;
            acknowledged += 1;
        }

        Ok(acknowledged)
    }
}
