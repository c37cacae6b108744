use thiserror::Error;

use crate::message::EventRecord;

/// A record about to be written to the log.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProducerRecord {
    pub topic: String,
    pub partition: i32,
    pub key: Vec<u8>,
    /// `None` publishes a tombstone.
    pub payload: Option<Vec<u8>>,
    pub headers: Vec<(String, String)>,
}

impl ProducerRecord {
    pub fn new(topic: impl Into<String>, partition: i32, key: Vec<u8>, payload: Option<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            partition,
            key,
            payload,
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }
}

/// Where the log stored a published record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecordMetadata {
    pub partition: i32,
    pub offset: i64,
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
    #[error("record rejected: {0}")]
    Rejected(String),
    #[error("publish timeout")]
    Timeout,
}

/// Writes records to a log.
///
/// Implementations might include a Kafka producer; [`InMemoryLog`](super::InMemoryLog)
/// is provided for tests and single-process setups.
pub trait Publisher: Send + Sync {
    fn publish(&self, record: ProducerRecord) -> Result<RecordMetadata, PublishError>;
}

/// Reads records of one partition starting at an offset.
pub trait LogReader: Send + Sync {
    fn read(
        &self,
        topic: &str,
        partition: i32,
        from_offset: i64,
        max_records: usize,
    ) -> Result<Vec<EventRecord>, PublishError>;
}
