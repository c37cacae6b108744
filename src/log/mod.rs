//! The partitioned log outbox records are published to and consumers read from.

mod in_memory;
mod publisher;

pub use in_memory::InMemoryLog;
pub use publisher::{LogReader, ProducerRecord, PublishError, Publisher, RecordMetadata};
