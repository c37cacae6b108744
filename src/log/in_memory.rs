use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;

use super::{LogReader, ProducerRecord, PublishError, Publisher, RecordMetadata};
use crate::message::EventRecord;

/// Thread-safe, partitioned, append-only log kept in memory.
///
/// Clones share the same records. Topics are created on first publish with the
/// partition count given at construction.
#[derive(Clone)]
pub struct InMemoryLog {
    topics: Arc<RwLock<HashMap<String, Vec<Vec<EventRecord>>>>>,
    partitions: u32,
}

impl InMemoryLog {
    pub fn new(partitions: u32) -> Self {
        Self {
            topics: Arc::new(RwLock::new(HashMap::new())),
            partitions: partitions.max(1),
        }
    }

    pub fn partitions(&self) -> u32 {
        self.partitions
    }

    /// Offset the next record of the partition will get.
    pub fn end_offset(&self, topic: &str, partition: i32) -> i64 {
        self.topics
            .read()
            .ok()
            .and_then(|topics| {
                topics
                    .get(topic)
                    .and_then(|partitions| partitions.get(partition as usize))
                    .map(|records| records.len() as i64)
            })
            .unwrap_or(0)
    }

    /// All records of a topic, partition by partition.
    pub fn records(&self, topic: &str) -> Vec<EventRecord> {
        self.topics
            .read()
            .ok()
            .and_then(|topics| topics.get(topic).map(|p| p.iter().flatten().cloned().collect()))
            .unwrap_or_default()
    }

    pub fn len(&self, topic: &str) -> usize {
        self.records(topic).len()
    }

    pub fn is_empty(&self, topic: &str) -> bool {
        self.len(topic) == 0
    }
}

impl Publisher for InMemoryLog {
    fn publish(&self, record: ProducerRecord) -> Result<RecordMetadata, PublishError> {
        if record.partition < 0 || record.partition as u32 >= self.partitions {
            return Err(PublishError::Rejected(format!(
                "partition {} does not exist on {} ({} partitions)",
                record.partition, record.topic, self.partitions
            )));
        }

        let mut topics = self
            .topics
            .write()
            .map_err(|_| PublishError::ConnectionFailed("log lock poisoned".into()))?;
        let partitions = topics
            .entry(record.topic.clone())
            .or_insert_with(|| vec![Vec::new(); self.partitions as usize]);
        let log = &mut partitions[record.partition as usize];
        let offset = log.len() as i64;

        log.push(EventRecord {
            topic: record.topic,
            partition: record.partition,
            offset,
            key: record.key,
            payload: record.payload,
            headers: record.headers,
            timestamp: Utc::now().timestamp_millis(),
        });

        Ok(RecordMetadata {
            partition: record.partition,
            offset,
        })
    }
}

impl LogReader for InMemoryLog {
    fn read(
        &self,
        topic: &str,
        partition: i32,
        from_offset: i64,
        max_records: usize,
    ) -> Result<Vec<EventRecord>, PublishError> {
        let topics = self
            .topics
            .read()
            .map_err(|_| PublishError::ConnectionFailed("log lock poisoned".into()))?;

        let records = topics
            .get(topic)
            .and_then(|partitions| partitions.get(partition as usize))
            .map(|records| {
                records
                    .iter()
                    .skip(from_offset.max(0) as usize)
                    .take(max_records)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(partition: i32, payload: &[u8]) -> ProducerRecord {
        ProducerRecord::new("topic", partition, b"key".to_vec(), Some(payload.to_vec()))
    }

    #[test]
    fn offsets_are_per_partition() {
        let log = InMemoryLog::new(2);

        assert_eq!(log.publish(record(0, b"a")).unwrap().offset, 0);
        assert_eq!(log.publish(record(1, b"b")).unwrap().offset, 0);
        assert_eq!(log.publish(record(0, b"c")).unwrap().offset, 1);

        assert_eq!(log.end_offset("topic", 0), 2);
        assert_eq!(log.end_offset("topic", 1), 1);
        assert_eq!(log.end_offset("other", 0), 0);
    }

    #[test]
    fn read_from_offset() {
        let log = InMemoryLog::new(1);
        for payload in [b"a", b"b", b"c"] {
            log.publish(record(0, payload)).unwrap();
        }

        let records = log.read("topic", 0, 1, 10).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].offset, 1);
        assert_eq!(records[0].payload.as_deref(), Some(&b"b"[..]));
    }

    #[test]
    fn unknown_partition_is_rejected() {
        let log = InMemoryLog::new(1);
        assert!(matches!(
            log.publish(record(3, b"a")),
            Err(PublishError::Rejected(_))
        ));
    }

    #[test]
    fn clones_share_records() {
        let log = InMemoryLog::new(1);
        let reader = log.clone();
        log.publish(record(0, b"a")).unwrap();

        assert_eq!(reader.len("topic"), 1);
    }
}
