use std::collections::HashSet;
use std::time::Duration;

use tracing::{debug, warn};

use super::{OutboxRecord, OutboxRepository};
use crate::config::OutboxConfig;
use crate::error::Result;
use crate::log::Publisher;

/// Result of a batch drain operation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainResult {
    pub claimed: usize,
    pub completed: usize,
    pub released: usize,
    pub failed: usize,
    /// Claimed but returned untouched because an earlier record of the same
    /// partition did not go out.
    pub deferred: usize,
}

impl DrainResult {
    fn add(&mut self, other: DrainResult) {
        self.claimed += other.claimed;
        self.completed += other.completed;
        self.released += other.released;
        self.failed += other.failed;
        self.deferred += other.deferred;
    }
}

/// Result of processing a single record.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProcessOneResult {
    pub completed: bool,
    pub released: bool,
    pub failed: bool,
}

/// Publishes outbox records to the log after their transaction committed.
pub struct OutboxWorker<P> {
    repository: OutboxRepository,
    publisher: P,
    topic: String,
    worker_id: String,
    batch_size: usize,
    lease: Duration,
    max_attempts: u32,
}

impl<P> OutboxWorker<P> {
    pub fn new(repository: OutboxRepository, publisher: P, topic: impl Into<String>) -> Self {
        Self {
            repository,
            publisher,
            topic: topic.into(),
            worker_id: format!("outbox-worker-{}", std::process::id()),
            batch_size: 100,
            lease: Duration::from_secs(60),
            max_attempts: 5,
        }
    }

    pub fn from_config(repository: OutboxRepository, publisher: P, config: &OutboxConfig) -> Self {
        Self::new(repository, publisher, config.topic.clone())
            .with_worker_id(config.worker_id.clone())
            .with_batch_size(config.batch_size)
            .with_lease(config.lease())
            .with_max_attempts(config.max_attempts)
    }

    /// Set the worker ID (used for lease tracking).
    pub fn with_worker_id(mut self, id: impl Into<String>) -> Self {
        self.worker_id = id.into();
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    /// Set the maximum number of attempts before failing a record.
    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = max.max(1);
        self
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    pub fn repository(&self) -> &OutboxRepository {
        &self.repository
    }
}

impl<P: Publisher> OutboxWorker<P> {
    /// Publish one claimed record and record the outcome.
    pub fn process_record(&self, record: &OutboxRecord) -> Result<ProcessOneResult> {
        match self.publisher.publish(record.to_producer_record(&self.topic)) {
            Ok(metadata) => {
                self.repository.complete(record.sequence_id)?;
                debug!(
                    sequence_id = record.sequence_id,
                    partition = metadata.partition,
                    offset = metadata.offset,
                    "published outbox record"
                );
                Ok(ProcessOneResult {
                    completed: true,
                    ..Default::default()
                })
            }
            Err(err) => {
                let error_msg = err.to_string();
                if record.attempts >= self.max_attempts {
                    warn!(
                        sequence_id = record.sequence_id,
                        attempts = record.attempts,
                        error = %error_msg,
                        "giving up on outbox record"
                    );
                    self.repository.fail(record.sequence_id, &error_msg)?;
                    Ok(ProcessOneResult {
                        failed: true,
                        ..Default::default()
                    })
                } else {
                    warn!(
                        sequence_id = record.sequence_id,
                        attempts = record.attempts,
                        error = %error_msg,
                        "publishing outbox record failed, will retry"
                    );
                    self.repository.release(record.sequence_id, &error_msg)?;
                    Ok(ProcessOneResult {
                        released: true,
                        ..Default::default()
                    })
                }
            }
        }
    }

    /// Claim one batch and publish it in sequence order.
    pub fn drain_once(&self) -> Result<DrainResult> {
        let claimed = self
            .repository
            .claim(&self.worker_id, self.batch_size, self.lease)?;

        let mut result = DrainResult {
            claimed: claimed.len(),
            ..Default::default()
        };
        let mut blocked_partitions = HashSet::new();

        for record in &claimed {
            if blocked_partitions.contains(&record.partition) {
                self.repository.unclaim(record.sequence_id)?;
                result.deferred += 1;
                continue;
            }

            let processed = self.process_record(record)?;
            if processed.completed {
                result.completed += 1;
            }
            if processed.released {
                result.released += 1;
                blocked_partitions.insert(record.partition);
            }
            if processed.failed {
                result.failed += 1;
                blocked_partitions.insert(record.partition);
            }
        }

        Ok(result)
    }

    /// Drain until a batch publishes nothing.
    pub fn drain(&self) -> Result<DrainResult> {
        let mut total = DrainResult::default();
        loop {
            let batch = self.drain_once()?;
            total.add(batch);
            if batch.completed == 0 && batch.failed == 0 {
                return Ok(total);
            }
        }
    }
}
