use std::collections::HashMap;
use std::sync::RwLock;

use tracing::error;

use crate::error::{EventStoreError, Result};

/// Highest offset per topic partition the restore side may process.
#[derive(Debug, Default)]
pub struct OffsetSynchronizationManager {
    watermarks: RwLock<HashMap<(String, i32), i64>>,
}

impl OffsetSynchronizationManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_max_topic_partition_offset(
        &self,
        topic: impl Into<String>,
        partition: i32,
        offset: i64,
    ) -> Result<()> {
        let mut watermarks = self
            .watermarks
            .write()
            .map_err(|_| EventStoreError::LockPoisoned("offset watermarks"))?;
        watermarks.insert((topic.into(), partition), offset);
        Ok(())
    }

    pub fn max_allowed_offset(&self, topic: &str, partition: i32) -> Result<Option<i64>> {
        let watermarks = self
            .watermarks
            .read()
            .map_err(|_| EventStoreError::LockPoisoned("offset watermarks"))?;
        Ok(watermarks.get(&(topic.to_string(), partition)).copied())
    }

    /// Fails when `offset` is above the watermark or no watermark was set.
    pub fn check(&self, topic: &str, partition: i32, offset: i64) -> Result<()> {
        let max_allowed = self.max_allowed_offset(topic, partition)?;
        match max_allowed {
            Some(max) if offset <= max => Ok(()),
            _ => {
                error!(
                    topic,
                    partition,
                    offset,
                    ?max_allowed,
                    "restore is ahead of the online service"
                );
                Err(EventStoreError::RestoreServiceAheadOfOnlineService {
                    topic: topic.to_string(),
                    partition,
                    offset,
                    max_allowed,
                })
            }
        }
    }
}
