use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::{Fetched, MessageStore, Result, StorageError, ID_INDEX};
use crate::message::{MessageId, StoredObject};

/// MemoryMessageStore keeps every bucket in an ordered map so range queries walk
/// the id index directly. Values written to an occupied key become siblings.
/// SHOULD BE USED ONLY FOR TESTING PURPOSES and single node runs
#[derive(Debug, Clone, Default)]
pub struct MemoryMessageStore {
    inner: Arc<DashMap<String, BTreeMap<u64, Vec<StoredObject>>>>,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        MemoryMessageStore {
            inner: Arc::new(DashMap::new()),
        }
    }

    /// Number of keys currently held in `bucket`, siblings counted once.
    pub fn key_count(&self, bucket: &str) -> usize {
        self.inner.get(bucket).map(|b| b.len()).unwrap_or(0)
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn put(&self, bucket: &str, id: MessageId, object: StoredObject) -> Result<()> {
        let mut bmap = self.inner.entry(bucket.to_owned()).or_default();
        bmap.entry(id.as_u64()).or_default().push(object);
        Ok(())
    }

    async fn get(&self, bucket: &str, id: MessageId) -> Result<Fetched> {
        let Some(bmap) = self.inner.get(bucket) else {
            return Ok(Fetched::Missing);
        };

        let fetched = match bmap.get(&id.as_u64()) {
            None => Fetched::Missing,
            Some(values) if values.is_empty() => Fetched::Missing,
            Some(values) if values.len() == 1 => Fetched::Object(values[0].clone()),
            Some(values) => Fetched::Conflict(values.clone()),
        };
        Ok(fetched)
    }

    async fn delete(&self, bucket: &str, id: MessageId) -> Result<()> {
        let removed = self
            .inner
            .get_mut(bucket)
            .and_then(|mut bmap| bmap.remove(&id.as_u64()));

        match removed {
            Some(_) => Ok(()),
            None => Err(StorageError::NotFound(format!("{}/{}", bucket, id))),
        }
    }

    async fn range_query(
        &self,
        bucket: &str,
        index: &str,
        low: u64,
        high: u64,
        limit: usize,
    ) -> Result<Vec<MessageId>> {
        if index != ID_INDEX {
            return Err(StorageError::InvalidArguments(format!(
                "unknown index: {}",
                index
            )));
        }
        if low > high {
            return Err(StorageError::InvalidArguments(format!(
                "empty range: {} > {}",
                low, high
            )));
        }

        let ids = match self.inner.get(bucket) {
            Some(bmap) => bmap
                .range(low..=high)
                .take(limit)
                .map(|(id, _)| MessageId::new(*id))
                .collect(),
            None => Vec::new(),
        };
        Ok(ids)
    }
}
