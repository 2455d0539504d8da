use super::{
    errors::Result,
    store::{ConfigStore, MapOp, ReplicatedMap},
    MetadataError,
};

use async_trait::async_trait;
use dashmap::{mapref::one::RefMut, DashMap};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// MemoryConfigStore is a simple in-memory map store that implements the ConfigStore trait.
/// SHOULD BE USED ONLY FOR TESTING PURPOSES and single node runs
#[derive(Debug, Clone, Default)]
pub struct MemoryConfigStore {
    inner: Arc<DashMap<String, BTreeMap<String, ReplicatedMap>>>,
    // simulates a network partition from the store when set
    unavailable: Arc<AtomicBool>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        MemoryConfigStore {
            inner: Arc::new(DashMap::new()),
            unavailable: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Make every following call fail with `Unavailable` until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(MetadataError::Unavailable(
                "memory config store switched off".to_string(),
            ));
        }
        Ok(())
    }

    fn get_bucket(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<RefMut<'_, String, BTreeMap<String, ReplicatedMap>>> {
        if bucket.is_empty() || key.is_empty() {
            return Err(MetadataError::InvalidArguments(format!(
                "bucket and key must be set: {}/{}",
                bucket, key
            )));
        }

        let bmap = self.inner.entry(bucket.to_owned()).or_default();
        Ok(bmap)
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn fetch_map(&self, bucket: &str, key: &str) -> Result<Option<ReplicatedMap>> {
        self.check_available()?;
        let bmap = self.get_bucket(bucket, key)?;
        Ok(bmap.get(key).cloned())
    }

    async fn store_map(&self, bucket: &str, key: &str, ops: &[MapOp]) -> Result<()> {
        self.check_available()?;
        let mut bmap = self.get_bucket(bucket, key)?;
        let map = bmap.entry(key.to_owned()).or_default();
        for op in ops {
            map.apply(op);
        }
        Ok(())
    }

    async fn destroy_map(&self, bucket: &str, key: &str) -> Result<()> {
        self.check_available()?;
        let mut bmap = self.get_bucket(bucket, key)?;
        let _value = bmap.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Tests basic map operations: store, fetch and destroy
    /// Expected: ops accumulate on the same map and destroy removes it
    #[tokio::test]
    async fn test_store_fetch_destroy() -> Result<()> {
        let store = MemoryConfigStore::new();

        assert!(store.fetch_map("config", "queues_config").await?.is_none());

        store
            .store_map("config", "queues_config", &[MapOp::add_to_set("queues", "a")])
            .await?;
        store
            .store_map("config", "queues_config", &[MapOp::add_to_set("queues", "b")])
            .await?;

        let map = store.fetch_map("config", "queues_config").await?.unwrap();
        assert_eq!(map.set_members("queues"), vec!["a", "b"]);

        store.destroy_map("config", "queues_config").await?;
        assert!(store.fetch_map("config", "queues_config").await?.is_none());
        Ok(())
    }

    /// Tests that empty bucket or key names are rejected
    #[tokio::test]
    async fn test_invalid_address() {
        let store = MemoryConfigStore::new();
        let err = store.fetch_map("", "key").await.unwrap_err();
        assert!(matches!(err, MetadataError::InvalidArguments(_)));
        let err = store.store_map("config", "", &[]).await.unwrap_err();
        assert!(matches!(err, MetadataError::InvalidArguments(_)));
    }

    /// Tests the outage switch used to simulate transient failures
    #[tokio::test]
    async fn test_unavailable_store_fails_every_call() -> Result<()> {
        let store = MemoryConfigStore::new();
        store.set_unavailable(true);
        let err = store.fetch_map("config", "queues_config").await.unwrap_err();
        assert!(matches!(err, MetadataError::Unavailable(_)));

        store.set_unavailable(false);
        assert!(store.fetch_map("config", "queues_config").await?.is_none());
        Ok(())
    }
}
