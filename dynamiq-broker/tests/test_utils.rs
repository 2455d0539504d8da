//! Shared test utilities for dynamiq-broker integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use dynamiq_broker::{BrokerContext, BrokerService, QueueSettings, Resources};
use dynamiq_core::compression::Lz4Compressor;
use dynamiq_core::membership::{Peer, StaticMembership};
use dynamiq_core::message::{MessageId, StoredObject};
use dynamiq_core::metadata::{self, ConfigStore, MapOp, MemoryConfigStore, MetadataError, ReplicatedMap};
use dynamiq_core::stats::MemoryStats;
use dynamiq_core::storage::{self, Fetched, MemoryMessageStore, MessageStore, StorageError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Message store that can be told to fail range queries or puts.
#[derive(Debug, Clone, Default)]
pub struct FlakyMessageStore {
    pub inner: MemoryMessageStore,
    fail_range_queries: Arc<AtomicBool>,
    fail_puts: Arc<AtomicBool>,
}

impl FlakyMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_range_queries(&self, fail: bool) {
        self.fail_range_queries.store(fail, Ordering::SeqCst);
    }

    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl MessageStore for FlakyMessageStore {
    async fn put(&self, bucket: &str, id: MessageId, object: StoredObject) -> storage::Result<()> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("puts switched off".to_string()));
        }
        self.inner.put(bucket, id, object).await
    }

    async fn get(&self, bucket: &str, id: MessageId) -> storage::Result<Fetched> {
        self.inner.get(bucket, id).await
    }

    async fn delete(&self, bucket: &str, id: MessageId) -> storage::Result<()> {
        self.inner.delete(bucket, id).await
    }

    async fn range_query(
        &self,
        bucket: &str,
        index: &str,
        low: u64,
        high: u64,
        limit: usize,
    ) -> storage::Result<Vec<MessageId>> {
        if self.fail_range_queries.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("range queries switched off".to_string()));
        }
        self.inner.range_query(bucket, index, low, high, limit).await
    }
}

/// Config store that rejects writes to keys starting with a configured prefix.
#[derive(Debug, Clone, Default)]
pub struct FlakyConfigStore {
    pub inner: MemoryConfigStore,
    failing_prefix: Arc<Mutex<Option<String>>>,
}

impl FlakyConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes_to(&self, prefix: Option<&str>) {
        if let Ok(mut failing) = self.failing_prefix.lock() {
            *failing = prefix.map(str::to_string);
        }
    }

    fn check_write(&self, key: &str) -> metadata::Result<()> {
        let failing = self.failing_prefix.lock().ok().and_then(|p| p.clone());
        match failing {
            Some(prefix) if key.starts_with(&prefix) => Err(MetadataError::Unavailable(format!(
                "writes to {} switched off",
                key
            ))),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl ConfigStore for FlakyConfigStore {
    async fn fetch_map(&self, bucket: &str, key: &str) -> metadata::Result<Option<ReplicatedMap>> {
        self.inner.fetch_map(bucket, key).await
    }

    async fn store_map(&self, bucket: &str, key: &str, ops: &[MapOp]) -> metadata::Result<()> {
        self.check_write(key)?;
        self.inner.store_map(bucket, key, ops).await
    }

    async fn destroy_map(&self, bucket: &str, key: &str) -> metadata::Result<()> {
        self.check_write(key)?;
        self.inner.destroy_map(bucket, key).await
    }
}

/// A broker node over shared stores, with handles for inspection.
pub struct TestNode {
    pub service: BrokerService,
    pub stats: MemoryStats,
    pub membership: Arc<StaticMembership>,
}

/// Settings with a short visibility timeout so consecutive reads do not stall.
pub fn fast_settings(min: u32, max: u32) -> QueueSettings {
    QueueSettings {
        min_partitions: min,
        max_partitions: max,
        max_partition_age: Duration::from_secs(600),
        visibility_timeout: Duration::from_millis(20),
        compressed_messages: false,
    }
}

pub fn build_node(
    name: &str,
    message_store: Arc<dyn MessageStore>,
    config_store: Arc<dyn ConfigStore>,
) -> TestNode {
    let stats = MemoryStats::new();
    let membership = Arc::new(StaticMembership::new(Peer::new(
        format!("{}:7946", name),
        "127.0.0.1",
    )));

    let ctx = BrokerContext {
        message_store,
        resources: Resources::new(config_store),
        compressor: Arc::new(Lz4Compressor),
        stats: Arc::new(stats.clone()),
        membership: membership.clone(),
        lease_timeout: Duration::from_millis(250),
        queue_defaults: fast_settings(1, 4),
    };

    TestNode {
        service: BrokerService::new(ctx),
        stats,
        membership,
    }
}

pub fn build_standalone(name: &str) -> (TestNode, MemoryMessageStore, MemoryConfigStore) {
    let store = MemoryMessageStore::new();
    let config = MemoryConfigStore::new();
    let node = build_node(name, Arc::new(store.clone()), Arc::new(config.clone()));
    (node, store, config)
}

/// Poll `check` until it holds or `limit` elapses.
pub async fn eventually<F, Fut>(limit: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if check().await {
            return true;
        }
        sleep(Duration::from_millis(10)).await;
    }
    check().await
}
