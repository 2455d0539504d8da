use dynamiq_core::metadata::{ConfigStore, MapOp, ReplicatedMap};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use super::{queue_config_key, CONFIG_BUCKET, QUEUES_CONFIG_KEY, QUEUE_SET};
use crate::errors::Result;

pub const MIN_PARTITIONS: &str = "min_partitions";
pub const MAX_PARTITIONS: &str = "max_partitions";
pub const MAX_PARTITION_AGE_MS: &str = "max_partition_age_ms";
pub const VISIBILITY_TIMEOUT_MS: &str = "visibility_timeout_ms";
pub const COMPRESSED_MESSAGES: &str = "compressed_messages";

/// Per queue settings, read from the queue's replicated map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSettings {
    /// Partition count a queue starts with and never shrinks below
    pub min_partitions: u32,
    /// Partition count the lease manager never grows past
    pub max_partitions: u32,
    /// Partitions that produced nothing for this long are dropped above the minimum
    pub max_partition_age: Duration,
    /// How long a partition that returned messages stays locked after release
    pub visibility_timeout: Duration,
    /// Compress message bodies on put
    pub compressed_messages: bool,
}

impl Default for QueueSettings {
    fn default() -> Self {
        QueueSettings {
            min_partitions: 1,
            max_partitions: 10,
            max_partition_age: Duration::from_secs(600),
            visibility_timeout: Duration::from_secs(5),
            compressed_messages: false,
        }
    }
}

impl QueueSettings {
    /// Build the settings from a replicated map, falling back to `defaults` for
    /// registers that are absent or unparseable.
    pub fn from_map(queue_name: &str, map: Option<&ReplicatedMap>, defaults: &QueueSettings) -> Self {
        let Some(map) = map else {
            return defaults.clone().normalized();
        };

        QueueSettings {
            min_partitions: parse_register(queue_name, map, MIN_PARTITIONS, defaults.min_partitions),
            max_partitions: parse_register(queue_name, map, MAX_PARTITIONS, defaults.max_partitions),
            max_partition_age: Duration::from_millis(parse_register(
                queue_name,
                map,
                MAX_PARTITION_AGE_MS,
                defaults.max_partition_age.as_millis() as u64,
            )),
            visibility_timeout: Duration::from_millis(parse_register(
                queue_name,
                map,
                VISIBILITY_TIMEOUT_MS,
                defaults.visibility_timeout.as_millis() as u64,
            )),
            compressed_messages: parse_register(
                queue_name,
                map,
                COMPRESSED_MESSAGES,
                defaults.compressed_messages,
            ),
        }
        .normalized()
    }

    pub fn to_ops(&self) -> Vec<MapOp> {
        vec![
            MapOp::set_register(MIN_PARTITIONS, self.min_partitions),
            MapOp::set_register(MAX_PARTITIONS, self.max_partitions),
            MapOp::set_register(MAX_PARTITION_AGE_MS, self.max_partition_age.as_millis()),
            MapOp::set_register(VISIBILITY_TIMEOUT_MS, self.visibility_timeout.as_millis()),
            MapOp::set_register(COMPRESSED_MESSAGES, self.compressed_messages),
        ]
    }

    // at least one partition, and max never below min
    pub fn normalized(mut self) -> Self {
        self.min_partitions = self.min_partitions.max(1);
        self.max_partitions = self.max_partitions.max(self.min_partitions);
        self
    }
}

fn parse_register<T: FromStr + Copy>(queue_name: &str, map: &ReplicatedMap, name: &str, default: T) -> T {
    match map.register(name) {
        None => default,
        Some(raw) => match raw.parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                warn!(queue = %queue_name, register = %name, value = %raw, "unparseable queue setting, using default");
                default
            }
        },
    }
}

/// Queue entries of the shared configuration store.
#[derive(Clone)]
pub struct QueueResources {
    store: Arc<dyn ConfigStore>,
}

impl QueueResources {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        QueueResources { store }
    }

    /// Every queue name registered in the cluster. A missing map means no queue was created yet.
    pub async fn queue_names(&self) -> Result<Vec<String>> {
        let map = self.store.fetch_map(CONFIG_BUCKET, QUEUES_CONFIG_KEY).await?;
        Ok(map.map(|m| m.set_members(QUEUE_SET)).unwrap_or_default())
    }

    pub async fn queue_exists(&self, queue_name: &str) -> Result<bool> {
        let map = self.store.fetch_map(CONFIG_BUCKET, QUEUES_CONFIG_KEY).await?;
        Ok(map.map(|m| m.set_contains(QUEUE_SET, queue_name)).unwrap_or(false))
    }

    pub async fn add_queue_name(&self, queue_name: &str) -> Result<()> {
        self.store
            .store_map(CONFIG_BUCKET, QUEUES_CONFIG_KEY, &[MapOp::add_to_set(QUEUE_SET, queue_name)])
            .await?;
        Ok(())
    }

    pub async fn remove_queue_name(&self, queue_name: &str) -> Result<()> {
        self.store
            .store_map(
                CONFIG_BUCKET,
                QUEUES_CONFIG_KEY,
                &[MapOp::remove_from_set(QUEUE_SET, queue_name)],
            )
            .await?;
        Ok(())
    }

    pub async fn fetch_queue_settings(
        &self,
        queue_name: &str,
        defaults: &QueueSettings,
    ) -> Result<QueueSettings> {
        let map = self
            .store
            .fetch_map(CONFIG_BUCKET, &queue_config_key(queue_name))
            .await?;
        Ok(QueueSettings::from_map(queue_name, map.as_ref(), defaults))
    }

    pub async fn store_queue_settings(&self, queue_name: &str, settings: &QueueSettings) -> Result<()> {
        self.store
            .store_map(CONFIG_BUCKET, &queue_config_key(queue_name), &settings.to_ops())
            .await?;
        Ok(())
    }

    pub async fn destroy_queue_settings(&self, queue_name: &str) -> Result<()> {
        self.store
            .destroy_map(CONFIG_BUCKET, &queue_config_key(queue_name))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_round_trip_through_registers() {
        let settings = QueueSettings {
            min_partitions: 3,
            max_partitions: 12,
            max_partition_age: Duration::from_secs(60),
            visibility_timeout: Duration::from_millis(1500),
            compressed_messages: true,
        };
        let mut map = ReplicatedMap::new();
        for op in settings.to_ops() {
            map.apply(&op);
        }

        let read = QueueSettings::from_map("billing", Some(&map), &QueueSettings::default());
        assert_eq!(read, settings);
    }

    #[test]
    fn unparseable_registers_fall_back_to_defaults() {
        let mut map = ReplicatedMap::new();
        map.apply(&MapOp::set_register(MIN_PARTITIONS, "three"));
        map.apply(&MapOp::set_register(COMPRESSED_MESSAGES, "true"));

        let defaults = QueueSettings::default();
        let read = QueueSettings::from_map("billing", Some(&map), &defaults);
        assert_eq!(read.min_partitions, defaults.min_partitions);
        assert!(read.compressed_messages);
    }

    #[test]
    fn max_partitions_never_below_min() {
        let mut map = ReplicatedMap::new();
        map.apply(&MapOp::set_register(MIN_PARTITIONS, 0));
        let read = QueueSettings::from_map("billing", Some(&map), &QueueSettings::default());
        assert_eq!(read.min_partitions, 1);

        map.apply(&MapOp::set_register(MIN_PARTITIONS, 8));
        map.apply(&MapOp::set_register(MAX_PARTITIONS, 4));
        let read = QueueSettings::from_map("billing", Some(&map), &QueueSettings::default());
        assert_eq!((read.min_partitions, read.max_partitions), (8, 8));
    }
}
