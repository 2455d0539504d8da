use dynamiq_core::metadata::{ConfigStore, MapOp};
use std::collections::BTreeSet;
use std::sync::Arc;

use super::{topic_config_key, CONFIG_BUCKET, TOPICS_CONFIG_KEY, TOPIC_QUEUE_SET, TOPIC_SET};
use crate::errors::Result;

/// Topic entries of the shared configuration store.
#[derive(Clone)]
pub struct TopicResources {
    store: Arc<dyn ConfigStore>,
}

impl TopicResources {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        TopicResources { store }
    }

    pub async fn topic_names(&self) -> Result<Vec<String>> {
        let map = self.store.fetch_map(CONFIG_BUCKET, TOPICS_CONFIG_KEY).await?;
        Ok(map.map(|m| m.set_members(TOPIC_SET)).unwrap_or_default())
    }

    pub async fn topic_exists(&self, topic_name: &str) -> Result<bool> {
        let map = self.store.fetch_map(CONFIG_BUCKET, TOPICS_CONFIG_KEY).await?;
        Ok(map.map(|m| m.set_contains(TOPIC_SET, topic_name)).unwrap_or(false))
    }

    pub async fn add_topic_name(&self, topic_name: &str) -> Result<()> {
        self.store
            .store_map(CONFIG_BUCKET, TOPICS_CONFIG_KEY, &[MapOp::add_to_set(TOPIC_SET, topic_name)])
            .await?;
        Ok(())
    }

    pub async fn remove_topic_name(&self, topic_name: &str) -> Result<()> {
        self.store
            .store_map(
                CONFIG_BUCKET,
                TOPICS_CONFIG_KEY,
                &[MapOp::remove_from_set(TOPIC_SET, topic_name)],
            )
            .await?;
        Ok(())
    }

    /// Queues linked to the topic, empty when the topic map does not exist.
    pub async fn fetch_topic_queues(&self, topic_name: &str) -> Result<BTreeSet<String>> {
        let map = self
            .store
            .fetch_map(CONFIG_BUCKET, &topic_config_key(topic_name))
            .await?;
        Ok(map
            .map(|m| m.set_members(TOPIC_QUEUE_SET).into_iter().collect())
            .unwrap_or_default())
    }

    pub async fn add_topic_queue(&self, topic_name: &str, queue_name: &str) -> Result<()> {
        self.store
            .store_map(
                CONFIG_BUCKET,
                &topic_config_key(topic_name),
                &[MapOp::add_to_set(TOPIC_QUEUE_SET, queue_name)],
            )
            .await?;
        Ok(())
    }

    pub async fn remove_topic_queue(&self, topic_name: &str, queue_name: &str) -> Result<()> {
        self.store
            .store_map(
                CONFIG_BUCKET,
                &topic_config_key(topic_name),
                &[MapOp::remove_from_set(TOPIC_QUEUE_SET, queue_name)],
            )
            .await?;
        Ok(())
    }

    pub async fn destroy_topic(&self, topic_name: &str) -> Result<()> {
        self.store
            .destroy_map(CONFIG_BUCKET, &topic_config_key(topic_name))
            .await?;
        Ok(())
    }
}
