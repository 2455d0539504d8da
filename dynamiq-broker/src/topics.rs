use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::errors::{BrokerError, Result};
use crate::queues::Queues;
use crate::topic::Topic;

#[cfg(test)]
#[path = "topics_test.rs"]
mod topics_test;

/// Topics known to this broker, kept in step with the cluster wide topic set.
#[derive(Debug)]
pub struct Topics {
    queues: Arc<Queues>,
    topics: RwLock<HashMap<String, Arc<Topic>>>,
}

impl Topics {
    pub fn new(queues: Arc<Queues>) -> Self {
        Topics {
            queues,
            topics: RwLock::new(HashMap::new()),
        }
    }

    pub fn queues(&self) -> &Arc<Queues> {
        &self.queues
    }

    pub async fn get(&self, topic_name: &str) -> Option<Arc<Topic>> {
        self.topics.read().await.get(topic_name).cloned()
    }

    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.topics.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    async fn materialize(&self, topic_name: &str) -> Result<Arc<Topic>> {
        if let Some(topic) = self.get(topic_name).await {
            return Ok(topic);
        }

        let topic = Arc::new(Topic::new(topic_name, Arc::clone(&self.queues)));
        topic.sync_config().await?;

        let mut topics = self.topics.write().await;
        let topic = topics
            .entry(topic_name.to_string())
            .or_insert_with(|| {
                debug!(topic = %topic_name, "materializing topic");
                topic
            });
        Ok(Arc::clone(topic))
    }

    /// Register a topic in the cluster and serve it locally.
    pub async fn create_topic(&self, topic_name: &str) -> Result<Arc<Topic>> {
        if topic_name.is_empty() {
            return Err(BrokerError::Configuration("topic name must not be empty".to_string()));
        }
        self.queues
            .context()
            .resources
            .topic
            .add_topic_name(topic_name)
            .await?;
        info!(topic = %topic_name, "topic created");
        self.materialize(topic_name).await
    }

    /// Remove a topic from the cluster along with its linked queue set. Linked queues survive.
    pub async fn delete_topic(&self, topic_name: &str) -> Result<()> {
        let resources = &self.queues.context().resources.topic;
        if !resources.topic_exists(topic_name).await? {
            return Err(BrokerError::TopicNotFound(topic_name.to_string()));
        }
        resources.remove_topic_name(topic_name).await?;

        let removed = self.topics.write().await.remove(topic_name);
        match removed {
            Some(topic) => topic.delete().await?,
            None => resources.destroy_topic(topic_name).await?,
        }
        info!(topic = %topic_name, "topic deleted");
        Ok(())
    }

    /// Drop `queue_name` from the local view of every topic.
    pub(crate) async fn forget_queue(&self, queue_name: &str) {
        let topics: Vec<Arc<Topic>> = self.topics.read().await.values().cloned().collect();
        for topic in topics {
            topic.forget_queue(queue_name).await;
        }
    }

    /// One reconciliation pass against the shared topic set. A failed read of the topic
    /// set skips the whole pass.
    pub async fn sync(&self) {
        let resources = &self.queues.context().resources.topic;
        let remote: BTreeSet<String> = match resources.topic_names().await {
            Ok(names) => names.into_iter().collect(),
            Err(e) => {
                warn!(error = %e, "failed to fetch topic names, skipping topic sync");
                return;
            }
        };
        let local: BTreeSet<String> = self.topics.read().await.keys().cloned().collect();

        for topic_name in remote.difference(&local) {
            if let Err(e) = self.materialize(topic_name).await {
                warn!(topic = %topic_name, error = %e, "failed to materialize topic");
            }
        }

        for topic_name in local.difference(&remote) {
            self.topics.write().await.remove(topic_name);
            info!(topic = %topic_name, "topic removed from cluster");
        }

        for topic_name in local.intersection(&remote) {
            let Some(topic) = self.get(topic_name).await else {
                continue;
            };
            if let Err(e) = topic.sync_config().await {
                warn!(topic = %topic_name, error = %e, "failed to sync topic settings");
            }
        }
    }
}
