use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::context::BrokerContext;
use crate::errors::{BrokerError, Result};
use crate::queue::Queue;
use crate::resources::QueueSettings;
use crate::topics::Topics;

#[cfg(test)]
#[path = "queues_test.rs"]
mod queues_test;

/// Queues served by this broker, kept in step with the cluster wide queue set.
#[derive(Debug)]
pub struct Queues {
    ctx: Arc<BrokerContext>,
    queues: RwLock<HashMap<String, Arc<Queue>>>,
}

impl Queues {
    pub fn new(ctx: Arc<BrokerContext>) -> Self {
        Queues {
            ctx,
            queues: RwLock::new(HashMap::new()),
        }
    }

    pub fn context(&self) -> &Arc<BrokerContext> {
        &self.ctx
    }

    pub async fn get(&self, queue_name: &str) -> Option<Arc<Queue>> {
        self.queues.read().await.get(queue_name).cloned()
    }

    /// Names of the locally materialized queues, sorted.
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.queues.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Whether the queue is registered in the cluster, materialized here or not.
    pub async fn exists(&self, queue_name: &str) -> Result<bool> {
        self.ctx.resources.queue.queue_exists(queue_name).await
    }

    /// The local queue, materialized from the shared configuration on first use.
    pub async fn get_or_init(&self, queue_name: &str) -> Result<Arc<Queue>> {
        if let Some(queue) = self.get(queue_name).await {
            return Ok(queue);
        }

        if !self.exists(queue_name).await? {
            return Err(BrokerError::QueueNotFound(queue_name.to_string()));
        }
        let settings = self
            .ctx
            .resources
            .queue
            .fetch_queue_settings(queue_name, &self.ctx.queue_defaults)
            .await?;
        Ok(self.materialize(queue_name, settings).await)
    }

    // a concurrent materialization of the same name wins, ours is dropped
    async fn materialize(&self, queue_name: &str, settings: QueueSettings) -> Arc<Queue> {
        let mut queues = self.queues.write().await;
        let queue = queues
            .entry(queue_name.to_string())
            .or_insert_with(|| {
                debug!(queue = %queue_name, "materializing queue");
                Arc::new(Queue::new(queue_name, settings, Arc::clone(&self.ctx)))
            });
        Arc::clone(queue)
    }

    /// Register a queue in the cluster with the given settings and serve it locally.
    pub async fn create_queue(&self, queue_name: &str, settings: QueueSettings) -> Result<Arc<Queue>> {
        if queue_name.is_empty() {
            return Err(BrokerError::Configuration("queue name must not be empty".to_string()));
        }
        let settings = settings.normalized();
        let resources = &self.ctx.resources.queue;
        resources.store_queue_settings(queue_name, &settings).await?;
        resources.add_queue_name(queue_name).await?;

        info!(queue = %queue_name, "queue created");
        Ok(self.materialize(queue_name, settings).await)
    }

    /// Remove a queue from the cluster. The queue is unlinked from every topic before
    /// anything else is touched.
    pub async fn delete_queue(&self, queue_name: &str, topics: &Topics) -> Result<()> {
        self.strip_from_topics(queue_name, topics).await?;

        let resources = &self.ctx.resources.queue;
        resources.remove_queue_name(queue_name).await?;
        resources.destroy_queue_settings(queue_name).await?;

        self.teardown(queue_name).await;
        info!(queue = %queue_name, "queue deleted");
        Ok(())
    }

    async fn strip_from_topics(&self, queue_name: &str, topics: &Topics) -> Result<()> {
        let topic_resources = &self.ctx.resources.topic;
        for topic_name in topic_resources.topic_names().await? {
            topic_resources
                .remove_topic_queue(&topic_name, queue_name)
                .await?;
        }
        topics.forget_queue(queue_name).await;
        Ok(())
    }

    async fn teardown(&self, queue_name: &str) {
        if let Some(queue) = self.queues.write().await.remove(queue_name) {
            queue.close();
        }
    }

    /// One reconciliation pass against the shared queue set.
    ///
    /// New names are materialized, names gone from the cluster are unlinked from every
    /// topic and closed, the remaining queues reload their settings. A failed read of the
    /// queue set skips the whole pass.
    pub async fn sync(&self, topics: &Topics) {
        let remote: BTreeSet<String> = match self.ctx.resources.queue.queue_names().await {
            Ok(names) => names.into_iter().collect(),
            Err(e) => {
                warn!(error = %e, "failed to fetch queue names, skipping queue sync");
                return;
            }
        };
        let local: BTreeSet<String> = self.queues.read().await.keys().cloned().collect();

        for queue_name in remote.difference(&local) {
            if let Err(e) = self.get_or_init(queue_name).await {
                warn!(queue = %queue_name, error = %e, "failed to materialize queue");
            }
        }

        for queue_name in local.difference(&remote) {
            match self.strip_from_topics(queue_name, topics).await {
                Ok(()) => {
                    self.teardown(queue_name).await;
                    info!(queue = %queue_name, "queue removed from cluster, torn down");
                }
                Err(e) => {
                    warn!(queue = %queue_name, error = %e, "failed to unlink queue from topics, retrying next sync");
                }
            }
        }

        for queue_name in local.intersection(&remote) {
            let Some(queue) = self.get(queue_name).await else {
                continue;
            };
            if let Err(e) = queue.sync_config().await {
                warn!(queue = %queue_name, error = %e, "failed to sync queue settings");
            }
        }
    }
}
