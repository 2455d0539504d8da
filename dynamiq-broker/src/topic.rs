use dynamiq_core::message::MessageId;
use futures::future::join_all;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::context::BrokerContext;
use crate::errors::{BrokerError, Result};
use crate::queues::Queues;

/// A named fan-out point. Every message broadcast to the topic is put to each linked queue.
#[derive(Debug)]
pub struct Topic {
    name: String,
    ctx: Arc<BrokerContext>,
    queues: Arc<Queues>,
    // snapshot of the linked queue set, swapped on every change
    linked: RwLock<Arc<BTreeSet<String>>>,
}

impl Topic {
    pub fn new(name: &str, queues: Arc<Queues>) -> Self {
        Topic {
            name: name.to_string(),
            ctx: Arc::clone(queues.context()),
            queues,
            linked: RwLock::new(Arc::new(BTreeSet::new())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Put `body` to every linked queue.
    ///
    /// Queues are written concurrently and independently; a queue that fails maps to
    /// `None` and does not hold up the others.
    pub async fn broadcast(&self, body: &[u8]) -> HashMap<String, Option<MessageId>> {
        let linked = Arc::clone(&*self.linked.read().await);

        let puts = linked.iter().map(|queue_name| async move {
            let result = match self.queues.get_or_init(queue_name).await {
                Ok(queue) => queue.put(body).await,
                Err(e) => Err(e),
            };
            let id = match result {
                Ok(id) => Some(id),
                Err(e) => {
                    warn!(topic = %self.name, queue = %queue_name, error = %e, "failed to broadcast to queue");
                    None
                }
            };
            (queue_name.clone(), id)
        });

        join_all(puts).await.into_iter().collect()
    }

    /// Link an existing queue to the topic.
    pub async fn add_queue(&self, queue_name: &str) -> Result<()> {
        if !self.ctx.resources.queue.queue_exists(queue_name).await? {
            return Err(BrokerError::QueueNotFound(queue_name.to_string()));
        }
        self.ctx
            .resources
            .topic
            .add_topic_queue(&self.name, queue_name)
            .await?;

        self.update_linked(|linked| {
            linked.insert(queue_name.to_string());
        })
        .await;
        debug!(topic = %self.name, queue = %queue_name, "queue linked to topic");
        Ok(())
    }

    /// Unlink a queue. Unlinking a queue that is not linked succeeds.
    pub async fn delete_queue(&self, queue_name: &str) -> Result<()> {
        self.ctx
            .resources
            .topic
            .remove_topic_queue(&self.name, queue_name)
            .await?;
        self.forget_queue(queue_name).await;
        debug!(topic = %self.name, queue = %queue_name, "queue unlinked from topic");
        Ok(())
    }

    pub async fn list_queues(&self) -> Vec<String> {
        self.linked.read().await.iter().cloned().collect()
    }

    /// Destroy the topic's configuration map.
    pub async fn delete(&self) -> Result<()> {
        self.ctx.resources.topic.destroy_topic(&self.name).await
    }

    /// Reload the linked queue set from the configuration store.
    pub async fn sync_config(&self) -> Result<()> {
        let linked = self.ctx.resources.topic.fetch_topic_queues(&self.name).await?;
        *self.linked.write().await = Arc::new(linked);
        Ok(())
    }

    // local view only, the shared set is left alone
    pub(crate) async fn forget_queue(&self, queue_name: &str) {
        self.update_linked(|linked| {
            linked.remove(queue_name);
        })
        .await;
    }

    async fn update_linked(&self, change: impl FnOnce(&mut BTreeSet<String>)) {
        let mut current = self.linked.write().await;
        let mut linked = (**current).clone();
        change(&mut linked);
        *current = Arc::new(linked);
    }
}
