mod queue;
mod topic;

pub use queue::{QueueResources, QueueSettings};
pub use topic::TopicResources;

use dynamiq_core::metadata::ConfigStore;
use std::sync::Arc;

// Layout of the shared configuration store
//
// bucket "config"
//   queues_config           set "queues"   -> every queue name in the cluster
//   queue_{name}_config     registers      -> per queue settings
//   topics_config           set "topics"   -> every topic name in the cluster
//   topic_{name}_config     set "queues"   -> queues linked to the topic
pub const CONFIG_BUCKET: &str = "config";
pub const QUEUES_CONFIG_KEY: &str = "queues_config";
pub const QUEUE_SET: &str = "queues";
pub const TOPICS_CONFIG_KEY: &str = "topics_config";
pub const TOPIC_SET: &str = "topics";
pub const TOPIC_QUEUE_SET: &str = "queues";

pub fn queue_config_key(queue_name: &str) -> String {
    format!("queue_{}_config", queue_name)
}

pub fn topic_config_key(topic_name: &str) -> String {
    format!("topic_{}_config", topic_name)
}

/// Typed access to the shared configuration store, split per entity kind.
#[derive(Clone)]
pub struct Resources {
    pub queue: QueueResources,
    pub topic: TopicResources,
}

impl Resources {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Resources {
            queue: QueueResources::new(Arc::clone(&store)),
            topic: TopicResources::new(store),
        }
    }
}

impl std::fmt::Debug for Resources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resources").finish_non_exhaustive()
    }
}
