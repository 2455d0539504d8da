use dynamiq_core::compression::Compressor;
use dynamiq_core::membership::Membership;
use dynamiq_core::stats::StatsSink;
use dynamiq_core::storage::MessageStore;
use std::sync::Arc;
use std::time::Duration;

use crate::resources::{QueueSettings, Resources};

/// External collaborators shared by every queue and topic of a broker.
#[derive(Clone)]
pub struct BrokerContext {
    pub message_store: Arc<dyn MessageStore>,
    pub resources: Resources,
    pub compressor: Arc<dyn Compressor>,
    pub stats: Arc<dyn StatsSink>,
    pub membership: Arc<dyn Membership>,
    /// Longest a consumer waits for a partition before its request fails
    pub lease_timeout: Duration,
    /// Applied where a queue's own settings are missing or unparseable
    pub queue_defaults: QueueSettings,
}

impl std::fmt::Debug for BrokerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerContext")
            .field("lease_timeout", &self.lease_timeout)
            .field("queue_defaults", &self.queue_defaults)
            .finish_non_exhaustive()
    }
}
