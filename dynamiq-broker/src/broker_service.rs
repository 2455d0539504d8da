use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;

use crate::broker_metrics::{
    BROKER_QUEUES_SERVED, BROKER_TOPICS_SERVED, SYNC_CYCLES_TOTAL, SYNC_DURATION_MS_TOTAL,
};
use crate::context::BrokerContext;
use crate::queues::Queues;
use crate::sync_scheduler::SyncScheduler;
use crate::topics::Topics;

// BrokerService - owns the queue and topic registries and the daemons that keep them
// in step with the shared configuration store.
#[derive(Debug)]
pub struct BrokerService {
    queues: Arc<Queues>,
    topics: Arc<Topics>,
    schedulers: Vec<SyncScheduler>,
}

impl BrokerService {
    pub fn new(ctx: BrokerContext) -> Self {
        let queues = Arc::new(Queues::new(Arc::new(ctx)));
        let topics = Arc::new(Topics::new(Arc::clone(&queues)));
        BrokerService {
            queues,
            topics,
            schedulers: Vec::new(),
        }
    }

    pub fn queues(&self) -> &Arc<Queues> {
        &self.queues
    }

    pub fn topics(&self) -> &Arc<Topics> {
        &self.topics
    }

    pub fn is_running(&self) -> bool {
        !self.schedulers.is_empty()
    }

    /// Run one reconciliation pass for both registries, then keep reconciling every
    /// `sync_interval` in the background. Calling it on a running service does nothing.
    pub async fn start(&mut self, sync_interval: Duration) {
        if self.is_running() {
            return;
        }

        // topics first so queue teardown sees every local topic
        sync_topics(&self.topics).await;
        sync_queues(&self.queues, &self.topics).await;

        let topics = Arc::clone(&self.topics);
        let topic_scheduler = SyncScheduler::start("topics", sync_interval, move || {
            let topics = Arc::clone(&topics);
            async move { sync_topics(&topics).await }
        });

        let queues = Arc::clone(&self.queues);
        let topics = Arc::clone(&self.topics);
        let queue_scheduler = SyncScheduler::start("queues", sync_interval, move || {
            let queues = Arc::clone(&queues);
            let topics = Arc::clone(&topics);
            async move { sync_queues(&queues, &topics).await }
        });

        self.schedulers = vec![topic_scheduler, queue_scheduler];
        info!(interval_ms = sync_interval.as_millis() as u64, "broker service started");
    }

    /// Stop the reconciliation daemons, waiting for passes in flight.
    pub async fn stop(&mut self) {
        for scheduler in self.schedulers.drain(..) {
            scheduler.stop().await;
        }
        info!("broker service stopped");
    }
}

async fn sync_queues(queues: &Queues, topics: &Topics) {
    let started = Instant::now();
    queues.sync(topics).await;

    metrics::counter!(SYNC_CYCLES_TOTAL.name, "registry" => "queues").increment(1);
    metrics::counter!(SYNC_DURATION_MS_TOTAL.name, "registry" => "queues")
        .increment(started.elapsed().as_millis() as u64);
    metrics::gauge!(BROKER_QUEUES_SERVED.name).set(queues.names().await.len() as f64);
}

async fn sync_topics(topics: &Topics) {
    let started = Instant::now();
    topics.sync().await;

    metrics::counter!(SYNC_CYCLES_TOTAL.name, "registry" => "topics").increment(1);
    metrics::counter!(SYNC_DURATION_MS_TOTAL.name, "registry" => "topics")
        .increment(started.elapsed().as_millis() as u64);
    metrics::gauge!(BROKER_TOPICS_SERVED.name).set(topics.names().await.len() as f64);
}
