use std::sync::Arc;

use anyhow::Result as AnyResult;

use crate::context::test_support::test_broker;
use crate::errors::BrokerError;
use crate::queues::Queues;
use crate::resources::QueueSettings;
use crate::topics::Topics;

fn registries(broker: &crate::context::test_support::TestBroker) -> (Arc<Queues>, Topics) {
    let queues = Arc::new(Queues::new(broker.ctx.clone()));
    let topics = Topics::new(Arc::clone(&queues));
    (queues, topics)
}

/// What this test validates
///
/// - Scenario: another node registers two queues, then removes one that is linked to a topic.
/// - Expectation: the first sync materializes both queues; the second closes the removed queue
///   and unlinks it from the topic in the shared store and in the local topic view.
///
/// Why this matters
/// - A topic must never keep fanning out to a queue the cluster has deleted.
#[tokio::test]
async fn sync_follows_the_shared_queue_set() -> AnyResult<()> {
    let broker = test_broker();
    let (queues, topics) = registries(&broker);
    let resources = &broker.ctx.resources;

    resources.queue.add_queue_name("orders").await?;
    resources.queue.add_queue_name("audit").await?;
    queues.sync(&topics).await;
    assert_eq!(queues.names().await, vec!["audit", "orders"]);

    let topic = topics.create_topic("events").await?;
    topic.add_queue("audit").await?;
    let audit = queues.get("audit").await.expect("audit materialized");

    resources.queue.remove_queue_name("audit").await?;
    queues.sync(&topics).await;

    assert_eq!(queues.names().await, vec!["orders"]);
    assert!(audit.is_closed());
    assert!(resources.topic.fetch_topic_queues("events").await?.is_empty());
    assert!(topic.list_queues().await.is_empty());
    Ok(())
}

/// What this test validates
///
/// - Scenario: the configuration store is unreachable during a sync.
/// - Expectation: the pass is skipped and local queues stay as they were.
#[tokio::test]
async fn sync_skips_cycle_when_store_is_unavailable() -> AnyResult<()> {
    let broker = test_broker();
    let (queues, topics) = registries(&broker);
    queues
        .create_queue("orders", QueueSettings::default())
        .await?;

    broker.config.set_unavailable(true);
    queues.sync(&topics).await;
    assert_eq!(queues.names().await, vec!["orders"]);

    broker.config.set_unavailable(false);
    queues.sync(&topics).await;
    assert_eq!(queues.names().await, vec!["orders"]);
    Ok(())
}

/// What this test validates
///
/// - Scenario: a surviving queue's settings are changed in the shared store.
/// - Expectation: the next sync resizes its partitions to the new minimum.
#[tokio::test]
async fn sync_resyncs_surviving_queues() -> AnyResult<()> {
    let broker = test_broker();
    let (queues, topics) = registries(&broker);
    let queue = queues
        .create_queue("orders", QueueSettings::default())
        .await?;
    assert_eq!(queue.partitions().count().await, 1);

    let wider = QueueSettings {
        min_partitions: 4,
        ..QueueSettings::default()
    };
    broker
        .ctx
        .resources
        .queue
        .store_queue_settings("orders", &wider)
        .await?;

    queues.sync(&topics).await;
    assert_eq!(queue.partitions().count().await, 4);
    Ok(())
}

/// What this test validates
///
/// - Scenario: lazy lookup of a queue the cluster does not know, then of one it does.
/// - Expectation: the unknown name fails with `QueueNotFound`, the known one is materialized on demand.
#[tokio::test]
async fn get_or_init_requires_a_registered_queue() -> AnyResult<()> {
    let broker = test_broker();
    let (queues, _topics) = registries(&broker);

    assert!(matches!(
        queues.get_or_init("ghost").await,
        Err(BrokerError::QueueNotFound(_))
    ));

    broker.ctx.resources.queue.add_queue_name("orders").await?;
    let queue = queues.get_or_init("orders").await?;
    assert_eq!(queue.name(), "orders");
    assert!(queues.exists("orders").await?);
    assert_eq!(queues.names().await, vec!["orders"]);
    Ok(())
}

/// What this test validates
///
/// - Scenario: an admin deletes a queue linked to a topic.
/// - Expectation: the queue is unlinked, unregistered, its settings destroyed and the local queue closed.
#[tokio::test]
async fn delete_queue_unlinks_before_teardown() -> AnyResult<()> {
    let broker = test_broker();
    let (queues, topics) = registries(&broker);
    let queue = queues
        .create_queue("orders", QueueSettings::default())
        .await?;
    let topic = topics.create_topic("events").await?;
    topic.add_queue("orders").await?;

    queues.delete_queue("orders", &topics).await?;

    assert!(queue.is_closed());
    assert!(!queues.exists("orders").await?);
    assert!(queues.get("orders").await.is_none());
    assert!(topic.list_queues().await.is_empty());
    assert!(broker
        .ctx
        .resources
        .topic
        .fetch_topic_queues("events")
        .await?
        .is_empty());
    Ok(())
}
