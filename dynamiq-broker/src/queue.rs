use dynamiq_core::message::{Message, MessageId, StoredObject, DEFAULT_CONTENT_TYPE};
use dynamiq_core::stats::{
    stats_key, APPROXIMATE_DEPTH_SUFFIX, DELETED_SUFFIX, DEPTH_SUFFIX, FILL_SUFFIX,
    RECEIVED_SUFFIX, SENT_SUFFIX,
};
use dynamiq_core::storage::{Fetched, ID_INDEX};
use futures::future::join_all;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use crate::context::BrokerContext;
use crate::errors::{BrokerError, Result};
use crate::estimator::{estimate_depth, fill_ratio};
use crate::in_flight::InFlight;
use crate::partitions::Partitions;
use crate::resources::QueueSettings;

#[cfg(test)]
#[path = "queue_test.rs"]
mod queue_test;

/// A named queue: messages live in the store bucket named after the queue and are
/// read back through partition leases.
#[derive(Debug)]
pub struct Queue {
    name: String,
    partitions: Partitions,
    in_flight: InFlight,
    settings: RwLock<Arc<QueueSettings>>,
    closed: AtomicBool,
    ctx: Arc<BrokerContext>,
}

impl Queue {
    pub fn new(name: &str, settings: QueueSettings, ctx: Arc<BrokerContext>) -> Self {
        let partitions = Partitions::init(name, &settings, ctx.lease_timeout);
        Queue {
            name: name.to_string(),
            partitions,
            in_flight: InFlight::new(),
            settings: RwLock::new(Arc::new(settings)),
            closed: AtomicBool::new(false),
            ctx,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn settings(&self) -> Arc<QueueSettings> {
        Arc::clone(&*self.settings.read().await)
    }

    pub fn partitions(&self) -> &Partitions {
        &self.partitions
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Mark the queue torn down. Every later operation fails with `QueueClosed`.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!(queue = %self.name, "queue closed");
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(BrokerError::QueueClosed(self.name.clone()));
        }
        Ok(())
    }

    /// Store a message with the default content type.
    pub async fn put(&self, body: &[u8]) -> Result<MessageId> {
        self.put_with_content_type(body, DEFAULT_CONTENT_TYPE).await
    }

    pub async fn put_with_content_type(&self, body: &[u8], content_type: &str) -> Result<MessageId> {
        self.ensure_open()?;
        let settings = self.settings().await;

        let object = if settings.compressed_messages {
            match self.ctx.compressor.compress(body) {
                Ok(compressed) => StoredObject::new(compressed, content_type, true),
                Err(e) => {
                    warn!(queue = %self.name, error = %e, "compression failed, storing message uncompressed");
                    StoredObject::new(body.to_vec(), content_type, false)
                }
            }
        } else {
            StoredObject::new(body.to_vec(), content_type, false)
        };

        let id = MessageId::random();
        self.ctx.message_store.put(&self.name, id, object).await?;

        self.ctx.stats.increment(&stats_key(&self.name, SENT_SUFFIX), 1);
        self.ctx
            .stats
            .increment_gauge(&stats_key(&self.name, DEPTH_SUFFIX), 1);
        Ok(id)
    }

    /// Lease a partition and return up to `batch_size` of its messages.
    ///
    /// Each id is fetched by its own task; ids that fail to load are skipped. Ids holding
    /// colliding writes are split into fresh messages which are returned in this batch.
    /// Messages this node handed out stay hidden until their visibility timeout runs out.
    pub async fn get(&self, batch_size: usize) -> Result<Vec<Message>> {
        self.ensure_open()?;
        let visibility = self.settings().await.visibility_timeout;
        let lease = self.partitions.lease(self.ctx.membership.as_ref()).await?;

        let hidden = self.in_flight.hidden_in(lease.range_low, lease.range_high).await;
        let scanned = match self
            .ctx
            .message_store
            .range_query(
                &self.name,
                ID_INDEX,
                lease.range_low,
                lease.range_high,
                batch_size + hidden,
            )
            .await
        {
            Ok(ids) => ids,
            Err(e) => {
                self.partitions.release(lease, false).await;
                return Err(e.into());
            }
        };
        let ids = self.in_flight.claim(&scanned, batch_size, visibility).await;

        let (tx, mut rx) = mpsc::channel(ids.len().max(1));
        for id in ids.iter().copied() {
            let tx = tx.clone();
            let ctx = Arc::clone(&self.ctx);
            let bucket = self.name.clone();
            tokio::spawn(async move {
                let messages = fetch_message(&ctx, &bucket, id).await;
                let _ = tx.send(messages).await;
            });
        }
        drop(tx);

        let mut messages = Vec::with_capacity(ids.len());
        while let Some(fetched) = rx.recv().await {
            messages.extend(fetched);
        }
        messages.sort_by_key(|m| m.id);

        // split collisions come back under ids nobody has claimed yet
        self.in_flight
            .hide(messages.iter().map(|m| m.id), visibility)
            .await;

        self.partitions.release(lease, !scanned.is_empty()).await;
        self.record_receive(batch_size, &ids, messages.len()).await;
        Ok(messages)
    }

    async fn record_receive(&self, batch_size: usize, ids: &[MessageId], returned: usize) {
        let partition_count = self.partitions.count().await;
        let member_count = self.ctx.membership.members().len();
        let stats = &self.ctx.stats;

        stats.increment(&stats_key(&self.name, RECEIVED_SUFFIX), returned as i64);
        stats.set_gauge(
            &stats_key(&self.name, FILL_SUFFIX),
            fill_ratio(batch_size, ids.len()),
        );
        stats.set_gauge(
            &stats_key(&self.name, APPROXIMATE_DEPTH_SUFFIX),
            estimate_depth(ids, partition_count, member_count),
        );
    }

    /// Delete one message. `Ok(false)` when nothing was stored under `id`.
    pub async fn delete(&self, id: MessageId) -> Result<bool> {
        self.ensure_open()?;
        match self.ctx.message_store.delete(&self.name, id).await {
            Ok(()) => {
                self.in_flight.forget(id).await;
                self.ctx
                    .stats
                    .increment(&stats_key(&self.name, DELETED_SUFFIX), 1);
                self.ctx
                    .stats
                    .decrement_gauge(&stats_key(&self.name, DEPTH_SUFFIX), 1);
                Ok(true)
            }
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete every id concurrently and return how many could not be deleted.
    pub async fn batch_delete(&self, ids: &[MessageId]) -> Result<usize> {
        self.ensure_open()?;
        let results = join_all(ids.iter().map(|id| self.delete(*id))).await;

        let failed = results
            .into_iter()
            .zip(ids)
            .filter(|(result, id)| match result {
                Ok(true) => false,
                Ok(false) => true,
                Err(e) => {
                    debug!(queue = %self.name, id = %id, error = %e, "failed to delete message");
                    true
                }
            })
            .count();
        Ok(failed)
    }

    /// Reload the settings from the configuration store and resize the partitions to match.
    pub async fn sync_config(&self) -> Result<()> {
        let settings = self
            .ctx
            .resources
            .queue
            .fetch_queue_settings(&self.name, &self.ctx.queue_defaults)
            .await?;

        self.partitions.resync(&settings).await;
        let mut current = self.settings.write().await;
        if **current != settings {
            debug!(queue = %self.name, settings = ?settings, "queue settings changed");
        }
        *current = Arc::new(settings);
        Ok(())
    }
}

// Failures are logged and yield no messages, the batch carries on without the id.
async fn fetch_message(ctx: &BrokerContext, bucket: &str, id: MessageId) -> Vec<Message> {
    match ctx.message_store.get(bucket, id).await {
        Ok(Fetched::Missing) => Vec::new(),
        Ok(Fetched::Object(object)) if object.is_tombstone() => Vec::new(),
        Ok(Fetched::Object(object)) => vec![decode(ctx, bucket, id, object)],
        Ok(Fetched::Conflict(siblings)) => repair_conflict(ctx, bucket, id, siblings).await,
        Err(e) => {
            debug!(queue = %bucket, id = %id, error = %e, "failed to fetch message");
            Vec::new()
        }
    }
}

fn decode(ctx: &BrokerContext, bucket: &str, id: MessageId, object: StoredObject) -> Message {
    if !object.compressed {
        return Message::from_object(id, object);
    }

    match ctx.compressor.decompress(&object.body) {
        Ok(body) => Message {
            id,
            body,
            content_type: object.content_type,
            compressed: false,
        },
        Err(e) => {
            warn!(queue = %bucket, id = %id, error = %e, "failed to decompress message, delivering it as stored");
            Message::from_object(id, object)
        }
    }
}

// Colliding writes landed on the same id. Every non-empty sibling becomes a message of
// its own under a fresh id; the shared key goes away once all of them are stored.
async fn repair_conflict(
    ctx: &BrokerContext,
    bucket: &str,
    id: MessageId,
    siblings: Vec<StoredObject>,
) -> Vec<Message> {
    debug!(queue = %bucket, id = %id, siblings = siblings.len(), "repairing colliding writes");

    let mut repaired = Vec::new();
    let mut all_stored = true;
    for sibling in siblings.into_iter().filter(|s| !s.is_tombstone()) {
        let new_id = MessageId::random();
        match ctx.message_store.put(bucket, new_id, sibling.clone()).await {
            Ok(()) => repaired.push(decode(ctx, bucket, new_id, sibling)),
            Err(e) => {
                warn!(queue = %bucket, id = %id, error = %e, "failed to store split message");
                all_stored = false;
            }
        }
    }

    if all_stored {
        if let Err(e) = ctx.message_store.delete(bucket, id).await {
            debug!(queue = %bucket, id = %id, error = %e, "failed to delete repaired key");
        }
    }
    repaired
}
