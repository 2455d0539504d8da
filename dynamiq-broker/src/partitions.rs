use dynamiq_core::membership::Membership;
use dynamiq_core::message::MAX_ID;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::errors::{BrokerError, Result};
use crate::resources::QueueSettings;

#[cfg(test)]
#[path = "partitions_test.rs"]
mod partitions_test;

/// A contiguous, inclusive slice of the message id space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
    pub id: u32,
    pub range_low: u64,
    pub range_high: u64,
}

impl Partition {
    fn overlaps(&self, other: &Partition) -> bool {
        self.range_low <= other.range_high && other.range_low <= self.range_high
    }
}

/// Split `[0, MAX_ID]` into `count` contiguous ranges of equal width; the last
/// one absorbs the remainder.
pub fn partition_ranges(count: u32) -> Vec<Partition> {
    let count = count.max(1);
    let step = MAX_ID / count as u64;
    (0..count)
        .map(|i| {
            let range_low = i as u64 * step;
            let range_high = if i == count - 1 {
                MAX_ID
            } else {
                range_low + step - 1
            };
            Partition {
                id: i,
                range_low,
                range_high,
            }
        })
        .collect()
}

/// Exclusive checkout of one partition. Bounds are copied so the partition set can
/// be rebuilt while the lease is outstanding.
#[derive(Debug, Clone)]
pub struct PartitionLease {
    pub partition_id: u32,
    pub range_low: u64,
    pub range_high: u64,
    generation: u64,
}

#[derive(Debug, Clone)]
struct PooledPartition {
    partition: Partition,
    // last release found messages
    productive: bool,
    released_at: Instant,
    last_productive: Instant,
}

impl PooledPartition {
    fn fresh(partition: Partition, now: Instant) -> Self {
        PooledPartition {
            partition,
            productive: false,
            released_at: now,
            last_productive: now,
        }
    }
}

// Heap order: productive partitions first, then the least recently released.
impl Ord for PooledPartition {
    fn cmp(&self, other: &Self) -> Ordering {
        self.productive
            .cmp(&other.productive)
            .then_with(|| other.released_at.cmp(&self.released_at))
            .then_with(|| other.partition.id.cmp(&self.partition.id))
    }
}

impl PartialOrd for PooledPartition {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for PooledPartition {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PooledPartition {}

#[derive(Debug)]
struct Cooling {
    until: Instant,
    entry: PooledPartition,
}

// A partition of the current table that overlaps a lease taken before the last rebuild.
#[derive(Debug)]
struct Held {
    entry: PooledPartition,
    cool_until: Option<Instant>,
}

#[derive(Debug)]
struct PartitionState {
    generation: u64,
    table: Vec<Partition>,
    ready: BinaryHeap<PooledPartition>,
    cooling: Vec<Cooling>,
    held: Vec<Held>,
    // keyed by (generation, partition id), stale leases stay until released
    leased: HashMap<(u64, u32), PooledPartition>,
    settings: QueueSettings,
}

impl PartitionState {
    fn new(count: u32, settings: QueueSettings) -> Self {
        let mut state = PartitionState {
            generation: 0,
            table: Vec::new(),
            ready: BinaryHeap::new(),
            cooling: Vec::new(),
            held: Vec::new(),
            leased: HashMap::new(),
            settings,
        };
        state.rebuild(count, Instant::now());
        state
    }

    fn count(&self) -> u32 {
        self.table.len() as u32
    }

    fn overlaps_outstanding(&self, partition: &Partition) -> bool {
        self.leased
            .values()
            .any(|leased| leased.partition.overlaps(partition))
    }

    fn pool(&mut self, entry: PooledPartition, cool_until: Option<Instant>, now: Instant) {
        match cool_until {
            Some(until) if until > now => self.cooling.push(Cooling { until, entry }),
            _ => self.ready.push(entry),
        }
    }

    // Replace the partition table with `count` equal ranges under a new generation.
    // A reuse lock stays with the partition id it was taken on. Partitions overlapping
    // an outstanding lease are held back until that lease comes home.
    fn rebuild(&mut self, count: u32, now: Instant) {
        let mut locks: HashMap<u32, Instant> = HashMap::new();
        let cooling = std::mem::take(&mut self.cooling)
            .into_iter()
            .map(|c| (c.entry.partition.id, c.until));
        let held = std::mem::take(&mut self.held)
            .into_iter()
            .filter_map(|h| h.cool_until.map(|until| (h.entry.partition.id, until)));
        for (id, until) in cooling.chain(held).filter(|(_, until)| *until > now) {
            let lock = locks.entry(id).or_insert(until);
            *lock = (*lock).max(until);
        }

        self.generation += 1;
        self.table = partition_ranges(count);
        self.ready.clear();

        for partition in self.table.clone() {
            let entry = PooledPartition::fresh(partition, now);
            let cool_until = locks.get(&partition.id).copied();
            if self.overlaps_outstanding(&partition) {
                self.held.push(Held { entry, cool_until });
            } else {
                self.pool(entry, cool_until, now);
            }
        }
    }

    // A lease from an older generation came home. Overlapping held partitions inherit
    // its reuse lock, those no longer overlapping any outstanding lease rejoin the pool.
    fn release_stale(&mut self, released: &Partition, lock_until: Option<Instant>, now: Instant) {
        if let Some(until) = lock_until {
            for held in self
                .held
                .iter_mut()
                .filter(|h| h.entry.partition.overlaps(released))
            {
                held.entry.productive = true;
                held.cool_until = Some(held.cool_until.map_or(until, |u| u.max(until)));
            }
        }

        let (blocked, freed): (Vec<Held>, Vec<Held>) = std::mem::take(&mut self.held)
            .into_iter()
            .partition(|h| self.overlaps_outstanding(&h.entry.partition));
        self.held = blocked;
        for held in freed {
            self.pool(held.entry, held.cool_until, now);
        }
    }

    fn promote_cooled(&mut self, now: Instant) {
        let (expired, still_cooling): (Vec<Cooling>, Vec<Cooling>) = std::mem::take(&mut self.cooling)
            .into_iter()
            .partition(|c| c.until <= now);
        self.cooling = still_cooling;
        for cooled in expired {
            self.ready.push(cooled.entry);
        }
    }

    fn next_cooled_at(&self) -> Option<Instant> {
        self.cooling.iter().map(|c| c.until).min()
    }

    // pooled partitions that have not produced messages within max_partition_age
    fn idle_count(&self, now: Instant) -> u32 {
        let max_age = self.settings.max_partition_age;
        let idle = |p: &PooledPartition| now.saturating_duration_since(p.last_productive) > max_age;
        let ready = self.ready.iter().filter(|&p| idle(p)).count();
        let cooling = self.cooling.iter().filter(|c| idle(&c.entry)).count();
        let held = self.held.iter().filter(|h| idle(&h.entry)).count();
        (ready + cooling + held) as u32
    }

    fn take_ready(&mut self) -> Option<PartitionLease> {
        let entry = self.ready.pop()?;
        let lease = PartitionLease {
            partition_id: entry.partition.id,
            range_low: entry.partition.range_low,
            range_high: entry.partition.range_high,
            generation: self.generation,
        };
        self.leased.insert((self.generation, entry.partition.id), entry);
        Some(lease)
    }
}

/// Partitions of one queue and the pool they are leased from.
///
/// Consumers lease a partition, scan its id range and hand it back. A partition that
/// returned messages stays locked for the visibility timeout so the messages it
/// handed out are not read again by the next consumer. When every partition is
/// busy the set grows up to `max_partitions`; resync shrinks it back as partitions
/// go idle.
#[derive(Debug)]
pub struct Partitions {
    queue_name: String,
    lease_timeout: Duration,
    state: Mutex<PartitionState>,
    released: Notify,
}

impl Partitions {
    /// Partition set sized to the configured minimum.
    pub fn init(queue_name: &str, settings: &QueueSettings, lease_timeout: Duration) -> Self {
        let settings = settings.clone().normalized();
        let count = settings.min_partitions;
        debug!(queue = %queue_name, partitions = count, "initializing partitions");
        Partitions {
            queue_name: queue_name.to_string(),
            lease_timeout,
            state: Mutex::new(PartitionState::new(count, settings)),
            released: Notify::new(),
        }
    }

    pub async fn count(&self) -> u32 {
        self.state.lock().await.count()
    }

    /// Snapshot of the current partition table, ordered by id.
    pub async fn ranges(&self) -> Vec<Partition> {
        self.state.lock().await.table.clone()
    }

    /// Check out a partition and return this node's stripe of its range.
    ///
    /// Waits at most the lease timeout when every partition is leased or locked and
    /// the set is already at its maximum size.
    pub async fn lease(&self, membership: &dyn Membership) -> Result<PartitionLease> {
        let started = Instant::now();
        let deadline = started + self.lease_timeout;

        loop {
            let notified = self.released.notified();
            let wake_at = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                state.promote_cooled(now);

                if state.ready.is_empty() && state.count() < state.settings.max_partitions {
                    let grown = state.count() + 1;
                    info!(
                        queue = %self.queue_name,
                        partitions = grown,
                        "all partitions busy, growing partition set"
                    );
                    state.rebuild(grown, now);
                    state.promote_cooled(now);
                }

                if let Some(lease) = state.take_ready() {
                    return Ok(node_stripe(lease, membership));
                }

                match state.next_cooled_at() {
                    Some(cooled_at) if cooled_at < deadline => cooled_at,
                    _ => deadline,
                }
            };

            if Instant::now() >= deadline {
                return Err(BrokerError::NoAvailablePartition {
                    queue: self.queue_name.clone(),
                    waited_ms: started.elapsed().as_millis(),
                });
            }

            // woken by a release, a partition cooling down, or the deadline
            let _ = tokio::time::timeout_at(wake_at, notified).await;
        }
    }

    /// Return a leased partition to the pool.
    ///
    /// A productive partition is locked for the visibility timeout, an unproductive one
    /// is immediately available again. A lease from before a rebuild frees the partitions
    /// of the current table that were held back behind it, passing on its lock.
    pub async fn release(&self, lease: PartitionLease, was_productive: bool) {
        {
            let mut state = self.state.lock().await;
            let Some(mut entry) = state.leased.remove(&(lease.generation, lease.partition_id)) else {
                debug!(queue = %self.queue_name, partition = lease.partition_id, "partition was not leased");
                return;
            };

            let now = Instant::now();
            let lock_until = was_productive.then(|| now + state.settings.visibility_timeout);

            if lease.generation != state.generation {
                debug!(
                    queue = %self.queue_name,
                    partition = lease.partition_id,
                    "partition set was rebuilt while leased, releasing overlapping partitions"
                );
                state.release_stale(&entry.partition, lock_until, now);
            } else {
                entry.productive = was_productive;
                entry.released_at = now;
                if was_productive {
                    entry.last_productive = now;
                }
                state.pool(entry, lock_until, now);
            }
        }
        self.released.notify_waiters();
    }

    /// Reconcile the partition count with freshly fetched settings.
    ///
    /// The count is clamped to `[min, max]`; within bounds, partitions idle for longer
    /// than `max_partition_age` are dropped down to the minimum.
    pub async fn resync(&self, settings: &QueueSettings) {
        let rebuilt = {
            let mut state = self.state.lock().await;
            state.settings = settings.clone().normalized();
            let now = Instant::now();
            let min = state.settings.min_partitions;
            let max = state.settings.max_partitions;
            let count = state.count();

            let target = if count < min {
                min
            } else if count > max {
                max
            } else {
                count.saturating_sub(state.idle_count(now)).max(min)
            };

            if target != count {
                info!(
                    queue = %self.queue_name,
                    from = count,
                    to = target,
                    "resizing partition set"
                );
                state.rebuild(target, now);
                true
            } else {
                false
            }
        };

        if rebuilt {
            self.released.notify_waiters();
        }
    }
}

// Members scan disjoint stripes of every partition, ordered by member name.
fn node_stripe(mut lease: PartitionLease, membership: &dyn Membership) -> PartitionLease {
    let mut members: Vec<String> = membership.members().into_iter().map(|m| m.name).collect();
    if members.len() <= 1 {
        return lease;
    }
    members.sort();
    members.dedup();

    let local = membership.local_name();
    let Some(position) = members.iter().position(|name| *name == local) else {
        return lease;
    };

    let stripes = members.len() as u64;
    let step = (lease.range_high - lease.range_low) / stripes;
    if step == 0 {
        return lease;
    }

    let position = position as u64;
    let low = lease.range_low + position * step;
    let high = if position == stripes - 1 {
        lease.range_high
    } else {
        low + step - 1
    };
    lease.range_low = low;
    lease.range_high = high;
    lease
}
