use dashmap::DashMap;
use std::sync::Arc;

pub const SENT_SUFFIX: &str = "sent.count";
pub const RECEIVED_SUFFIX: &str = "received.count";
pub const DELETED_SUFFIX: &str = "deleted.count";
pub const DEPTH_SUFFIX: &str = "depth.count";
pub const APPROXIMATE_DEPTH_SUFFIX: &str = "approximate_depth.count";
pub const FILL_SUFFIX: &str = "fill.count";

/// Builds the `<entity>.<metric>` key every stat is published under.
pub fn stats_key(entity: &str, suffix: &str) -> String {
    format!("{}.{}", entity, suffix)
}

/// Fire-and-forget stats transport.
pub trait StatsSink: Send + Sync + 'static {
    fn increment(&self, key: &str, delta: i64);
    fn increment_gauge(&self, key: &str, delta: i64);
    fn decrement_gauge(&self, key: &str, delta: i64);
    fn set_gauge(&self, key: &str, value: i64);
}

/// Keeps every counter and gauge in memory so tests can read them back.
#[derive(Debug, Clone, Default)]
pub struct MemoryStats {
    counters: Arc<DashMap<String, i64>>,
    gauges: Arc<DashMap<String, i64>>,
}

impl MemoryStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter(&self, key: &str) -> i64 {
        self.counters.get(key).map(|v| *v).unwrap_or(0)
    }

    pub fn gauge(&self, key: &str) -> i64 {
        self.gauges.get(key).map(|v| *v).unwrap_or(0)
    }
}

impl StatsSink for MemoryStats {
    fn increment(&self, key: &str, delta: i64) {
        *self.counters.entry(key.to_owned()).or_insert(0) += delta;
    }

    fn increment_gauge(&self, key: &str, delta: i64) {
        *self.gauges.entry(key.to_owned()).or_insert(0) += delta;
    }

    fn decrement_gauge(&self, key: &str, delta: i64) {
        *self.gauges.entry(key.to_owned()).or_insert(0) -= delta;
    }

    fn set_gauge(&self, key: &str, value: i64) {
        self.gauges.insert(key.to_owned(), value);
    }
}
