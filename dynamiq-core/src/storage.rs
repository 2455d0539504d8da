use async_trait::async_trait;
use thiserror::Error;

use crate::message::{MessageId, StoredObject};

mod memory_store;
pub use memory_store::MemoryMessageStore;

pub type Result<T> = std::result::Result<T, StorageError>;

/// Name of the numeric secondary index every message is written under.
pub const ID_INDEX: &str = "id_int";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Key not found: {0}")]
    NotFound(String),

    #[error("Storage backend unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Storage backend error: {0}")]
    Backend(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl StorageError {
    /// Missing keys are expected while partitions resize and consumers race on deletes.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

/// Result of reading one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched {
    Missing,
    Object(StoredObject),
    // concurrent writers landed on the same key, every value is kept
    Conflict(Vec<StoredObject>),
}

/// Replicated object store holding the messages of every queue, one bucket per queue.
///
/// Writes are never merged: two writes to the same id without a causal context are
/// exposed as siblings on the next read.
#[async_trait]
pub trait MessageStore: Send + Sync + 'static {
    /// Store `object` under `id`, indexing it on [`ID_INDEX`] with the numeric id.
    async fn put(&self, bucket: &str, id: MessageId, object: StoredObject) -> Result<()>;

    async fn get(&self, bucket: &str, id: MessageId) -> Result<Fetched>;

    /// Remove every value stored under `id`; `NotFound` when nothing was there.
    async fn delete(&self, bucket: &str, id: MessageId) -> Result<()>;

    /// Up to `limit` ids whose index value lies in `[low, high]`, ascending.
    async fn range_query(
        &self,
        bucket: &str,
        index: &str,
        low: u64,
        high: u64,
        limit: usize,
    ) -> Result<Vec<MessageId>>;
}
