use dynamiq_core::{
    membership::MembershipError, metadata::MetadataError, storage::StorageError,
};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BrokerError>;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("No partition of queue {queue} became available within {waited_ms}ms")]
    NoAvailablePartition { queue: String, waited_ms: u128 },

    #[error("Queue {0} is closed")]
    QueueClosed(String),

    #[error("Queue not found: {0}")]
    QueueNotFound(String),

    #[error("Topic not found: {0}")]
    TopicNotFound(String),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Message store error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration store error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("Membership error: {0}")]
    Membership(#[from] MembershipError),
}
