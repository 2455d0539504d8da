pub mod broker_metrics;
pub mod broker_service;
pub mod context;
pub mod errors;
pub mod estimator;
mod in_flight;
pub mod members;
pub mod partitions;
pub mod queue;
pub mod queues;
pub mod resources;
pub mod service_configuration;
pub mod sync_scheduler;
pub mod topic;
pub mod topics;

pub use broker_service::BrokerService;
pub use context::BrokerContext;
pub use errors::{BrokerError, Result};
pub use queue::Queue;
pub use queues::Queues;
pub use resources::{QueueSettings, Resources};
pub use topic::Topic;
pub use topics::Topics;
