mod errors;
pub use errors::{MetadataError, Result};

mod store;
pub use store::{ConfigStore, MapOp, ReplicatedMap};

mod memory_store;
pub use memory_store::MemoryConfigStore;
