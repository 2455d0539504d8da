pub mod compression;
pub mod membership;
pub mod message;
pub mod metadata;
pub mod stats;
pub mod storage;
