use thiserror::Error;

pub type Result<T> = std::result::Result<T, MetadataError>;

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("Configuration store unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),
}
