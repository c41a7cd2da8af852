use thiserror::Error;
use tm_monitor_block_store::BlockStoreError;

/// Errors that can occur in the in-memory block store.
#[derive(Debug, Error)]
pub enum Error {
    /// A block could not be encoded or a stored block could not be decoded.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl BlockStoreError for Error {}
