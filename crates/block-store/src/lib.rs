//! Abstract interface for persisting observed blocks.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use std::error::Error;
use std::fmt::Debug;

use async_trait::async_trait;
use tm_monitor_types::Block;

/// Marker trait for `BlockStore` errors
pub trait BlockStoreError: Debug + Error + Send + Sync + 'static {}

/// A sink for full blocks, keyed by height.
///
/// Heights are unique: saving a block at a height that is already stored
/// replaces the earlier block.
#[async_trait]
pub trait BlockStore: Clone + Send + Sync + 'static {
    /// The error type for store operations.
    type Error: BlockStoreError;

    /// Persists a block.
    async fn save(&self, block: &Block) -> Result<(), Self::Error>;

    /// Loads the block stored at `height`, if any.
    async fn get(&self, height: i64) -> Result<Option<Block>, Self::Error>;

    /// All stored heights in ascending order.
    async fn heights(&self) -> Result<Vec<i64>, Self::Error>;
}
