//! In-memory implementation of block persistence for local runs and tests.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

pub use error::Error;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tm_monitor_block_store::BlockStore;
use tm_monitor_types::Block;
use tokio::sync::Mutex;
use tracing::trace;

/// In-memory block store. Blocks are held as JSON, keyed by height.
#[derive(Clone, Debug, Default)]
pub struct MemoryBlockStore {
    capacity: Option<usize>,
    map: Arc<Mutex<BTreeMap<i64, Bytes>>>,
}

impl MemoryBlockStore {
    /// Creates an unbounded `MemoryBlockStore`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that keeps at most `capacity` blocks, evicting the
    /// lowest heights first.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity),
            map: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    /// Number of blocks currently held.
    pub async fn len(&self) -> usize {
        self.map.lock().await.len()
    }

    /// Whether the store holds no blocks.
    pub async fn is_empty(&self) -> bool {
        self.map.lock().await.is_empty()
    }
}

#[async_trait]
impl BlockStore for MemoryBlockStore {
    type Error = Error;

    async fn save(&self, block: &Block) -> Result<(), Self::Error> {
        let bytes = Bytes::from(serde_json::to_vec(block)?);
        let mut map = self.map.lock().await;

        map.insert(block.height(), bytes);

        if let Some(capacity) = self.capacity {
            while map.len() > capacity {
                if let Some((height, _)) = map.pop_first() {
                    trace!(height, "evicted block");
                }
            }
        }

        Ok(())
    }

    async fn get(&self, height: i64) -> Result<Option<Block>, Self::Error> {
        let bytes = self.map.lock().await.get(&height).cloned();

        match bytes {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn heights(&self) -> Result<Vec<i64>, Self::Error> {
        Ok(self.map.lock().await.keys().copied().collect())
    }
}
