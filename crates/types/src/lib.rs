//! Wire types shared by the Tendermint monitor crates.
//!
//! These mirror the JSON shapes returned by a Tendermint node's RPC and
//! websocket event interfaces. Only the fields the monitor reads are modelled;
//! everything else is ignored on deserialization.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod block;
mod error;
pub mod serde_int;
mod validator;

pub use block::{Block, BlockData, BlockId, Commit, Header, Vote};
pub use error::Error;
pub use validator::{
    ED25519_KEY_TYPE, NodeInfo, PubKey, Status, SyncInfo, Validator, ValidatorInfo, ValidatorSet,
};
