//! Request/response client for a Tendermint node's JSON-RPC interface.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod http;

pub use error::{Error, Result};
pub use http::{HttpRpcClient, HttpRpcClientOptions};

use std::error::Error as StdError;
use std::fmt::Debug;

use async_trait::async_trait;
use tm_monitor_types::{Status, ValidatorSet};

/// Marker trait for `RpcClient` errors
pub trait RpcClientError: Debug + StdError + Send + Sync + 'static {}

/// Queries a node answers synchronously.
#[async_trait]
pub trait RpcClient: Send + Sync + 'static {
    /// The error type for RPC calls.
    type Error: RpcClientError;

    /// The current validator set, with the height it applies to.
    async fn validators(&self) -> std::result::Result<ValidatorSet, Self::Error>;

    /// The node's status, including its own validator public key.
    async fn status(&self) -> std::result::Result<Status, Self::Error>;
}
