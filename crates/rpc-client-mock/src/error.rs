//! Error types for the mock RPC client.

use thiserror::Error;
use tm_monitor_rpc_client::RpcClientError;

/// Error type for the mock RPC client.
#[derive(Debug, Error)]
pub enum Error {
    /// A scripted failure of the named method.
    #[error("mock {0} call failed")]
    Unavailable(&'static str),
}

impl RpcClientError for Error {}
