//! Error types for the HTTP RPC client.

use thiserror::Error;

use crate::RpcClientError;

/// Result type for RPC client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when calling a node's RPC endpoint.
#[derive(Debug, Error)]
pub enum Error {
    /// The endpoint could not be turned into an HTTP URL.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// The HTTP request failed.
    #[error("HTTP request error: {0}")]
    HttpRequest(#[from] reqwest::Error),

    /// The node answered with a JSON-RPC error.
    #[error("RPC error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// Error message, with the node's detail appended when present.
        message: String,
    },

    /// The response had neither a result nor an error.
    #[error("empty RPC response for {0}")]
    EmptyResponse(&'static str),

    /// The result did not have the expected shape.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RpcClientError for Error {}
