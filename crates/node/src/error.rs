use thiserror::Error;

/// Result type for node operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while monitoring a node.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// Opening the event stream or subscribing to a topic failed.
    #[error("subscription failed: {0}")]
    Subscription(String),

    /// An RPC query against the node failed.
    #[error("query failed: {0}")]
    Query(String),

    /// Reconnection gave up after the configured number of restarts.
    #[error("gave up reconnecting after {0} restarts")]
    MaxRestartsExceeded(usize),

    /// `start` was called on a node that is already running.
    #[error("node already started")]
    AlreadyStarted,

    /// The node has been stopped and cannot be used again.
    #[error("node stopped")]
    Stopped,

    /// The node was never started, so there is nothing to reconnect.
    #[error("node not started")]
    NotStarted,
}
