use thiserror::Error;

/// Result type for monitor operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while managing monitored nodes.
#[derive(Debug, Error)]
pub enum Error {
    /// A node with this name is already monitored.
    #[error("node `{0}` is already monitored")]
    AlreadyMonitored(String),

    /// No node with this name is monitored.
    #[error("cannot find node `{0}`")]
    UnknownNode(String),

    /// A node could not be built for an endpoint.
    #[error("failed to build node for `{endpoint}`: {message}")]
    Build {
        /// The endpoint that was requested.
        endpoint: String,
        /// What went wrong.
        message: String,
    },

    /// The node itself failed.
    #[error(transparent)]
    Node(#[from] tm_monitor_node::Error),
}
