use thiserror::Error;

/// Errors that can occur in this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Failed to bind to address.
    #[error("failed to bind to address: {0}")]
    Bind(std::io::Error),

    /// The server stopped with an error.
    #[error("server error: {0}")]
    Serve(std::io::Error),
}
