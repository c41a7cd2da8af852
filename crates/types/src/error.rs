use thiserror::Error;

/// Errors that can occur while interpreting wire types.
#[derive(Debug, Error)]
pub enum Error {
    /// The public key value was not valid base64.
    #[error("invalid public key encoding: {0}")]
    PubKeyEncoding(#[from] base64::DecodeError),
}
