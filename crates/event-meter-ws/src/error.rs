//! Error types for the websocket event meter.

use thiserror::Error;
use tm_monitor_event_meter::EventMeterError;

/// Result type for websocket event meter operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the websocket event meter.
#[derive(Debug, Error)]
pub enum Error {
    /// The websocket handshake failed.
    #[error("websocket connect failed: {0}")]
    Connect(String),

    /// The endpoint could not be turned into a websocket URL.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// A request could not be written to the socket.
    #[error("websocket send failed: {0}")]
    Send(String),

    /// A request could not be encoded.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl EventMeterError for Error {}
