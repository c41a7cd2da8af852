//! Error types for the mock event meter.

use tm_monitor_event_meter::{EventMeterError, Topic};
use thiserror::Error;

/// Error type for the mock event meter.
#[derive(Debug, Error)]
pub enum Error {
    /// A scripted start failure.
    #[error("mock connection refused")]
    ConnectionRefused,

    /// A scripted subscribe failure.
    #[error("mock subscribe to {0:?} rejected")]
    SubscribeRejected(Topic),
}

impl EventMeterError for Error {}
