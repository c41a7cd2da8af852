//! Abstract interface for subscribing to a Tendermint node's event stream.
//!
//! An event meter owns a single connection to a node. Callers subscribe to
//! topics and register latency and disconnect callbacks; the meter invokes
//! each callback on its own task, so callbacks may run concurrently with each
//! other.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod event;

pub use event::{Event, Topic};

use std::error::Error;
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

/// Marker trait for `EventMeter` errors
pub trait EventMeterError: Debug + Error + Send + Sync + 'static {}

/// Invoked with every event received on a subscribed topic.
pub type EventCallback = Arc<dyn Fn(Event) -> BoxFuture<'static, ()> + Send + Sync>;

/// Invoked with a block latency, in nanoseconds.
pub type LatencyCallback = Arc<dyn Fn(f64) -> BoxFuture<'static, ()> + Send + Sync>;

/// Invoked once each time an established connection is lost.
pub type DisconnectCallback = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// A connection to a node's event stream.
#[async_trait]
pub trait EventMeter: Send + Sync + 'static {
    /// The error type for meter operations.
    type Error: EventMeterError;

    /// Opens the connection. Topics subscribed before a previous disconnect
    /// are re-subscribed, so `start` doubles as reconnect.
    async fn start(&self) -> Result<(), Self::Error>;

    /// Closes the connection. Does not fire the disconnect callback.
    async fn stop(&self);

    /// Subscribes to a topic. Replaces any previous callback for the topic.
    async fn subscribe(&self, topic: Topic, callback: EventCallback) -> Result<(), Self::Error>;

    /// Unsubscribes from a topic and drops its callback.
    async fn unsubscribe(&self, topic: Topic) -> Result<(), Self::Error>;

    /// Registers the latency callback, replacing any previous one.
    fn register_latency_callback(&self, callback: LatencyCallback);

    /// Registers the disconnect callback, replacing any previous one.
    fn register_disconnect_callback(&self, callback: DisconnectCallback);

    /// Drops the latency and disconnect callbacks.
    fn clear_callbacks(&self);
}
