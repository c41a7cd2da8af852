//! Mock implementation of the event meter interface for testing purposes.
//!
//! Tests drive the meter by hand: [`MockEventMeter::emit`] plays the part of
//! the remote node, [`MockEventMeter::disconnect`] drops the connection, and
//! start or subscribe failures can be scripted up front.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

pub use error::Error;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tm_monitor_event_meter::{
    DisconnectCallback, Event, EventCallback, EventMeter, LatencyCallback, Topic,
};
use tracing::debug;

#[derive(Clone, Copy, Debug)]
enum StartFailures {
    None,
    Times(usize),
    Always,
}

#[derive(Default)]
struct Callbacks {
    disconnect: Option<DisconnectCallback>,
    latency: Option<LatencyCallback>,
    subscriptions: HashMap<Topic, EventCallback>,
}

struct Inner {
    callbacks: Mutex<Callbacks>,
    disconnect_on_register: AtomicBool,
    rejected_topics: Mutex<HashSet<Topic>>,
    running: AtomicBool,
    start_calls: AtomicUsize,
    start_failures: Mutex<StartFailures>,
    stop_calls: AtomicUsize,
}

/// Scriptable in-process event meter.
#[derive(Clone)]
pub struct MockEventMeter {
    inner: Arc<Inner>,
}

impl MockEventMeter {
    /// Creates a meter whose operations all succeed.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                callbacks: Mutex::new(Callbacks::default()),
                disconnect_on_register: AtomicBool::new(false),
                rejected_topics: Mutex::new(HashSet::new()),
                running: AtomicBool::new(false),
                start_calls: AtomicUsize::new(0),
                start_failures: Mutex::new(StartFailures::None),
                stop_calls: AtomicUsize::new(0),
            }),
        }
    }

    /// Makes the next `times` calls to `start` fail.
    pub fn fail_starts(&self, times: usize) {
        *self.inner.start_failures.lock() = StartFailures::Times(times);
    }

    /// Makes every call to `start` fail.
    pub fn fail_all_starts(&self) {
        *self.inner.start_failures.lock() = StartFailures::Always;
    }

    /// Makes subscribing to `topic` fail.
    pub fn reject_topic(&self, topic: Topic) {
        self.inner.rejected_topics.lock().insert(topic);
    }

    /// Drops the connection inside the next `register_disconnect_callback`,
    /// running the callback to completion before registration returns.
    pub fn disconnect_on_register(&self) {
        self.inner
            .disconnect_on_register
            .store(true, Ordering::SeqCst);
    }

    /// Number of times `start` has been called.
    #[must_use]
    pub fn start_calls(&self) -> usize {
        self.inner.start_calls.load(Ordering::SeqCst)
    }

    /// Number of times `stop` has been called.
    #[must_use]
    pub fn stop_calls(&self) -> usize {
        self.inner.stop_calls.load(Ordering::SeqCst)
    }

    /// Whether the meter is currently connected.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Whether a callback is registered for `topic`.
    #[must_use]
    pub fn is_subscribed(&self, topic: Topic) -> bool {
        self.inner.callbacks.lock().subscriptions.contains_key(&topic)
    }

    /// Whether latency or disconnect callbacks are registered.
    #[must_use]
    pub fn has_callbacks(&self) -> bool {
        let callbacks = self.inner.callbacks.lock();
        callbacks.latency.is_some() || callbacks.disconnect.is_some()
    }

    /// Delivers an event to its topic's subscriber on a fresh task and waits
    /// for the callback to finish. Returns `false` if nothing was delivered.
    pub async fn emit(&self, event: Event) -> bool {
        if !self.is_running() {
            return false;
        }

        let callback = self
            .inner
            .callbacks
            .lock()
            .subscriptions
            .get(&event.topic())
            .cloned();

        match callback {
            Some(callback) => tokio::spawn(callback(event)).await.is_ok(),
            None => false,
        }
    }

    /// Delivers a latency sample, in nanoseconds. Returns `false` if nothing
    /// was delivered.
    pub async fn emit_latency(&self, latency_ns: f64) -> bool {
        if !self.is_running() {
            return false;
        }

        let callback = self.inner.callbacks.lock().latency.clone();

        match callback {
            Some(callback) => tokio::spawn(callback(latency_ns)).await.is_ok(),
            None => false,
        }
    }

    /// Drops the connection and fires the disconnect callback once. Returns
    /// `false` if the meter was not connected.
    pub async fn disconnect(&self) -> bool {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            return false;
        }

        let callback = self.inner.callbacks.lock().disconnect.clone();

        if let Some(callback) = callback {
            let _ = tokio::spawn(callback()).await;
        }

        true
    }
}

impl Default for MockEventMeter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventMeter for MockEventMeter {
    type Error = Error;

    async fn start(&self) -> Result<(), Self::Error> {
        self.inner.start_calls.fetch_add(1, Ordering::SeqCst);

        let fail = {
            let mut failures = self.inner.start_failures.lock();
            match *failures {
                StartFailures::None => false,
                StartFailures::Always => true,
                StartFailures::Times(0) => {
                    *failures = StartFailures::None;
                    false
                }
                StartFailures::Times(n) => {
                    *failures = StartFailures::Times(n - 1);
                    true
                }
            }
        };

        if fail {
            debug!("mock start failed");
            return Err(Error::ConnectionRefused);
        }

        self.inner.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) {
        self.inner.stop_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.running.store(false, Ordering::SeqCst);
    }

    async fn subscribe(&self, topic: Topic, callback: EventCallback) -> Result<(), Self::Error> {
        if self.inner.rejected_topics.lock().contains(&topic) {
            return Err(Error::SubscribeRejected(topic));
        }

        self.inner
            .callbacks
            .lock()
            .subscriptions
            .insert(topic, callback);
        Ok(())
    }

    async fn unsubscribe(&self, topic: Topic) -> Result<(), Self::Error> {
        self.inner.callbacks.lock().subscriptions.remove(&topic);
        Ok(())
    }

    fn register_latency_callback(&self, callback: LatencyCallback) {
        self.inner.callbacks.lock().latency = Some(callback);
    }

    fn register_disconnect_callback(&self, callback: DisconnectCallback) {
        self.inner.callbacks.lock().disconnect = Some(callback.clone());

        if self.inner.disconnect_on_register.swap(false, Ordering::SeqCst)
            && self.inner.running.swap(false, Ordering::SeqCst)
        {
            debug!("mock connection dropped on registration");
            futures::executor::block_on(callback());
        }
    }

    fn clear_callbacks(&self) {
        let mut callbacks = self.inner.callbacks.lock();
        callbacks.latency = None;
        callbacks.disconnect = None;
    }
}
