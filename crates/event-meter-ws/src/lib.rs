//! Websocket implementation of the event meter interface.
//!
//! Connects to a Tendermint node's `/websocket` endpoint, subscribes to event
//! queries over JSON-RPC and dispatches decoded events to the registered
//! callbacks, each on its own task. Block latency is the interval between
//! consecutive `NewBlockHeader` events.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod rpc;

pub use error::{Error, Result};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tm_monitor_event_meter::{
    DisconnectCallback, Event, EventCallback, EventMeter, LatencyCallback, Topic,
};
use tokio::net::TcpStream;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, trace, warn};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = Arc<tokio::sync::Mutex<SplitSink<WsStream, Message>>>;

/// Options for configuring a `WsEventMeter`.
#[derive(Clone, Debug)]
pub struct WsEventMeterOptions {
    /// Node address, e.g. `localhost:46657` or `tcp://host:26657`.
    pub endpoint: String,

    /// Path of the websocket endpoint. Usually `/websocket`.
    pub path: String,

    /// How often to ping the node to detect dead connections.
    pub ping_interval: Duration,
}

impl WsEventMeterOptions {
    /// Default options for the given endpoint.
    #[must_use]
    pub fn for_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            path: "/websocket".to_string(),
            ping_interval: Duration::from_secs(10),
        }
    }
}

#[derive(Default)]
struct Callbacks {
    disconnect: Option<DisconnectCallback>,
    latency: Option<LatencyCallback>,
    subscriptions: HashMap<Topic, EventCallback>,
}

struct Connection {
    shutdown_token: CancellationToken,
    sink: WsSink,
    task_tracker: TaskTracker,
}

/// Event meter over a Tendermint websocket connection.
#[derive(Clone)]
pub struct WsEventMeter {
    callbacks: Arc<Mutex<Callbacks>>,
    connection: Arc<tokio::sync::Mutex<Option<Connection>>>,
    ping_interval: Duration,
    url: Url,
}

impl WsEventMeter {
    /// Creates a new meter. Does not connect until `start` is called.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint cannot be turned into a websocket URL.
    pub fn new(
        WsEventMeterOptions {
            endpoint,
            path,
            ping_interval,
        }: WsEventMeterOptions,
    ) -> Result<Self> {
        Ok(Self {
            callbacks: Arc::new(Mutex::new(Callbacks::default())),
            connection: Arc::new(tokio::sync::Mutex::new(None)),
            ping_interval,
            url: websocket_url(&endpoint, &path)?,
        })
    }

    /// The websocket URL this meter connects to.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    async fn send_text(sink: &WsSink, text: String) -> Result<()> {
        sink.lock()
            .await
            .send(Message::text(text))
            .await
            .map_err(|e| Error::Send(e.to_string()))
    }

    fn spawn_ping_task(&self, connection: &Connection) {
        let ping_interval = self.ping_interval;
        let shutdown_token = connection.shutdown_token.clone();
        let sink = connection.sink.clone();

        connection.task_tracker.spawn(async move {
            let mut ticker = tokio::time::interval(ping_interval);
            // First tick is immediate.
            ticker.tick().await;

            loop {
                tokio::select! {
                    () = shutdown_token.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = sink.lock().await.send(Message::Ping(Bytes::new())).await {
                            debug!("ping failed: {e}");
                            break;
                        }
                    }
                }
            }
        });
    }

    fn spawn_read_task(&self, connection: &Connection, stream: SplitStream<WsStream>) {
        let callbacks = self.callbacks.clone();
        let shutdown_token = connection.shutdown_token.clone();
        let url = self.url.clone();

        connection.task_tracker.spawn(async move {
            let mut stream = stream;
            let mut last_header_at: Option<Instant> = None;

            loop {
                let message = tokio::select! {
                    () = shutdown_token.cancelled() => return,
                    message = stream.next() => message,
                };

                match message {
                    Some(Ok(Message::Text(text))) => {
                        handle_frame(&callbacks, text.as_str(), &mut last_header_at);
                    }
                    Some(Ok(Message::Close(frame))) => {
                        info!(%url, "connection closed by node: {frame:?}");
                        break;
                    }
                    Some(Ok(_)) => {
                        // Ping, pong and binary frames carry no events
                    }
                    Some(Err(e)) => {
                        warn!(%url, "websocket read failed: {e}");
                        break;
                    }
                    None => {
                        info!(%url, "websocket stream ended");
                        break;
                    }
                }
            }

            // stop() cancels before closing, so a cancelled token means the
            // loss was requested and must not be reported.
            if shutdown_token.is_cancelled() {
                return;
            }
            shutdown_token.cancel();

            let disconnect = callbacks.lock().disconnect.clone();
            if let Some(callback) = disconnect {
                tokio::spawn(callback());
            }
        });
    }
}

fn handle_frame(callbacks: &Mutex<Callbacks>, text: &str, last_header_at: &mut Option<Instant>) {
    let response: rpc::Response = match serde_json::from_str(text) {
        Ok(response) => response,
        Err(e) => {
            warn!("undecodable frame: {e}");
            return;
        }
    };

    if let Some(rpc_error) = response.error {
        error!(
            code = rpc_error.code,
            data = ?rpc_error.data,
            "node returned error: {}",
            rpc_error.message
        );
        return;
    }

    let Some(data) = response.result.and_then(|result| result.data) else {
        trace!("subscription ack");
        return;
    };

    let event = match Event::decode(data) {
        Ok(event) => event,
        Err(e) => {
            debug!("ignoring unknown event: {e}");
            return;
        }
    };

    let (event_callback, latency_callback) = {
        let callbacks = callbacks.lock();
        (
            callbacks.subscriptions.get(&event.topic()).cloned(),
            callbacks.latency.clone(),
        )
    };

    if matches!(event, Event::NewBlockHeader(_)) {
        let now = Instant::now();
        if let (Some(previous), Some(callback)) = (last_header_at.replace(now), latency_callback) {
            #[allow(clippy::cast_precision_loss)]
            let latency_ns = now.duration_since(previous).as_nanos() as f64;
            tokio::spawn(callback(latency_ns));
        }
    }

    if let Some(callback) = event_callback {
        tokio::spawn(callback(event));
    }
}

/// Builds the websocket URL for a node address. Accepts bare `host:port`,
/// `tcp://`, `http(s)://` and `ws(s)://` forms.
fn websocket_url(endpoint: &str, path: &str) -> Result<Url> {
    let endpoint = endpoint.trim();
    let base = if let Some(rest) = endpoint.strip_prefix("tcp://") {
        format!("ws://{rest}")
    } else if let Some(rest) = endpoint.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if let Some(rest) = endpoint.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if endpoint.starts_with("ws://") || endpoint.starts_with("wss://") {
        endpoint.to_string()
    } else {
        format!("ws://{endpoint}")
    };

    let mut url = Url::parse(&base).map_err(|e| Error::InvalidEndpoint(format!("{endpoint}: {e}")))?;
    if url.host_str().is_none() {
        return Err(Error::InvalidEndpoint(format!("{endpoint}: missing host")));
    }
    url.set_path(path);

    Ok(url)
}

#[async_trait]
impl EventMeter for WsEventMeter {
    type Error = Error;

    async fn start(&self) -> Result<()> {
        let mut guard = self.connection.lock().await;

        if let Some(previous) = guard.take() {
            previous.shutdown_token.cancel();
            previous.task_tracker.close();
        }

        debug!("connecting to {}", self.url);

        let (ws_stream, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| Error::Connect(e.to_string()))?;
        let (sink, stream) = ws_stream.split();

        let connection = Connection {
            shutdown_token: CancellationToken::new(),
            sink: Arc::new(tokio::sync::Mutex::new(sink)),
            task_tracker: TaskTracker::new(),
        };

        let topics: Vec<Topic> = self.callbacks.lock().subscriptions.keys().copied().collect();
        for topic in topics {
            Self::send_text(&connection.sink, rpc::subscribe_request(topic)?).await?;
        }

        self.spawn_read_task(&connection, stream);
        self.spawn_ping_task(&connection);
        connection.task_tracker.close();

        info!("connected to {}", self.url);
        *guard = Some(connection);

        Ok(())
    }

    async fn stop(&self) {
        let Some(connection) = self.connection.lock().await.take() else {
            return;
        };

        connection.shutdown_token.cancel();
        if let Err(e) = connection.sink.lock().await.close().await {
            debug!("close failed: {e}");
        }
        connection.task_tracker.wait().await;

        info!("disconnected from {}", self.url);
    }

    async fn subscribe(&self, topic: Topic, callback: EventCallback) -> Result<()> {
        self.callbacks.lock().subscriptions.insert(topic, callback);

        let guard = self.connection.lock().await;
        if let Some(connection) = guard.as_ref().filter(|c| !c.shutdown_token.is_cancelled()) {
            Self::send_text(&connection.sink, rpc::subscribe_request(topic)?).await?;
        }

        Ok(())
    }

    async fn unsubscribe(&self, topic: Topic) -> Result<()> {
        self.callbacks.lock().subscriptions.remove(&topic);

        let guard = self.connection.lock().await;
        if let Some(connection) = guard.as_ref().filter(|c| !c.shutdown_token.is_cancelled()) {
            Self::send_text(&connection.sink, rpc::unsubscribe_request(topic)?).await?;
        }

        Ok(())
    }

    fn register_latency_callback(&self, callback: LatencyCallback) {
        self.callbacks.lock().latency = Some(callback);
    }

    fn register_disconnect_callback(&self, callback: DisconnectCallback) {
        self.callbacks.lock().disconnect = Some(callback);
    }

    fn clear_callbacks(&self) {
        let mut callbacks = self.callbacks.lock();
        callbacks.latency = None;
        callbacks.disconnect = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::FutureExt;

    #[test]
    fn test_websocket_url_forms() {
        let cases = [
            ("localhost:46657", "ws://localhost:46657/websocket"),
            ("tcp://0.0.0.0:26657", "ws://0.0.0.0:26657/websocket"),
            ("http://node.example:26657", "ws://node.example:26657/websocket"),
            ("https://node.example", "wss://node.example/websocket"),
            ("ws://node.example:1/ignored", "ws://node.example:1/websocket"),
        ];

        for (endpoint, expected) in cases {
            assert_eq!(websocket_url(endpoint, "/websocket").unwrap().as_str(), expected);
        }
    }

    #[test]
    fn test_websocket_url_rejects_garbage() {
        assert!(websocket_url("ws://", "/websocket").is_err());
    }

    #[tokio::test]
    async fn test_frames_dispatch_events_and_latency() {
        let callbacks = Arc::new(Mutex::new(Callbacks::default()));
        let headers = Arc::new(AtomicUsize::new(0));
        let latencies = Arc::new(AtomicUsize::new(0));

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<()>();
        {
            let headers = headers.clone();
            let tx = tx.clone();
            callbacks.lock().subscriptions.insert(
                Topic::NewBlockHeader,
                Arc::new(move |_event| {
                    let headers = headers.clone();
                    let tx = tx.clone();
                    async move {
                        headers.fetch_add(1, Ordering::SeqCst);
                        let _ = tx.send(());
                    }
                    .boxed()
                }),
            );
        }
        {
            let latencies = latencies.clone();
            callbacks.lock().latency = Some(Arc::new(move |latency_ns| {
                let latencies = latencies.clone();
                let tx = tx.clone();
                async move {
                    assert!(latency_ns >= 0.0);
                    latencies.fetch_add(1, Ordering::SeqCst);
                    let _ = tx.send(());
                }
                .boxed()
            }));
        }

        let frame = r#"{"jsonrpc":"2.0","id":"tm-monitor#subscribe#NewBlockHeader","result":{"query":"tm.event='NewBlockHeader'","data":{"type":"tendermint/event/NewBlockHeader","value":{"header":{"height":"5"}}}}}"#;
        let mut last_header_at = None;

        handle_frame(&callbacks, frame, &mut last_header_at);
        handle_frame(&callbacks, frame, &mut last_header_at);

        // two header callbacks and one latency callback
        for _ in 0..3 {
            rx.recv().await.unwrap();
        }

        assert_eq!(headers.load(Ordering::SeqCst), 2);
        assert_eq!(latencies.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_start_fails_without_node() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        let meter = WsEventMeter::new(WsEventMeterOptions::for_endpoint("127.0.0.1:1")).unwrap();

        assert!(matches!(meter.start().await, Err(Error::Connect(_))));
        // stopping a meter that never connected is a no-op
        meter.stop().await;
    }
}
