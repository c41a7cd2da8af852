use crate::observations::Observations;
use crate::queues::{Queues, deliver};
use crate::{DeliveryMode, Error, NodeOptions, NodeState, NodeStatus, Result};

use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use tm_monitor_block_store::BlockStore;
use tm_monitor_event_meter::{
    DisconnectCallback, Event, EventCallback, EventMeter, LatencyCallback, Topic,
};
use tm_monitor_rpc_client::RpcClient;
use tm_monitor_types::{Block, Header, PubKey};
use tokio::sync::OnceCell;
use tokio::sync::mpsc::Sender;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, instrument, warn};

const NANOS_PER_MILLI: f64 = 1_000_000.0;

/// The node's own validator key, with its derived address.
struct OwnKey {
    pub_key: PubKey,
    address: String,
}

struct Inner<M, C, S>
where
    M: EventMeter,
    C: RpcClient,
    S: BlockStore,
{
    address: String,
    name: String,
    meter: M,
    client: C,
    store: S,
    delivery_mode: DeliveryMode,
    max_restarts: usize,
    validator_check_interval: Duration,
    own_key: OnceCell<OwnKey>,
    observations: Mutex<Observations>,
    queues: Mutex<Queues>,
    lifecycle: tokio::sync::Mutex<()>,
    shutdown_token: CancellationToken,
    task_tracker: TaskTracker,
}

/// Monitors a single Tendermint node.
///
/// A `Node` owns one event-stream connection. Once started it tracks the
/// node's height, block latency, validator membership and precommit record,
/// and forwards observations to whichever queues were registered before
/// `start`. Reconnecting after a disconnect is left to the owner, who calls
/// [`Node::restart_with_backoff`].
pub struct Node<M, C, S>
where
    M: EventMeter,
    C: RpcClient,
    S: BlockStore,
{
    inner: Arc<Inner<M, C, S>>,
}

impl<M, C, S> Clone for Node<M, C, S>
where
    M: EventMeter,
    C: RpcClient,
    S: BlockStore,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<M, C, S> Node<M, C, S>
where
    M: EventMeter,
    C: RpcClient,
    S: BlockStore,
{
    /// Creates a node that has not been started.
    pub fn new(
        address: impl Into<String>,
        meter: M,
        client: C,
        store: S,
        NodeOptions {
            name,
            validator_check_interval,
            max_restarts,
            delivery_mode,
        }: NodeOptions,
    ) -> Self {
        let address = address.into();
        let name = name.unwrap_or_else(|| address.clone());

        Self {
            inner: Arc::new(Inner {
                address,
                name,
                meter,
                client,
                store,
                delivery_mode,
                max_restarts,
                validator_check_interval,
                own_key: OnceCell::new(),
                observations: Mutex::new(Observations::default()),
                queues: Mutex::new(Queues::default()),
                lifecycle: tokio::sync::Mutex::new(()),
                shutdown_token: CancellationToken::new(),
                task_tracker: TaskTracker::new(),
            }),
        }
    }

    /// Forwards every new block header to `sender`.
    pub fn send_blocks_to(&self, sender: Sender<Header>) {
        self.inner.queues.lock().headers = Some(sender);
    }

    /// Forwards every full block to `sender`.
    pub fn send_full_blocks_to(&self, sender: Sender<Block>) {
        self.inner.queues.lock().blocks = Some(sender);
    }

    /// Forwards every block latency, in milliseconds, to `sender`.
    pub fn send_block_latencies_to(&self, sender: Sender<f64>) {
        self.inner.queues.lock().latencies = Some(sender);
    }

    /// Sends `true` to `sender` each time the connection drops.
    pub fn notify_about_disconnects(&self, sender: Sender<bool>) {
        self.inner.queues.lock().disconnects = Some(sender);
    }

    /// Connects to the node and begins monitoring it.
    ///
    /// # Errors
    ///
    /// Returns `Error::Subscription` if the event stream cannot be opened or a
    /// topic cannot be subscribed. The node is left as it was before the call
    /// and `start` may be retried. Returns `Error::AlreadyStarted` or
    /// `Error::Stopped` on lifecycle misuse.
    ///
    /// A connection that drops before `start` returns leaves the node
    /// `Offline`, with the disconnect already delivered; reconnecting is then
    /// up to the owner.
    pub async fn start(&self) -> Result<()> {
        let inner = &self.inner;
        let lifecycle = inner.lifecycle.lock().await;

        {
            let mut observations = inner.observations.lock();
            match observations.state {
                NodeState::Created => observations.state = NodeState::Starting,
                NodeState::Stopped => return Err(Error::Stopped),
                _ => return Err(Error::AlreadyStarted),
            }
        }

        if let Err(e) = inner.connect().await {
            let mut observations = inner.observations.lock();
            observations.state = NodeState::Created;
            observations.last_error = Some(e.to_string());
            return Err(e);
        }

        // The disconnect callback is live from here on and may already have
        // moved the node to `Offline`.
        let went_online = {
            let mut observations = inner.observations.lock();
            observations.last_error = None;
            if observations.state == NodeState::Starting {
                observations.state = NodeState::Online;
                observations.online = true;
                true
            } else {
                false
            }
        };

        if went_online {
            info!(node = %inner.address, "node started");
        } else {
            warn!(node = %inner.address, "node disconnected while starting");
        }

        // `stop` must not wait on the first validator query.
        drop(lifecycle);

        if let Err(e) = inner.check_is_validator().await {
            warn!(node = %inner.address, error = %e, "initial validator check failed");
        }

        if !inner.shutdown_token.is_cancelled() {
            inner.spawn_validator_loop();
        }

        Ok(())
    }

    /// Stops monitoring. Safe to call any number of times, including on a
    /// node that never started. Does not wait for in-flight callbacks; see
    /// [`Node::wait`].
    pub async fn stop(&self) {
        let inner = &self.inner;
        let _lifecycle = inner.lifecycle.lock().await;

        let previous = {
            let mut observations = inner.observations.lock();
            observations.online = false;
            std::mem::replace(&mut observations.state, NodeState::Stopped)
        };

        inner.shutdown_token.cancel();
        inner.task_tracker.close();

        if matches!(previous, NodeState::Created | NodeState::Stopped) {
            return;
        }

        for topic in Topic::ALL {
            if let Err(e) = inner.meter.unsubscribe(topic).await {
                debug!(node = %inner.address, ?topic, error = %e, "unsubscribe failed");
            }
        }
        inner.meter.clear_callbacks();
        inner.meter.stop().await;

        info!(node = %inner.address, "node stopped");
    }

    /// Waits for the node's background tasks to finish after `stop`.
    pub async fn wait(&self) {
        self.inner.task_tracker.wait().await;
    }

    /// Reopens the event stream with exponential backoff.
    ///
    /// Attempt `k` waits `2^k` seconds before trying. After `max_restarts`
    /// failed attempts beyond the first the loop gives up.
    ///
    /// # Errors
    ///
    /// Returns `Error::MaxRestartsExceeded` when the attempts run out,
    /// `Error::Stopped` if the node is stopped meanwhile, or
    /// `Error::NotStarted` if the node was never started.
    #[instrument(skip(self), fields(node = %self.inner.address))]
    pub async fn restart_with_backoff(&self) -> Result<()> {
        let inner = &self.inner;

        {
            let mut observations = inner.observations.lock();
            match observations.state {
                NodeState::Stopped => return Err(Error::Stopped),
                NodeState::Created | NodeState::Starting => return Err(Error::NotStarted),
                NodeState::Online | NodeState::Offline | NodeState::Reconnecting => {
                    observations.state = NodeState::Reconnecting;
                }
            }
        }

        let mut attempt: usize = 0;

        loop {
            let delay = backoff_delay(attempt);
            debug!(attempt, ?delay, "waiting before reconnect");

            tokio::select! {
                () = inner.shutdown_token.cancelled() => return Err(Error::Stopped),
                () = tokio::time::sleep(delay) => {}
            }

            match inner.meter.start().await {
                Ok(()) => {
                    let stopped = {
                        let mut observations = inner.observations.lock();
                        match observations.state {
                            NodeState::Stopped => true,
                            NodeState::Reconnecting => {
                                observations.state = NodeState::Online;
                                observations.online = true;
                                observations.resync = true;
                                observations.last_error = None;
                                false
                            }
                            // Dropped again before we got here; the owner has
                            // been notified and drives the next reconnect.
                            _ => false,
                        }
                    };

                    if stopped {
                        inner.meter.stop().await;
                        return Err(Error::Stopped);
                    }

                    info!(attempt, "reconnected");
                    return Ok(());
                }
                Err(e) => {
                    attempt += 1;
                    warn!(attempt, error = %e, "reconnect failed");

                    if attempt > inner.max_restarts {
                        let err = Error::MaxRestartsExceeded(inner.max_restarts);
                        error!(error = %err, "giving up on node");

                        let mut observations = inner.observations.lock();
                        if observations.state == NodeState::Reconnecting {
                            observations.state = NodeState::Offline;
                        }
                        observations.last_error = Some(err.to_string());

                        return Err(err);
                    }
                }
            }
        }
    }

    /// Block height and number of validators, from a fresh `validators` query.
    ///
    /// # Errors
    ///
    /// Returns `Error::Query` if the query fails.
    pub async fn num_validators(&self) -> Result<(i64, usize)> {
        let set = self
            .inner
            .client
            .validators()
            .await
            .map_err(|e| Error::Query(e.to_string()))?;

        Ok((set.block_height, set.validators.len()))
    }

    /// Sum of voting power across the current validator set.
    ///
    /// # Errors
    ///
    /// Returns `Error::Query` if the query fails.
    pub async fn total_voting_power(&self) -> Result<i64> {
        let set = self
            .inner
            .client
            .validators()
            .await
            .map_err(|e| Error::Query(e.to_string()))?;

        Ok(set.total_voting_power())
    }

    /// Remote endpoint this node was created for.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.inner.address
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Whether the node is currently connected.
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.inner.observations.lock().online
    }

    /// Whether the node's key has been seen in the validator set.
    #[must_use]
    pub fn is_validator(&self) -> bool {
        self.inner.observations.lock().is_validator
    }

    /// Voting power, if a validator.
    #[must_use]
    pub fn voting_power(&self) -> i64 {
        self.inner.observations.lock().voting_power
    }

    /// The node's public key, once it has been fetched.
    #[must_use]
    pub fn public_key(&self) -> Option<PubKey> {
        self.inner.own_key.get().map(|own| own.pub_key.clone())
    }

    /// Highest block height observed.
    #[must_use]
    pub fn height(&self) -> i64 {
        self.inner.observations.lock().height
    }

    /// Most recent block latency, in milliseconds.
    #[must_use]
    pub fn block_latency_ms(&self) -> f64 {
        self.inner.observations.lock().block_latency_ms
    }

    /// Blocks this node signed a precommit for while a validator.
    #[must_use]
    pub fn precommit_sum(&self) -> u64 {
        self.inner.observations.lock().precommit_sum
    }

    /// Blocks this node missed a precommit for while a validator.
    #[must_use]
    pub fn precommit_miss(&self) -> u64 {
        self.inner.observations.lock().precommit_miss
    }

    /// Interval between validator membership checks.
    #[must_use]
    pub fn validator_check_interval(&self) -> Duration {
        self.inner.validator_check_interval
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> NodeState {
        self.inner.observations.lock().state
    }

    /// The most recent start or reconnect failure, cleared on success.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.inner.observations.lock().last_error.clone()
    }

    /// Snapshot of the node for reporting.
    #[must_use]
    pub fn status(&self) -> NodeStatus {
        let pub_key = self.public_key();
        let observations = self.inner.observations.lock();

        NodeStatus {
            name: self.inner.name.clone(),
            online: observations.online,
            height: observations.height,
            block_latency: observations.block_latency_ms,
            is_validator: observations.is_validator,
            power: observations.voting_power,
            pub_key,
            pc_sum: observations.precommit_sum,
            pc_miss: observations.precommit_miss,
        }
    }
}

impl<M, C, S> Inner<M, C, S>
where
    M: EventMeter,
    C: RpcClient,
    S: BlockStore,
{
    /// Opens the stream, subscribes both topics and registers callbacks. On
    /// failure nothing stays subscribed or registered.
    async fn connect(self: &Arc<Self>) -> Result<()> {
        self.meter
            .start()
            .await
            .map_err(|e| Error::Subscription(e.to_string()))?;

        let callback = event_callback(Arc::downgrade(self));
        let mut subscribed = Vec::with_capacity(Topic::ALL.len());

        for topic in Topic::ALL {
            if let Err(e) = self.meter.subscribe(topic, callback.clone()).await {
                warn!(node = %self.address, ?topic, error = %e, "subscribe failed");

                for topic in subscribed {
                    if let Err(e) = self.meter.unsubscribe(topic).await {
                        debug!(node = %self.address, ?topic, error = %e, "unsubscribe failed");
                    }
                }
                self.meter.stop().await;

                return Err(Error::Subscription(format!("{}: {e}", topic.query())));
            }

            subscribed.push(topic);
        }

        self.meter
            .register_latency_callback(latency_callback(Arc::downgrade(self)));
        self.meter
            .register_disconnect_callback(disconnect_callback(Arc::downgrade(self)));

        Ok(())
    }

    fn spawn_validator_loop(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let shutdown_token = self.shutdown_token.clone();
        let interval = self.validator_check_interval;

        self.task_tracker.spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    () = shutdown_token.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let Some(inner) = weak.upgrade() else {
                    break;
                };

                if let Err(e) = inner.check_is_validator().await {
                    warn!(node = %inner.address, error = %e, "validator check failed");
                }
            }
        });
    }

    #[instrument(skip(self), fields(node = %self.address))]
    async fn check_is_validator(&self) -> Result<()> {
        let set = self
            .client
            .validators()
            .await
            .map_err(|e| Error::Query(e.to_string()))?;

        let own = self.own_key().await?;

        if let Some(validator) = set
            .validators
            .iter()
            .find(|validator| validator.pub_key == own.pub_key)
        {
            let mut observations = self.observations.lock();
            if !observations.is_validator {
                info!(voting_power = validator.voting_power, "node is a validator");
            }
            observations.is_validator = true;
            observations.voting_power = validator.voting_power;
        }

        Ok(())
    }

    async fn own_key(&self) -> Result<&OwnKey> {
        self.own_key
            .get_or_try_init(|| async {
                let status = self
                    .client
                    .status()
                    .await
                    .map_err(|e| Error::Query(e.to_string()))?;

                let pub_key = status.validator_info.pub_key;
                let address = pub_key
                    .address()
                    .map_err(|e| Error::Query(e.to_string()))?;

                debug!(node = %self.address, %address, "fetched public key");

                Ok::<_, Error>(OwnKey { pub_key, address })
            })
            .await
    }

    async fn handle_event(&self, event: Event) {
        match event {
            Event::NewBlockHeader(header) => self.handle_header(header).await,
            Event::NewBlock(block) => self.handle_block(block).await,
        }
    }

    async fn handle_header(&self, header: Header) {
        let height = self.observations.lock().observe_height(header.height);

        info!(
            node = %self.address,
            height,
            num_txs = header.num_txs,
            "new block header"
        );

        let sender = self.queues.lock().headers.clone();
        deliver(self.delivery_mode, &self.name, "header", sender, header).await;
    }

    async fn handle_block(&self, block: Block) {
        self.persist(block.clone());

        let signed = self
            .own_key
            .get()
            .map(|own| block.last_commit.signed_by(&own.address));

        {
            let mut observations = self.observations.lock();
            observations.observe_height(block.height());
            if let Some(signed) = signed {
                observations.count_precommit(signed);
            }
        }

        let sender = self.queues.lock().blocks.clone();
        deliver(self.delivery_mode, &self.name, "block", sender, block).await;
    }

    fn persist(&self, block: Block) {
        let store = self.store.clone();
        let node = self.address.clone();

        self.task_tracker.spawn(async move {
            if let Err(e) = store.save(&block).await {
                warn!(%node, height = block.height(), error = %e, "failed to save block");
            }
        });
    }

    async fn handle_latency(&self, latency_ns: f64) {
        let latency_ms = latency_ns / NANOS_PER_MILLI;
        self.observations.lock().block_latency_ms = latency_ms;

        let sender = self.queues.lock().latencies.clone();
        deliver(self.delivery_mode, &self.name, "latency", sender, latency_ms).await;
    }

    async fn handle_disconnect(&self) {
        {
            let mut observations = self.observations.lock();
            if observations.state == NodeState::Stopped {
                return;
            }
            observations.online = false;
            observations.state = NodeState::Offline;
        }

        warn!(node = %self.address, "node disconnected");

        let sender = self.queues.lock().disconnects.clone();
        deliver(self.delivery_mode, &self.name, "disconnect", sender, true).await;
    }
}

fn event_callback<M, C, S>(inner: Weak<Inner<M, C, S>>) -> EventCallback
where
    M: EventMeter,
    C: RpcClient,
    S: BlockStore,
{
    Arc::new(move |event| {
        let inner = inner.clone();
        async move {
            if let Some(inner) = inner.upgrade() {
                inner.handle_event(event).await;
            }
        }
        .boxed()
    })
}

fn latency_callback<M, C, S>(inner: Weak<Inner<M, C, S>>) -> LatencyCallback
where
    M: EventMeter,
    C: RpcClient,
    S: BlockStore,
{
    Arc::new(move |latency_ns| {
        let inner = inner.clone();
        async move {
            if let Some(inner) = inner.upgrade() {
                inner.handle_latency(latency_ns).await;
            }
        }
        .boxed()
    })
}

fn disconnect_callback<M, C, S>(inner: Weak<Inner<M, C, S>>) -> DisconnectCallback
where
    M: EventMeter,
    C: RpcClient,
    S: BlockStore,
{
    Arc::new(move || {
        let inner = inner.clone();
        async move {
            if let Some(inner) = inner.upgrade() {
                inner.handle_disconnect().await;
            }
        }
        .boxed()
    })
}

/// `2^attempt` seconds, saturating.
fn backoff_delay(attempt: usize) -> Duration {
    let secs = u32::try_from(attempt)
        .ok()
        .and_then(|attempt| 1u64.checked_shl(attempt))
        .unwrap_or(u64::MAX);

    Duration::from_secs(secs)
}
