//! Watches a fleet of Tendermint nodes and aggregates their health.
//!
//! The [`Monitor`] owns a set of [`Node`]s. It listens to each node's header,
//! latency and disconnect queues, keeps a [`Network`] summary current, and
//! restarts nodes whose connections drop.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod network;

pub use error::{Error, Result};
pub use network::{Health, Network};

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tm_monitor_block_store::BlockStore;
use tm_monitor_event_meter::EventMeter;
use tm_monitor_node::{Node, NodeStatus};
use tm_monitor_rpc_client::RpcClient;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Builds an unstarted node for an endpoint. Used to add nodes at runtime.
pub type NodeBuilder<M, C, S> = Arc<dyn Fn(&str) -> Result<Node<M, C, S>> + Send + Sync>;

/// Options for configuring a `Monitor`.
#[derive(Clone, Debug)]
pub struct MonitorOptions {
    /// Capacity of each per-node queue the monitor listens on.
    pub queue_capacity: usize,

    /// How often the validator set size and node counts are refreshed.
    pub update_interval: Duration,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            queue_capacity: 100,
            update_interval: Duration::from_secs(5),
        }
    }
}

struct Monitored<M, C, S>
where
    M: EventMeter,
    C: RpcClient,
    S: BlockStore,
{
    node: Node<M, C, S>,
    listener_token: CancellationToken,
}

struct Inner<M, C, S>
where
    M: EventMeter,
    C: RpcClient,
    S: BlockStore,
{
    nodes: RwLock<BTreeMap<String, Monitored<M, C, S>>>,
    network: Mutex<Network>,
    total_disconnects: AtomicU64,
    queue_capacity: usize,
    update_interval: Duration,
    shutdown_token: CancellationToken,
    task_tracker: TaskTracker,
}

/// Aggregates many monitored nodes into one network view.
pub struct Monitor<M, C, S>
where
    M: EventMeter,
    C: RpcClient,
    S: BlockStore,
{
    inner: Arc<Inner<M, C, S>>,
}

impl<M, C, S> Clone for Monitor<M, C, S>
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

impl<M, C, S> Monitor<M, C, S>
where
    M: EventMeter,
    C: RpcClient,
    S: BlockStore,
{
    /// Creates an empty monitor.
    #[must_use]
    pub fn new(
        MonitorOptions {
            queue_capacity,
            update_interval,
        }: MonitorOptions,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                nodes: RwLock::new(BTreeMap::new()),
                network: Mutex::new(Network::default()),
                total_disconnects: AtomicU64::new(0),
                queue_capacity,
                update_interval,
                shutdown_token: CancellationToken::new(),
                task_tracker: TaskTracker::new(),
            }),
        }
    }

    /// Adds a node and starts it.
    ///
    /// The node stays under monitoring even if it fails to start; it is then
    /// reported offline.
    ///
    /// # Errors
    ///
    /// Returns `Error::AlreadyMonitored` if a node with the same name is
    /// present, or `Error::Node` if the node fails to start.
    pub async fn monitor(&self, node: Node<M, C, S>) -> Result<()> {
        let name = node.name().to_string();
        let listener_token = self.inner.shutdown_token.child_token();

        {
            let mut nodes = self.inner.nodes.write();
            if nodes.contains_key(&name) {
                return Err(Error::AlreadyMonitored(name));
            }
            nodes.insert(
                name.clone(),
                Monitored {
                    node: node.clone(),
                    listener_token: listener_token.clone(),
                },
            );
        }

        self.listen(&node, listener_token);

        let result = node.start().await;
        self.inner.recount();

        match result {
            Ok(()) => {
                info!(node = %name, "monitoring node");
                Ok(())
            }
            Err(e) => {
                warn!(node = %name, error = %e, "monitored node failed to start");
                Err(e.into())
            }
        }
    }

    /// Stops a node and removes it from monitoring.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnknownNode` if no node has this name.
    pub async fn unmonitor(&self, name: &str) -> Result<()> {
        let monitored = self
            .inner
            .nodes
            .write()
            .remove(name)
            .ok_or_else(|| Error::UnknownNode(name.to_string()))?;

        monitored.listener_token.cancel();
        monitored.node.stop().await;
        self.inner.recount();

        info!(node = %name, "stopped monitoring node");

        Ok(())
    }

    /// Looks up a monitored node.
    #[must_use]
    pub fn node_by_name(&self, name: &str) -> Option<Node<M, C, S>> {
        self.inner
            .nodes
            .read()
            .get(name)
            .map(|monitored| monitored.node.clone())
    }

    /// All monitored nodes, ordered by name.
    #[must_use]
    pub fn nodes(&self) -> Vec<Node<M, C, S>> {
        self.inner
            .nodes
            .read()
            .values()
            .map(|monitored| monitored.node.clone())
            .collect()
    }

    /// Status snapshots of all monitored nodes, ordered by name.
    #[must_use]
    pub fn node_statuses(&self) -> Vec<NodeStatus> {
        self.inner
            .nodes
            .read()
            .values()
            .map(|monitored| monitored.node.status())
            .collect()
    }

    /// Snapshot of the network summary.
    #[must_use]
    pub fn network(&self) -> Network {
        let mut network = self.inner.network.lock().clone();
        network.total_disconnects = self.inner.total_disconnects.load(Ordering::Relaxed);
        network
    }

    /// Starts the periodic refresh of validator and node counts.
    pub fn start(&self) {
        let weak = Arc::downgrade(&self.inner);
        let shutdown_token = self.inner.shutdown_token.clone();
        let update_interval = self.inner.update_interval;

        self.inner.task_tracker.spawn(async move {
            let mut ticker = tokio::time::interval(update_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    () = shutdown_token.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let Some(inner) = weak.upgrade() else {
                    break;
                };

                inner.update_num_validators().await;
                inner.recount();
            }
        });
    }

    /// Starts many nodes concurrently. Returns how many started successfully.
    pub async fn start_all(&self, nodes: Vec<Node<M, C, S>>) -> usize {
        let mut join_set = JoinSet::new();

        for node in nodes {
            let monitor = self.clone();
            join_set.spawn(async move { monitor.monitor(node).await });
        }

        let mut started = 0;
        while let Some(result) = join_set.join_next().await {
            match result {
                Ok(Ok(())) => started += 1,
                Ok(Err(e)) => debug!(error = %e, "node not started"),
                Err(e) => error!(error = %e, "node start task failed"),
            }
        }

        started
    }

    /// Stops every node and the monitor's own tasks.
    pub async fn stop(&self) {
        self.inner.shutdown_token.cancel();
        self.inner.task_tracker.close();

        for node in self.nodes() {
            node.stop().await;
        }

        self.inner.task_tracker.wait().await;
        self.inner.recount();

        info!("monitor stopped");
    }

    fn listen(&self, node: &Node<M, C, S>, listener_token: CancellationToken) {
        let capacity = self.inner.queue_capacity;
        let (headers_tx, mut headers_rx) = mpsc::channel(capacity);
        let (latencies_tx, mut latencies_rx) = mpsc::channel(capacity);
        let (disconnects_tx, mut disconnects_rx) = mpsc::channel(capacity);

        node.send_blocks_to(headers_tx);
        node.send_block_latencies_to(latencies_tx);
        node.notify_about_disconnects(disconnects_tx);

        let inner = self.inner.clone();
        let node = node.clone();

        self.inner.task_tracker.spawn(async move {
            loop {
                tokio::select! {
                    () = listener_token.cancelled() => break,
                    Some(header) = headers_rx.recv() => {
                        inner.network.lock().new_block(header.height);
                    }
                    Some(latency_ms) = latencies_rx.recv() => {
                        inner.network.lock().new_block_latency(latency_ms);
                    }
                    Some(_) = disconnects_rx.recv() => {
                        inner.node_disconnected(&node, listener_token.clone());
                    }
                    else => break,
                }
            }
        });
    }
}

impl<M, C, S> Inner<M, C, S>
where
    M: EventMeter,
    C: RpcClient,
    S: BlockStore,
{
    fn recount(&self) {
        let counts: Vec<(bool, bool)> = self
            .nodes
            .read()
            .values()
            .map(|monitored| (monitored.node.is_online(), monitored.node.is_validator()))
            .collect();

        self.network.lock().recount(counts);
    }

    fn node_disconnected(self: &Arc<Self>, node: &Node<M, C, S>, listener_token: CancellationToken) {
        self.total_disconnects.fetch_add(1, Ordering::Relaxed);
        self.recount();

        warn!(node = %node.name(), "node disconnected, restarting");

        let inner = Arc::downgrade(self);
        let node = node.clone();

        self.task_tracker.spawn(async move {
            let result = tokio::select! {
                () = listener_token.cancelled() => return,
                result = node.restart_with_backoff() => result,
            };

            match result {
                Ok(()) => info!(node = %node.name(), "node back online"),
                Err(tm_monitor_node::Error::Stopped) => {
                    debug!(node = %node.name(), "node stopped while restarting");
                }
                Err(e) => error!(node = %node.name(), error = %e, "node restart failed"),
            }

            if let Some(inner) = inner.upgrade() {
                inner.recount();
            }
        });
    }

    async fn update_num_validators(&self) {
        let online: Vec<Node<M, C, S>> = self
            .nodes
            .read()
            .values()
            .filter(|monitored| monitored.node.is_online())
            .map(|monitored| monitored.node.clone())
            .collect();

        for node in online {
            match node.num_validators().await {
                Ok((height, num_validators)) => {
                    debug!(node = %node.name(), height, num_validators, "validator set size");
                    self.network.lock().num_validators = num_validators;
                    return;
                }
                Err(e) => warn!(node = %node.name(), error = %e, "failed to count validators"),
            }
        }
    }
}
