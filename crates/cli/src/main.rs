//! Monitors a set of Tendermint nodes and serves their status over JSON-RPC.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_pub_crate)]

mod ton;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tm_monitor::{Monitor, MonitorOptions, NodeBuilder};
use tm_monitor_block_store_memory::MemoryBlockStore;
use tm_monitor_event_meter_ws::{WsEventMeter, WsEventMeterOptions};
use tm_monitor_node::{DeliveryMode, Node, NodeOptions};
use tm_monitor_rpc_client::{HttpRpcClient, HttpRpcClientOptions};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

type CliMonitor = Monitor<WsEventMeter, HttpRpcClient, MemoryBlockStore>;
type CliNode = Node<WsEventMeter, HttpRpcClient, MemoryBlockStore>;

/// CLI-specific error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The listen address could not be parsed.
    #[error("invalid listen address `{0}`")]
    ListenAddr(String),

    /// Monitor error
    #[error(transparent)]
    Monitor(#[from] tm_monitor::Error),

    /// RPC server error
    #[error(transparent)]
    RpcServer(#[from] tm_monitor_rpc_server::Error),

    /// The RPC server task panicked or was aborted.
    #[error("rpc server task failed: {0}")]
    ServerTask(#[from] tokio::task::JoinError),
}

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Node RPC endpoints to monitor, e.g. `localhost:26657`. May be comma-separated.
    #[arg(required = true, value_delimiter = ',')]
    endpoints: Vec<String>,

    /// Address the monitor's own RPC server listens on
    #[arg(long, default_value = "0.0.0.0:46670", env = "TM_MONITOR_LISTEN_ADDR")]
    listen_addr: String,

    /// Do not draw the table of nodes; log to stdout instead
    #[arg(long, env = "TM_MONITOR_NO_TON")]
    no_ton: bool,

    /// Seconds between validator set checks
    #[arg(
        long,
        default_value_t = 5,
        env = "TM_MONITOR_VALIDATOR_CHECK_INTERVAL_SECS"
    )]
    validator_check_interval_secs: u64,

    /// Reconnect attempts before a node is given up on
    #[arg(long, default_value_t = 25, env = "TM_MONITOR_MAX_RESTARTS")]
    max_restarts: usize,

    /// Capacity of each per-node queue
    #[arg(long, default_value_t = 100, env = "TM_MONITOR_QUEUE_CAPACITY")]
    queue_capacity: usize,

    /// Drop new values instead of waiting when a queue is full
    #[arg(long, env = "TM_MONITOR_DROP_WHEN_FULL")]
    drop_when_full: bool,

    /// Number of most recent blocks kept in memory
    #[arg(long, default_value_t = 1000, env = "TM_MONITOR_BLOCK_RETENTION")]
    block_retention: usize,

    /// Timeout for RPC queries to nodes, in seconds
    #[arg(long, default_value_t = 10, env = "TM_MONITOR_RPC_TIMEOUT_SECS")]
    rpc_timeout_secs: u64,
}

impl Args {
    fn node_options(&self) -> NodeOptions {
        NodeOptions {
            validator_check_interval: Duration::from_secs(self.validator_check_interval_secs),
            max_restarts: self.max_restarts,
            delivery_mode: if self.drop_when_full {
                DeliveryMode::DropNewest
            } else {
                DeliveryMode::Block
            },
            ..NodeOptions::default()
        }
    }
}

/// Accepts `host:port` or Tendermint's `tcp://host:port`.
fn parse_listen_addr(listen_addr: &str) -> Result<SocketAddr, Error> {
    let trimmed = listen_addr.trim();

    trimmed
        .strip_prefix("tcp://")
        .unwrap_or(trimmed)
        .parse()
        .map_err(|_| Error::ListenAddr(listen_addr.to_string()))
}

fn node_builder(args: &Args) -> NodeBuilder<WsEventMeter, HttpRpcClient, MemoryBlockStore> {
    let node_options = args.node_options();
    let rpc_timeout = Duration::from_secs(args.rpc_timeout_secs);
    let store = MemoryBlockStore::with_capacity(args.block_retention);

    Arc::new(move |endpoint: &str| -> tm_monitor::Result<CliNode> {
        let build_error = |message: String| tm_monitor::Error::Build {
            endpoint: endpoint.to_string(),
            message,
        };

        let meter = WsEventMeter::new(WsEventMeterOptions::for_endpoint(endpoint))
            .map_err(|e| build_error(e.to_string()))?;
        let client = HttpRpcClient::new(HttpRpcClientOptions {
            endpoint: endpoint.to_string(),
            timeout: rpc_timeout,
        })
        .map_err(|e| build_error(e.to_string()))?;

        Ok(Node::new(
            endpoint,
            meter,
            client,
            store.clone(),
            node_options.clone(),
        ))
    })
}

fn init_logging(no_ton: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // The table owns stdout while it is drawn.
    if no_ton {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn spawn_signal_handler(shutdown_token: CancellationToken) {
    tokio::spawn(async move {
        if cfg!(unix) {
            use tokio::signal::unix::{SignalKind, signal};

            let mut sigterm = signal(SignalKind::terminate()).expect("SIGTERM handler failed");
            let mut sigint = signal(SignalKind::interrupt()).expect("SIGINT handler failed");

            tokio::select! {
                _ = sigterm.recv() => info!("Received SIGTERM"),
                _ = sigint.recv() => info!("Received SIGINT"),
            }
        } else {
            let _ = tokio::signal::ctrl_c().await;
            info!("Received interrupt signal");
        }

        info!("Shutting down");
        shutdown_token.cancel();
    });
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();
    init_logging(args.no_ton);

    let listen_addr = parse_listen_addr(&args.listen_addr)?;

    let shutdown_token = CancellationToken::new();
    spawn_signal_handler(shutdown_token.clone());

    let node_builder = node_builder(&args);
    let monitor: CliMonitor = Monitor::new(MonitorOptions {
        queue_capacity: args.queue_capacity,
        ..MonitorOptions::default()
    });

    let nodes = args
        .endpoints
        .iter()
        .map(|endpoint| node_builder(endpoint.trim()))
        .collect::<tm_monitor::Result<Vec<_>>>()?;
    let total = nodes.len();

    let started = monitor.start_all(nodes).await;
    if started < total {
        warn!(started, total, "some nodes failed to start");
    } else {
        info!(started, "all nodes started");
    }

    monitor.start();

    let router = tm_monitor_rpc_server::router(monitor.clone(), node_builder);
    let mut server = tokio::spawn(tm_monitor_rpc_server::serve(
        listen_addr,
        router,
        shutdown_token.clone(),
    ));

    let table = (!args.no_ton)
        .then(|| tokio::spawn(ton::run(monitor.clone(), shutdown_token.clone())));

    let server_result = tokio::select! {
        () = shutdown_token.cancelled() => None,
        result = &mut server => Some(result),
    };

    shutdown_token.cancel();
    monitor.stop().await;

    if let Some(table) = table {
        let _ = table.await;
    }

    match server_result {
        Some(result) => result??,
        None => server.await??,
    }

    Ok(())
}
