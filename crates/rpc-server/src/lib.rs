//! JSON-RPC for the monitor, in Tendermint's RPC style.
//!
//! Every method is reachable three ways:
//!
//! - URI style, `GET /status/node?name=host:26657`, answering with `id: -1`;
//! - `POST /` with a JSON-RPC 2.0 request body;
//! - JSON-RPC 2.0 request frames over `GET /websocket`.
//!
//! Errors come back in the `error` member. Over HTTP an unknown node or
//! method answers 404 and anything else 500.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod handlers;
mod methods;

pub use error::Error;

use std::net::SocketAddr;

use axum::Router;
use axum::routing::{get, post};
use tm_monitor::{Monitor, NodeBuilder};
use tm_monitor_block_store::BlockStore;
use tm_monitor_event_meter::EventMeter;
use tm_monitor_rpc_client::RpcClient;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::info;

/// Shared state of the RPC routes.
pub struct RpcState<M, C, S>
where
    M: EventMeter,
    C: RpcClient,
    S: BlockStore,
{
    monitor: Monitor<M, C, S>,
    node_builder: NodeBuilder<M, C, S>,
}

impl<M, C, S> Clone for RpcState<M, C, S>
where
    M: EventMeter,
    C: RpcClient,
    S: BlockStore,
{
    fn clone(&self) -> Self {
        Self {
            monitor: self.monitor.clone(),
            node_builder: self.node_builder.clone(),
        }
    }
}

/// Builds the RPC router over `monitor`. `node_builder` creates nodes for
/// the `monitor` method.
pub fn router<M, C, S>(monitor: Monitor<M, C, S>, node_builder: NodeBuilder<M, C, S>) -> Router
where
    M: EventMeter,
    C: RpcClient,
    S: BlockStore,
{
    Router::new()
        .route("/", post(handlers::post_handler::<M, C, S>))
        .route("/websocket", get(handlers::ws_handler::<M, C, S>))
        .route("/{*method}", get(handlers::uri_handler::<M, C, S>))
        .with_state(RpcState {
            monitor,
            node_builder,
        })
        .layer(CorsLayer::very_permissive())
}

/// Serves `router` on `listen_addr` until `shutdown_token` is cancelled.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails.
pub async fn serve(
    listen_addr: SocketAddr,
    router: Router,
    shutdown_token: CancellationToken,
) -> Result<(), Error> {
    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .map_err(Error::Bind)?;

    info!(%listen_addr, "rpc server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown_token.cancelled().await })
        .await
        .map_err(Error::Serve)?;

    info!("rpc server shutdown");

    Ok(())
}
