//! Per-node monitoring for Tendermint networks.
//!
//! A [`Node`] connects to one node's event stream through an
//! [`EventMeter`](tm_monitor_event_meter::EventMeter), queries it through an
//! [`RpcClient`](tm_monitor_rpc_client::RpcClient), and hands full blocks to a
//! [`BlockStore`](tm_monitor_block_store::BlockStore). Observations are
//! forwarded to optional bounded queues supplied by the owner.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod node;
mod observations;
mod options;
mod queues;
mod status;

pub use error::{Error, Result};
pub use node::Node;
pub use options::{DeliveryMode, NodeOptions};
pub use status::{NodeState, NodeStatus};
