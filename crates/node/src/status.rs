use serde::{Deserialize, Serialize};
use tm_monitor_types::PubKey;

/// Lifecycle state of a `Node`.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    /// Constructed, not yet started. Also the state after a failed start.
    #[default]
    Created,

    /// `start` is in progress.
    Starting,

    /// Connected and receiving events.
    Online,

    /// The connection was lost.
    Offline,

    /// A reconnect loop is running.
    Reconnecting,

    /// Stopped for good.
    Stopped,
}

/// Point-in-time snapshot of a node, as served over RPC.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct NodeStatus {
    /// Display name.
    pub name: String,

    /// Whether the node is connected.
    pub online: bool,

    /// Highest block height observed.
    pub height: i64,

    /// Most recent block latency, in milliseconds.
    pub block_latency: f64,

    /// Whether the node's key is in the validator set.
    pub is_validator: bool,

    /// Voting power, if a validator.
    pub power: i64,

    /// The node's public key, once fetched.
    pub pub_key: Option<PubKey>,

    /// Blocks this node signed a precommit for.
    pub pc_sum: u64,

    /// Blocks this node missed a precommit for.
    pub pc_miss: u64,
}
