//! The RPC methods, shared by every transport.

use axum::http::StatusCode;
use serde::Serialize;
use serde_json::Value;
use tm_monitor::Network;
use tm_monitor_block_store::BlockStore;
use tm_monitor_event_meter::EventMeter;
use tm_monitor_node::NodeStatus;
use tm_monitor_rpc_client::RpcClient;
use tracing::warn;

use crate::RpcState;

pub(crate) const PARSE_ERROR: i64 = -32700;
pub(crate) const METHOD_NOT_FOUND: i64 = -32601;
pub(crate) const INVALID_PARAMS: i64 = -32602;
pub(crate) const INTERNAL_ERROR: i64 = -32603;

/// A failed call, with the HTTP status it maps to.
#[derive(Debug)]
pub(crate) struct Failure {
    pub(crate) status: StatusCode,
    pub(crate) code: i64,
    pub(crate) message: String,
}

impl Failure {
    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: INTERNAL_ERROR,
            message: message.into(),
        }
    }

    pub(crate) fn parse(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: PARSE_ERROR,
            message: message.into(),
        }
    }

    fn unknown_node() -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code: INVALID_PARAMS,
            message: "Cannot find node with that name".to_string(),
        }
    }

    fn unknown_method(method: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code: METHOD_NOT_FOUND,
            message: format!("Method not found: {method}"),
        }
    }

    fn missing_param(name: &str) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: INVALID_PARAMS,
            message: format!("missing parameter `{name}`"),
        }
    }
}

#[derive(Serialize)]
struct NetworkAndNodes {
    network: Network,
    nodes: Vec<NodeStatus>,
}

#[derive(Serialize)]
struct NetworkStatus {
    network_status: &'static str,
}

/// URI-style parameters may arrive quoted, e.g. `?name="host:26657"`.
pub(crate) fn unquote(value: &str) -> &str {
    let value = value.trim();
    value
        .strip_prefix('"')
        .and_then(|value| value.strip_suffix('"'))
        .unwrap_or(value)
}

/// Reads a parameter by name from an object, or by position from an array.
fn param(params: &Value, name: &str, position: usize) -> Option<String> {
    let value = match params {
        Value::Object(map) => map.get(name)?,
        Value::Array(values) => values.get(position)?,
        _ => return None,
    };

    match value {
        Value::String(value) => Some(unquote(value).to_string()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn required(params: &Value, name: &str) -> Result<String, Failure> {
    param(params, name, 0).ok_or_else(|| Failure::missing_param(name))
}

fn to_result<T: Serialize>(result: &T) -> Result<Value, Failure> {
    serde_json::to_value(result).map_err(|e| Failure::internal(e.to_string()))
}

/// Runs `method` with `params` against the monitor.
pub(crate) async fn call<M, C, S>(
    state: &RpcState<M, C, S>,
    method: &str,
    params: &Value,
) -> Result<Value, Failure>
where
    M: EventMeter,
    C: RpcClient,
    S: BlockStore,
{
    match method {
        "status" => to_result(&NetworkAndNodes {
            network: state.monitor.network(),
            nodes: state.monitor.node_statuses(),
        }),
        "status/network" => to_result(&NetworkStatus {
            network_status: state.monitor.network().health_string(),
        }),
        "status/node" => {
            let name = required(params, "name")?;
            let node = state
                .monitor
                .node_by_name(&name)
                .ok_or_else(Failure::unknown_node)?;
            to_result(&node.status())
        }
        "monitor" => monitor(state, &required(params, "endpoint")?).await,
        "unmonitor" => {
            let endpoint = required(params, "endpoint")?;
            match state.monitor.unmonitor(&endpoint).await {
                Ok(()) => Ok(Value::Bool(true)),
                Err(tm_monitor::Error::UnknownNode(_)) => Err(Failure::unknown_node()),
                Err(e) => Err(Failure::internal(e.to_string())),
            }
        }
        _ => Err(Failure::unknown_method(method)),
    }
}

/// Adds a node for `endpoint` unless one is already monitored. Safe to call
/// repeatedly.
async fn monitor<M, C, S>(state: &RpcState<M, C, S>, endpoint: &str) -> Result<Value, Failure>
where
    M: EventMeter,
    C: RpcClient,
    S: BlockStore,
{
    if let Some(node) = state.monitor.node_by_name(endpoint) {
        return to_result(&node.status());
    }

    let node = (state.node_builder)(endpoint).map_err(|e| {
        warn!(%endpoint, error = %e, "failed to build node");
        Failure::internal(e.to_string())
    })?;

    state
        .monitor
        .monitor(node.clone())
        .await
        .map_err(|e| Failure::internal(e.to_string()))?;

    to_result(&node.status())
}
