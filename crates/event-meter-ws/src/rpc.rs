//! JSON-RPC framing for Tendermint's websocket subscription API.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tm_monitor_event_meter::Topic;

const CLIENT_ID: &str = "tm-monitor";

#[derive(Serialize)]
struct QueryParams<'a> {
    query: &'a str,
}

#[derive(Serialize)]
struct Request<'a> {
    jsonrpc: &'static str,
    id: String,
    method: &'static str,
    params: QueryParams<'a>,
}

fn request(method: &'static str, topic: Topic) -> Request<'static> {
    Request {
        jsonrpc: "2.0",
        id: format!("{CLIENT_ID}#{method}#{topic:?}"),
        method,
        params: QueryParams {
            query: topic.query(),
        },
    }
}

/// Encodes a `subscribe` request for `topic`.
pub fn subscribe_request(topic: Topic) -> serde_json::Result<String> {
    serde_json::to_string(&request("subscribe", topic))
}

/// Encodes an `unsubscribe` request for `topic`.
pub fn unsubscribe_request(topic: Topic) -> serde_json::Result<String> {
    serde_json::to_string(&request("unsubscribe", topic))
}

#[derive(Debug, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SubscriptionResult {
    #[serde(default)]
    pub data: Option<Value>,
}

/// A frame received from the node. Subscription acks carry an empty result,
/// event notifications carry `result.data`.
#[derive(Debug, Deserialize)]
pub struct Response {
    #[serde(default)]
    pub result: Option<SubscriptionResult>,
    #[serde(default)]
    pub error: Option<RpcError>,
}
