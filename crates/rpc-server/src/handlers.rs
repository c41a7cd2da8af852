use std::collections::HashMap;

use axum::Json;
use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tm_monitor_block_store::BlockStore;
use tm_monitor_event_meter::EventMeter;
use tm_monitor_rpc_client::RpcClient;
use tracing::{debug, error};

use crate::RpcState;
use crate::methods::{self, Failure};

/// The id URI-style calls answer with.
const URI_ID: i64 = -1;

#[derive(Serialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Serialize)]
struct RpcResponse {
    jsonrpc: &'static str,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcError>,
}

impl RpcResponse {
    fn new(id: Value, outcome: Result<Value, Failure>) -> (StatusCode, Self) {
        match outcome {
            Ok(result) => (
                StatusCode::OK,
                Self {
                    jsonrpc: "2.0",
                    id,
                    result: Some(result),
                    error: None,
                },
            ),
            Err(Failure {
                status,
                code,
                message,
            }) => (
                status,
                Self {
                    jsonrpc: "2.0",
                    id,
                    result: None,
                    error: Some(RpcError { code, message }),
                },
            ),
        }
    }
}

#[derive(Deserialize)]
struct RpcRequest {
    #[serde(default)]
    id: Value,
    method: String,
    #[serde(default)]
    params: Value,
}

async fn handle_request<M, C, S>(
    state: &RpcState<M, C, S>,
    body: &[u8],
) -> (StatusCode, RpcResponse)
where
    M: EventMeter,
    C: RpcClient,
    S: BlockStore,
{
    match serde_json::from_slice::<RpcRequest>(body) {
        Ok(RpcRequest { id, method, params }) => {
            debug!(%method, "rpc request");
            RpcResponse::new(id, methods::call(state, &method, &params).await)
        }
        Err(e) => RpcResponse::new(Value::Null, Err(Failure::parse(format!("parse error: {e}")))),
    }
}

/// `GET /<method>?<param>=<value>`
pub(crate) async fn uri_handler<M, C, S>(
    State(state): State<RpcState<M, C, S>>,
    Path(method): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Response
where
    M: EventMeter,
    C: RpcClient,
    S: BlockStore,
{
    let params = query
        .into_iter()
        .map(|(name, value)| (name, Value::String(value)))
        .collect();

    let method = method.trim_end_matches('/');
    let outcome = methods::call(&state, method, &Value::Object(params)).await;
    let (status, response) = RpcResponse::new(Value::from(URI_ID), outcome);

    (status, Json(response)).into_response()
}

/// `POST /` with a JSON-RPC request body.
pub(crate) async fn post_handler<M, C, S>(
    State(state): State<RpcState<M, C, S>>,
    body: Bytes,
) -> Response
where
    M: EventMeter,
    C: RpcClient,
    S: BlockStore,
{
    let (status, response) = handle_request(&state, &body).await;

    (status, Json(response)).into_response()
}

/// `GET /websocket`: one JSON-RPC response per request frame.
pub(crate) async fn ws_handler<M, C, S>(
    State(state): State<RpcState<M, C, S>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse
where
    M: EventMeter,
    C: RpcClient,
    S: BlockStore,
{
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket<M, C, S>(mut socket: WebSocket, state: RpcState<M, C, S>)
where
    M: EventMeter,
    C: RpcClient,
    S: BlockStore,
{
    debug!("websocket client connected");

    while let Some(message) = socket.recv().await {
        let body = match message {
            Ok(Message::Text(text)) => Bytes::copy_from_slice(text.as_str().as_bytes()),
            Ok(Message::Binary(bytes)) => bytes,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!(error = %e, "websocket receive failed");
                break;
            }
        };

        let (_, response) = handle_request(&state, &body).await;

        let text = match serde_json::to_string(&response) {
            Ok(text) => text,
            Err(e) => {
                error!(error = %e, "failed to encode websocket response");
                continue;
            }
        };

        if let Err(e) = socket.send(Message::text(text)).await {
            debug!(error = %e, "websocket send failed");
            break;
        }
    }

    debug!("websocket client disconnected");
}
