use crate::{Error, Result, RpcClient};

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tm_monitor_types::{Status, ValidatorSet};
use tracing::{debug, trace};
use url::Url;

/// Options for configuring an `HttpRpcClient`.
#[derive(Clone, Debug)]
pub struct HttpRpcClientOptions {
    /// Node address, e.g. `localhost:46657` or `tcp://host:26657`.
    pub endpoint: String,

    /// Per-request timeout.
    pub timeout: Duration,
}

impl HttpRpcClientOptions {
    /// Default options for the given endpoint.
    #[must_use]
    pub fn for_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Serialize)]
struct Request<'a> {
    jsonrpc: &'static str,
    id: &'static str,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct RpcError {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<String>,
}

#[derive(Deserialize)]
struct Response<T> {
    result: Option<T>,
    #[serde(default)]
    error: Option<RpcError>,
}

/// JSON-RPC over HTTP POST.
#[derive(Clone, Debug)]
pub struct HttpRpcClient {
    client: Client,
    url: Url,
}

impl HttpRpcClient {
    /// Creates a new client.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint is not a valid address or the HTTP
    /// client cannot be built.
    pub fn new(HttpRpcClientOptions { endpoint, timeout }: HttpRpcClientOptions) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            url: http_url(&endpoint)?,
        })
    }

    /// The URL requests are posted to.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// Calls `method` with `params` and decodes the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the node reports an error, or
    /// the result cannot be decoded into `T`.
    pub async fn call<T: DeserializeOwned>(&self, method: &'static str, params: Value) -> Result<T> {
        let request = Request {
            jsonrpc: "2.0",
            id: "tm-monitor",
            method,
            params,
        };

        debug!(method, url = %self.url, "rpc call");

        let body = self
            .client
            .post(self.url.clone())
            .json(&request)
            .send()
            .await?
            .text()
            .await?;

        trace!(method, "rpc response: {body}");

        let response: Response<T> = serde_json::from_str(&body)?;

        if let Some(RpcError { code, message, data }) = response.error {
            let message = match data {
                Some(data) if !data.is_empty() => format!("{message}: {data}"),
                _ => message,
            };
            return Err(Error::Rpc { code, message });
        }

        response.result.ok_or(Error::EmptyResponse(method))
    }
}

#[async_trait]
impl RpcClient for HttpRpcClient {
    type Error = Error;

    async fn validators(&self) -> Result<ValidatorSet> {
        self.call("validators", Value::Object(serde_json::Map::new()))
            .await
    }

    async fn status(&self) -> Result<Status> {
        self.call("status", Value::Object(serde_json::Map::new()))
            .await
    }
}

fn http_url(endpoint: &str) -> Result<Url> {
    let endpoint = endpoint.trim();
    let base = if let Some(rest) = endpoint.strip_prefix("tcp://") {
        format!("http://{rest}")
    } else if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!("http://{endpoint}")
    };

    let url = Url::parse(&base).map_err(|e| Error::InvalidEndpoint(format!("{endpoint}: {e}")))?;
    if url.host_str().is_none() {
        return Err(Error::InvalidEndpoint(format!("{endpoint}: missing host")));
    }

    Ok(url)
}
