//! JSON-RPC 2.0 over HTTP (`json-rpc://`, `json-rpcs://`).
//!
//! A `json-rpc` endpoint is served by an HTTP session to the equivalent
//! `http(s)` URL; calls post one request envelope each.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::endpoint::{Connection, Resource, Transport};
use crate::error::{CommunicationError, CommunicationResult};
use crate::method::CommunicationMethod;
use crate::transport::http::{build_session, HttpRequestMethod};

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Default)]
pub struct JsonRpcTransport;

#[async_trait]
impl Transport for JsonRpcTransport {
    async fn init_connection(&self, connection: &mut Connection) -> CommunicationResult<()> {
        let base = http_url(connection.endpoint().address(), connection.params().encryption())?;
        let session = build_session(connection, base)?;
        connection.set_resource(Resource::Http(session));
        Ok(())
    }

    async fn close_connection(&self, connection: &mut Connection) -> CommunicationResult<()> {
        connection.take_resource();
        Ok(())
    }
}

/// Map `json-rpc[s]://rest` to `http[s]://rest`.
fn http_url(address: &Url, encrypted: bool) -> CommunicationResult<Url> {
    let rest = &address.as_str()[address.scheme().len()..];
    let scheme = if encrypted { "https" } else { "http" };
    let target = format!("{scheme}{rest}");
    Url::parse(&target).map_err(|source| CommunicationError::InvalidAddress {
        address: target,
        source,
    })
}

#[derive(Debug, Serialize)]
struct RequestEnvelope<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    #[serde(skip_serializing_if = "Value::is_null")]
    params: Value,
    id: u64,
}

#[derive(Debug, Deserialize)]
struct ResponseEnvelope {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

/// Call one remote method. The input is the `params` member (`null` omits
/// it); the output is the `result` member.
#[derive(Debug, Clone)]
pub struct JsonRpcCall {
    method: String,
    request: HttpRequestMethod,
    default_input: Option<Value>,
    log: bool,
}

impl JsonRpcCall {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            request: HttpRequestMethod::post("").with_header("Content-Type", "application/json"),
            default_input: Some(Value::Null),
            log: false,
        }
    }

    /// Post to `path` relative to the endpoint address.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.request = HttpRequestMethod::post(path).with_header("Content-Type", "application/json");
        self
    }

    pub fn with_default_input(mut self, params: Value) -> Self {
        self.default_input = Some(params);
        self
    }

    pub fn with_logging(mut self, log: bool) -> Self {
        self.log = log;
        self
    }
}

#[async_trait]
impl CommunicationMethod<Value, Value> for JsonRpcCall {
    fn token(&self) -> &str {
        &self.method
    }

    fn default_input(&self) -> Option<Value> {
        self.default_input.clone()
    }

    fn log_execution(&self) -> bool {
        self.log
    }

    async fn do_on(&self, connection: &mut Connection, params: Value) -> CommunicationResult<Value> {
        let id = NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed);
        let body = serde_json::to_string(&RequestEnvelope {
            jsonrpc: "2.0",
            method: &self.method,
            params,
            id,
        })?;

        let reply = self.request.evaluate(Some(body), connection).await?;
        let envelope: ResponseEnvelope = serde_json::from_str(&reply)?;

        if let Some(error) = envelope.error {
            let mut message = format!("{} ({}): {}", self.method, error.code, error.message);
            if let Some(data) = error.data {
                message.push_str(&format!(" [{data}]"));
            }
            return Err(CommunicationError::Protocol(message));
        }
        Ok(envelope.result)
    }
}
