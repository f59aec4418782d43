//! JSON-RPC 2.0 over HTTPS.
//!
//! [`JsonRpcClient`] posts `{ jsonrpc, id, method, params }` to an endpoint
//! and decodes the `result` member into the caller's type. A `null` result
//! decodes into `Option::None`, so lookups such as receipts can model
//! "not found yet" without an error.

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use url::Url;

use crate::error::RpcError;

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a, P> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: P,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: serde_json::Value,
    #[serde(default)]
    error: Option<JsonRpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcErrorObject {
    code: i64,
    message: String,
}

/// A JSON-RPC client shared by every endpoint.
///
/// Clones share the HTTP connection pool and the request id counter.
#[derive(Debug, Clone)]
pub struct JsonRpcClient {
    client: Client,
    timeout: Option<Duration>,
    next_id: Arc<AtomicU64>,
}

impl Default for JsonRpcClient {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonRpcClient {
    /// Default per-request timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

    /// Creates a client with [`Self::DEFAULT_TIMEOUT`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_client(Client::new())
    }

    /// Wraps an existing reqwest client.
    #[must_use]
    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            timeout: Some(Self::DEFAULT_TIMEOUT),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The configured timeout, if any.
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Calls `method` on `url`.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::Http`] on transport failure, [`RpcError::HttpStatus`]
    /// on a non-200 response, [`RpcError::Rpc`] if the node returned an error
    /// object and [`RpcError::JsonDeserialization`] if the result does not
    /// match `R`.
    pub async fn call<P, R>(&self, url: &Url, method: &str, params: P) -> Result<R, RpcError>
    where
        P: Serialize + Send,
        R: DeserializeOwned,
    {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };
        let context = "POST JSON-RPC";

        let mut req = self.client.post(url.clone()).json(&request);
        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }
        let http_response = req
            .send()
            .await
            .map_err(|e| RpcError::Http { context, source: e })?;

        let status = http_response.status();
        let body = http_response
            .text()
            .await
            .map_err(|e| RpcError::Http { context, source: e })?;
        if status != StatusCode::OK {
            return Err(RpcError::HttpStatus {
                context,
                status,
                body,
            });
        }

        let response: JsonRpcResponse = serde_json::from_str(&body)
            .map_err(|e| RpcError::JsonDeserialization { context, source: e })?;
        if let Some(error) = response.error {
            return Err(RpcError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        serde_json::from_value(response.result).map_err(|e| RpcError::JsonDeserialization {
            context: "Decoding JSON-RPC result",
            source: e,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_call_decodes_result() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"jsonrpc": "2.0", "method": "eth_blockNumber"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"jsonrpc": "2.0", "id": 1, "result": "0x10"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = JsonRpcClient::new();
        let url: Url = server.uri().parse().unwrap();
        let result: String = client
            .call(&url, "eth_blockNumber", json!([]))
            .await
            .unwrap();
        assert_eq!(result, "0x10");
    }

    #[tokio::test]
    async fn test_null_result_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"jsonrpc": "2.0", "id": 1, "result": null})),
            )
            .mount(&server)
            .await;

        let client = JsonRpcClient::new();
        let url: Url = server.uri().parse().unwrap();
        let receipt: Option<serde_json::Value> = client
            .call(&url, "eth_getTransactionReceipt", json!(["0xabc"]))
            .await
            .unwrap();
        assert!(receipt.is_none());
    }

    #[tokio::test]
    async fn test_error_object_and_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": {"code": -32602, "message": "Invalid params"}
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let client = JsonRpcClient::new();
        let url: Url = server.uri().parse().unwrap();

        let err = client
            .call::<_, String>(&url, "getHealth", json!([]))
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::Rpc { code: -32602, .. }));
        assert!(!err.is_transient());

        let err = client
            .call::<_, String>(&url, "getHealth", json!([]))
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::HttpStatus { .. }));
        assert!(err.is_transient());
    }
}
