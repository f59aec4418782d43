//! Client for the edge-function RPC proxy.
//!
//! The proxy is an HTTP function that forwards selected Solana RPC methods
//! through the operator's own provider key:
//!
//! `GET {base}/functions/v1/get-solana-rpc?method=<method>&network=<network>`
//!
//! It answers with a flat JSON object, for example
//! `{ "latest_blockhash": "..." }` for `getLatestBlockhash`.

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;
use walletkit::Network;

use crate::error::RpcError;

const PROXY_PATH: &str = "functions/v1/get-solana-rpc";

/// Response of the proxy's `getLatestBlockhash` method.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LatestBlockhashResponse {
    /// Base58 blockhash.
    #[serde(alias = "blockhash")]
    pub latest_blockhash: String,
}

/// A client for the edge RPC proxy.
#[derive(Debug, Clone)]
pub struct EdgeProxyClient {
    base_url: Url,
    endpoint: Url,
    client: Client,
    headers: HeaderMap,
    timeout: Option<Duration>,
}

impl EdgeProxyClient {
    /// Default request timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Creates a client for the proxy deployed under `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::UrlParse`] if the proxy URL cannot be constructed.
    pub fn try_new(base_url: Url) -> Result<Self, RpcError> {
        let mut base = base_url;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let endpoint = base.join(PROXY_PATH).map_err(|e| RpcError::UrlParse {
            context: "Failed to construct edge proxy URL",
            source: e,
        })?;
        Ok(Self {
            base_url: base,
            endpoint,
            client: Client::new(),
            headers: HeaderMap::new(),
            timeout: Some(Self::DEFAULT_TIMEOUT),
        })
    }

    /// The base URL of the deployment.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The full proxy function URL.
    #[must_use]
    pub const fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Attaches custom headers to all requests.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Sends the deployment's anonymous key as `apikey` and bearer token.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::InvalidEndpoint`] if the key is not a valid header value.
    pub fn with_api_key(mut self, key: &str) -> Result<Self, RpcError> {
        let invalid = |_| RpcError::InvalidEndpoint {
            url: self.endpoint.to_string(),
            reason: "API key is not a valid header value",
        };
        let apikey = HeaderValue::from_str(key).map_err(invalid)?;
        let bearer = HeaderValue::from_str(&format!("Bearer {key}")).map_err(invalid)?;
        self.headers
            .insert(HeaderName::from_static("apikey"), apikey);
        self.headers.insert(AUTHORIZATION, bearer);
        Ok(self)
    }

    /// Sets the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Invokes `method` through the proxy.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError`] on transport, status or decoding failure.
    pub async fn get<R>(&self, method: &str, network: Network) -> Result<R, RpcError>
    where
        R: DeserializeOwned,
    {
        let context = "GET edge proxy";
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("method", method)
            .append_pair("network", cluster_name(network));
        let mut req = self.client.get(url);
        for (key, value) in &self.headers {
            req = req.header(key, value);
        }
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
        serde_json::from_str(&body)
            .map_err(|e| RpcError::JsonDeserialization { context, source: e })
    }

    /// Fetches the latest blockhash through the proxy.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError`] if the request fails or the blockhash is empty.
    pub async fn latest_blockhash(&self, network: Network) -> Result<String, RpcError> {
        let response: LatestBlockhashResponse = self.get("getLatestBlockhash", network).await?;
        if response.latest_blockhash.is_empty() {
            return Err(RpcError::unexpected(
                "GET edge proxy",
                "empty latest_blockhash",
            ));
        }
        Ok(response.latest_blockhash)
    }
}

/// The proxy's name for a Solana network.
const fn cluster_name(network: Network) -> &'static str {
    match network {
        Network::Mainnet => "mainnet",
        Network::Testnet => "devnet",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_endpoint_joins_under_base_path() {
        let client =
            EdgeProxyClient::try_new("https://abc.supabase.co/prefix".parse().unwrap()).unwrap();
        assert_eq!(
            client.endpoint().as_str(),
            "https://abc.supabase.co/prefix/functions/v1/get-solana-rpc"
        );
    }

    #[tokio::test]
    async fn test_latest_blockhash() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/functions/v1/get-solana-rpc"))
            .and(query_param("method", "getLatestBlockhash"))
            .and(query_param("network", "devnet"))
            .and(header("apikey", "anon"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"latest_blockhash": "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = EdgeProxyClient::try_new(server.uri().parse().unwrap())
            .unwrap()
            .with_api_key("anon")
            .unwrap();
        let hash = client.latest_blockhash(Network::Testnet).await.unwrap();
        assert_eq!(hash, "9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin");
    }

    #[tokio::test]
    async fn test_proxy_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream failed"))
            .mount(&server)
            .await;

        let client = EdgeProxyClient::try_new(server.uri().parse().unwrap()).unwrap();
        let err = client.latest_blockhash(Network::Mainnet).await.unwrap_err();
        assert!(err.is_transient());
    }
}
