//! JSON-RPC calls with endpoint failover.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use url::Url;
use walletkit::retry::{RetryPolicy, with_retry_if};
use walletkit::{Chain, Network};

use crate::endpoints::EndpointResolver;
use crate::error::RpcError;
use crate::jsonrpc::JsonRpcClient;

/// Runs JSON-RPC calls against resolved endpoints.
///
/// Every attempt resolves a fresh endpoint. A transient failure marks the
/// endpoint as failed before retrying, so the next attempt lands elsewhere.
#[derive(Debug, Clone)]
pub struct RpcFailover {
    resolver: Arc<EndpointResolver>,
    client: JsonRpcClient,
    retry: RetryPolicy,
}

impl RpcFailover {
    /// Creates a failover client with the default retry policy.
    #[must_use]
    pub fn new(resolver: Arc<EndpointResolver>, client: JsonRpcClient) -> Self {
        Self {
            resolver,
            client,
            retry: RetryPolicy::default(),
        }
    }

    /// Sets the retry policy.
    #[must_use]
    pub const fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The resolver endpoints are drawn from.
    #[must_use]
    pub const fn resolver(&self) -> &Arc<EndpointResolver> {
        &self.resolver
    }

    /// The underlying JSON-RPC client.
    #[must_use]
    pub const fn client(&self) -> &JsonRpcClient {
        &self.client
    }

    /// Calls `method`, failing over between endpoints on transient errors.
    ///
    /// # Errors
    ///
    /// Returns the first non-transient error, or the last transient one once
    /// retries are exhausted.
    pub async fn call<P, R>(
        &self,
        chain: Chain,
        network: Network,
        method: &str,
        params: &P,
    ) -> Result<R, RpcError>
    where
        P: Serialize + Sync + ?Sized,
        R: DeserializeOwned,
    {
        with_retry_if(
            || async move {
                let url = self.resolver.resolve(chain, network)?;
                self.call_at(&url, method, params).await
            },
            &self.retry,
            RpcError::is_transient,
        )
        .await
    }

    /// Calls `method` on one specific endpoint, marking it failed on a transient error.
    ///
    /// # Errors
    ///
    /// Returns any error from the call.
    pub async fn call_at<P, R>(&self, url: &Url, method: &str, params: &P) -> Result<R, RpcError>
    where
        P: Serialize + Sync + ?Sized,
        R: DeserializeOwned,
    {
        let result = self.client.call(url, method, params).await;
        if let Err(err) = &result {
            if err.is_transient() {
                self.resolver.mark_failed(url);
            }
            #[cfg(feature = "telemetry")]
            tracing::warn!(rpc_url = %url, method, error = %err, "RPC call failed");
        }
        result
    }
}
