//! Pending nonce as the Ethereum chain tip.
//!
//! A sender's next nonce changes only when it submits, so it is cached like
//! a Solana blockhash and served from the pooled endpoints.

use alloy_primitives::Address;
use async_trait::async_trait;
use std::sync::Arc;
use walletkit::Network;
use walletkit::retry::RetryPolicy;
use walletkit_rpc::{ChainTipCache, RpcError, TipFetcher, TipSource};

use crate::rpc::EvmRpc;

/// Fetches the pending nonce of one account from the endpoint pools.
#[derive(Debug, Clone)]
pub struct PooledNonce {
    rpc: EvmRpc,
    address: Address,
}

impl PooledNonce {
    /// Creates a fetcher for `address`.
    #[must_use]
    pub const fn new(rpc: EvmRpc, address: Address) -> Self {
        Self { rpc, address }
    }
}

#[async_trait]
impl TipFetcher for PooledNonce {
    fn source(&self) -> TipSource {
        TipSource::PooledRpc
    }

    async fn fetch(&self, network: Network) -> Result<Option<String>, RpcError> {
        let nonce = self.rpc.pending_nonce(self.address, network).await?;
        Ok(Some(nonce.to_string()))
    }
}

/// Builds a nonce cache for `address`.
///
/// The fetcher makes one call per attempt; the cache owns the retries.
#[must_use]
pub fn nonce_cache(rpc: &EvmRpc, address: Address) -> ChainTipCache {
    let single_shot = EvmRpc::new(rpc.failover().clone().with_retry_policy(RetryPolicy::none()));
    ChainTipCache::new([Arc::new(PooledNonce::new(single_shot, address)) as Arc<dyn TipFetcher>])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use walletkit::Chain;
    use walletkit_rpc::endpoints::EndpointPool;
    use walletkit_rpc::{EndpointRegistry, EndpointResolver, JsonRpcClient, RpcFailover};
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_nonce_is_cached() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"jsonrpc": "2.0", "id": 1, "result": "0x7"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let mut registry = EndpointRegistry::new();
        registry.insert(
            Chain::Ethereum,
            Network::Mainnet,
            EndpointPool {
                public: vec![server.uri().parse().unwrap()],
                keyed_template: None,
            },
        );
        let rpc = EvmRpc::new(
            RpcFailover::new(Arc::new(EndpointResolver::new(registry)), JsonRpcClient::new())
                .with_retry_policy(RetryPolicy::none()),
        );
        let cache = nonce_cache(&rpc, Address::repeat_byte(0x11));

        let first = cache.get_fresh(Network::Mainnet).await.unwrap();
        let second = cache.get_fresh(Network::Mainnet).await.unwrap();
        assert_eq!(first.value, "7");
        assert_eq!(first, second);
    }
}
