//! Blockhash sources for the chain-tip cache.

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use url::Url;
use walletkit::Network;
use walletkit::preferences::Preferences;
use walletkit::retry::RetryPolicy;
use walletkit_rpc::endpoints::validate_custom_url;
use walletkit_rpc::{
    ChainTipCache, EdgeProxyClient, JsonRpcClient, RpcError, TipFetcher, TipSource,
};

use crate::rpc::SolanaRpc;

/// Genesis hash of Solana mainnet-beta. Any other cluster serves testnet requests.
const MAINNET_GENESIS_HASH: &str = "5eykt4UsFv8P8NJdTREpY1vzqKqZKvdpKuc147dw2N9d";

#[derive(Debug, serde::Deserialize)]
struct BlockhashEnvelope {
    value: BlockhashValue,
}

#[derive(Debug, serde::Deserialize)]
struct BlockhashValue {
    blockhash: String,
}

/// Reads the blockhash from the user's custom RPC URL, when one is set.
///
/// The URL serves a single cluster. Its network is learned once per URL from
/// `getGenesisHash`, and requests for any other network skip this source.
#[derive(Debug, Clone)]
pub struct CustomRpcBlockhash {
    preferences: Preferences,
    client: JsonRpcClient,
    clusters: Arc<Mutex<HashMap<Url, Network>>>,
}

impl CustomRpcBlockhash {
    /// Creates a fetcher reading the URL from `preferences` on every call.
    #[must_use]
    pub fn new(preferences: Preferences, client: JsonRpcClient) -> Self {
        Self {
            preferences,
            client,
            clusters: Arc::default(),
        }
    }

    async fn cluster_of(&self, url: &Url) -> Result<Network, RpcError> {
        let known = self
            .clusters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url)
            .copied();
        if let Some(network) = known {
            return Ok(network);
        }
        let genesis: String = self.client.call(url, "getGenesisHash", json!([])).await?;
        let network = if genesis == MAINNET_GENESIS_HASH {
            Network::Mainnet
        } else {
            Network::Testnet
        };
        self.clusters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.clone(), network);
        Ok(network)
    }
}

#[async_trait]
impl TipFetcher for CustomRpcBlockhash {
    fn source(&self) -> TipSource {
        TipSource::CustomRpc
    }

    async fn fetch(&self, network: Network) -> Result<Option<String>, RpcError> {
        let Some(raw) = self.preferences.custom_solana_rpc_url() else {
            return Ok(None);
        };
        let url = validate_custom_url(&raw)?;
        let cluster = self.cluster_of(&url).await?;
        if cluster != network {
            #[cfg(feature = "telemetry")]
            tracing::debug!(rpc_url = %url, cluster = %cluster, network = %network, "Custom RPC serves another network, skipping");
            return Ok(None);
        }
        let response: BlockhashEnvelope = self
            .client
            .call(&url, "getLatestBlockhash", json!([{ "commitment": "finalized" }]))
            .await?;
        Ok(Some(response.value.blockhash))
    }
}

/// Reads the blockhash through the edge proxy.
#[derive(Debug, Clone)]
pub struct EdgeProxyBlockhash {
    proxy: EdgeProxyClient,
}

impl EdgeProxyBlockhash {
    /// Wraps a proxy client.
    #[must_use]
    pub const fn new(proxy: EdgeProxyClient) -> Self {
        Self { proxy }
    }
}

#[async_trait]
impl TipFetcher for EdgeProxyBlockhash {
    fn source(&self) -> TipSource {
        TipSource::EdgeProxy
    }

    async fn fetch(&self, network: Network) -> Result<Option<String>, RpcError> {
        self.proxy.latest_blockhash(network).await.map(Some)
    }
}

/// Reads the blockhash from the resolver's endpoint pools.
///
/// Each fetch makes one call; retries belong to the cache, which re-resolves
/// the endpoint on every attempt.
#[derive(Debug, Clone)]
pub struct PooledBlockhash {
    rpc: SolanaRpc,
}

impl PooledBlockhash {
    /// Wraps the pooled Solana client.
    #[must_use]
    pub const fn new(rpc: SolanaRpc) -> Self {
        Self { rpc }
    }
}

#[async_trait]
impl TipFetcher for PooledBlockhash {
    fn source(&self) -> TipSource {
        TipSource::PooledRpc
    }

    async fn fetch(&self, network: Network) -> Result<Option<String>, RpcError> {
        let latest = self.rpc.latest_blockhash(network).await?;
        Ok(Some(latest.blockhash))
    }
}

/// Builds a blockhash cache over every available source.
///
/// The custom RPC source is only consulted when `preferences` is given, and
/// the proxy source only when `proxy` is.
#[must_use]
pub fn blockhash_cache(
    rpc: &SolanaRpc,
    preferences: Option<Preferences>,
    proxy: Option<EdgeProxyClient>,
) -> ChainTipCache {
    let single_shot = SolanaRpc::new(rpc.failover().clone().with_retry_policy(RetryPolicy::none()));
    let mut fetchers: Vec<Arc<dyn TipFetcher>> = vec![Arc::new(PooledBlockhash::new(single_shot))];
    if let Some(preferences) = preferences {
        let client = rpc.failover().client().clone();
        fetchers.push(Arc::new(CustomRpcBlockhash::new(preferences, client)));
    }
    if let Some(proxy) = proxy {
        fetchers.push(Arc::new(EdgeProxyBlockhash::new(proxy)));
    }
    ChainTipCache::new(fetchers)
}
