//! Wires storage, preferences, the resolver and the chain clients together.

use futures_util::future::join_all;
use std::sync::Arc;
use url::Url;
use walletkit::events::EventBus;
use walletkit::preferences::Preferences;
use walletkit::session::SessionStore;
use walletkit::storage::{JsonFileStore, KeyValueStore, StorageError};
use walletkit::{Chain, Network};
use walletkit_evm::{ETHEREUM_ENDPOINTS, EvmRpc};
use walletkit_rpc::{
    ChainTipCache, EdgeProxyClient, EndpointRegistry, EndpointResolver, JsonRpcClient, RpcError,
    RpcFailover, StatusSource,
};
use walletkit_svm::{SOLANA_ENDPOINTS, SolanaRpc, blockhash_cache};

use crate::config::{CliConfig, EdgeProxyConfig};

/// Errors raised while building the context.
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    /// The store could not be opened or written.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// An endpoint or proxy URL is invalid.
    #[error(transparent)]
    Rpc(#[from] RpcError),
}

/// Everything a command needs.
#[derive(Debug)]
pub struct AppContext {
    /// Loaded configuration.
    pub config: CliConfig,
    /// Session state.
    pub sessions: SessionStore,
    /// Stored preferences.
    pub preferences: Preferences,
    /// Shared endpoint resolver.
    pub resolver: Arc<EndpointResolver>,
    /// Solana queries.
    pub solana: SolanaRpc,
    /// Ethereum queries.
    pub ethereum: EvmRpc,
    /// Edge proxy client, if configured.
    pub proxy: Option<EdgeProxyClient>,
}

impl AppContext {
    /// Builds the context over the JSON file named in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError`] if the store cannot be opened or a URL is invalid.
    pub fn open(config: CliConfig) -> Result<Self, ContextError> {
        let store = JsonFileStore::open(&config.store_path)?;
        Self::with_store(config, Arc::new(store))
    }

    /// Builds the context over an explicit store.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError`] if a configured URL is invalid or the
    /// preference overrides cannot be written.
    pub fn with_store(
        config: CliConfig,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self, ContextError> {
        let events = EventBus::new();
        let preferences = Preferences::new(Arc::clone(&store), events.clone());
        apply_overrides(&config, &preferences)?;
        let sessions = SessionStore::new(store).with_events(events);

        let registry = EndpointRegistry::new()
            .with_specs(SOLANA_ENDPOINTS)?
            .with_specs(ETHEREUM_ENDPOINTS)?;
        let resolver = Arc::new(
            EndpointResolver::new(registry)
                .with_preferences(preferences.clone())
                .with_config(config.resolver),
        );
        let failover = RpcFailover::new(Arc::clone(&resolver), JsonRpcClient::new());
        let proxy = config.edge_proxy.as_ref().map(proxy_client).transpose()?;

        tracing::debug!(
            store = %config.store_path.display(),
            force_mainnet = config.resolver.force_mainnet,
            edge_proxy = proxy.is_some(),
            "Built context"
        );

        Ok(Self {
            solana: SolanaRpc::new(failover.clone()),
            ethereum: EvmRpc::new(failover),
            config,
            sessions,
            preferences,
            resolver,
            proxy,
        })
    }

    /// The network to use: `requested`, else the stored active network.
    #[must_use]
    pub fn network(&self, requested: Option<Network>) -> Network {
        requested.unwrap_or_else(|| self.preferences.active_network())
    }

    /// A blockhash cache over the custom RPC, the proxy and the pools.
    #[must_use]
    pub fn blockhash_cache(&self) -> ChainTipCache {
        blockhash_cache(
            &self.solana,
            Some(self.preferences.clone()),
            self.proxy.clone(),
        )
    }

    /// The transaction status source for `chain`.
    #[must_use]
    pub fn status_source(&self, chain: Chain) -> Arc<dyn StatusSource> {
        match chain {
            Chain::Solana => Arc::new(self.solana.clone()),
            Chain::Ethereum => Arc::new(self.ethereum.clone()),
        }
    }

    /// Checks every candidate endpoint of `chain` concurrently.
    ///
    /// Endpoints that fail transiently are marked failed in the resolver.
    pub async fn health(&self, chain: Chain, network: Network) -> Vec<(Url, Result<(), RpcError>)> {
        let candidates = self.resolver.candidates(chain, network);
        let checks = candidates.iter().map(|url| async move {
            match chain {
                Chain::Solana => self.solana.health(url).await,
                Chain::Ethereum => {
                    let network = self.resolver.effective_network(network);
                    self.ethereum.health(url, network).await
                }
            }
        });
        let results = join_all(checks).await;
        candidates.into_iter().zip(results).collect()
    }
}

fn proxy_client(config: &EdgeProxyConfig) -> Result<EdgeProxyClient, RpcError> {
    let client = EdgeProxyClient::try_new(config.base_url.clone())?;
    match config.api_key.as_deref().filter(|key| is_resolved(key)) {
        Some(key) => client.with_api_key(key),
        None => Ok(client),
    }
}

/// `false` for values still holding an unexpanded `$VAR`.
fn is_resolved(value: &str) -> bool {
    let value = value.trim();
    !value.is_empty() && !value.starts_with('$')
}

fn apply_overrides(config: &CliConfig, preferences: &Preferences) -> Result<(), StorageError> {
    let overrides = &config.preferences;
    if let Some(url) = overrides.custom_solana_rpc_url.as_deref() {
        if is_resolved(url) {
            preferences.set_custom_solana_rpc_url(Some(url))?;
        } else {
            tracing::warn!("Skipping custom_solana_rpc_url: value not resolved (missing env var?)");
        }
    }
    if let Some(key) = overrides.alchemy_api_key.as_deref() {
        if is_resolved(key) {
            preferences.set_alchemy_api_key(Some(key))?;
        } else {
            tracing::warn!("Skipping alchemy_api_key: value not resolved (missing env var?)");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PreferenceOverrides;
    use walletkit::storage::MemoryStore;

    #[test]
    fn test_overrides_are_written_to_preferences() {
        let config = CliConfig {
            preferences: PreferenceOverrides {
                custom_solana_rpc_url: Some("https://rpc.example.com".to_owned()),
                alchemy_api_key: Some("$ALCHEMY_API_KEY".to_owned()),
            },
            ..CliConfig::default()
        };
        let ctx = AppContext::with_store(config, Arc::new(MemoryStore::new())).unwrap();
        assert_eq!(
            ctx.preferences.custom_solana_rpc_url().as_deref(),
            Some("https://rpc.example.com")
        );
        assert_eq!(ctx.preferences.alchemy_api_key(), None);

        let candidates = ctx.resolver.candidates(Chain::Solana, Network::Mainnet);
        assert_eq!(candidates[0].as_str(), "https://rpc.example.com/");
    }

    #[test]
    fn test_network_falls_back_to_active_network() {
        let ctx = AppContext::with_store(CliConfig::default(), Arc::new(MemoryStore::new())).unwrap();
        assert_eq!(ctx.network(None), Network::Mainnet);
        ctx.preferences.set_active_network(Network::Testnet).unwrap();
        assert_eq!(ctx.network(None), Network::Testnet);
        assert_eq!(ctx.network(Some(Network::Mainnet)), Network::Mainnet);
    }

    #[test]
    fn test_edge_proxy_from_config() {
        let config = CliConfig {
            edge_proxy: Some(EdgeProxyConfig {
                base_url: "https://abc.supabase.co".parse().unwrap(),
                api_key: Some("anon".to_owned()),
            }),
            ..CliConfig::default()
        };
        let ctx = AppContext::with_store(config, Arc::new(MemoryStore::new())).unwrap();
        let proxy = ctx.proxy.unwrap();
        assert_eq!(
            proxy.endpoint().as_str(),
            "https://abc.supabase.co/functions/v1/get-solana-rpc"
        );
    }
}
