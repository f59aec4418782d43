//! Short-lived cache for the value a transaction must reference.
//!
//! On Solana the chain tip is the latest blockhash; on Ethereum it is the
//! sender's pending nonce. Both go stale quickly but are fetched far more
//! often than they change, so [`ChainTipCache`] keeps:
//!
//! - **Fresh value** - Reused while younger than 30 seconds, with no network calls
//! - **Emergency value** - Refreshed at most every 2 minutes from the pooled
//!   endpoints and handed out only through [`ChainTipCache::get_or_emergency`]
//!
//! On a miss, sources are tried in [`TipSource`] order (custom RPC, edge
//! proxy, pooled public RPC), each wrapped in retry with backoff. Every
//! outcome is logged with its source tag.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::{self, Debug, Display, Formatter};
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use walletkit::Network;
use walletkit::retry::{RetryPolicy, with_retry_if};
use walletkit::task::{Every, RepeatingTask, TaskHandle};

use crate::error::RpcError;

/// Where a chain tip came from. Sources are tried in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TipSource {
    /// The user's custom RPC endpoint.
    CustomRpc,
    /// The operator's edge proxy.
    EdgeProxy,
    /// The resolver's public or keyed endpoints.
    PooledRpc,
}

impl TipSource {
    /// The log tag of the source.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::CustomRpc => "custom-rpc",
            Self::EdgeProxy => "edge-proxy",
            Self::PooledRpc => "pooled-rpc",
        }
    }
}

impl Display for TipSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fetched chain tip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedChainTip {
    /// Blockhash or nonce, as returned by the source.
    pub value: String,
    /// When the value was fetched.
    pub fetched_at: Instant,
    /// Which source produced it.
    pub source: TipSource,
}

impl CachedChainTip {
    /// Stamps `value` with the current time.
    #[must_use]
    pub fn new(value: String, source: TipSource) -> Self {
        Self {
            value,
            fetched_at: Instant::now(),
            source,
        }
    }

    /// Time since the value was fetched.
    #[must_use]
    pub fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }
}

/// One way of fetching a chain tip.
#[async_trait]
pub trait TipFetcher: Send + Sync {
    /// The source tag for logs and cache entries.
    fn source(&self) -> TipSource;

    /// Fetches the tip for `network`.
    ///
    /// Returns `Ok(None)` when the source is not configured, which moves on
    /// to the next source without counting as a failure.
    async fn fetch(&self, network: Network) -> Result<Option<String>, RpcError>;
}

/// Fresh and emergency chain-tip cache over an ordered set of fetchers.
pub struct ChainTipCache {
    fetchers: Vec<Arc<dyn TipFetcher>>,
    retry: RetryPolicy,
    ttl: Duration,
    emergency_ttl: Duration,
    fresh: RwLock<HashMap<Network, CachedChainTip>>,
    emergency: RwLock<HashMap<Network, CachedChainTip>>,
}

impl Debug for ChainTipCache {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let sources: Vec<TipSource> = self.fetchers.iter().map(|f| f.source()).collect();
        f.debug_struct("ChainTipCache")
            .field("sources", &sources)
            .field("ttl", &self.ttl)
            .field("emergency_ttl", &self.emergency_ttl)
            .finish_non_exhaustive()
    }
}

impl ChainTipCache {
    /// How long a fetched value is reused.
    pub const DEFAULT_TTL: Duration = Duration::from_secs(30);

    /// How often the emergency value is refreshed.
    pub const DEFAULT_EMERGENCY_TTL: Duration = Duration::from_secs(120);

    /// Creates a cache. Fetchers are ordered by their [`TipSource`].
    #[must_use]
    pub fn new(fetchers: impl IntoIterator<Item = Arc<dyn TipFetcher>>) -> Self {
        let mut fetchers: Vec<Arc<dyn TipFetcher>> = fetchers.into_iter().collect();
        fetchers.sort_by_key(|f| f.source());
        Self {
            fetchers,
            retry: RetryPolicy::default(),
            ttl: Self::DEFAULT_TTL,
            emergency_ttl: Self::DEFAULT_EMERGENCY_TTL,
            fresh: RwLock::new(HashMap::new()),
            emergency: RwLock::new(HashMap::new()),
        }
    }

    /// Sets the retry policy applied to each source.
    #[must_use]
    pub const fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the fresh-value lifetime.
    #[must_use]
    pub const fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Returns a tip younger than the TTL, fetching one if needed.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::AllSourcesFailed`] if no source produced a value.
    pub async fn get_fresh(&self, network: Network) -> Result<CachedChainTip, RpcError> {
        if let Some(tip) = self.cached(network).await {
            #[cfg(feature = "telemetry")]
            tracing::debug!(network = %network, source = %tip.source, age_ms = tip.age().as_millis() as u64, "Chain tip cache hit");
            return Ok(tip);
        }

        let mut failures = Vec::new();
        for fetcher in &self.fetchers {
            let source = fetcher.source();
            let result = with_retry_if(
                || fetcher.fetch(network),
                &self.retry,
                RpcError::is_transient,
            )
            .await;
            match result {
                Ok(Some(value)) => {
                    let tip = CachedChainTip::new(value, source);
                    self.fresh.write().await.insert(network, tip.clone());
                    if source == TipSource::PooledRpc {
                        self.store_emergency_if_stale(network, &tip).await;
                    }
                    #[cfg(feature = "telemetry")]
                    tracing::info!(network = %network, source = %source, "Fetched chain tip");
                    return Ok(tip);
                }
                Ok(None) => {
                    #[cfg(feature = "telemetry")]
                    tracing::debug!(network = %network, source = %source, "Chain tip source not configured");
                }
                Err(err) => {
                    #[cfg(feature = "telemetry")]
                    tracing::warn!(network = %network, source = %source, error = %err, "Chain tip source failed");
                    failures.push(format!("{source}: {err}"));
                }
            }
        }

        #[cfg(feature = "telemetry")]
        tracing::error!(network = %network, "All chain tip sources failed");
        Err(RpcError::AllSourcesFailed { network, failures })
    }

    /// Like [`Self::get_fresh`], falling back to the emergency value.
    ///
    /// The emergency value may be up to a few minutes old; callers must be
    /// prepared for a transaction built on it to be rejected.
    pub async fn get_or_emergency(&self, network: Network) -> Option<CachedChainTip> {
        match self.get_fresh(network).await {
            Ok(tip) => Some(tip),
            Err(_e) => {
                let fallback = self.emergency.read().await.get(&network).cloned();
                #[cfg(feature = "telemetry")]
                tracing::warn!(network = %network, error = %_e, has_emergency = fallback.is_some(), "Falling back to emergency chain tip");
                fallback
            }
        }
    }

    /// Fetches a new emergency value from the pooled sources.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::AllSourcesFailed`] if no pooled source produced a value.
    pub async fn refresh_emergency(&self, network: Network) -> Result<CachedChainTip, RpcError> {
        let mut failures = Vec::new();
        for fetcher in self
            .fetchers
            .iter()
            .filter(|f| f.source() == TipSource::PooledRpc)
        {
            match with_retry_if(|| fetcher.fetch(network), &self.retry, RpcError::is_transient)
                .await
            {
                Ok(Some(value)) => {
                    let tip = CachedChainTip::new(value, TipSource::PooledRpc);
                    self.emergency.write().await.insert(network, tip.clone());
                    #[cfg(feature = "telemetry")]
                    tracing::debug!(network = %network, "Refreshed emergency chain tip");
                    return Ok(tip);
                }
                Ok(None) => {}
                Err(err) => failures.push(format!("{}: {err}", TipSource::PooledRpc)),
            }
        }
        Err(RpcError::AllSourcesFailed { network, failures })
    }

    /// Keeps the emergency value for `network` refreshed in the background.
    #[must_use]
    pub fn spawn_emergency_refresh(self: &Arc<Self>, network: Network) -> TaskHandle {
        let this = Arc::clone(self);
        RepeatingTask::spawn(Every::immediately(self.emergency_ttl), move |_| {
            let this = Arc::clone(&this);
            async move {
                if let Err(_e) = this.refresh_emergency(network).await {
                    #[cfg(feature = "telemetry")]
                    tracing::warn!(network = %network, error = %_e, "Emergency chain tip refresh failed");
                }
                ControlFlow::Continue(())
            }
        })
    }

    /// The current emergency value, if any.
    pub async fn emergency(&self, network: Network) -> Option<CachedChainTip> {
        self.emergency.read().await.get(&network).cloned()
    }

    /// Drops the fresh value so the next call fetches.
    pub async fn invalidate(&self, network: Network) {
        self.fresh.write().await.remove(&network);
    }

    async fn cached(&self, network: Network) -> Option<CachedChainTip> {
        let guard = self.fresh.read().await;
        let tip = guard.get(&network)?;
        (tip.age() < self.ttl).then(|| tip.clone())
    }

    async fn store_emergency_if_stale(&self, network: Network, tip: &CachedChainTip) {
        let mut guard = self.emergency.write().await;
        let stale = guard
            .get(&network)
            .is_none_or(|current| current.age() >= self.emergency_ttl);
        if stale {
            guard.insert(network, tip.clone());
        }
    }
}
