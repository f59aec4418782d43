//! RPC endpoint selection with failure cooldown.
//!
//! Chain crates publish their endpoint pools as static [`EndpointSpec`]
//! slices; applications assemble them into an [`EndpointRegistry`]. The
//! [`EndpointResolver`] then picks a URL for each request in this order:
//!
//! 1. The user's custom Solana RPC URL, if it is a well-formed `http(s)` URL
//! 2. The keyed provider URL, if an API key is configured
//! 3. A random public endpoint that has not failed in the last cooldown window
//! 4. If every candidate is cooling down, the one that failed longest ago
//!
//! A candidate that failed recently is skipped at every tier. No endpoint is
//! ever excluded permanently; failure records are process-local.

use dashmap::DashMap;
use rand::RngExt;
use rand::rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::{self, Debug, Formatter};
use std::time::Duration;
use tokio::time::Instant;
use url::Url;
use walletkit::preferences::Preferences;
use walletkit::{Chain, Network};

use crate::error::RpcError;

/// Placeholder replaced with the API key in keyed endpoint templates.
pub const API_KEY_PLACEHOLDER: &str = "{api_key}";

/// A static endpoint pool for one chain and network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointSpec {
    /// The chain served.
    pub chain: Chain,
    /// The network served.
    pub network: Network,
    /// Free public endpoints.
    pub public: &'static [&'static str],
    /// Keyed provider URL containing [`API_KEY_PLACEHOLDER`].
    pub keyed_template: Option<&'static str>,
}

/// Parsed endpoints for one chain and network.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointPool {
    /// Public endpoints, in declaration order.
    pub public: Vec<Url>,
    /// Keyed provider URL template.
    pub keyed_template: Option<String>,
}

impl EndpointPool {
    /// Parses a static spec.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::InvalidEndpoint`] if a public URL is not `http(s)`.
    pub fn from_spec(spec: &EndpointSpec) -> Result<Self, RpcError> {
        let public = spec
            .public
            .iter()
            .map(|raw| validate_url(raw))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            public,
            keyed_template: spec.keyed_template.map(str::to_owned),
        })
    }

    /// Renders the keyed URL for `api_key`.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::InvalidEndpoint`] if the rendered URL is malformed.
    pub fn keyed_url(&self, api_key: &str) -> Result<Option<Url>, RpcError> {
        let Some(template) = &self.keyed_template else {
            return Ok(None);
        };
        let rendered = template.replace(API_KEY_PLACEHOLDER, api_key.trim());
        validate_url(&rendered).map(Some)
    }
}

/// Endpoint pools keyed by chain and network.
#[derive(Debug, Clone, Default)]
pub struct EndpointRegistry(HashMap<(Chain, Network), EndpointPool>);

impl EndpointRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    /// Adds every spec in `specs`, replacing pools for the same chain and network.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::InvalidEndpoint`] if a spec contains a malformed URL.
    pub fn with_specs(mut self, specs: &[EndpointSpec]) -> Result<Self, RpcError> {
        for spec in specs {
            self.insert(spec.chain, spec.network, EndpointPool::from_spec(spec)?);
        }
        Ok(self)
    }

    /// Inserts a pool.
    pub fn insert(&mut self, chain: Chain, network: Network, pool: EndpointPool) {
        self.0.insert((chain, network), pool);
    }

    /// Returns the pool for a chain and network.
    #[must_use]
    pub fn pool(&self, chain: Chain, network: Network) -> Option<&EndpointPool> {
        self.0.get(&(chain, network))
    }
}

const fn default_cooldown_secs() -> u64 {
    60
}

/// Resolver settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Resolve every request against mainnet regardless of the caller's network.
    #[serde(default)]
    pub force_mainnet: bool,
    /// Seconds a failed endpoint is skipped.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            force_mainnet: false,
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

impl ResolverConfig {
    /// The cooldown window.
    #[must_use]
    pub const fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

/// Picks endpoints and remembers which ones failed recently.
pub struct EndpointResolver {
    registry: EndpointRegistry,
    preferences: Option<Preferences>,
    config: ResolverConfig,
    failures: DashMap<Url, Instant>,
}

impl Debug for EndpointResolver {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointResolver")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .field("failures", &self.failures.len())
            .finish_non_exhaustive()
    }
}

impl EndpointResolver {
    /// Creates a resolver without user preferences.
    #[must_use]
    pub fn new(registry: EndpointRegistry) -> Self {
        Self {
            registry,
            preferences: None,
            config: ResolverConfig::default(),
            failures: DashMap::new(),
        }
    }

    /// Reads the custom URL and API key from `preferences` on every resolve.
    #[must_use]
    pub fn with_preferences(mut self, preferences: Preferences) -> Self {
        self.preferences = Some(preferences);
        self
    }

    /// Sets the resolver configuration.
    #[must_use]
    pub const fn with_config(mut self, config: ResolverConfig) -> Self {
        self.config = config;
        self
    }

    /// The resolver configuration.
    #[must_use]
    pub const fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Applies `force_mainnet` to a requested network.
    #[must_use]
    pub fn effective_network(&self, network: Network) -> Network {
        if self.config.force_mainnet && network != Network::Mainnet {
            #[cfg(feature = "telemetry")]
            tracing::info!(requested = %network, "force_mainnet is set, resolving against mainnet");
            return Network::Mainnet;
        }
        network
    }

    /// Every candidate for a chain and network, in selection-tier order.
    ///
    /// Malformed custom URLs and keyed URLs are logged and left out.
    #[must_use]
    pub fn candidates(&self, chain: Chain, network: Network) -> Vec<Url> {
        let network = self.effective_network(network);
        let pool = self.registry.pool(chain, network);
        let mut candidates = Vec::new();

        if let Some(prefs) = &self.preferences {
            if chain == Chain::Solana
                && let Some(raw) = prefs.custom_solana_rpc_url()
            {
                match validate_custom_url(&raw) {
                    Ok(url) => candidates.push(url),
                    Err(_e) => {
                        #[cfg(feature = "telemetry")]
                        tracing::warn!(error = %_e, "Ignoring custom Solana RPC URL");
                    }
                }
            }
            if let (Some(pool), Some(key)) = (pool, prefs.alchemy_api_key()) {
                match pool.keyed_url(&key) {
                    Ok(Some(url)) => candidates.push(url),
                    Ok(None) => {}
                    Err(_e) => {
                        #[cfg(feature = "telemetry")]
                        tracing::warn!(chain = %chain, network = %network, error = %_e, "Ignoring keyed RPC URL");
                    }
                }
            }
        }

        if let Some(pool) = pool {
            candidates.extend(pool.public.iter().cloned());
        }
        candidates
    }

    /// Picks an endpoint for a chain and network.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::NoEndpoints`] if no candidate exists at all.
    pub fn resolve(&self, chain: Chain, network: Network) -> Result<Url, RpcError> {
        let network = self.effective_network(network);
        let candidates = self.candidates(chain, network);
        let public_count = self
            .registry
            .pool(chain, network)
            .map_or(0, |p| p.public.len());
        let priority_count = candidates.len() - public_count;

        let (priority, public) = candidates.split_at(priority_count);
        if let Some(url) = priority.iter().find(|url| !self.is_cooling_down(url)) {
            #[cfg(feature = "telemetry")]
            tracing::debug!(chain = %chain, network = %network, rpc_url = %url, "Resolved configured endpoint");
            return Ok(url.clone());
        }

        let healthy: Vec<&Url> = public
            .iter()
            .filter(|url| !self.is_cooling_down(url))
            .collect();
        if !healthy.is_empty() {
            let url = healthy[rng().random_range(0..healthy.len())];
            #[cfg(feature = "telemetry")]
            tracing::debug!(chain = %chain, network = %network, rpc_url = %url, "Resolved public endpoint");
            return Ok(url.clone());
        }

        let fallback = candidates
            .iter()
            .min_by_key(|url| self.failures.get(*url).map(|at| *at.value()))
            .cloned()
            .ok_or(RpcError::NoEndpoints { chain, network })?;
        #[cfg(feature = "telemetry")]
        tracing::warn!(chain = %chain, network = %network, rpc_url = %fallback, "All endpoints cooling down, using least recently failed");
        Ok(fallback)
    }

    /// Records a failure of `url`, excluding it for the cooldown window.
    pub fn mark_failed(&self, url: &Url) {
        #[cfg(feature = "telemetry")]
        tracing::warn!(rpc_url = %url, cooldown_secs = self.config.cooldown_secs, "Marking RPC endpoint as failed");
        self.failures.insert(url.clone(), Instant::now());
    }

    /// Returns `true` if `url` failed within the cooldown window.
    #[must_use]
    pub fn is_cooling_down(&self, url: &Url) -> bool {
        let cooling = self
            .failures
            .get(url)
            .is_some_and(|at| at.elapsed() < self.config.cooldown());
        if !cooling {
            self.failures
                .remove_if(url, |_, at| at.elapsed() >= self.config.cooldown());
        }
        cooling
    }
}

/// Validates a user-supplied RPC URL.
///
/// # Errors
///
/// Returns [`RpcError::InvalidEndpoint`] unless `raw` is an absolute
/// `http://` or `https://` URL with a host.
pub fn validate_custom_url(raw: &str) -> Result<Url, RpcError> {
    validate_url(raw.trim())
}

fn validate_url(raw: &str) -> Result<Url, RpcError> {
    let url = Url::parse(raw).map_err(|_| RpcError::InvalidEndpoint {
        url: raw.to_owned(),
        reason: "not a valid URL",
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(RpcError::InvalidEndpoint {
            url: raw.to_owned(),
            reason: "scheme must be http or https",
        });
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(RpcError::InvalidEndpoint {
            url: raw.to_owned(),
            reason: "missing host",
        });
    }
    Ok(url)
}
