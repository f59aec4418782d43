//! User preferences read by the RPC layer.
//!
//! The custom Solana RPC URL, the keyed-provider API key and the active
//! network live in the same key-value store as the session. Values that fail
//! to parse read as unset.

use std::sync::Arc;

use crate::chain::Network;
use crate::events::{EventBus, SessionEvent};
use crate::storage::{KeyValueStore, StorageError, keys};

/// Typed access to preference keys.
#[derive(Clone)]
pub struct Preferences {
    store: Arc<dyn KeyValueStore>,
    events: EventBus,
}

impl std::fmt::Debug for Preferences {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Preferences").finish_non_exhaustive()
    }
}

impl Preferences {
    /// Creates a preference view over `store`, announcing changes on `events`.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>, events: EventBus) -> Self {
        Self { store, events }
    }

    /// The user-configured Solana RPC URL, if any.
    #[must_use]
    pub fn custom_solana_rpc_url(&self) -> Option<String> {
        non_empty(self.store.get(keys::CUSTOM_SOLANA_RPC_URL))
    }

    /// Sets or clears the custom Solana RPC URL.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend fails to write.
    pub fn set_custom_solana_rpc_url(&self, url: Option<&str>) -> Result<(), StorageError> {
        set_or_remove(self.store.as_ref(), keys::CUSTOM_SOLANA_RPC_URL, url)
    }

    /// The keyed-provider (Alchemy) API key, if any.
    #[must_use]
    pub fn alchemy_api_key(&self) -> Option<String> {
        non_empty(self.store.get(keys::ALCHEMY_API_KEY))
    }

    /// Sets or clears the keyed-provider API key.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend fails to write.
    pub fn set_alchemy_api_key(&self, key: Option<&str>) -> Result<(), StorageError> {
        set_or_remove(self.store.as_ref(), keys::ALCHEMY_API_KEY, key)
    }

    /// The selected network, defaulting to mainnet.
    #[must_use]
    pub fn active_network(&self) -> Network {
        self.store
            .get(keys::ACTIVE_NETWORK)
            .and_then(|raw| raw.parse().ok())
            .unwrap_or_default()
    }

    /// Selects a network and broadcasts [`SessionEvent::NetworkChanged`] if it changed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend fails to write.
    pub fn set_active_network(&self, network: Network) -> Result<(), StorageError> {
        let previous = self.active_network();
        self.store
            .set(keys::ACTIVE_NETWORK, network.as_str().to_owned())?;
        if previous != network {
            #[cfg(feature = "telemetry")]
            tracing::info!(from = %previous, to = %network, "Active network changed");
            self.events.publish(SessionEvent::NetworkChanged { network });
        }
        Ok(())
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn set_or_remove(
    store: &dyn KeyValueStore,
    key: &str,
    value: Option<&str>,
) -> Result<(), StorageError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => store.set(key, v.to_owned()),
        None => store.remove(key),
    }
}
