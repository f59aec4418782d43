//! Key-value storage backends.
//!
//! Session and preference state is persisted through the [`KeyValueStore`]
//! trait so that components never touch a concrete storage API directly.
//! Values are plain strings; structured values are stored as JSON.
//!
//! Every writer owns a fixed set of keys (see [`keys`]). Readers treat keys
//! they cannot parse as absent, so adding keys never breaks older readers.

use dashmap::DashMap;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Well-known storage keys.
pub mod keys {
    /// Connected wallet address.
    pub const WALLET_ADDRESS: &str = "walletAddress";
    /// Connected wallet type.
    pub const WALLET_TYPE: &str = "walletType";
    /// Connection time in milliseconds since the Unix epoch.
    pub const WALLET_CONNECTED_AT: &str = "walletConnectedAt";
    /// Set to `"true"` when the user connected through an explicit action.
    pub const WALLET_EXPLICIT_CONNECT: &str = "walletExplicitConnect";
    /// Set to `"true"` after an explicit disconnect; suppresses auto-reconnect.
    pub const WALLET_EXPLICIT_DISCONNECT: &str = "walletExplicitDisconnect";
    /// JSON-encoded [`WalletSession`](crate::session::WalletSession).
    pub const WALLET_CONNECTION_STATE: &str = "walletConnectionState";
    /// User-configured Solana RPC URL.
    pub const CUSTOM_SOLANA_RPC_URL: &str = "customSolanaRpcUrl";
    /// API key for the keyed RPC provider.
    pub const ALCHEMY_API_KEY: &str = "alchemyApiKey";
    /// Currently selected network.
    pub const ACTIVE_NETWORK: &str = "activeNetwork";
}

/// Errors raised by persistent storage backends.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Reading or writing the backing file failed.
    #[error("Storage I/O error at {path}: {source}")]
    Io {
        /// The file being accessed.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// A value could not be encoded.
    #[error("Failed to encode stored value: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A string key-value store with `localStorage` semantics.
///
/// Writes are last-write-wins and not transactional.
pub trait KeyValueStore: Send + Sync {
    /// Returns the value stored under `key`.
    fn get(&self, key: &str) -> Option<String>;

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if a persistent backend fails to write.
    fn set(&self, key: &str, value: String) -> Result<(), StorageError>;

    /// Removes `key`. Removing an absent key is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if a persistent backend fails to write.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// A process-local store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, String>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|v| v.value().clone())
    }

    fn set(&self, key: &str, value: String) -> Result<(), StorageError> {
        self.entries.insert(key.to_owned(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// A store persisted as a flat JSON object on disk.
///
/// The whole file is rewritten on every change.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl JsonFileStore {
    /// Opens the store at `path`, starting empty if the file does not exist.
    ///
    /// A file that is not a JSON object of strings is treated as empty and
    /// will be overwritten on the next write.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] if an existing file cannot be read.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|source| StorageError::Io {
                path: path.clone(),
                source,
            })?;
            serde_json::from_str(&content).unwrap_or_else(|_e| {
                #[cfg(feature = "telemetry")]
                tracing::warn!(path = %path.display(), error = %_e, "Ignoring unreadable store file");
                BTreeMap::new()
            })
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Returns the backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        let content = serde_json::to_string_pretty(entries)?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, content).map_err(|source| StorageError::Io {
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, &self.path).map_err(|source| StorageError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.get(key).cloned()
    }

    fn set(&self, key: &str, value: String) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_owned(), value);
        self.persist(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.remove(key).is_some() {
            self.persist(&entries)?;
        }
        Ok(())
    }
}
