//! Wallet provider capability traits.
//!
//! Wallet extensions inject objects into the page; SDKs such as WalletConnect
//! hand out their own session objects. Each of them exposes one of three
//! capability shapes, modelled here as traits:
//!
//! - [`SolanaProvider`] - Phantom and Solflare style `connect`/`publicKey` objects
//! - [`Eip1193Provider`] - MetaMask and Phantom-Ethereum `request({ method, params })` objects
//! - [`WalletConnectProvider`] - Modal-driven sessions with an observable account
//!
//! A host binds the concrete objects it finds into [`InjectedWallets`], which is
//! the only view of the environment the rest of the crate sees.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// EIP-1193 code for a request the user rejected.
pub const USER_REJECTED_CODE: i64 = 4001;

/// EIP-1193 code for a method the provider does not support.
pub const UNSUPPORTED_METHOD_CODE: i64 = 4200;

/// JSON-RPC code used by MetaMask when an identical request is already pending.
pub const REQUEST_PENDING_CODE: i64 = -32002;

/// JSON-RPC code for a method that does not exist.
pub const METHOD_NOT_FOUND_CODE: i64 = -32601;

/// An error raised by a wallet provider object.
///
/// Mirrors the `{ code, message }` shape wallet extensions reject with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderError {
    /// Provider-specific numeric code, when one was supplied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,
    /// Human-readable message.
    pub message: String,
}

impl ProviderError {
    /// Creates an error without a code.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    /// Creates an error with a provider code.
    pub fn with_code(code: i64, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            message: message.into(),
        }
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} (code {code})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for ProviderError {}

/// A Solana wallet object such as `window.phantom.solana` or `window.solflare`.
///
/// `is_connected` and `public_key` are read-only and never prompt the user.
#[async_trait]
pub trait SolanaProvider: Send + Sync {
    /// Whether the provider reports an active connection.
    fn is_connected(&self) -> bool;

    /// The connected account's base58 public key, if the provider has one yet.
    ///
    /// Some providers flip `is_connected` before the key is populated.
    fn public_key(&self) -> Option<String>;

    /// Requests a connection, prompting the user if the site is not yet trusted.
    async fn connect(&self) -> Result<(), ProviderError>;

    /// Ends the connection.
    async fn disconnect(&self) -> Result<(), ProviderError>;
}

/// An EIP-1193 provider such as `window.ethereum`.
#[async_trait]
pub trait Eip1193Provider: Send + Sync {
    /// Sends a JSON-RPC request through the provider.
    async fn request(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, ProviderError>;

    /// The `isMetaMask` flag. Several wallets set it for compatibility.
    fn is_metamask(&self) -> bool {
        false
    }

    /// The `isPhantom` flag.
    fn is_phantom(&self) -> bool {
        false
    }
}

/// A WalletConnect / Reown session driven by the SDK's modal.
#[async_trait]
pub trait WalletConnectProvider: Send + Sync {
    /// Opens the connection modal.
    ///
    /// The modal resolves independently of this call; completion is observed
    /// through [`WalletConnectProvider::account_changes`].
    async fn open_modal(&self) -> Result<(), ProviderError>;

    /// Subscribes to the SDK's connected-account state.
    fn account_changes(&self) -> watch::Receiver<Option<String>>;

    /// Ends the session.
    async fn disconnect(&self) -> Result<(), ProviderError>;

    /// The currently connected account, if any.
    fn account(&self) -> Option<String> {
        let changes = self.account_changes();
        let account = changes.borrow().clone();
        account
    }
}

/// A wallet provider, tagged by its capability shape.
#[derive(Clone)]
pub enum WalletProvider {
    /// Solana-style provider.
    Solana(Arc<dyn SolanaProvider>),
    /// EIP-1193 provider.
    Ethereum(Arc<dyn Eip1193Provider>),
    /// WalletConnect session.
    WalletConnect(Arc<dyn WalletConnectProvider>),
}

impl fmt::Debug for WalletProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let variant = match self {
            Self::Solana(_) => "Solana",
            Self::Ethereum(_) => "Ethereum",
            Self::WalletConnect(_) => "WalletConnect",
        };
        f.debug_tuple("WalletProvider").field(&variant).finish()
    }
}

/// The wallet objects visible to this page or process.
///
/// Each field corresponds to one well-known injection point. Hosts fill in
/// whatever they find; absent fields mean "not installed".
#[derive(Clone, Default)]
pub struct InjectedWallets {
    /// `window.phantom.solana`
    pub phantom_solana: Option<Arc<dyn SolanaProvider>>,
    /// `window.phantom.ethereum`
    pub phantom_ethereum: Option<Arc<dyn Eip1193Provider>>,
    /// `window.solflare`
    pub solflare: Option<Arc<dyn SolanaProvider>>,
    /// `window.ethereum`
    pub ethereum: Option<Arc<dyn Eip1193Provider>>,
    /// The WalletConnect / Reown SDK instance, if the app initialized one.
    pub wallet_connect: Option<Arc<dyn WalletConnectProvider>>,
}

impl fmt::Debug for InjectedWallets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InjectedWallets")
            .field("phantom_solana", &self.phantom_solana.is_some())
            .field("phantom_ethereum", &self.phantom_ethereum.is_some())
            .field("solflare", &self.solflare.is_some())
            .field("ethereum", &self.ethereum.is_some())
            .field("wallet_connect", &self.wallet_connect.is_some())
            .finish()
    }
}

impl InjectedWallets {
    /// Creates an environment with no wallets.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builder-style setter for `window.phantom.solana`.
    #[must_use]
    pub fn with_phantom_solana(mut self, provider: Arc<dyn SolanaProvider>) -> Self {
        self.phantom_solana = Some(provider);
        self
    }

    /// Builder-style setter for `window.phantom.ethereum`.
    #[must_use]
    pub fn with_phantom_ethereum(mut self, provider: Arc<dyn Eip1193Provider>) -> Self {
        self.phantom_ethereum = Some(provider);
        self
    }

    /// Builder-style setter for `window.solflare`.
    #[must_use]
    pub fn with_solflare(mut self, provider: Arc<dyn SolanaProvider>) -> Self {
        self.solflare = Some(provider);
        self
    }

    /// Builder-style setter for `window.ethereum`.
    #[must_use]
    pub fn with_ethereum(mut self, provider: Arc<dyn Eip1193Provider>) -> Self {
        self.ethereum = Some(provider);
        self
    }

    /// Builder-style setter for the WalletConnect SDK session.
    #[must_use]
    pub fn with_wallet_connect(mut self, provider: Arc<dyn WalletConnectProvider>) -> Self {
        self.wallet_connect = Some(provider);
        self
    }
}
