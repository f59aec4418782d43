//! EIP-1193 and WalletConnect connectors.
//!
//! - [`Eip1193Connector`] - MetaMask and Phantom's Ethereum provider
//! - [`WalletConnectConnector`] - The WalletConnect / Reown modal
//!
//! `eth_requestAccounts` only opens the wallet prompt. The connected account is
//! always re-read through `eth_accounts` afterwards, since some wallets resolve
//! the request before their account list is updated.

use alloy_primitives::Address;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use walletkit::WalletType;
use walletkit::connect::{ConnectOptions, WalletConnector};
use walletkit::error::WalletError;
use walletkit::provider::{
    Eip1193Provider, InjectedWallets, METHOD_NOT_FOUND_CODE, ProviderError, UNSUPPORTED_METHOD_CODE,
    WalletConnectProvider, WalletProvider,
};

/// Normalizes an address to its EIP-55 checksum form.
fn checksum(raw: &str) -> Result<String, WalletError> {
    raw.trim()
        .parse::<Address>()
        .map(|address| address.to_checksum(None))
        .map_err(|_| WalletError::invalid_state(format!("Invalid Ethereum address '{raw}'")))
}

fn first_account(accounts: Value) -> Result<Option<String>, WalletError> {
    let accounts: Vec<String> = serde_json::from_value(accounts)
        .map_err(|e| WalletError::invalid_state(format!("Malformed eth_accounts response: {e}")))?;
    accounts.first().map(|raw| checksum(raw)).transpose()
}

const fn is_unsupported(err: &ProviderError) -> bool {
    matches!(err.code, Some(UNSUPPORTED_METHOD_CODE | METHOD_NOT_FOUND_CODE))
}

/// A connector for an injected EIP-1193 provider.
#[derive(Clone)]
pub struct Eip1193Connector {
    wallet_type: WalletType,
    provider: Option<Arc<dyn Eip1193Provider>>,
}

impl fmt::Debug for Eip1193Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Eip1193Connector")
            .field("wallet_type", &self.wallet_type)
            .field("installed", &self.provider.is_some())
            .finish()
    }
}

impl Eip1193Connector {
    /// Creates a connector for `wallet_type` backed by `provider`.
    #[must_use]
    pub fn new(wallet_type: WalletType, provider: Option<Arc<dyn Eip1193Provider>>) -> Self {
        Self {
            wallet_type,
            provider,
        }
    }

    /// The MetaMask connector. `window.ethereum` only counts when it is not Phantom's.
    #[must_use]
    pub fn metamask(wallets: &InjectedWallets) -> Self {
        let provider = match wallets.provider_for(WalletType::Metamask) {
            Some(WalletProvider::Ethereum(provider)) => Some(provider),
            _ => None,
        };
        Self::new(WalletType::Metamask, provider)
    }

    /// The Phantom Ethereum connector.
    #[must_use]
    pub fn phantom(wallets: &InjectedWallets) -> Self {
        Self::new(WalletType::PhantomEthereum, wallets.phantom_ethereum.clone())
    }

    fn provider(&self) -> Result<&Arc<dyn Eip1193Provider>, WalletError> {
        self.provider.as_ref().ok_or(WalletError::NotInstalled {
            wallet_type: self.wallet_type,
        })
    }
}

#[async_trait]
impl WalletConnector for Eip1193Connector {
    fn wallet_type(&self) -> WalletType {
        self.wallet_type
    }

    fn is_installed(&self) -> bool {
        self.provider.is_some()
    }

    async fn connect(&self, options: &ConnectOptions) -> Result<String, WalletError> {
        let provider = self.provider()?;
        if options.force_prompt {
            // Re-opens the account picker on wallets that remember the site.
            match provider
                .request("wallet_requestPermissions", json!([{ "eth_accounts": {} }]))
                .await
            {
                Ok(_) => {}
                Err(err) if is_unsupported(&err) => {}
                Err(err) => return Err(err.into()),
            }
        }
        provider.request("eth_requestAccounts", json!([])).await?;
        let accounts = provider.request("eth_accounts", json!([])).await?;
        first_account(accounts)?
            .ok_or_else(|| WalletError::transient("Wallet connected but returned no accounts"))
    }

    async fn disconnect(&self) -> Result<(), WalletError> {
        let provider = self.provider()?;
        match provider
            .request("wallet_revokePermissions", json!([{ "eth_accounts": {} }]))
            .await
        {
            Ok(_) => Ok(()),
            Err(err) if is_unsupported(&err) => {
                #[cfg(feature = "telemetry")]
                tracing::debug!(wallet_type = %self.wallet_type, "Provider cannot revoke permissions");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn current_account(&self) -> Result<Option<String>, WalletError> {
        let accounts = self.provider()?.request("eth_accounts", json!([])).await?;
        first_account(accounts)
    }
}

/// A connector for the WalletConnect / Reown modal.
///
/// Success is observed on the SDK's account subscription. If no account
/// appears within the timeout, the user is taken to have closed the modal.
#[derive(Clone)]
pub struct WalletConnectConnector {
    provider: Option<Arc<dyn WalletConnectProvider>>,
    timeout: Duration,
}

impl fmt::Debug for WalletConnectConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletConnectConnector")
            .field("installed", &self.provider.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl WalletConnectConnector {
    /// Default time to wait for the user to pick an account.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

    /// Creates a connector over the SDK session.
    #[must_use]
    pub const fn new(provider: Option<Arc<dyn WalletConnectProvider>>) -> Self {
        Self {
            provider,
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    /// Sets how long to wait for an account.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn provider(&self) -> Result<&Arc<dyn WalletConnectProvider>, WalletError> {
        self.provider.as_ref().ok_or(WalletError::NotInstalled {
            wallet_type: WalletType::Walletconnect,
        })
    }
}

#[async_trait]
impl WalletConnector for WalletConnectConnector {
    fn wallet_type(&self) -> WalletType {
        WalletType::Walletconnect
    }

    fn is_installed(&self) -> bool {
        self.provider.is_some()
    }

    async fn connect(&self, options: &ConnectOptions) -> Result<String, WalletError> {
        let provider = self.provider()?;
        if !options.force_prompt
            && let Some(account) = provider.account()
        {
            return checksum(&account);
        }

        // Only a selection made after the modal opens counts.
        let mut changes = provider.account_changes();
        changes.mark_unchanged();
        provider.open_modal().await?;

        let account = tokio::time::timeout(self.timeout, next_account(&mut changes))
            .await
            .map_err(|_| WalletError::UserRejected {
                message: "modal closed without selecting an account".to_owned(),
            })??;
        checksum(&account)
    }

    async fn disconnect(&self) -> Result<(), WalletError> {
        self.provider()?.disconnect().await?;
        Ok(())
    }

    async fn current_account(&self) -> Result<Option<String>, WalletError> {
        self.provider()?
            .account()
            .as_deref()
            .map(checksum)
            .transpose()
    }
}

/// Waits for the next account the SDK reports, skipping disconnects.
async fn next_account(changes: &mut watch::Receiver<Option<String>>) -> Result<String, WalletError> {
    loop {
        changes
            .changed()
            .await
            .map_err(|_| WalletError::transient("WalletConnect session closed"))?;
        if let Some(account) = changes.borrow_and_update().clone() {
            return Ok(account);
        }
    }
}

/// Connectors for every Ethereum wallet, installed or not.
#[must_use]
pub fn connectors(wallets: &InjectedWallets) -> Vec<Arc<dyn WalletConnector>> {
    vec![
        Arc::new(Eip1193Connector::metamask(wallets)),
        Arc::new(Eip1193Connector::phantom(wallets)),
        Arc::new(WalletConnectConnector::new(wallets.wallet_connect.clone())),
    ]
}
