//! Wallet presence detection.
//!
//! Detection only inspects the shape of [`InjectedWallets`]; it never calls a
//! provider and never fails. A wallet that is absent is simply not listed.

use std::collections::HashSet;

use crate::chain::WalletType;
use crate::provider::{InjectedWallets, WalletProvider};

/// Returns the wallet types whose providers are present.
///
/// `window.ethereum` counts as MetaMask only when it sets `isMetaMask` and
/// not `isPhantom`, since Phantom also injects an EIP-1193 object there.
/// WalletConnect is listed when the host initialized its SDK.
#[must_use]
pub fn detect_wallets(wallets: &InjectedWallets) -> HashSet<WalletType> {
    let detected: HashSet<WalletType> = WalletType::ALL
        .into_iter()
        .filter(|wallet_type| wallets.provider_for(*wallet_type).is_some())
        .collect();
    #[cfg(feature = "telemetry")]
    tracing::debug!(detected = ?detected, "Detected wallets");
    detected
}

impl InjectedWallets {
    /// Returns the provider that serves `wallet_type`, if present.
    #[must_use]
    pub fn provider_for(&self, wallet_type: WalletType) -> Option<WalletProvider> {
        match wallet_type {
            WalletType::Phantom => self.phantom_solana.clone().map(WalletProvider::Solana),
            WalletType::Solflare => self.solflare.clone().map(WalletProvider::Solana),
            WalletType::PhantomEthereum => self
                .phantom_ethereum
                .clone()
                .map(WalletProvider::Ethereum),
            WalletType::Metamask => self
                .ethereum
                .clone()
                .filter(|p| p.is_metamask() && !p.is_phantom())
                .map(WalletProvider::Ethereum),
            WalletType::Walletconnect => self
                .wallet_connect
                .clone()
                .map(WalletProvider::WalletConnect),
        }
    }

    /// Returns `true` if any wallet is present.
    #[must_use]
    pub fn any(&self) -> bool {
        WalletType::ALL
            .into_iter()
            .any(|wallet_type| self.provider_for(wallet_type).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{Eip1193Provider, ProviderError};
    use async_trait::async_trait;
    use std::sync::Arc;

    struct FlaggedEthereum {
        metamask: bool,
        phantom: bool,
    }

    #[async_trait]
    impl Eip1193Provider for FlaggedEthereum {
        async fn request(
            &self,
            _method: &str,
            _params: serde_json::Value,
        ) -> Result<serde_json::Value, ProviderError> {
            Ok(serde_json::Value::Null)
        }

        fn is_metamask(&self) -> bool {
            self.metamask
        }

        fn is_phantom(&self) -> bool {
            self.phantom
        }
    }

    fn ethereum(metamask: bool, phantom: bool) -> Arc<dyn Eip1193Provider> {
        Arc::new(FlaggedEthereum { metamask, phantom })
    }

    #[test]
    fn test_nothing_injected() {
        let wallets = InjectedWallets::empty();
        assert!(detect_wallets(&wallets).is_empty());
        assert!(!wallets.any());
    }

    #[test]
    fn test_metamask_requires_flag() {
        let wallets = InjectedWallets::empty().with_ethereum(ethereum(true, false));
        assert_eq!(
            detect_wallets(&wallets),
            HashSet::from([WalletType::Metamask])
        );

        let generic = InjectedWallets::empty().with_ethereum(ethereum(false, false));
        assert!(detect_wallets(&generic).is_empty());
    }

    #[test]
    fn test_phantom_posing_as_metamask_is_not_metamask() {
        let wallets = InjectedWallets::empty()
            .with_ethereum(ethereum(true, true))
            .with_phantom_ethereum(ethereum(false, true));
        let detected = detect_wallets(&wallets);
        assert!(!detected.contains(&WalletType::Metamask));
        assert!(detected.contains(&WalletType::PhantomEthereum));
    }
}
