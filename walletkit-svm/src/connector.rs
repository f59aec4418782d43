//! Phantom and Solflare connectors.
//!
//! Solana wallets expose `connect()` and a `publicKey` property. Some of them
//! resolve `connect()` before `publicKey` is populated, so a successful
//! connect is followed by a bounded poll for the key.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use walletkit::WalletType;
use walletkit::connect::{ConnectOptions, WalletConnector};
use walletkit::error::WalletError;
use walletkit::provider::{InjectedWallets, SolanaProvider};

use crate::address::SolanaAddress;

/// How long to wait for `publicKey` after `connect()` resolves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyPollPolicy {
    /// Reads of `publicKey`, including the first.
    pub attempts: u32,
    /// Delay after the first empty read.
    pub initial_delay: Duration,
    /// Growth of the delay per attempt.
    pub factor: f64,
    /// Upper bound on a single delay.
    pub max_delay: Duration,
}

impl Default for KeyPollPolicy {
    fn default() -> Self {
        Self {
            attempts: 8,
            initial_delay: Duration::from_millis(250),
            factor: 1.3,
            max_delay: Duration::from_secs(4),
        }
    }
}

/// A connector for one Solana wallet.
#[derive(Clone)]
pub struct SolanaConnector {
    wallet_type: WalletType,
    provider: Option<Arc<dyn SolanaProvider>>,
    key_poll: KeyPollPolicy,
}

impl std::fmt::Debug for SolanaConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolanaConnector")
            .field("wallet_type", &self.wallet_type)
            .field("installed", &self.provider.is_some())
            .field("key_poll", &self.key_poll)
            .finish()
    }
}

impl SolanaConnector {
    /// Creates a connector for `wallet_type` backed by `provider`.
    #[must_use]
    pub fn new(wallet_type: WalletType, provider: Option<Arc<dyn SolanaProvider>>) -> Self {
        Self {
            wallet_type,
            provider,
            key_poll: KeyPollPolicy::default(),
        }
    }

    /// The Phantom connector for `wallets`.
    #[must_use]
    pub fn phantom(wallets: &InjectedWallets) -> Self {
        Self::new(WalletType::Phantom, wallets.phantom_solana.clone())
    }

    /// The Solflare connector for `wallets`.
    #[must_use]
    pub fn solflare(wallets: &InjectedWallets) -> Self {
        Self::new(WalletType::Solflare, wallets.solflare.clone())
    }

    /// Sets the public key poll policy.
    #[must_use]
    pub const fn with_key_poll(mut self, key_poll: KeyPollPolicy) -> Self {
        self.key_poll = key_poll;
        self
    }

    fn provider(&self) -> Result<&Arc<dyn SolanaProvider>, WalletError> {
        self.provider.as_ref().ok_or(WalletError::NotInstalled {
            wallet_type: self.wallet_type,
        })
    }

    async fn wait_for_public_key(&self, provider: &dyn SolanaProvider) -> Option<String> {
        let policy = self.key_poll;
        let mut delay = policy.initial_delay;
        for attempt in 1..=policy.attempts {
            if let Some(key) = provider.public_key() {
                return Some(key);
            }
            if attempt == policy.attempts {
                break;
            }
            #[cfg(feature = "telemetry")]
            tracing::debug!(wallet_type = %self.wallet_type, attempt, delay_ms = delay.as_millis() as u64, "Public key not available yet");
            tokio::time::sleep(delay).await;
            delay = delay.mul_f64(policy.factor).min(policy.max_delay);
        }
        None
    }
}

fn parse_address(raw: &str) -> Result<String, WalletError> {
    raw.parse::<SolanaAddress>()
        .map(|address| address.to_string())
        .map_err(|e| WalletError::invalid_state(e.to_string()))
}

#[async_trait]
impl WalletConnector for SolanaConnector {
    fn wallet_type(&self) -> WalletType {
        self.wallet_type
    }

    fn is_installed(&self) -> bool {
        self.provider.is_some()
    }

    async fn connect(&self, options: &ConnectOptions) -> Result<String, WalletError> {
        let provider = self.provider()?;
        if !options.force_prompt
            && provider.is_connected()
            && let Some(key) = provider.public_key()
        {
            #[cfg(feature = "telemetry")]
            tracing::debug!(wallet_type = %self.wallet_type, "Provider already connected");
            return parse_address(&key);
        }

        provider.connect().await?;
        let key = self
            .wait_for_public_key(provider.as_ref())
            .await
            .ok_or_else(|| {
                WalletError::transient("Wallet connected but public key not available")
            })?;
        parse_address(&key)
    }

    async fn disconnect(&self) -> Result<(), WalletError> {
        self.provider()?.disconnect().await?;
        Ok(())
    }

    async fn current_account(&self) -> Result<Option<String>, WalletError> {
        let provider = self.provider()?;
        if !provider.is_connected() {
            return Ok(None);
        }
        provider.public_key().as_deref().map(parse_address).transpose()
    }
}

/// Connectors for every Solana wallet, installed or not.
#[must_use]
pub fn connectors(wallets: &InjectedWallets) -> Vec<Arc<dyn WalletConnector>> {
    vec![
        Arc::new(SolanaConnector::phantom(wallets)),
        Arc::new(SolanaConnector::solflare(wallets)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use walletkit::error::ErrorKind;
    use walletkit::provider::ProviderError;

    const KEY: &str = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM";

    /// Reveals its key only after `key_after_reads` reads following `connect`.
    #[derive(Default)]
    struct SlowKeyWallet {
        connected: AtomicBool,
        key_after_reads: u32,
        reads: AtomicU32,
        connects: AtomicU32,
        reject: Option<ProviderError>,
        key: Mutex<Option<String>>,
    }

    impl SlowKeyWallet {
        fn revealing_after(reads: u32) -> Arc<Self> {
            Arc::new(Self {
                key_after_reads: reads,
                key: Mutex::new(Some(KEY.to_owned())),
                ..Self::default()
            })
        }
    }

    #[async_trait]
    impl SolanaProvider for SlowKeyWallet {
        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }

        fn public_key(&self) -> Option<String> {
            if !self.is_connected() {
                return None;
            }
            let reads = self.reads.fetch_add(1, Ordering::SeqCst) + 1;
            if reads > self.key_after_reads {
                self.key.lock().unwrap().clone()
            } else {
                None
            }
        }

        async fn connect(&self) -> Result<(), ProviderError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            if let Some(err) = &self.reject {
                return Err(err.clone());
            }
            self.connected.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn disconnect(&self) -> Result<(), ProviderError> {
            self.connected.store(false, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_for_late_public_key() {
        let wallet = SlowKeyWallet::revealing_after(3);
        let connector = SolanaConnector::new(
            WalletType::Phantom,
            Some(wallet.clone() as Arc<dyn SolanaProvider>),
        );
        let address = connector.connect(&ConnectOptions::default()).await.unwrap();
        assert_eq!(address, KEY);
        assert_eq!(wallet.reads.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_public_key_is_transient() {
        let wallet = SlowKeyWallet::revealing_after(u32::MAX);
        let connector = SolanaConnector::new(
            WalletType::Solflare,
            Some(wallet.clone() as Arc<dyn SolanaProvider>),
        );
        let started = tokio::time::Instant::now();
        let err = connector
            .connect(&ConnectOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transient);
        assert_eq!(wallet.reads.load(Ordering::SeqCst), 8);
        // Seven sleeps: 250ms growing by 1.3x, none reaching the 4s cap.
        let elapsed = started.elapsed();
        assert!(elapsed > Duration::from_secs(3) && elapsed < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_already_connected_short_circuits() {
        let wallet = SlowKeyWallet::revealing_after(0);
        wallet.connected.store(true, Ordering::SeqCst);
        let connector = SolanaConnector::new(
            WalletType::Phantom,
            Some(wallet.clone() as Arc<dyn SolanaProvider>),
        );

        connector.connect(&ConnectOptions::default()).await.unwrap();
        assert_eq!(wallet.connects.load(Ordering::SeqCst), 0);

        connector
            .connect(&ConnectOptions::default().with_force_prompt(true))
            .await
            .unwrap();
        assert_eq!(wallet.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_user_rejection_maps_to_user_rejected() {
        let wallet = Arc::new(SlowKeyWallet {
            reject: Some(ProviderError::new("User rejected the request.")),
            ..SlowKeyWallet::default()
        });
        let connector = SolanaConnector::new(
            WalletType::Phantom,
            Some(wallet as Arc<dyn SolanaProvider>),
        );
        let err = connector
            .connect(&ConnectOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UserRejected);
    }

    #[tokio::test]
    async fn test_current_account_is_read_only() {
        let wallet = SlowKeyWallet::revealing_after(0);
        let connector = SolanaConnector::new(
            WalletType::Phantom,
            Some(wallet.clone() as Arc<dyn SolanaProvider>),
        );
        assert_eq!(connector.current_account().await.unwrap(), None);

        wallet.connected.store(true, Ordering::SeqCst);
        assert_eq!(connector.current_account().await.unwrap().as_deref(), Some(KEY));
        assert_eq!(wallet.connects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_provider_is_not_installed() {
        let connectors = connectors(&InjectedWallets::empty());
        assert_eq!(connectors.len(), 2);
        assert!(connectors.iter().all(|c| !c.is_installed()));
        let err = connectors[0]
            .connect(&ConnectOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotInstalled);
    }
}
