//! Wallet connection orchestration.
//!
//! Every wallet type is served by one [`WalletConnector`], registered in a
//! [`ConnectorRegistry`]. The [`ConnectionManager`] drives a single attempt
//! through `idle -> connecting -> connected | failed`:
//!
//! - **In-flight guard** - A second `connect` for a wallet type that is still
//!   connecting returns at once, without touching the provider or the bus
//! - **Not installed** - Opens the install page, or on mobile the wallet's
//!   deep link with the app store as fallback
//! - **Retry** - Transient failures are retried with backoff; rejections are not
//! - **Persistence** - A successful attempt stores the session, lifts the
//!   explicit-disconnect flag and publishes [`SessionEvent::Connected`]
//!
//! Different wallet types may connect concurrently.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

use crate::chain::WalletType;
use crate::error::WalletError;
use crate::events::SessionEvent;
use crate::platform::{self, DeviceInfo, Launcher, LogLauncher};
use crate::retry::{RetryPolicy, with_retry_if};
use crate::session::SessionStore;

/// Options for a single connection attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Prompt the user even if the wallet already reports a connection.
    pub force_prompt: bool,
    /// Treat the caller as a mobile browser regardless of the device info.
    pub is_mobile: bool,
}

impl ConnectOptions {
    /// Sets `force_prompt`.
    #[must_use]
    pub const fn with_force_prompt(mut self, force_prompt: bool) -> Self {
        self.force_prompt = force_prompt;
        self
    }

    /// Sets `is_mobile`.
    #[must_use]
    pub const fn with_mobile(mut self, is_mobile: bool) -> Self {
        self.is_mobile = is_mobile;
        self
    }
}

/// Per-wallet connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No attempt has been made, or the wallet was disconnected.
    #[default]
    Idle,
    /// An attempt is running.
    Connecting,
    /// The last attempt succeeded.
    Connected,
    /// The last attempt failed.
    Failed,
}

/// The outcome of one connect or disconnect call.
#[derive(Debug)]
pub struct ConnectionAttemptResult {
    /// Whether the call achieved its goal.
    pub success: bool,
    /// The connected address, on successful connect.
    pub address: Option<String>,
    /// The wallet the call was made for.
    pub wallet_type: Option<WalletType>,
    /// Why the call failed.
    pub error: Option<WalletError>,
}

impl ConnectionAttemptResult {
    /// A successful connect.
    #[must_use]
    pub const fn connected(address: String, wallet_type: WalletType) -> Self {
        Self {
            success: true,
            address: Some(address),
            wallet_type: Some(wallet_type),
            error: None,
        }
    }

    /// A successful disconnect.
    #[must_use]
    pub const fn disconnected(wallet_type: WalletType) -> Self {
        Self {
            success: true,
            address: None,
            wallet_type: Some(wallet_type),
            error: None,
        }
    }

    /// A failed call.
    #[must_use]
    pub const fn failed(wallet_type: WalletType, error: WalletError) -> Self {
        Self {
            success: false,
            address: None,
            wallet_type: Some(wallet_type),
            error: Some(error),
        }
    }
}

/// Connects to one wallet type through its provider.
#[async_trait]
pub trait WalletConnector: Send + Sync {
    /// The wallet this connector serves.
    fn wallet_type(&self) -> WalletType;

    /// Whether the provider object is present.
    fn is_installed(&self) -> bool {
        true
    }

    /// Connects and returns the account address.
    ///
    /// May prompt the user.
    async fn connect(&self, options: &ConnectOptions) -> Result<String, WalletError>;

    /// Ends the provider connection.
    async fn disconnect(&self) -> Result<(), WalletError>;

    /// Returns the connected account using read-only calls only.
    ///
    /// Must never prompt the user.
    async fn current_account(&self) -> Result<Option<String>, WalletError>;
}

/// Connectors keyed by wallet type.
#[derive(Clone, Default)]
pub struct ConnectorRegistry(HashMap<WalletType, Arc<dyn WalletConnector>>);

impl Debug for ConnectorRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let types: Vec<&str> = self.0.keys().map(WalletType::as_str).collect();
        f.debug_tuple("ConnectorRegistry").field(&types).finish()
    }
}

impl ConnectorRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    /// Registers a connector, replacing any previous one for its wallet type.
    pub fn register(&mut self, connector: Arc<dyn WalletConnector>) {
        self.0.insert(connector.wallet_type(), connector);
    }

    /// Builder-style [`Self::register`] for several connectors.
    #[must_use]
    pub fn with(mut self, connectors: impl IntoIterator<Item = Arc<dyn WalletConnector>>) -> Self {
        for connector in connectors {
            self.register(connector);
        }
        self
    }

    /// Returns the connector for `wallet_type`.
    #[must_use]
    pub fn get(&self, wallet_type: WalletType) -> Option<&Arc<dyn WalletConnector>> {
        self.0.get(&wallet_type)
    }

    /// Wallet types whose connectors report an installed provider.
    #[must_use]
    pub fn detected(&self) -> HashSet<WalletType> {
        self.0
            .values()
            .filter(|c| c.is_installed())
            .map(|c| c.wallet_type())
            .collect()
    }
}

/// Orchestrates connect and disconnect across all registered wallets.
pub struct ConnectionManager {
    registry: ConnectorRegistry,
    sessions: SessionStore,
    launcher: Arc<dyn Launcher>,
    device: DeviceInfo,
    dapp_url: Option<String>,
    retry: RetryPolicy,
    states: DashMap<WalletType, ConnectionState>,
}

impl Debug for ConnectionManager {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("registry", &self.registry)
            .field("device", &self.device)
            .field("dapp_url", &self.dapp_url)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    /// Creates a manager for a desktop device that logs URLs instead of opening them.
    #[must_use]
    pub fn new(registry: ConnectorRegistry, sessions: SessionStore) -> Self {
        Self {
            registry,
            sessions,
            launcher: Arc::new(LogLauncher),
            device: DeviceInfo::desktop(),
            dapp_url: None,
            retry: RetryPolicy::default(),
            states: DashMap::new(),
        }
    }

    /// Sets the URL opener.
    #[must_use]
    pub fn with_launcher(mut self, launcher: Arc<dyn Launcher>) -> Self {
        self.launcher = launcher;
        self
    }

    /// Sets the device description.
    #[must_use]
    pub const fn with_device(mut self, device: DeviceInfo) -> Self {
        self.device = device;
        self
    }

    /// Sets the URL the wallet's in-app browser should open on mobile.
    #[must_use]
    pub fn with_dapp_url(mut self, dapp_url: impl Into<String>) -> Self {
        self.dapp_url = Some(dapp_url.into());
        self
    }

    /// Sets the retry policy for provider connects.
    #[must_use]
    pub const fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The session store this manager writes to.
    #[must_use]
    pub const fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// The registered connectors.
    #[must_use]
    pub const fn registry(&self) -> &ConnectorRegistry {
        &self.registry
    }

    /// Lifecycle state of `wallet_type`.
    #[must_use]
    pub fn state(&self, wallet_type: WalletType) -> ConnectionState {
        self.states
            .get(&wallet_type)
            .map(|s| *s.value())
            .unwrap_or_default()
    }

    /// Connects `wallet_type`.
    ///
    /// Never returns an error directly; failures are carried in the result.
    pub async fn connect(
        &self,
        wallet_type: WalletType,
        options: ConnectOptions,
    ) -> ConnectionAttemptResult {
        let Some(mut guard) = self.begin(wallet_type) else {
            #[cfg(feature = "telemetry")]
            tracing::debug!(wallet_type = %wallet_type, "Connection already in progress");
            return ConnectionAttemptResult::failed(
                wallet_type,
                WalletError::AlreadyConnecting { wallet_type },
            );
        };

        #[cfg(feature = "telemetry")]
        tracing::info!(wallet_type = %wallet_type, force_prompt = options.force_prompt, "Connecting wallet");

        match self.try_connect(wallet_type, &options).await {
            Ok(address) => {
                guard.finish(ConnectionState::Connected);
                #[cfg(feature = "telemetry")]
                tracing::info!(wallet_type = %wallet_type, address = %address, "Wallet connected");
                self.sessions.events().publish(SessionEvent::Connected {
                    address: address.clone(),
                    wallet_type,
                });
                ConnectionAttemptResult::connected(address, wallet_type)
            }
            Err(err) => {
                guard.finish(ConnectionState::Failed);
                #[cfg(feature = "telemetry")]
                tracing::warn!(wallet_type = %wallet_type, error = %err, "Wallet connection failed");
                ConnectionAttemptResult::failed(wallet_type, err)
            }
        }
    }

    /// Disconnects `wallet_type`, clears its session and suppresses auto-reconnect.
    ///
    /// Local state is torn down even if the provider's disconnect fails; the
    /// provider error is then reported in the result.
    pub async fn disconnect(&self, wallet_type: WalletType) -> ConnectionAttemptResult {
        let provider_result = match self.registry.get(wallet_type) {
            Some(connector) if connector.is_installed() => connector.disconnect().await,
            _ => Ok(()),
        };

        // A session held by another wallet type is left alone.
        let owns_session = self
            .sessions
            .get()
            .is_none_or(|session| session.wallet_type == wallet_type);
        let local_result = if owns_session {
            self.sessions
                .clear()
                .and_then(|()| self.sessions.mark_explicit_disconnect())
        } else {
            Ok(())
        };
        self.states.insert(wallet_type, ConnectionState::Idle);
        self.sessions.events().publish(SessionEvent::Disconnected {
            wallet_type: Some(wallet_type),
        });

        #[cfg(feature = "telemetry")]
        tracing::info!(wallet_type = %wallet_type, "Wallet disconnected");

        match provider_result.and(local_result.map_err(WalletError::from)) {
            Ok(()) => ConnectionAttemptResult::disconnected(wallet_type),
            Err(err) => {
                #[cfg(feature = "telemetry")]
                tracing::warn!(wallet_type = %wallet_type, error = %err, "Disconnect did not complete cleanly");
                ConnectionAttemptResult::failed(wallet_type, err)
            }
        }
    }

    async fn try_connect(
        &self,
        wallet_type: WalletType,
        options: &ConnectOptions,
    ) -> Result<String, WalletError> {
        let Some(connector) = self
            .registry
            .get(wallet_type)
            .filter(|c| c.is_installed())
        else {
            self.redirect_to_install(wallet_type, options);
            return Err(WalletError::NotInstalled { wallet_type });
        };

        let address = with_retry_if(
            || connector.connect(options),
            &self.retry,
            WalletError::is_retryable,
        )
        .await?;

        self.sessions.store(address.clone(), wallet_type)?;
        self.sessions.record_explicit_connect()?;
        Ok(address)
    }

    fn redirect_to_install(&self, wallet_type: WalletType, options: &ConnectOptions) {
        let mobile = options.is_mobile || self.device.is_mobile();
        if mobile && wallet_type.supports_deep_link() {
            let link = self
                .dapp_url
                .as_deref()
                .and_then(|dapp| platform::deep_link(wallet_type, dapp));
            if let Some(link) = link {
                match self.launcher.open(&link) {
                    Ok(()) => return,
                    Err(_e) => {
                        #[cfg(feature = "telemetry")]
                        tracing::warn!(wallet_type = %wallet_type, error = %_e, "Deep link failed, falling back to app store");
                    }
                }
            }
            if let Some(store_url) = platform::app_store_url(wallet_type, self.device.os) {
                self.open_logged(store_url);
                return;
            }
        }
        self.open_logged(platform::install_url(wallet_type));
    }

    fn open_logged(&self, url: &str) {
        if let Err(_e) = self.launcher.open(url) {
            #[cfg(feature = "telemetry")]
            tracing::warn!(url, error = %_e, "Failed to open URL");
        }
    }

    fn begin(&self, wallet_type: WalletType) -> Option<InFlightGuard<'_>> {
        use dashmap::mapref::entry::Entry;
        match self.states.entry(wallet_type) {
            Entry::Occupied(entry) if *entry.get() == ConnectionState::Connecting => return None,
            Entry::Occupied(mut entry) => {
                entry.insert(ConnectionState::Connecting);
            }
            Entry::Vacant(entry) => {
                entry.insert(ConnectionState::Connecting);
            }
        }
        Some(InFlightGuard {
            states: &self.states,
            wallet_type,
            outcome: ConnectionState::Failed,
        })
    }
}

/// Releases the in-flight slot when the attempt ends, even if it was cancelled.
struct InFlightGuard<'a> {
    states: &'a DashMap<WalletType, ConnectionState>,
    wallet_type: WalletType,
    outcome: ConnectionState,
}

impl InFlightGuard<'_> {
    const fn finish(&mut self, outcome: ConnectionState) {
        self.outcome = outcome;
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.states.insert(self.wallet_type, self.outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, Timestamp};
    use crate::error::ErrorKind;
    use crate::platform::{LaunchError, Os};
    use crate::storage::MemoryStore;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct ScriptedConnector {
        wallet_type: WalletType,
        installed: bool,
        delay: Duration,
        script: Mutex<VecDeque<Result<String, WalletError>>>,
        connects: AtomicU32,
        disconnects: AtomicU32,
    }

    impl ScriptedConnector {
        fn new(wallet_type: WalletType, script: Vec<Result<String, WalletError>>) -> Self {
            Self {
                wallet_type,
                installed: true,
                delay: Duration::ZERO,
                script: Mutex::new(script.into()),
                connects: AtomicU32::new(0),
                disconnects: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl WalletConnector for ScriptedConnector {
        fn wallet_type(&self) -> WalletType {
            self.wallet_type
        }

        fn is_installed(&self) -> bool {
            self.installed
        }

        async fn connect(&self, _options: &ConnectOptions) -> Result<String, WalletError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            let next = self.script.lock().unwrap().pop_front();
            next.unwrap_or_else(|| Err(WalletError::invalid_state("script exhausted")))
        }

        async fn disconnect(&self) -> Result<(), WalletError> {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn current_account(&self) -> Result<Option<String>, WalletError> {
            Ok(None)
        }
    }

    #[derive(Default)]
    struct RecordingLauncher {
        opened: Mutex<Vec<String>>,
        refuse_scheme: Option<&'static str>,
    }

    impl Launcher for RecordingLauncher {
        fn open(&self, url: &str) -> Result<(), LaunchError> {
            self.opened.lock().unwrap().push(url.to_owned());
            match self.refuse_scheme {
                Some(scheme) if url.starts_with(scheme) => Err(LaunchError {
                    url: url.to_owned(),
                    reason: "no handler".into(),
                }),
                _ => Ok(()),
            }
        }
    }

    fn sessions() -> SessionStore {
        SessionStore::with_clock(
            Arc::new(MemoryStore::new()),
            Arc::new(ManualClock::new(Timestamp::from_millis(1_700_000_000_000))),
        )
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::default()
            .with_delays(Duration::from_millis(10), Duration::from_millis(50))
            .with_max_jitter(Duration::ZERO)
    }

    fn manager_with(connector: Arc<ScriptedConnector>) -> ConnectionManager {
        let registry = ConnectorRegistry::new().with([connector as Arc<dyn WalletConnector>]);
        ConnectionManager::new(registry, sessions()).with_retry_policy(fast_retry())
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_connect_persists_and_broadcasts() {
        let connector = Arc::new(ScriptedConnector::new(
            WalletType::Metamask,
            vec![Ok("0xabc".into())],
        ));
        let manager = manager_with(connector.clone());
        manager.sessions().mark_explicit_disconnect().unwrap();
        let mut events = manager.sessions().subscribe();

        let result = manager
            .connect(WalletType::Metamask, ConnectOptions::default())
            .await;

        assert!(result.success);
        assert_eq!(result.address.as_deref(), Some("0xabc"));
        assert_eq!(manager.state(WalletType::Metamask), ConnectionState::Connected);
        let session = manager.sessions().get().unwrap();
        assert_eq!(session.address, "0xabc");
        assert!(!manager.sessions().is_explicitly_disconnected());
        assert_eq!(
            events.try_recv().unwrap(),
            SessionEvent::Connected {
                address: "0xabc".into(),
                wallet_type: WalletType::Metamask
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_connect_while_in_flight_is_noop() {
        let mut scripted =
            ScriptedConnector::new(WalletType::Phantom, vec![Ok("So1ana".into())]);
        scripted.delay = Duration::from_secs(5);
        let connector = Arc::new(scripted);
        let manager = manager_with(connector.clone());
        let mut events = manager.sessions().subscribe();

        let (first, second) = tokio::join!(
            manager.connect(WalletType::Phantom, ConnectOptions::default()),
            async {
                let result = manager
                    .connect(WalletType::Phantom, ConnectOptions::default())
                    .await;
                assert!(events.try_recv().is_err());
                result
            }
        );

        assert!(first.success);
        assert!(!second.success);
        assert_eq!(
            second.error.map(|e| e.kind()),
            Some(ErrorKind::AlreadyConnecting)
        );
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_are_retried() {
        let connector = Arc::new(ScriptedConnector::new(
            WalletType::Solflare,
            vec![
                Err(WalletError::transient("Wallet not ready")),
                Err(WalletError::transient("connected but public key missing")),
                Ok("So1flare".into()),
            ],
        ));
        let manager = manager_with(connector.clone());
        let result = manager
            .connect(WalletType::Solflare, ConnectOptions::default())
            .await;
        assert!(result.success);
        assert_eq!(connector.connects.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_user_rejection_is_not_retried() {
        let connector = Arc::new(ScriptedConnector::new(
            WalletType::Metamask,
            vec![Err(WalletError::UserRejected {
                message: "User denied account authorization".into(),
            })],
        ));
        let manager = manager_with(connector.clone());
        let result = manager
            .connect(WalletType::Metamask, ConnectOptions::default())
            .await;
        assert!(!result.success);
        assert_eq!(result.error.map(|e| e.kind()), Some(ErrorKind::UserRejected));
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
        assert_eq!(manager.state(WalletType::Metamask), ConnectionState::Failed);
        assert!(manager.sessions().get().is_none());
    }

    #[tokio::test]
    async fn test_no_wallets_opens_metamask_install_page() {
        let launcher = Arc::new(RecordingLauncher::default());
        let manager = ConnectionManager::new(ConnectorRegistry::new(), sessions())
            .with_launcher(launcher.clone());
        assert!(manager.registry().detected().is_empty());

        let result = manager
            .connect(WalletType::Metamask, ConnectOptions::default())
            .await;

        assert!(!result.success);
        assert_eq!(result.error.map(|e| e.kind()), Some(ErrorKind::NotInstalled));
        assert_eq!(
            *launcher.opened.lock().unwrap(),
            vec!["https://metamask.io/download/".to_owned()]
        );
    }

    #[tokio::test]
    async fn test_mobile_deep_link_falls_back_to_app_store() {
        let launcher = Arc::new(RecordingLauncher {
            refuse_scheme: Some("metamask://"),
            ..RecordingLauncher::default()
        });
        let manager = ConnectionManager::new(ConnectorRegistry::new(), sessions())
            .with_launcher(launcher.clone())
            .with_device(DeviceInfo { os: Os::Ios })
            .with_dapp_url("https://app.example.com/presale");

        let result = manager
            .connect(WalletType::Metamask, ConnectOptions::default())
            .await;

        assert!(!result.success);
        assert_eq!(
            *launcher.opened.lock().unwrap(),
            vec![
                "metamask://dapp/app.example.com".to_owned(),
                "https://apps.apple.com/app/metamask/id1438144202".to_owned(),
            ]
        );
    }

    #[tokio::test]
    async fn test_disconnect_clears_and_flags() {
        let connector = Arc::new(ScriptedConnector::new(
            WalletType::Metamask,
            vec![Ok("0xabc".into())],
        ));
        let manager = manager_with(connector.clone());
        assert!(
            manager
                .connect(WalletType::Metamask, ConnectOptions::default())
                .await
                .success
        );
        let mut events = manager.sessions().subscribe();

        let result = manager.disconnect(WalletType::Metamask).await;

        assert!(result.success);
        assert_eq!(connector.disconnects.load(Ordering::SeqCst), 1);
        assert!(manager.sessions().get().is_none());
        assert!(manager.sessions().is_explicitly_disconnected());
        assert_eq!(manager.state(WalletType::Metamask), ConnectionState::Idle);
        assert_eq!(
            events.try_recv().unwrap(),
            SessionEvent::Disconnected {
                wallet_type: Some(WalletType::Metamask)
            }
        );
    }

    #[tokio::test]
    async fn test_disconnect_keeps_other_wallets_session() {
        let connector = Arc::new(ScriptedConnector::new(WalletType::Metamask, vec![]));
        let manager = manager_with(connector.clone());
        let phantom = manager
            .sessions()
            .store("So1ana", WalletType::Phantom)
            .unwrap();

        let result = manager.disconnect(WalletType::Metamask).await;

        assert!(result.success);
        assert_eq!(connector.disconnects.load(Ordering::SeqCst), 1);
        assert_eq!(manager.sessions().get(), Some(phantom));
        assert!(!manager.sessions().is_explicitly_disconnected());
    }
}
