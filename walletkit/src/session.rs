//! Persisted wallet session with lazy expiry.
//!
//! A [`SessionStore`] keeps at most one [`WalletSession`]. The session is
//! written as a JSON blob under [`keys::WALLET_CONNECTION_STATE`] together
//! with the flat address/type/time keys older readers look at.
//!
//! Expiry is never enforced by a timer. [`SessionStore::is_valid`] compares
//! the stored expiry with the clock and clears the session when it has
//! passed, so an expired session disappears the first time anyone asks.
//!
//! The store also owns the explicit-disconnect flag. While it is set, silent
//! recovery must not reconnect; the next user-initiated connect clears it.

use rand::RngExt;
use rand::rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use crate::chain::WalletType;
use crate::clock::{Clock, SystemClock, Timestamp};
use crate::events::{EventBus, SessionEvent};
use crate::storage::{KeyValueStore, StorageError, keys};

/// Default session lifetime in minutes (24 hours).
pub const DEFAULT_TTL_MINUTES: u64 = 1440;

const FLAG_SET: &str = "true";

/// The active wallet session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletSession {
    /// Connected account address.
    pub address: String,
    /// Wallet holding the account.
    pub wallet_type: WalletType,
    /// When the session was established or last refreshed.
    pub connected_at: Timestamp,
    /// When the session stops being valid.
    pub expires_at: Timestamp,
    /// Random identifier, stable across refreshes.
    pub session_id: String,
}

impl WalletSession {
    /// Returns `true` once `now` is past the expiry time.
    #[must_use]
    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        now > self.expires_at
    }

    /// Lifetime the session was created with; kept across refreshes.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.expires_at.saturating_since(self.connected_at)
    }
}

/// Reads and writes the wallet session in a [`KeyValueStore`].
#[derive(Clone)]
pub struct SessionStore {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    events: EventBus,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

impl SessionStore {
    /// Creates a store over `store` using the system clock.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    /// Creates a store with an explicit clock.
    #[must_use]
    pub fn with_clock(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            events: EventBus::new(),
        }
    }

    /// Replaces the event bus, so several components can share one.
    #[must_use]
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    /// The bus session changes are announced on.
    #[must_use]
    pub const fn events(&self) -> &EventBus {
        &self.events
    }

    /// Subscribes to session events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// The underlying key-value store.
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    /// The clock used for timestamps.
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Stores a new session with the default lifetime.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend fails to write.
    pub fn store(
        &self,
        address: impl Into<String>,
        wallet_type: WalletType,
    ) -> Result<WalletSession, StorageError> {
        self.store_with_ttl(address, wallet_type, DEFAULT_TTL_MINUTES)
    }

    /// Stores a new session that expires `ttl_minutes` from now.
    ///
    /// Any previous session is replaced and receives a fresh `session_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend fails to write.
    pub fn store_with_ttl(
        &self,
        address: impl Into<String>,
        wallet_type: WalletType,
        ttl_minutes: u64,
    ) -> Result<WalletSession, StorageError> {
        let now = self.clock.now();
        let session = WalletSession {
            address: address.into(),
            wallet_type,
            connected_at: now,
            expires_at: now + Duration::from_secs(ttl_minutes.saturating_mul(60)),
            session_id: new_session_id(),
        };
        self.write(&session)?;
        #[cfg(feature = "telemetry")]
        tracing::info!(
            wallet_type = %session.wallet_type,
            address = %session.address,
            expires_at = %session.expires_at,
            "Stored wallet session"
        );
        Ok(session)
    }

    /// Returns the stored session, valid or not.
    ///
    /// A blob that cannot be parsed reads as no session.
    #[must_use]
    pub fn get(&self) -> Option<WalletSession> {
        let raw = self.store.get(keys::WALLET_CONNECTION_STATE)?;
        serde_json::from_str(&raw).ok()
    }

    /// Returns `true` if a session exists and has not expired.
    ///
    /// An expired session is cleared as a side effect.
    pub fn is_valid(&self) -> bool {
        let Some(session) = self.get() else {
            return false;
        };
        if session.is_expired_at(self.clock.now()) {
            #[cfg(feature = "telemetry")]
            tracing::info!(wallet_type = %session.wallet_type, "Wallet session expired");
            if let Err(_e) = self.clear() {
                #[cfg(feature = "telemetry")]
                tracing::warn!(error = %_e, "Failed to clear expired session");
            }
            return false;
        }
        true
    }

    /// Returns the session only if it is still valid.
    #[must_use]
    pub fn current(&self) -> Option<WalletSession> {
        if self.is_valid() { self.get() } else { None }
    }

    /// Restarts the current session's lifetime from now, keeping its id.
    ///
    /// Both timestamps move, so `expires_at - connected_at` stays the
    /// lifetime the session was stored with. Returns `None` if there is no
    /// session to refresh.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend fails to write.
    pub fn refresh(&self) -> Result<Option<WalletSession>, StorageError> {
        let Some(mut session) = self.get() else {
            return Ok(None);
        };
        let ttl = session.ttl();
        let now = self.clock.now();
        session.connected_at = now;
        session.expires_at = now + ttl;
        self.write(&session)?;
        #[cfg(feature = "telemetry")]
        tracing::debug!(session_id = %session.session_id, expires_at = %session.expires_at, "Refreshed wallet session");
        Ok(Some(session))
    }

    /// Removes the session and its companion keys.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend fails to write.
    pub fn clear(&self) -> Result<(), StorageError> {
        for key in [
            keys::WALLET_CONNECTION_STATE,
            keys::WALLET_ADDRESS,
            keys::WALLET_TYPE,
            keys::WALLET_CONNECTED_AT,
            keys::WALLET_EXPLICIT_CONNECT,
        ] {
            self.store.remove(key)?;
        }
        Ok(())
    }

    /// Records a user-initiated connect, lifting any explicit-disconnect flag.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend fails to write.
    pub fn record_explicit_connect(&self) -> Result<(), StorageError> {
        self.store.remove(keys::WALLET_EXPLICIT_DISCONNECT)?;
        self.store
            .set(keys::WALLET_EXPLICIT_CONNECT, FLAG_SET.to_owned())
    }

    /// Records a user-initiated disconnect. Suppresses auto-reconnect.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend fails to write.
    pub fn mark_explicit_disconnect(&self) -> Result<(), StorageError> {
        self.store.remove(keys::WALLET_EXPLICIT_CONNECT)?;
        self.store
            .set(keys::WALLET_EXPLICIT_DISCONNECT, FLAG_SET.to_owned())
    }

    /// Returns `true` if the user disconnected and has not connected since.
    #[must_use]
    pub fn is_explicitly_disconnected(&self) -> bool {
        self.store.get(keys::WALLET_EXPLICIT_DISCONNECT).as_deref() == Some(FLAG_SET)
    }

    fn write(&self, session: &WalletSession) -> Result<(), StorageError> {
        let blob = serde_json::to_string(session)?;
        self.store.set(keys::WALLET_CONNECTION_STATE, blob)?;
        self.store.set(keys::WALLET_ADDRESS, session.address.clone())?;
        self.store
            .set(keys::WALLET_TYPE, session.wallet_type.as_str().to_owned())?;
        self.store
            .set(keys::WALLET_CONNECTED_AT, session.connected_at.to_string())
    }
}

fn new_session_id() -> String {
    format!("{:032x}", rng().random::<u128>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::MemoryStore;

    fn fixture() -> (SessionStore, Arc<ManualClock>, Arc<MemoryStore>) {
        let clock = Arc::new(ManualClock::new(Timestamp::from_millis(1_700_000_000_000)));
        let backend = Arc::new(MemoryStore::new());
        let sessions = SessionStore::with_clock(backend.clone(), clock.clone());
        (sessions, clock, backend)
    }

    #[test]
    fn test_store_sets_expiry_and_flat_keys() {
        let (sessions, _clock, backend) = fixture();
        let session = sessions.store("0xabc", WalletType::Metamask).unwrap();
        assert_eq!(session.ttl(), Duration::from_secs(24 * 60 * 60));
        assert_eq!(session.session_id.len(), 32);
        assert_eq!(backend.get(keys::WALLET_ADDRESS).as_deref(), Some("0xabc"));
        assert_eq!(backend.get(keys::WALLET_TYPE).as_deref(), Some("metamask"));
        assert_eq!(sessions.get(), Some(session));
        assert!(sessions.is_valid());
    }

    #[test]
    fn test_expired_session_is_cleared_on_check() {
        let (sessions, clock, backend) = fixture();
        sessions
            .store_with_ttl("So1ana", WalletType::Phantom, 60)
            .unwrap();
        clock.advance(Duration::from_secs(60 * 60));
        assert!(sessions.is_valid(), "expiry is inclusive of the boundary");
        clock.advance(Duration::from_millis(1));
        assert!(!sessions.is_valid());
        assert!(sessions.get().is_none());
        assert!(backend.get(keys::WALLET_ADDRESS).is_none());
    }

    #[test]
    fn test_refresh_preserves_session_id() {
        let (sessions, clock, _backend) = fixture();
        let original = sessions.store("0xabc", WalletType::Metamask).unwrap();
        clock.advance(Duration::from_secs(3600));
        let refreshed = sessions.refresh().unwrap().unwrap();
        assert_eq!(refreshed.session_id, original.session_id);
        assert_eq!(refreshed.connected_at, clock.now());
        assert!(refreshed.expires_at > original.expires_at);
    }

    #[test]
    fn test_repeated_refresh_keeps_lifetime() {
        let (sessions, clock, _backend) = fixture();
        sessions.store("0xabc", WalletType::Metamask).unwrap();
        let day = Duration::from_secs(24 * 60 * 60);
        for _ in 0..3 {
            clock.advance(Duration::from_secs(3600));
            let refreshed = sessions.refresh().unwrap().unwrap();
            assert_eq!(refreshed.ttl(), day);
            assert_eq!(refreshed.expires_at, clock.now() + day);
        }

        clock.advance(day);
        assert!(sessions.is_valid());
        clock.advance(Duration::from_millis(1));
        assert!(!sessions.is_valid());
    }

    #[test]
    fn test_refresh_without_session() {
        let (sessions, _clock, _backend) = fixture();
        assert!(sessions.refresh().unwrap().is_none());
    }

    #[test]
    fn test_unparseable_blob_reads_as_absent() {
        let (sessions, _clock, backend) = fixture();
        backend
            .set(keys::WALLET_CONNECTION_STATE, "{not json".into())
            .unwrap();
        assert!(sessions.get().is_none());
        assert!(!sessions.is_valid());
    }

    #[test]
    fn test_explicit_flags_are_exclusive() {
        let (sessions, _clock, backend) = fixture();
        sessions.record_explicit_connect().unwrap();
        assert!(!sessions.is_explicitly_disconnected());
        sessions.mark_explicit_disconnect().unwrap();
        assert!(sessions.is_explicitly_disconnected());
        assert!(backend.get(keys::WALLET_EXPLICIT_CONNECT).is_none());
        sessions.record_explicit_connect().unwrap();
        assert!(!sessions.is_explicitly_disconnected());
    }
}
