//! Typed session notifications.
//!
//! Components that display wallet state subscribe to an [`EventBus`] instead of
//! polling the store. Delivery is best-effort: publishing with no subscribers
//! is not an error, and a subscriber that falls too far behind skips the
//! oldest events.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::chain::{Network, WalletType};

/// A change in wallet or network state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A wallet was connected, reconnected or restored.
    Connected {
        /// The connected account.
        address: String,
        /// The wallet that holds the account.
        wallet_type: WalletType,
    },
    /// The wallet session ended.
    Disconnected {
        /// The wallet that was disconnected, when known.
        wallet_type: Option<WalletType>,
    },
    /// The active network changed.
    NetworkChanged {
        /// The newly selected network.
        network: Network,
    },
}

/// A cloneable publish/subscribe channel for [`SessionEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    /// Number of events buffered per subscriber.
    pub const DEFAULT_CAPACITY: usize = 64;

    /// Creates a bus with [`Self::DEFAULT_CAPACITY`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    /// Creates a bus buffering `capacity` events per subscriber.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event to every current subscriber.
    pub fn publish(&self, event: SessionEvent) {
        #[cfg(feature = "telemetry")]
        tracing::debug!(event = ?event, subscribers = self.sender.receiver_count(), "Publishing session event");
        let _ = self.sender.send(event);
    }

    /// Subscribes to events published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
