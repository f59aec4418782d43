//! Wallet error taxonomy.
//!
//! Every connection or session failure is reported to the caller as one of
//! the [`WalletError`] variants. The variants are deliberately coarse so that
//! UI code can branch on them:
//!
//! - **Not installed** - no provider object; the caller is sent to an install page
//! - **User rejected** - surfaced verbatim and never retried
//! - **Transient** - network, timeout, rate limit or provider-not-ready; retried with backoff
//! - **Invalid state** - configuration or response errors that a retry cannot fix

use crate::chain::WalletType;
use crate::provider::{ProviderError, REQUEST_PENDING_CODE, USER_REJECTED_CODE};
use crate::retry::is_transient_message;
use crate::storage::StorageError;

/// Coarse classification of a [`WalletError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No provider object was found.
    NotInstalled,
    /// The user declined the request.
    UserRejected,
    /// A retry may succeed.
    Transient,
    /// A retry will not help.
    InvalidState,
    /// A connection for the same wallet type is already running.
    AlreadyConnecting,
    /// Anything the provider reported that fits no other kind.
    Provider,
}

/// Errors surfaced by connection, disconnection and session operations.
#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    /// No provider object for this wallet type is present.
    #[error("{wallet_type} wallet is not installed")]
    NotInstalled {
        /// The wallet that was requested.
        wallet_type: WalletType,
    },

    /// The user rejected the request in the wallet UI.
    #[error("User rejected the request: {message}")]
    UserRejected {
        /// Provider message.
        message: String,
    },

    /// A temporary failure; the operation may be retried.
    #[error("Transient wallet error: {message}")]
    Transient {
        /// Description of the failure.
        message: String,
    },

    /// The operation cannot succeed in the current configuration or state.
    #[error("Invalid state: {message}")]
    InvalidState {
        /// Description of the failure.
        message: String,
    },

    /// A connection attempt for this wallet type is already in flight.
    #[error("Connection to {wallet_type} is already in progress")]
    AlreadyConnecting {
        /// The wallet already being connected.
        wallet_type: WalletType,
    },

    /// An unclassified provider failure.
    #[error("Wallet provider error: {0}")]
    Provider(ProviderError),

    /// Session state could not be persisted.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl WalletError {
    /// Creates a [`WalletError::Transient`].
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    /// Creates a [`WalletError::InvalidState`].
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Returns the coarse kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotInstalled { .. } => ErrorKind::NotInstalled,
            Self::UserRejected { .. } => ErrorKind::UserRejected,
            Self::Transient { .. } => ErrorKind::Transient,
            Self::InvalidState { .. } | Self::Storage(_) => ErrorKind::InvalidState,
            Self::AlreadyConnecting { .. } => ErrorKind::AlreadyConnecting,
            Self::Provider(_) => ErrorKind::Provider,
        }
    }

    /// Returns `true` if retrying the operation may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transient)
    }
}

impl From<ProviderError> for WalletError {
    /// Classifies a raw provider rejection.
    ///
    /// Code `4001` and the rejection wording used by Solana wallets map to
    /// [`WalletError::UserRejected`]; pending-request collisions and messages
    /// that read as transient map to [`WalletError::Transient`].
    fn from(err: ProviderError) -> Self {
        let lowered = err.message.to_ascii_lowercase();
        let rejected = err.code == Some(USER_REJECTED_CODE)
            || lowered.contains("user rejected")
            || lowered.contains("rejected the request")
            || lowered.contains("user denied")
            || lowered.contains("user cancelled");
        if rejected {
            return Self::UserRejected {
                message: err.message,
            };
        }
        if err.code == Some(REQUEST_PENDING_CODE) || is_transient_message(&err.message) {
            return Self::Transient {
                message: err.to_string(),
            };
        }
        Self::Provider(err)
    }
}
