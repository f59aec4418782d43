//! Silent session re-validation.
//!
//! A stored session is only a claim; the wallet may have been locked,
//! switched accounts or revoked the site since. [`SessionRecovery`] checks
//! the claim against the provider using [`WalletConnector::current_account`]
//! only, so it never prompts the user. Checks run on page load
//! ([`SessionRecovery::restore`]), on window focus
//! ([`SessionRecovery::on_focus`]) and on a tapering timer
//! ([`SessionRecovery::start_periodic`]).
//!
//! Failures are logged and never surfaced; the session is left untouched
//! when the provider cannot be asked.

use std::ops::ControlFlow;
use std::sync::Arc;

use crate::chain::Chain;
use crate::connect::ConnectorRegistry;
use crate::events::SessionEvent;
use crate::session::{SessionStore, WalletSession};
use crate::task::{RepeatingTask, RevalidationSchedule, TaskHandle};

/// Result of one silent check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevalidationOutcome {
    /// The provider still reports the stored account; the session was refreshed.
    Valid,
    /// The provider reports a different account; the session now holds it.
    Changed {
        /// The newly reported account.
        address: String,
    },
    /// The provider reports no account; the session was cleared.
    Lost,
    /// Nothing to check: no valid session, or the user disconnected explicitly.
    Skipped,
    /// The provider could not be asked; the session was left as is.
    Failed,
}

/// Re-validates the stored session against its wallet.
#[derive(Debug, Clone)]
pub struct SessionRecovery {
    registry: ConnectorRegistry,
    sessions: SessionStore,
}

impl SessionRecovery {
    /// Creates a recovery helper.
    #[must_use]
    pub const fn new(registry: ConnectorRegistry, sessions: SessionStore) -> Self {
        Self { registry, sessions }
    }

    /// Restores the session on application load.
    ///
    /// Returns the session if the wallet still holds an account for it, and
    /// announces it with [`SessionEvent::Connected`]. Does nothing after an
    /// explicit disconnect.
    pub async fn restore(&self) -> Option<WalletSession> {
        if self.sessions.is_explicitly_disconnected() {
            #[cfg(feature = "telemetry")]
            tracing::debug!("Skipping restore after explicit disconnect");
            return None;
        }
        match self.verify_silently().await {
            RevalidationOutcome::Valid => {
                let session = self.sessions.get()?;
                self.sessions.events().publish(SessionEvent::Connected {
                    address: session.address.clone(),
                    wallet_type: session.wallet_type,
                });
                Some(session)
            }
            RevalidationOutcome::Changed { .. } => self.sessions.get(),
            _ => None,
        }
    }

    /// Re-validates when the window regains focus.
    pub async fn on_focus(&self) -> RevalidationOutcome {
        self.verify_silently().await
    }

    /// Checks the stored session with read-only provider calls.
    pub async fn verify_silently(&self) -> RevalidationOutcome {
        if self.sessions.is_explicitly_disconnected() {
            return RevalidationOutcome::Skipped;
        }
        let Some(session) = self.sessions.current() else {
            return RevalidationOutcome::Skipped;
        };
        let wallet_type = session.wallet_type;
        let Some(connector) = self
            .registry
            .get(wallet_type)
            .filter(|c| c.is_installed())
        else {
            #[cfg(feature = "telemetry")]
            tracing::debug!(wallet_type = %wallet_type, "Wallet not available for re-validation");
            return RevalidationOutcome::Failed;
        };

        let account = match connector.current_account().await {
            Ok(account) => account,
            Err(_e) => {
                #[cfg(feature = "telemetry")]
                tracing::warn!(wallet_type = %wallet_type, error = %_e, "Silent re-validation failed");
                return RevalidationOutcome::Failed;
            }
        };

        let outcome = match account {
            Some(address) if same_account(&session, &address) => {
                self.sessions.refresh().map(|_| RevalidationOutcome::Valid)
            }
            Some(address) => self.sessions.store(address.clone(), wallet_type).map(|_| {
                self.sessions.events().publish(SessionEvent::Connected {
                    address: address.clone(),
                    wallet_type,
                });
                RevalidationOutcome::Changed { address }
            }),
            None => self.sessions.clear().map(|()| {
                self.sessions.events().publish(SessionEvent::Disconnected {
                    wallet_type: Some(wallet_type),
                });
                RevalidationOutcome::Lost
            }),
        };

        outcome.unwrap_or_else(|_e| {
            #[cfg(feature = "telemetry")]
            tracing::warn!(wallet_type = %wallet_type, error = %_e, "Failed to persist re-validated session");
            RevalidationOutcome::Failed
        })
    }

    /// Starts periodic re-validation on [`RevalidationSchedule`].
    ///
    /// The task ends once the session is lost or skipped, or when the handle
    /// is stopped or dropped.
    #[must_use]
    pub fn start_periodic(self: &Arc<Self>) -> TaskHandle {
        let this = Arc::clone(self);
        RepeatingTask::spawn(RevalidationSchedule, move |_run| {
            let this = Arc::clone(&this);
            async move {
                let outcome = this.verify_silently().await;
                #[cfg(feature = "telemetry")]
                tracing::debug!(check = _run + 1, outcome = ?outcome, "Periodic session check");
                match outcome {
                    RevalidationOutcome::Lost | RevalidationOutcome::Skipped => {
                        ControlFlow::Break(())
                    }
                    _ => ControlFlow::Continue(()),
                }
            }
        })
    }
}

fn same_account(session: &WalletSession, address: &str) -> bool {
    match session.wallet_type.chain() {
        Chain::Ethereum => session.address.eq_ignore_ascii_case(address),
        Chain::Solana => session.address == address,
    }
}
