//! Stops long-running commands on SIGINT or SIGTERM.
//!
//! [`Shutdown`] listens for the signal on a tracked background task and
//! cancels a [`CancellationToken`] that commands such as `watch` select on.

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Signal listener owning the shutdown token.
#[allow(missing_debug_implementations)] // TaskTracker doesn't impl Debug
pub struct Shutdown {
    tracker: TaskTracker,
    token: CancellationToken,
}

impl Shutdown {
    /// Installs the signal handlers.
    ///
    /// # Errors
    ///
    /// Returns an [`std::io::Error`] if signal registration fails.
    #[allow(clippy::unnecessary_wraps)] // Result needed on Unix for signal registration
    pub fn install() -> Result<Self, std::io::Error> {
        let token = CancellationToken::new();
        let trigger = token.clone();
        let tracker = TaskTracker::new();

        #[cfg(unix)]
        {
            let mut sigterm = signal(SignalKind::terminate())?;
            let mut sigint = signal(SignalKind::interrupt())?;
            tracker.spawn(async move {
                tokio::select! {
                    _ = sigterm.recv() => tracing::info!("Received SIGTERM, stopping"),
                    _ = sigint.recv() => tracing::info!("Received SIGINT, stopping"),
                    () = trigger.cancelled() => return,
                }
                trigger.cancel();
            });
        }

        #[cfg(not(unix))]
        {
            tracker.spawn(async move {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => trigger.cancel(),
                    () = trigger.cancelled() => {}
                }
            });
        }

        tracker.close();
        Ok(Self { tracker, token })
    }

    /// A token cancelled when a shutdown signal arrives.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Releases the signal listener once the command is done.
    pub async fn finish(self) {
        self.token.cancel();
        self.tracker.wait().await;
    }
}
