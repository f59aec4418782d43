//! Cancellable repeating background tasks.
//!
//! A [`RepeatingTask`] runs an async body on a [`Schedule`] until the body
//! returns [`ControlFlow::Break`] or the returned [`TaskHandle`] is stopped
//! or dropped. Stopping is idempotent and takes effect at the next await
//! point of the sleep; a body that is already running finishes its current
//! iteration first.

use std::future::Future;
use std::ops::ControlFlow;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Decides how long to wait before each run.
pub trait Schedule: Send + 'static {
    /// Delay before run number `run` (starting at 0).
    fn delay_before(&self, run: u64) -> Duration;
}

/// A fixed period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Every {
    /// Time between runs.
    pub period: Duration,
    /// Whether the first run happens without waiting.
    pub immediate: bool,
}

impl Every {
    /// Runs every `period`, waiting one period before the first run.
    #[must_use]
    pub const fn new(period: Duration) -> Self {
        Self {
            period,
            immediate: false,
        }
    }

    /// Runs immediately, then every `period`.
    #[must_use]
    pub const fn immediately(period: Duration) -> Self {
        Self {
            period,
            immediate: true,
        }
    }
}

impl Schedule for Every {
    fn delay_before(&self, run: u64) -> Duration {
        if run == 0 && self.immediate {
            Duration::ZERO
        } else {
            self.period
        }
    }
}

/// Back-off schedule for silent session re-validation.
///
/// Checks 1-5 run every minute, 6-10 every 2 minutes, 11-20 every 5 minutes
/// and everything after that every 10 minutes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RevalidationSchedule;

impl Schedule for RevalidationSchedule {
    fn delay_before(&self, run: u64) -> Duration {
        let minutes = match run {
            0..=4 => 1,
            5..=9 => 2,
            10..=19 => 5,
            _ => 10,
        };
        Duration::from_secs(minutes * 60)
    }
}

/// Spawns repeating tasks on the current tokio runtime.
#[derive(Debug, Clone, Copy)]
pub struct RepeatingTask;

impl RepeatingTask {
    /// Spawns `body` on `schedule`.
    ///
    /// `body` receives the zero-based run number. Returning
    /// [`ControlFlow::Break`] ends the task.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn spawn<S, F, Fut>(schedule: S, mut body: F) -> TaskHandle
    where
        S: Schedule,
        F: FnMut(u64) -> Fut + Send + 'static,
        Fut: Future<Output = ControlFlow<()>> + Send + 'static,
    {
        let token = CancellationToken::new();
        let child = token.clone();
        let join = tokio::spawn(async move {
            let mut run: u64 = 0;
            loop {
                let delay = schedule.delay_before(run);
                tokio::select! {
                    () = child.cancelled() => break,
                    () = tokio::time::sleep(delay) => {}
                }
                if child.is_cancelled() || body(run).await.is_break() {
                    break;
                }
                run = run.saturating_add(1);
            }
            #[cfg(feature = "telemetry")]
            tracing::debug!(runs = run, "Repeating task ended");
        });
        TaskHandle {
            token,
            join: Some(join),
        }
    }
}

/// Owner of a spawned [`RepeatingTask`]. Dropping it stops the task.
#[derive(Debug)]
pub struct TaskHandle {
    token: CancellationToken,
    join: Option<JoinHandle<()>>,
}

impl TaskHandle {
    /// Stops the task. Calling this more than once has no further effect.
    pub fn stop(&self) {
        self.token.cancel();
    }

    /// Returns `true` once [`Self::stop`] was called.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Returns `true` once the task has exited for any reason.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.join.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Waits for the task to exit.
    pub async fn finished(&mut self) {
        if let Some(join) = self.join.take() {
            let _ = join.await;
        }
    }

    /// A token that is cancelled when this handle is stopped.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn test_revalidation_schedule_steps() {
        let schedule = RevalidationSchedule;
        let minutes = |run| schedule.delay_before(run).as_secs() / 60;
        assert_eq!(minutes(0), 1);
        assert_eq!(minutes(4), 1);
        assert_eq!(minutes(5), 2);
        assert_eq!(minutes(9), 2);
        assert_eq!(minutes(10), 5);
        assert_eq!(minutes(19), 5);
        assert_eq!(minutes(20), 10);
        assert_eq!(minutes(1_000), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_runs_until_break() {
        let runs = Arc::new(AtomicU64::new(0));
        let counter = runs.clone();
        let mut handle = RepeatingTask::spawn(Every::immediately(Duration::from_secs(10)), move |run| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if run == 2 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            }
        });
        handle.finished().await;
        assert_eq!(runs.load(Ordering::SeqCst), 3);
        assert!(handle.is_finished());
        assert!(!handle.is_stopped());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent_and_halts_runs() {
        let runs = Arc::new(AtomicU64::new(0));
        let counter = runs.clone();
        let mut handle = RepeatingTask::spawn(Every::new(Duration::from_secs(60)), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { ControlFlow::Continue(()) }
        });
        tokio::time::sleep(Duration::from_secs(150)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        handle.stop();
        handle.stop();
        assert!(handle.is_stopped());
        handle.finished().await;
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels() {
        let runs = Arc::new(AtomicU64::new(0));
        let counter = runs.clone();
        let handle = RepeatingTask::spawn(Every::new(Duration::from_secs(1)), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { ControlFlow::Continue(()) }
        });
        drop(handle);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }
}
