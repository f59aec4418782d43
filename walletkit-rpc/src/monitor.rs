//! Transaction status polling.
//!
//! A [`TransactionMonitor`] polls a [`StatusSource`] on a fixed interval and
//! publishes every result on a `watch` channel:
//!
//! ```text
//! unknown -> pending -> confirmed
//!                    -> failed
//! ```
//!
//! `confirmed` and `failed` are terminal: polling stops and the hash is never
//! polled again. A failed poll reports `unknown` together with the error and
//! polling continues. The watch ends only on a terminal state or when its
//! [`TransactionWatchHandle`] is stopped or dropped.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use walletkit::Network;
use walletkit::task::{Every, RepeatingTask, TaskHandle};

use crate::error::RpcError;

/// Lifecycle of a submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    /// Seen but not yet confirmed, or confirmed below the required depth.
    Pending,
    /// Included with enough confirmations.
    Confirmed,
    /// Included and reverted, or rejected.
    Failed,
    /// Not known yet, or the last poll failed.
    #[default]
    Unknown,
}

impl TxStatus {
    /// Returns `true` for states that end the watch.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Failed)
    }
}

/// What a [`StatusSource`] reports for one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusReport {
    /// Chain-reported status, before the confirmation threshold is applied.
    pub status: TxStatus,
    /// Confirmations observed so far.
    pub confirmations: u64,
}

impl StatusReport {
    /// A report with no confirmations.
    #[must_use]
    pub const fn new(status: TxStatus) -> Self {
        Self {
            status,
            confirmations: 0,
        }
    }

    /// Sets the confirmation count.
    #[must_use]
    pub const fn with_confirmations(mut self, confirmations: u64) -> Self {
        self.confirmations = confirmations;
        self
    }
}

/// The observable state of a watched transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionWatch {
    /// Transaction hash or signature.
    pub tx_hash: String,
    /// Network the transaction was sent to.
    pub network: Network,
    /// Current status.
    pub status: TxStatus,
    /// Confirmations observed so far.
    pub confirmations: u64,
    /// Error from the most recent poll, if it failed.
    pub last_error: Option<String>,
    /// Number of polls performed.
    pub polls: u64,
}

/// Looks up the status of a transaction on chain.
#[async_trait]
pub trait StatusSource: Send + Sync {
    /// Polls the chain once.
    async fn status(&self, tx_hash: &str, network: Network) -> Result<StatusReport, RpcError>;
}

/// Polls transactions until they reach a terminal state.
#[derive(Clone)]
pub struct TransactionMonitor {
    source: Arc<dyn StatusSource>,
    interval: Duration,
    required_confirmations: u64,
}

impl std::fmt::Debug for TransactionMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionMonitor")
            .field("interval", &self.interval)
            .field("required_confirmations", &self.required_confirmations)
            .finish_non_exhaustive()
    }
}

impl TransactionMonitor {
    /// Default time between polls.
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);

    /// Creates a monitor polling every 10 seconds and requiring one confirmation.
    #[must_use]
    pub fn new(source: Arc<dyn StatusSource>) -> Self {
        Self {
            source,
            interval: Self::DEFAULT_INTERVAL,
            required_confirmations: 1,
        }
    }

    /// Sets the poll interval.
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sets the confirmations needed before a transaction counts as confirmed.
    #[must_use]
    pub const fn with_required_confirmations(mut self, required: u64) -> Self {
        self.required_confirmations = required;
        self
    }

    /// Starts watching `tx_hash`. The first poll happens immediately.
    #[must_use]
    pub fn watch(&self, tx_hash: impl Into<String>, network: Network) -> TransactionWatchHandle {
        let tx_hash = tx_hash.into();
        let (tx, rx) = watch::channel(TransactionWatch {
            tx_hash: tx_hash.clone(),
            network,
            status: TxStatus::Unknown,
            confirmations: 0,
            last_error: None,
            polls: 0,
        });
        let required = Arc::new(AtomicU64::new(self.required_confirmations));
        let source = Arc::clone(&self.source);
        let threshold = Arc::clone(&required);

        #[cfg(feature = "telemetry")]
        tracing::info!(tx_hash = %tx_hash, network = %network, "Watching transaction");

        let task = RepeatingTask::spawn(Every::immediately(self.interval), move |_| {
            let source = Arc::clone(&source);
            let tx = tx.clone();
            let tx_hash = tx_hash.clone();
            let required = threshold.load(Ordering::SeqCst);
            async move {
                let result = source.status(&tx_hash, network).await;
                let mut terminal = false;
                tx.send_modify(|watch| {
                    watch.polls += 1;
                    match result {
                        Ok(report) => {
                            watch.status = effective_status(report, required);
                            watch.confirmations = report.confirmations;
                            watch.last_error = None;
                        }
                        Err(err) => {
                            #[cfg(feature = "telemetry")]
                            tracing::warn!(tx_hash = %tx_hash, error = %err, "Transaction status poll failed");
                            watch.status = TxStatus::Unknown;
                            watch.last_error = Some(err.to_string());
                        }
                    }
                    terminal = watch.status.is_terminal();
                });
                if terminal {
                    #[cfg(feature = "telemetry")]
                    tracing::info!(tx_hash = %tx_hash, status = ?tx.borrow().status, "Transaction reached terminal state");
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            }
        });

        TransactionWatchHandle { rx, required, task }
    }

    /// Watches `tx_hash` until it is confirmed with `required` confirmations or fails.
    ///
    /// # Errors
    ///
    /// See [`TransactionWatchHandle::wait_for_confirmation`].
    pub async fn wait_for_confirmation(
        &self,
        tx_hash: impl Into<String>,
        network: Network,
        required: u64,
    ) -> Result<bool, RpcError> {
        let mut handle = self
            .clone()
            .with_required_confirmations(required)
            .watch(tx_hash, network);
        handle.wait_for_confirmation(required).await
    }
}

fn effective_status(report: StatusReport, required: u64) -> TxStatus {
    match report.status {
        TxStatus::Confirmed if report.confirmations < required => TxStatus::Pending,
        status => status,
    }
}

/// Owner of a running watch. Dropping it stops polling.
#[derive(Debug)]
pub struct TransactionWatchHandle {
    rx: watch::Receiver<TransactionWatch>,
    required: Arc<AtomicU64>,
    task: TaskHandle,
}

impl TransactionWatchHandle {
    /// A receiver that observes every update.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<TransactionWatch> {
        self.rx.clone()
    }

    /// The latest state.
    #[must_use]
    pub fn current(&self) -> TransactionWatch {
        self.rx.borrow().clone()
    }

    /// Stops polling. Idempotent.
    pub fn stop(&self) {
        self.task.stop();
    }

    /// Returns `true` once polling has ended.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits until the transaction is confirmed with at least `required`
    /// confirmations (`true`) or fails (`false`).
    ///
    /// Raises the watch's confirmation threshold to `required` if it was lower.
    /// Returns `false` if the watch already finished below `required`.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::WatchClosed`] if the watch is stopped first.
    pub async fn wait_for_confirmation(&mut self, required: u64) -> Result<bool, RpcError> {
        self.required.fetch_max(required, Ordering::SeqCst);
        loop {
            {
                let watch = self.rx.borrow_and_update();
                match watch.status {
                    TxStatus::Confirmed => return Ok(watch.confirmations >= required),
                    TxStatus::Failed => return Ok(false),
                    TxStatus::Pending | TxStatus::Unknown => {}
                }
            }
            if self.task.is_stopped() || self.rx.changed().await.is_err() {
                return Err(RpcError::WatchClosed {
                    tx_hash: self.rx.borrow().tx_hash.clone(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicU32;

    struct ScriptedSource {
        script: Mutex<VecDeque<Result<StatusReport, &'static str>>>,
        polls: AtomicU32,
    }

    impl ScriptedSource {
        fn new(script: Vec<Result<StatusReport, &'static str>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                polls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl StatusSource for ScriptedSource {
        async fn status(&self, _tx_hash: &str, _network: Network) -> Result<StatusReport, RpcError> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop_front();
            next.unwrap_or(Ok(StatusReport::new(TxStatus::Pending)))
                .map_err(|message| RpcError::unexpected("test", message))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_polls_then_confirmed_stops_polling() {
        let source = ScriptedSource::new(vec![
            Err("connection reset"),
            Err("connection reset"),
            Ok(StatusReport::new(TxStatus::Confirmed).with_confirmations(3)),
        ]);
        let monitor = TransactionMonitor::new(source.clone());
        let mut handle = monitor.watch("0xfeed", Network::Mainnet);
        let mut updates = handle.subscribe();

        updates.changed().await.unwrap();
        let first = updates.borrow_and_update().clone();
        assert_eq!(first.status, TxStatus::Unknown);
        assert_eq!(first.last_error.as_deref(), Some("Unexpected response: test: connection reset"));

        assert!(handle.wait_for_confirmation(3).await.unwrap());
        assert_eq!(source.polls.load(Ordering::SeqCst), 3);
        let current = handle.current();
        assert_eq!(current.confirmations, 3);
        assert_eq!(current.polls, 3);
        assert!(current.last_error.is_none());

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(source.polls.load(Ordering::SeqCst), 3);
        assert!(handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirmations_below_threshold_stay_pending() {
        let source = ScriptedSource::new(vec![
            Ok(StatusReport::new(TxStatus::Confirmed).with_confirmations(1)),
            Ok(StatusReport::new(TxStatus::Confirmed).with_confirmations(2)),
            Ok(StatusReport::new(TxStatus::Confirmed).with_confirmations(3)),
        ]);
        let monitor = TransactionMonitor::new(source.clone()).with_required_confirmations(3);
        let mut handle = monitor.watch("sig", Network::Testnet);

        let mut updates = handle.subscribe();
        updates.changed().await.unwrap();
        assert_eq!(updates.borrow().status, TxStatus::Pending);

        assert!(handle.wait_for_confirmation(3).await.unwrap());
        assert_eq!(source.polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_transaction_is_terminal() {
        let source = ScriptedSource::new(vec![
            Ok(StatusReport::new(TxStatus::Pending)),
            Ok(StatusReport::new(TxStatus::Failed).with_confirmations(1)),
        ]);
        let monitor = TransactionMonitor::new(source.clone());
        assert!(
            !monitor
                .wait_for_confirmation("0xbad", Network::Mainnet, 1)
                .await
                .unwrap()
        );
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(source.polls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_watch_reports_closed() {
        let source = ScriptedSource::new(vec![]);
        let monitor = TransactionMonitor::new(source.clone());
        let mut handle = monitor.watch("0xslow", Network::Mainnet);
        tokio::time::sleep(Duration::from_secs(15)).await;
        handle.stop();

        let err = handle.wait_for_confirmation(1).await.unwrap_err();
        assert!(matches!(err, RpcError::WatchClosed { .. }));
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(source.polls.load(Ordering::SeqCst), 2);
    }
}
