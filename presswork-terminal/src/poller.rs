//! Reconciliation poller
//!
//! Runs independently of the push channel: every interval (or sooner, when an
//! event marks the view stale) it fetches the pending requests routed to this
//! department and replaces the view. Fetch failures are logged and retried on
//! the next tick, never fatal.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use presswork_common::config::DEFAULT_POLL_INTERVAL_SECS;
use presswork_common::models::{Department, ReprintRequest};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::error::{TerminalError, TerminalResult};
use crate::view::{Applied, Reconciler, Update};

/// Default per-fetch timeout
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;

/// Authoritative source of a department's pending reprint requests
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch_pending(&self, department: Department) -> TerminalResult<Vec<ReprintRequest>>;
}

/// Periodic full refresh of a [`Reconciler`]'s view
pub struct ReconciliationPoller<S> {
    source: S,
    reconciler: Reconciler,
    department: Department,
    interval: Duration,
    fetch_timeout: Duration,
}

impl<S: SnapshotSource> ReconciliationPoller<S> {
    pub fn new(source: S, reconciler: Reconciler, department: Department) -> Self {
        Self {
            source,
            reconciler,
            department,
            interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_fetch_timeout(mut self, fetch_timeout: Duration) -> Self {
        self.fetch_timeout = fetch_timeout;
        self
    }

    /// Fetch once and apply the snapshot
    ///
    /// Returns what the snapshot did, or the error that was logged.
    pub async fn tick(&self) -> TerminalResult<Applied> {
        let fetched =
            tokio::time::timeout(self.fetch_timeout, self.source.fetch_pending(self.department))
                .await
                .map_err(|_| TerminalError::Timeout(self.fetch_timeout))
                .and_then(|result| result);

        match fetched {
            Ok(requests) => {
                debug!(department = %self.department, count = requests.len(), "Snapshot fetched");
                Ok(self.reconciler.apply(Update::Snapshot(requests)).await)
            }
            Err(e) => {
                warn!(
                    department = %self.department,
                    error = %e,
                    "Reconciliation fetch failed, retrying next tick"
                );
                Err(e)
            }
        }
    }

    /// Poll until `shutdown` resolves
    pub async fn run(self, shutdown: impl Future<Output = ()>) {
        info!(
            department = %self.department,
            interval_secs = self.interval.as_secs(),
            "Reconciliation poller started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {}
                _ = self.reconciler.refresh_requested() => {
                    debug!("Refetch requested by push event");
                    ticker.reset();
                }
            }
            // Errors are already logged by tick
            let _ = self.tick().await;
        }

        info!(department = %self.department, "Reconciliation poller stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cues::LogCues;
    use crate::view::TerminalView;
    use chrono::Utc;
    use presswork_common::models::ReprintStatus;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use uuid::Uuid;

    struct FlakySource {
        calls: AtomicU32,
        rows: Vec<ReprintRequest>,
    }

    #[async_trait]
    impl SnapshotSource for FlakySource {
        async fn fetch_pending(&self, _department: Department) -> TerminalResult<Vec<ReprintRequest>> {
            // Every other call fails
            if self.calls.fetch_add(1, Ordering::SeqCst) % 2 == 1 {
                return Err(TerminalError::Network("connection refused".to_string()));
            }
            Ok(self.rows.clone())
        }
    }

    struct SlowSource;

    #[async_trait]
    impl SnapshotSource for SlowSource {
        async fn fetch_pending(&self, _department: Department) -> TerminalResult<Vec<ReprintRequest>> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Vec::new())
        }
    }

    fn reconciler() -> Reconciler {
        Reconciler::new(TerminalView::new(Department::Printing, Arc::new(LogCues)))
    }

    fn row() -> ReprintRequest {
        ReprintRequest {
            id: Uuid::new_v4(),
            activity_id: "A002".to_string(),
            requested_by: "Maria".to_string(),
            reason: "smudged ink".to_string(),
            details: None,
            quantity: 3,
            status: ReprintStatus::Pending,
            from_department: Department::Finishing,
            to_department: Department::Printing,
            created_at: Utc::now(),
            processed_by: None,
            processed_at: None,
        }
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_last_view() {
        let reconciler = reconciler();
        let poller = ReconciliationPoller::new(
            FlakySource {
                calls: AtomicU32::new(0),
                rows: vec![row()],
            },
            reconciler.clone(),
            Department::Printing,
        );

        assert_eq!(poller.tick().await.unwrap(), Applied::Replaced { changed: true });
        assert!(poller.tick().await.is_err());
        assert_eq!(reconciler.pending().await.len(), 1);

        assert_eq!(poller.tick().await.unwrap(), Applied::Replaced { changed: false });
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_timeout_is_transient() {
        let poller = ReconciliationPoller::new(SlowSource, reconciler(), Department::Printing)
            .with_fetch_timeout(Duration::from_secs(10));

        let err = poller.tick().await.unwrap_err();
        assert!(matches!(err, TerminalError::Timeout(_)));
        assert!(err.is_transient());
    }
}
