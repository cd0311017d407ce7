//! Cancellation broadcast and result aggregation
//!
//! One [`CancellationToken`] is shared by every session and by the driver.
//! Cancelling it wakes all waiters, and every later check sees it as already
//! cancelled. Each session owns one [`ShutdownHandle`]; reporting consumes it,
//! so a session can hand over its final counts at most once.

use super::report::{AggregateReport, SessionReport};
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A session's view of the shutdown protocol
#[derive(Debug)]
pub struct ShutdownHandle {
    cancel: CancellationToken,
    reports: mpsc::Sender<SessionReport>,
}

impl ShutdownHandle {
    /// Wait until cancellation is broadcast; returns at once if it already was
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// Whether cancellation has been broadcast
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Hand the final counts to the coordinator
    pub async fn report(self, report: SessionReport) {
        if self.reports.send(report).await.is_err() {
            debug!("Coordinator gone before report could be delivered");
        }
    }
}

/// Collects the final counts of every session after an interrupt
pub struct Coordinator {
    cancel: CancellationToken,
    reports_tx: mpsc::Sender<SessionReport>,
    reports_rx: mpsc::Receiver<SessionReport>,
    target_count: usize,
    shutdown_grace: Option<Duration>,
    started_at: Instant,
}

impl Coordinator {
    /// Create a coordinator expecting `target_count` reports
    ///
    /// With `shutdown_grace` unset the final collection waits without bound.
    pub fn new(target_count: usize, shutdown_grace: Option<Duration>) -> Self {
        // One slot per session: sessions report once, so sending never blocks.
        let (reports_tx, reports_rx) = mpsc::channel(target_count.max(1));
        Self {
            cancel: CancellationToken::new(),
            reports_tx,
            reports_rx,
            target_count,
            shutdown_grace,
            started_at: Instant::now(),
        }
    }

    /// Handle for one session. Create exactly one per target.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            cancel: self.cancel.clone(),
            reports: self.reports_tx.clone(),
        }
    }

    /// The cancellation entry point for the driver
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for `interrupt` (or an earlier cancel), stop every session and aggregate.
    pub async fn run<F>(self, interrupt: F, payload_size: usize) -> AggregateReport
    where
        F: Future<Output = ()>,
    {
        let Coordinator {
            cancel,
            reports_tx,
            mut reports_rx,
            target_count,
            shutdown_grace,
            started_at,
        } = self;
        // Only sessions hold senders from here on, so a closed channel means
        // every session is gone.
        drop(reports_tx);

        tokio::select! {
            _ = interrupt => {}
            _ = cancel.cancelled() => {}
        }
        let elapsed = started_at.elapsed();
        info!(target_count, ?elapsed, "Interrupt received, stopping all probes");
        cancel.cancel();

        let sessions = collect(&mut reports_rx, target_count, shutdown_grace).await;
        if sessions.len() < target_count {
            warn!(
                missing = target_count - sessions.len(),
                "Not every probe session reported before shutdown"
            );
        }

        AggregateReport::from_sessions(sessions, elapsed, payload_size, target_count)
    }
}

async fn collect(
    reports_rx: &mut mpsc::Receiver<SessionReport>,
    target_count: usize,
    shutdown_grace: Option<Duration>,
) -> Vec<SessionReport> {
    let deadline = shutdown_grace.map(|grace| Instant::now() + grace);
    let mut sessions = Vec::with_capacity(target_count);

    while sessions.len() < target_count {
        let next = match deadline {
            Some(deadline) => match tokio::time::timeout_at(deadline, reports_rx.recv()).await {
                Ok(next) => next,
                Err(_) => break,
            },
            None => reports_rx.recv().await,
        };
        match next {
            Some(report) => {
                debug!(
                    address = %report.address,
                    receive_count = report.receive_count,
                    "Collected session report"
                );
                sessions.push(report);
            }
            None => break,
        }
    }

    sessions
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn report(last_octet: u8, receive_count: u64) -> SessionReport {
        SessionReport {
            address: Ipv4Addr::new(192, 0, 2, last_octet),
            identifier: u16::from(last_octet),
            send_count: receive_count + 1,
            receive_count,
            failure: None,
        }
    }

    #[tokio::test]
    async fn test_every_waiter_observes_cancellation() {
        let coordinator = Coordinator::new(3, None);
        let handles: Vec<_> = (0..3).map(|_| coordinator.shutdown_handle()).collect();
        let token = coordinator.cancellation();

        let waiters: Vec<_> = handles
            .into_iter()
            .map(|handle| {
                tokio::spawn(async move {
                    handle.cancelled().await;
                    // A second check does not block
                    handle.cancelled().await;
                    handle.is_cancelled()
                })
            })
            .collect();

        token.cancel();
        for waiter in waiters {
            assert!(waiter.await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_sums_exactly_target_count_reports() {
        let coordinator = Coordinator::new(3, None);
        let handles: Vec<_> = (0..3).map(|_| coordinator.shutdown_handle()).collect();

        for (i, handle) in handles.into_iter().enumerate() {
            tokio::spawn(async move {
                handle.cancelled().await;
                handle.report(report(i as u8 + 1, (i as u64 + 1) * 10)).await;
            });
        }

        let aggregate = coordinator.run(async {}, 64).await;
        assert_eq!(aggregate.sessions.len(), 3);
        assert_eq!(aggregate.total_receive_count, 60);
        assert_eq!(aggregate.missing_reports, 0);
    }

    #[tokio::test]
    async fn test_early_cancel_unblocks_run() {
        let coordinator = Coordinator::new(0, None);
        let token = coordinator.cancellation();
        token.cancel();
        // Cancelling twice is harmless
        token.cancel();

        let aggregate = coordinator.run(std::future::pending(), 32).await;
        assert_eq!(aggregate.target_count, 0);
        assert_eq!(aggregate.total_receive_count, 0);
    }

    #[tokio::test]
    async fn test_dropped_sessions_end_collection() {
        let coordinator = Coordinator::new(2, None);
        let reporting = coordinator.shutdown_handle();
        let silent = coordinator.shutdown_handle();

        tokio::spawn(async move {
            reporting.cancelled().await;
            reporting.report(report(1, 5)).await;
        });
        drop(silent);

        let aggregate = coordinator.run(async {}, 64).await;
        assert_eq!(aggregate.total_receive_count, 5);
        assert_eq!(aggregate.missing_reports, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_grace_period_bounds_collection() {
        let coordinator = Coordinator::new(2, Some(Duration::from_secs(1)));
        let reporting = coordinator.shutdown_handle();
        let stuck = coordinator.shutdown_handle();

        tokio::spawn(async move {
            reporting.cancelled().await;
            reporting.report(report(1, 4)).await;
        });
        tokio::spawn(async move {
            // Never reports, but keeps its sender alive
            let _stuck = stuck;
            std::future::pending::<()>().await;
        });

        let aggregate = coordinator.run(async {}, 64).await;
        assert_eq!(aggregate.sessions.len(), 1);
        assert_eq!(aggregate.missing_reports, 1);
    }
}
