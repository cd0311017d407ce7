//! Final per-target and aggregate reports

use serde::Serialize;
use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;

/// Compute throughput in Kbps.
///
/// Each received echo accounts for one request and its reply, hence the
/// division by two. Returns `0.0` when no time has elapsed.
pub fn compute_throughput_kbps(
    total_receive_count: u64,
    elapsed: Duration,
    payload_size: usize,
    target_count: usize,
) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return 0.0;
    }
    total_receive_count as f64 * (payload_size as f64 * 8.0 * target_count as f64)
        / (secs * 1024.0 * 2.0)
}

/// Final counters handed over by one probe session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionReport {
    /// Target address
    pub address: Ipv4Addr,
    /// Echo identifier used for the target
    pub identifier: u16,
    /// Requests sent
    pub send_count: u64,
    /// Replies that passed validation
    pub receive_count: u64,
    /// Transport error that stopped the session early, if any
    pub failure: Option<String>,
}

impl SessionReport {
    /// Percentage of requests without a valid reply
    pub fn loss_percent(&self) -> f64 {
        if self.send_count == 0 {
            return 0.0;
        }
        (self.send_count - self.receive_count) as f64 * 100.0 / self.send_count as f64
    }
}

/// Summary of every session, built once at shutdown
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateReport {
    /// Sum of all sessions' receive counts
    pub total_receive_count: u64,
    /// Sum of all sessions' send counts
    pub total_send_count: u64,
    /// Time from start to interrupt
    pub elapsed: Duration,
    /// Configured payload size in bytes
    pub payload_size: usize,
    /// Number of targets probed
    pub target_count: usize,
    /// Reports in arrival order
    pub sessions: Vec<SessionReport>,
    /// Sessions that never reported before collection ended
    pub missing_reports: usize,
}

impl AggregateReport {
    /// Build the aggregate from collected session reports
    pub fn from_sessions(
        sessions: Vec<SessionReport>,
        elapsed: Duration,
        payload_size: usize,
        target_count: usize,
    ) -> Self {
        let total_receive_count = sessions.iter().map(|s| s.receive_count).sum();
        let total_send_count = sessions.iter().map(|s| s.send_count).sum();
        let missing_reports = target_count.saturating_sub(sessions.len());
        Self {
            total_receive_count,
            total_send_count,
            elapsed,
            payload_size,
            target_count,
            sessions,
            missing_reports,
        }
    }

    /// Throughput of validated echoes, uplink and downlink combined
    pub fn throughput_kbps(&self) -> f64 {
        compute_throughput_kbps(
            self.total_receive_count,
            self.elapsed,
            self.payload_size,
            self.target_count,
        )
    }
}

impl fmt::Display for AggregateReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- perfpinger statistics ---")?;
        write!(
            f,
            "Total {} packets in {:.2} sec : {:.2} Kbps of both UL and DL.",
            self.total_receive_count,
            self.elapsed.as_secs_f64(),
            self.throughput_kbps()
        )
    }
}
