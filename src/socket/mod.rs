//! Socket abstraction layer for ICMP echo probing

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

pub mod factory;
#[cfg(unix)]
pub mod icmp_v4;
pub mod utils;

/// Socket mode (affects permissions required)
///
/// Different socket modes have different permission requirements:
/// - **Raw**: Full control but requires root/CAP_NET_RAW
/// - **Dgram**: ICMP datagram sockets - platform specific permissions
///
/// # Platform-Specific DGRAM Support
///
/// - **Linux**: Requires root or `sysctl net.ipv4.ping_group_range` configuration
/// - **macOS**: Works without root for ICMP DGRAM sockets
/// - **FreeBSD/OpenBSD**: Requires root
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SocketMode {
    /// Raw socket - always requires CAP_NET_RAW or root
    Raw,
    /// Datagram socket for ICMP - permissions vary by platform
    Dgram,
}

impl SocketMode {
    /// Get a human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            SocketMode::Raw => "Raw",
            SocketMode::Dgram => "Datagram",
        }
    }
}

/// Transport carrying echo requests to one target and replies back
///
/// Implementations deliver ICMP messages only: any IP header present on the
/// wire is removed before `recv_from` returns.
#[async_trait]
pub trait EchoTransport: Send + Sync {
    /// Get the socket mode backing this transport
    fn mode(&self) -> SocketMode;

    /// Send an encoded ICMP message to `dest`
    async fn send_to(&self, packet: &[u8], dest: Ipv4Addr) -> Result<()>;

    /// Wait for the next inbound ICMP message
    ///
    /// Returns the number of bytes written into `buf` and the sender address.
    /// This waits without bound; callers apply their own deadline.
    async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, Ipv4Addr)>;
}
