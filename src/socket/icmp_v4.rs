//! IPv4 ICMP socket implementation

use super::{EchoTransport, SocketMode};
use anyhow::{Context, Result};
use async_trait::async_trait;
use pnet::packet::ipv4::Ipv4Packet;
use socket2::{SockAddr, Socket as Socket2};
use std::mem::MaybeUninit;
use std::net::{Ipv4Addr, SocketAddrV4};
use tokio::io::unix::AsyncFd;

/// IPv4 header minimum length in bytes
const IPV4_HEADER_MIN_LEN_BYTES: usize = 20;

/// ICMPv4 socket registered with the tokio reactor
pub struct IcmpV4Transport {
    socket: AsyncFd<Socket2>,
    mode: SocketMode,
    strip_ip_header: bool,
}

impl IcmpV4Transport {
    /// Wrap an already created (and, for datagram mode, bound) ICMP socket
    pub fn new(socket: Socket2, mode: SocketMode) -> Result<Self> {
        socket
            .set_nonblocking(true)
            .context("Failed to make ICMP socket non-blocking")?;
        let socket = AsyncFd::new(socket).context("Failed to register ICMP socket")?;

        // Raw sockets always hand us the IP header. Datagram sockets only do on macOS.
        let strip_ip_header = match mode {
            SocketMode::Raw => true,
            SocketMode::Dgram => cfg!(target_os = "macos"),
        };

        Ok(Self {
            socket,
            mode,
            strip_ip_header,
        })
    }
}

/// Remove a leading IPv4 header in place, returning the remaining length.
///
/// Packets too short to hold the advertised header are left untouched so the
/// validator can reject them.
pub(crate) fn strip_ipv4_header(buf: &mut [u8], len: usize) -> usize {
    if len < IPV4_HEADER_MIN_LEN_BYTES {
        return len;
    }
    let header_len = match Ipv4Packet::new(&buf[..len]) {
        Some(packet) if packet.get_version() == 4 => usize::from(packet.get_header_length()) * 4,
        _ => return len,
    };
    if header_len < IPV4_HEADER_MIN_LEN_BYTES || header_len > len {
        return len;
    }
    buf.copy_within(header_len..len, 0);
    len - header_len
}

#[async_trait]
impl EchoTransport for IcmpV4Transport {
    fn mode(&self) -> SocketMode {
        self.mode
    }

    async fn send_to(&self, packet: &[u8], dest: Ipv4Addr) -> Result<()> {
        let target_addr = SockAddr::from(SocketAddrV4::new(dest, 0));
        loop {
            let mut guard = self.socket.writable().await?;
            match guard.try_io(|inner| inner.get_ref().send_to(packet, &target_addr)) {
                Ok(result) => {
                    result.context("Failed to send ICMP packet")?;
                    return Ok(());
                }
                Err(_would_block) => continue,
            }
        }
    }

    async fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, Ipv4Addr)> {
        loop {
            let mut guard = self.socket.readable().await?;
            let received = guard.try_io(|inner| {
                // SAFETY: recv_from only writes initialized bytes into the buffer
                let uninit: &mut [MaybeUninit<u8>] =
                    unsafe { &mut *(&mut *buf as *mut [u8] as *mut [MaybeUninit<u8>]) };
                inner.get_ref().recv_from(uninit)
            });

            let (size, socket_addr) = match received {
                Ok(result) => result.context("Failed to receive ICMP packet")?,
                Err(_would_block) => continue,
            };

            let from_addr = match socket_addr.as_socket_ipv4() {
                Some(s) => *s.ip(),
                None => continue,
            };

            let size = if self.strip_ip_header {
                strip_ipv4_header(buf, size)
            } else {
                size
            };
            return Ok((size, from_addr));
        }
    }
}
