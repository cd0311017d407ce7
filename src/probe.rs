//! Probe-related types
//!
//! A [`Target`] is owned by exactly one probe session. Requests and replies are
//! ephemeral values built and discarded within a single probe attempt.

use anyhow::{anyhow, Result};
use pnet::packet::icmp::echo_request::MutableEchoRequestPacket;
use pnet::packet::icmp::{IcmpCode, IcmpTypes};
use pnet::packet::Packet;
use pnet::util::checksum;
use rand::Rng;
use std::collections::HashSet;
use std::net::Ipv4Addr;
use tokio::time::Instant;

/// ICMP echo header length (type, code, checksum, identifier, sequence)
pub const ICMP_ECHO_HEADER_LEN: usize = 8;

/// Build the deterministic payload sent with every request: `0, 1, 2, ...`
pub fn build_payload(size: usize) -> Vec<u8> {
    (0..size).map(|i| i as u8).collect()
}

/// Draw `count` distinct, non-zero echo identifiers.
///
/// Zero is excluded because a datagram ICMP socket bound to port 0 gets an
/// ephemeral port, and Linux rewrites the identifier to that port.
///
/// # Panics
///
/// If `count` exceeds the number of non-zero identifiers (65535).
pub fn unique_identifiers(count: usize) -> Vec<u16> {
    assert!(
        count <= usize::from(u16::MAX),
        "at most {} distinct identifiers exist",
        u16::MAX
    );
    let mut rng = rand::rng();
    unique_identifiers_from(count, || rng.random())
}

fn unique_identifiers_from(count: usize, mut draw: impl FnMut() -> u16) -> Vec<u16> {
    let mut seen = HashSet::with_capacity(count);
    let mut identifiers = Vec::with_capacity(count);
    while identifiers.len() < count {
        let identifier = draw();
        if identifier != 0 && seen.insert(identifier) {
            identifiers.push(identifier);
        }
    }
    identifiers
}

/// One probe destination and its counters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Resolved destination address
    pub address: Ipv4Addr,
    /// Echo identifier used to tell this target's replies apart
    pub identifier: u16,
    /// Payload carried by every request
    pub payload: Vec<u8>,
    /// Requests sent so far; the latest value doubles as the sequence number
    pub send_count: u64,
    /// Replies that passed validation
    pub receive_count: u64,
}

impl Target {
    /// Create a target with a random non-zero echo identifier
    ///
    /// Targets probed together need distinct identifiers; see
    /// [`unique_identifiers`].
    pub fn new(address: Ipv4Addr, payload: Vec<u8>) -> Self {
        Self::with_identifier(address, rand::random_range(1..=u16::MAX), payload)
    }

    /// Create a target with a fixed echo identifier
    pub fn with_identifier(address: Ipv4Addr, identifier: u16, payload: Vec<u8>) -> Self {
        Self {
            address,
            identifier,
            payload,
            send_count: 0,
            receive_count: 0,
        }
    }

    /// Count a new request and return it.
    ///
    /// The wire sequence is the low 16 bits of `send_count`.
    pub fn next_request(&mut self) -> ProbeRequest<'_> {
        self.send_count += 1;
        ProbeRequest {
            identifier: self.identifier,
            sequence: self.send_count as u16,
            payload: &self.payload,
        }
    }

    /// Count a validated reply
    pub fn record_reply(&mut self) {
        self.receive_count += 1;
        debug_assert!(self.receive_count <= self.send_count);
    }
}

/// An echo request about to be transmitted
#[derive(Debug, Clone, Copy)]
pub struct ProbeRequest<'a> {
    /// Echo identifier
    pub identifier: u16,
    /// Echo sequence number
    pub sequence: u16,
    /// Echo payload
    pub payload: &'a [u8],
}

impl ProbeRequest<'_> {
    /// Serialize into an ICMP Echo Request with a valid checksum
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; MutableEchoRequestPacket::minimum_packet_size() + self.payload.len()];
        let mut packet = MutableEchoRequestPacket::new(&mut buf)
            .ok_or_else(|| anyhow!("Failed to create ICMP packet"))?;

        packet.set_icmp_type(IcmpTypes::EchoRequest);
        packet.set_icmp_code(IcmpCode(0));
        packet.set_identifier(self.identifier);
        packet.set_sequence_number(self.sequence);
        packet.set_payload(self.payload);

        let sum = checksum(packet.packet(), 1);
        packet.set_checksum(sum);

        Ok(buf)
    }
}

/// A packet received from a target's address
#[derive(Debug, Clone)]
pub struct ProbeReply {
    /// Sender address
    pub from: Ipv4Addr,
    /// ICMP message bytes, without any IP header
    pub bytes: Vec<u8>,
    /// When the packet was read
    pub received_at: Instant,
}

impl ProbeReply {
    /// Number of ICMP bytes received
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the reply carried no bytes at all
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pnet::packet::icmp::echo_request::EchoRequestPacket;

    #[test]
    fn test_build_payload_wraps() {
        let payload = build_payload(300);
        assert_eq!(payload.len(), 300);
        assert_eq!(payload[0], 0);
        assert_eq!(payload[255], 255);
        assert_eq!(payload[256], 0);
        assert!(build_payload(0).is_empty());
    }

    #[test]
    fn test_next_request_increments_send_count() {
        let mut target = Target::with_identifier(Ipv4Addr::LOCALHOST, 42, build_payload(4));
        let seq = target.next_request().sequence;
        assert_eq!(seq, 1);
        assert_eq!(target.next_request().sequence, 2);
        assert_eq!(target.send_count, 2);
        assert_eq!(target.receive_count, 0);
    }

    #[test]
    fn test_sequence_wraps_on_the_wire() {
        let mut target = Target::with_identifier(Ipv4Addr::LOCALHOST, 1, Vec::new());
        target.send_count = u64::from(u16::MAX);
        let request = target.next_request();
        assert_eq!(request.sequence, 0);
        assert_eq!(target.send_count, 65536);
    }

    #[test]
    fn test_encode_echo_request() {
        let payload = build_payload(32);
        let request = ProbeRequest {
            identifier: 0xBEEF,
            sequence: 7,
            payload: &payload,
        };
        let bytes = request.encode().unwrap();
        assert_eq!(bytes.len(), ICMP_ECHO_HEADER_LEN + 32);

        let packet = EchoRequestPacket::new(&bytes).unwrap();
        assert_eq!(packet.get_icmp_type(), IcmpTypes::EchoRequest);
        assert_eq!(packet.get_identifier(), 0xBEEF);
        assert_eq!(packet.get_sequence_number(), 7);
        assert_eq!(packet.payload(), payload.as_slice());

        assert_eq!(checksum(&bytes, 1), packet.get_checksum());
    }

    #[test]
    fn test_identifier_draws_skip_zero_and_repeats() {
        let mut draws = [0u16, 5, 5, 0, 7, 5, 9].into_iter();
        let identifiers = unique_identifiers_from(3, || draws.next().unwrap());
        assert_eq!(identifiers, vec![5, 7, 9]);
    }

    #[test]
    fn test_unique_identifiers_are_distinct_and_non_zero() {
        let identifiers = unique_identifiers(2000);
        assert_eq!(identifiers.len(), 2000);
        assert!(!identifiers.contains(&0));
        let distinct: HashSet<_> = identifiers.iter().collect();
        assert_eq!(distinct.len(), identifiers.len());
    }

    #[test]
    fn test_new_target_never_uses_identifier_zero() {
        for _ in 0..1000 {
            assert_ne!(Target::new(Ipv4Addr::LOCALHOST, Vec::new()).identifier, 0);
        }
    }

    #[test]
    fn test_new_target_starts_with_zero_counts() {
        let a = Target::new(Ipv4Addr::LOCALHOST, Vec::new());
        assert_eq!(a.send_count, 0);
        assert_eq!(a.receive_count, 0);
        assert_eq!(a.address, Ipv4Addr::LOCALHOST);
    }
}
