//! Reply validation
//!
//! Classifies a packet received from a target's address. Validation never
//! touches the target's counters; the session acts on the verdict.

use crate::probe::{ProbeReply, Target, ICMP_ECHO_HEADER_LEN};
use pnet::packet::icmp::echo_reply::EchoReplyPacket;
use pnet::packet::icmp::{IcmpPacket, IcmpTypes};
use pnet::packet::Packet;
use serde::Serialize;

/// Outcome of validating one reply against its target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReplyVerdict {
    /// Echo reply matching identifier, an already sent sequence, and payload
    Valid,
    /// Identifier differs, or the sequence refers to a request not yet sent
    WrongIdentity {
        /// Identifier found in the reply
        identifier: u16,
        /// Sequence found in the reply
        sequence: u16,
    },
    /// Identity matches but the payload bytes differ
    WrongPayload {
        /// Identifier found in the reply
        identifier: u16,
        /// Sequence found in the reply
        sequence: u16,
    },
    /// A well-formed ICMP message that is not an echo reply
    NotEcho {
        /// ICMP type found in the message
        icmp_type: u8,
    },
    /// Too short to be parsed as ICMP
    Malformed,
}

impl ReplyVerdict {
    /// Whether the reply counts as received
    pub fn is_valid(&self) -> bool {
        matches!(self, ReplyVerdict::Valid)
    }
}

/// Validate `reply` against `target`
pub fn validate(reply: &ProbeReply, target: &Target) -> ReplyVerdict {
    let icmp_packet = match IcmpPacket::new(&reply.bytes) {
        Some(packet) => packet,
        None => return ReplyVerdict::Malformed,
    };

    let icmp_type = icmp_packet.get_icmp_type();
    if icmp_type != IcmpTypes::EchoReply {
        return ReplyVerdict::NotEcho {
            icmp_type: icmp_type.0,
        };
    }

    let echo_reply = match EchoReplyPacket::new(&reply.bytes) {
        Some(packet) => packet,
        None => return ReplyVerdict::Malformed,
    };

    let identifier = echo_reply.get_identifier();
    let sequence = echo_reply.get_sequence_number();

    if identifier != target.identifier || u64::from(sequence) > target.send_count {
        return ReplyVerdict::WrongIdentity {
            identifier,
            sequence,
        };
    }

    if echo_reply.payload() != target.payload.as_slice() {
        return ReplyVerdict::WrongPayload {
            identifier,
            sequence,
        };
    }

    ReplyVerdict::Valid
}

/// Whether `bytes` is this target's own echo request looped back to a raw socket
pub fn is_own_request(bytes: &[u8], identifier: u16) -> bool {
    bytes.len() >= ICMP_ECHO_HEADER_LEN
        && bytes[0] == IcmpTypes::EchoRequest.0
        && u16::from_be_bytes([bytes[4], bytes[5]]) == identifier
}
