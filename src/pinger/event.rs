//! Per-attempt status events published by probe sessions

use super::validator::ReplyVerdict;
use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;
use tokio::sync::mpsc;

/// Channel end sessions publish their events on
pub type EventSender = mpsc::UnboundedSender<ProbeEvent>;

/// Something worth telling the operator about one target
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeEvent {
    /// A session started probing
    Started {
        /// Target address
        address: Ipv4Addr,
        /// Echo identifier chosen for the target
        identifier: u16,
        /// Payload bytes per request
        payload_size: usize,
    },
    /// A valid reply arrived
    Reply {
        /// Reply sender
        from: Ipv4Addr,
        /// ICMP bytes received
        bytes: usize,
        /// Send count at the time of the attempt
        sequence: u64,
        /// Round-trip time
        rtt: Duration,
    },
    /// No reply from the target before the deadline
    Timeout {
        /// Target address
        address: Ipv4Addr,
        /// Send count at the time of the attempt
        sequence: u64,
    },
    /// A reply arrived but failed validation
    Rejected {
        /// Reply sender
        from: Ipv4Addr,
        /// ICMP bytes received
        bytes: usize,
        /// Send count at the time of the attempt
        sequence: u64,
        /// The target's own identifier
        expected_identifier: u16,
        /// Why the reply was rejected
        verdict: ReplyVerdict,
    },
    /// Reading the reply failed; the request is given up
    ReceiveFailed {
        /// Target address
        address: Ipv4Addr,
        /// Send count at the time of the attempt
        sequence: u64,
        /// Error text
        error: String,
    },
    /// The session stopped on a transport error
    Failed {
        /// Target address
        address: Ipv4Addr,
        /// Error text
        error: String,
    },
}

impl fmt::Display for ProbeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeEvent::Started {
                address,
                identifier,
                payload_size,
            } => write!(
                f,
                "PERFPINGER {address} (ID:{identifier}): {payload_size} data bytes"
            ),
            ProbeEvent::Reply {
                from,
                bytes,
                sequence,
                rtt,
            } => write!(
                f,
                "{bytes} bytes from {from}: icmp_seq={sequence} time={:.2} ms",
                rtt.as_secs_f64() * 1000.0
            ),
            ProbeEvent::Timeout { address, sequence } => {
                write!(f, "* Request timeout from {address}: icmp_seq={sequence}")
            }
            ProbeEvent::Rejected {
                from,
                bytes,
                sequence,
                expected_identifier,
                verdict,
            } => match verdict {
                ReplyVerdict::WrongIdentity {
                    identifier,
                    sequence: got_sequence,
                }
                | ReplyVerdict::WrongPayload {
                    identifier,
                    sequence: got_sequence,
                } => write!(
                    f,
                    "* Wrong data {bytes} bytes from {from} (ID=[{identifier},{expected_identifier}], Seq=[{got_sequence},{sequence}]): icmp_seq={sequence}"
                ),
                ReplyVerdict::NotEcho { .. } => {
                    write!(f, "* Not echo received from {from}: icmp_seq={sequence}")
                }
                ReplyVerdict::Malformed | ReplyVerdict::Valid => {
                    write!(f, "* Reply error from {from}: icmp_seq={sequence}")
                }
            },
            ProbeEvent::ReceiveFailed {
                address,
                sequence,
                error,
            } => write!(
                f,
                "* Receive error from {address}: icmp_seq={sequence}: {error}"
            ),
            ProbeEvent::Failed { address, error } => {
                write!(f, "* Probe to {address} stopped: {error}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDR: Ipv4Addr = Ipv4Addr::new(192, 0, 2, 7);

    #[test]
    fn test_started_line() {
        let event = ProbeEvent::Started {
            address: ADDR,
            identifier: 513,
            payload_size: 32,
        };
        assert_eq!(event.to_string(), "PERFPINGER 192.0.2.7 (ID:513): 32 data bytes");
    }

    #[test]
    fn test_reply_line() {
        let event = ProbeEvent::Reply {
            from: ADDR,
            bytes: 40,
            sequence: 3,
            rtt: Duration::from_micros(12_346),
        };
        assert_eq!(
            event.to_string(),
            "40 bytes from 192.0.2.7: icmp_seq=3 time=12.35 ms"
        );
    }

    #[test]
    fn test_timeout_line() {
        let event = ProbeEvent::Timeout {
            address: ADDR,
            sequence: 9,
        };
        assert_eq!(event.to_string(), "* Request timeout from 192.0.2.7: icmp_seq=9");
    }

    #[test]
    fn test_receive_error_line() {
        let event = ProbeEvent::ReceiveFailed {
            address: ADDR,
            sequence: 4,
            error: "Connection refused".to_string(),
        };
        assert_eq!(
            event.to_string(),
            "* Receive error from 192.0.2.7: icmp_seq=4: Connection refused"
        );
    }

    #[test]
    fn test_wrong_data_line_shows_observed_and_expected() {
        let event = ProbeEvent::Rejected {
            from: ADDR,
            bytes: 40,
            sequence: 2,
            expected_identifier: 100,
            verdict: ReplyVerdict::WrongIdentity {
                identifier: 200,
                sequence: 5,
            },
        };
        assert_eq!(
            event.to_string(),
            "* Wrong data 40 bytes from 192.0.2.7 (ID=[200,100], Seq=[5,2]): icmp_seq=2"
        );
    }

    #[test]
    fn test_not_echo_and_malformed_lines() {
        let not_echo = ProbeEvent::Rejected {
            from: ADDR,
            bytes: 8,
            sequence: 1,
            expected_identifier: 1,
            verdict: ReplyVerdict::NotEcho { icmp_type: 3 },
        };
        assert_eq!(
            not_echo.to_string(),
            "* Not echo received from 192.0.2.7: icmp_seq=1"
        );

        let malformed = ProbeEvent::Rejected {
            from: ADDR,
            bytes: 2,
            sequence: 1,
            expected_identifier: 1,
            verdict: ReplyVerdict::Malformed,
        };
        assert_eq!(
            malformed.to_string(),
            "* Reply error from 192.0.2.7: icmp_seq=1"
        );
    }
}
