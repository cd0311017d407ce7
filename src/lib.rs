//! perfpinger - concurrent ICMP echo probing with throughput reporting
//!
//! Each target gets its own probe session that sends echo requests on a fixed
//! interval, validates replies against the target's identifier and payload,
//! and counts them. On interrupt every session hands its counts to a
//! coordinator, which prints an aggregate throughput figure.

pub mod hosts;
pub mod pinger;
pub mod probe;
pub mod socket;

// Re-export core types for library users
pub use pinger::{
    AggregateReport, Pinger, PingerConfig, PingerConfigBuilder, PingerError, ProbeEvent,
    ReplyVerdict, SessionReport,
};
pub use probe::{build_payload, ProbeReply, ProbeRequest, Target};
pub use socket::factory::create_echo_transport;
pub use socket::{EchoTransport, SocketMode};
