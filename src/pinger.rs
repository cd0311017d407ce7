//! Concurrent per-target echo probing and throughput reporting

pub mod api;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod event;
pub mod report;
pub mod session;
pub mod validator;

// Re-export commonly used types
pub use api::{Pinger, PreparedTarget};
pub use config::{PingerConfig, PingerConfigBuilder};
pub use coordinator::{Coordinator, ShutdownHandle};
pub use error::PingerError;
pub use event::{EventSender, ProbeEvent};
pub use report::{compute_throughput_kbps, AggregateReport, SessionReport};
pub use session::ProbeSession;
pub use validator::{validate, ReplyVerdict};
