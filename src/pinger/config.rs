//! Configuration types for probing runs

use crate::probe::build_payload;
use crate::socket::SocketMode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default interval between requests to one target in milliseconds
pub const DEFAULT_INTERVAL_MS: u64 = 1000;
/// Default payload size in bytes
pub const DEFAULT_PAYLOAD_SIZE: usize = 56;
/// Largest ICMP payload that fits an IPv4 datagram (65535 - 20 - 8)
pub const MAX_PAYLOAD_SIZE: usize = 65507;
/// The reply deadline is this many send intervals
pub const REPLY_TIMEOUT_INTERVALS: u32 = 2;

/// Configuration for a probing run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingerConfig {
    /// Payload bytes carried by each request (default: 56)
    pub payload_size: usize,
    /// Interval between requests to one target (default: 1000ms)
    pub interval: Duration,
    /// Preferred socket mode; `None` tries raw then datagram
    pub socket_mode: Option<SocketMode>,
    /// Bound on the final report collection; `None` waits indefinitely
    pub shutdown_grace: Option<Duration>,
}

impl Default for PingerConfig {
    fn default() -> Self {
        Self {
            payload_size: DEFAULT_PAYLOAD_SIZE,
            interval: Duration::from_millis(DEFAULT_INTERVAL_MS),
            socket_mode: None,
            shutdown_grace: None,
        }
    }
}

impl PingerConfig {
    /// Create a new PingerConfig builder
    pub fn builder() -> PingerConfigBuilder {
        PingerConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.interval.as_millis() == 0 {
            return Err("interval must be at least 1ms".to_string());
        }
        if self.payload_size > MAX_PAYLOAD_SIZE {
            return Err(format!(
                "payload size {} exceeds the maximum of {} bytes",
                self.payload_size, MAX_PAYLOAD_SIZE
            ));
        }
        Ok(())
    }

    /// How long a session waits for a reply after sending
    pub fn reply_timeout(&self) -> Duration {
        self.interval * REPLY_TIMEOUT_INTERVALS
    }

    /// The payload every request carries
    pub fn payload(&self) -> Vec<u8> {
        build_payload(self.payload_size)
    }
}

/// Builder for PingerConfig
pub struct PingerConfigBuilder {
    config: PingerConfig,
}

impl PingerConfigBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self {
            config: PingerConfig::default(),
        }
    }

    /// Set the payload size in bytes
    pub fn payload_size(mut self, size: usize) -> Self {
        self.config.payload_size = size;
        self
    }

    /// Set the send interval
    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    /// Set the preferred socket mode
    pub fn socket_mode(mut self, mode: SocketMode) -> Self {
        self.config.socket_mode = Some(mode);
        self
    }

    /// Bound the wait for final session reports
    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.config.shutdown_grace = Some(grace);
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<PingerConfig, String> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for PingerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
