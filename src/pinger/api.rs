//! High-level probing API

use crate::pinger::{
    AggregateReport, Coordinator, EventSender, PingerConfig, PingerError, ProbeSession,
};
use crate::probe::{unique_identifiers, Target};
use crate::socket::factory::create_echo_transport;
use crate::socket::EchoTransport;
use futures::future::join_all;
use std::collections::HashSet;
use std::future::Future;
use std::net::Ipv4Addr;
use tracing::{debug, info, warn};

/// A target paired with the transport its session will use
pub type PreparedTarget = (Target, Box<dyn EchoTransport>);

/// Probes a set of hosts concurrently until interrupted
///
/// # Examples
///
/// ```no_run
/// use perfpinger::{Pinger, PingerConfig};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = PingerConfig::builder()
///     .payload_size(64)
///     .interval(Duration::from_millis(500))
///     .build()?;
///
/// let (events_tx, mut events_rx) = tokio::sync::mpsc::unbounded_channel();
/// tokio::spawn(async move {
///     while let Some(event) = events_rx.recv().await {
///         println!("{event}");
///     }
/// });
///
/// let pinger = Pinger::new(config)?;
/// let report = pinger
///     .run(&["192.0.2.1".parse()?], events_tx, async {
///         let _ = tokio::signal::ctrl_c().await;
///     })
///     .await?;
/// println!("{report}");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Pinger {
    config: PingerConfig,
}

impl Pinger {
    /// Create a pinger from a validated configuration
    ///
    /// # Errors
    ///
    /// * `PingerError::ConfigError` - If the configuration is out of range
    pub fn new(config: PingerConfig) -> Result<Self, PingerError> {
        config.validate().map_err(PingerError::ConfigError)?;
        Ok(Self { config })
    }

    /// The configuration in use
    pub fn config(&self) -> &PingerConfig {
        &self.config
    }

    /// Open one transport per address, then probe until `interrupt` resolves
    ///
    /// Every transport is opened before any session starts, so a setup
    /// failure aborts the run without sending a single request.
    ///
    /// # Errors
    ///
    /// * `PingerError::ConfigError` - If `addresses` is empty or has more than 65535 entries
    /// * `PingerError::InsufficientPermissions` - If no ICMP socket may be opened
    /// * `PingerError::SocketError` - If socket creation fails otherwise
    pub async fn run<F>(
        &self,
        addresses: &[Ipv4Addr],
        events: EventSender,
        interrupt: F,
    ) -> Result<AggregateReport, PingerError>
    where
        F: Future<Output = ()>,
    {
        if addresses.is_empty() {
            return Err(PingerError::ConfigError("no targets to probe".to_string()));
        }
        if addresses.len() > usize::from(u16::MAX) {
            return Err(PingerError::ConfigError(format!(
                "{} targets given, at most {} can be probed at once",
                addresses.len(),
                u16::MAX
            )));
        }

        let payload = self.config.payload();
        let identifiers = unique_identifiers(addresses.len());
        let mut prepared = Vec::with_capacity(addresses.len());
        for (&address, identifier) in addresses.iter().zip(identifiers) {
            let target = Target::with_identifier(address, identifier, payload.clone());
            let transport = create_echo_transport(&target, self.config.socket_mode)?;
            debug!(
                %address,
                identifier = target.identifier,
                mode = transport.mode().description(),
                "Transport ready"
            );
            prepared.push((target, transport));
        }

        self.run_with(prepared, events, interrupt).await
    }

    /// Probe already prepared targets until `interrupt` resolves
    ///
    /// Useful for tests or for callers that open transports themselves.
    /// Sessions that stop on a send error still contribute their counts.
    ///
    /// # Errors
    ///
    /// * `PingerError::ConfigError` - If `prepared` is empty or two targets
    ///   share an echo identifier
    pub async fn run_with<F>(
        &self,
        prepared: Vec<PreparedTarget>,
        events: EventSender,
        interrupt: F,
    ) -> Result<AggregateReport, PingerError>
    where
        F: Future<Output = ()>,
    {
        if prepared.is_empty() {
            return Err(PingerError::ConfigError("no targets to probe".to_string()));
        }
        let mut identifiers = HashSet::with_capacity(prepared.len());
        if let Some((target, _)) = prepared
            .iter()
            .find(|(target, _)| !identifiers.insert(target.identifier))
        {
            return Err(PingerError::ConfigError(format!(
                "echo identifier {} is used by more than one target",
                target.identifier
            )));
        }

        let coordinator = Coordinator::new(prepared.len(), self.config.shutdown_grace);
        info!(
            targets = prepared.len(),
            payload_size = self.config.payload_size,
            interval_ms = self.config.interval.as_millis() as u64,
            "Starting probe sessions"
        );

        let handles: Vec<_> = prepared
            .into_iter()
            .map(|(target, transport)| {
                let session = ProbeSession::new(
                    target,
                    transport,
                    &self.config,
                    coordinator.shutdown_handle(),
                    events.clone(),
                );
                tokio::spawn(session.run())
            })
            .collect();
        drop(events);

        let aggregate = coordinator.run(interrupt, self.config.payload_size).await;

        if self.config.shutdown_grace.is_some() {
            // Sessions still blocked on a reply after the grace period are abandoned
            for handle in handles.iter().filter(|h| !h.is_finished()) {
                handle.abort();
            }
        }
        for joined in join_all(handles).await {
            match joined {
                Ok(Ok(_)) => {}
                Ok(Err(err)) => debug!(%err, "Session ended with an error"),
                Err(err) if err.is_cancelled() => debug!("Session aborted after grace period"),
                Err(err) => warn!(%err, "Session task panicked"),
            }
        }

        Ok(aggregate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = PingerConfig {
            interval: Duration::ZERO,
            ..PingerConfig::default()
        };
        assert!(matches!(
            Pinger::new(config),
            Err(PingerError::ConfigError(_))
        ));
    }

    #[tokio::test]
    async fn test_run_without_targets_is_config_error() {
        let pinger = Pinger::new(PingerConfig::default()).unwrap();
        let (events_tx, _events_rx) = mpsc::unbounded_channel();

        let result = pinger.run(&[], events_tx.clone(), async {}).await;
        assert!(matches!(result, Err(PingerError::ConfigError(_))));

        let result = pinger.run_with(Vec::new(), events_tx, async {}).await;
        assert!(matches!(result, Err(PingerError::ConfigError(_))));
    }
}
