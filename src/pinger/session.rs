//! Per-target probe session
//!
//! A session fires on a periodic timer, sends one echo request and then waits
//! for that request to resolve (valid reply, rejected reply or timeout) before
//! it looks at the timer again. At most one request per target is therefore
//! outstanding. Ticks missed while waiting are skipped, not replayed, so the
//! effective rate drops below one request per interval whenever replies are
//! slow.

use super::config::PingerConfig;
use super::coordinator::ShutdownHandle;
use super::event::{EventSender, ProbeEvent};
use super::report::SessionReport;
use super::validator::{is_own_request, validate};
use super::PingerError;
use crate::probe::{ProbeReply, Target, ICMP_ECHO_HEADER_LEN};
use crate::socket::EchoTransport;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, instrument, trace, warn};

/// Largest IPv4 header a raw socket can hand us
const IPV4_HEADER_MAX_LEN_BYTES: usize = 60;

/// How one attempt's wait ended
enum Awaited {
    Reply(ProbeReply),
    Timeout,
    ReceiveFailed(String),
}

/// The send/receive loop for one target
pub struct ProbeSession {
    target: Target,
    transport: Box<dyn EchoTransport>,
    interval: Duration,
    reply_timeout: Duration,
    shutdown: ShutdownHandle,
    events: EventSender,
    recv_buf: Vec<u8>,
}

impl ProbeSession {
    /// Create a session that owns `target` until it reports
    pub fn new(
        target: Target,
        transport: Box<dyn EchoTransport>,
        config: &PingerConfig,
        shutdown: ShutdownHandle,
        events: EventSender,
    ) -> Self {
        let recv_buf =
            vec![0u8; IPV4_HEADER_MAX_LEN_BYTES + ICMP_ECHO_HEADER_LEN + target.payload.len()];
        Self {
            target,
            transport,
            interval: config.interval,
            reply_timeout: config.reply_timeout(),
            shutdown,
            events,
            recv_buf,
        }
    }

    /// Probe until cancellation is broadcast, then report the final counts.
    ///
    /// A send failure stops the session early; it still reports, with the
    /// failure attached, and the error is returned.
    #[instrument(skip_all, fields(address = %self.target.address, identifier = self.target.identifier))]
    pub async fn run(mut self) -> Result<SessionReport, PingerError> {
        self.emit(ProbeEvent::Started {
            address: self.target.address,
            identifier: self.target.identifier,
            payload_size: self.target.payload.len(),
        });

        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    debug!(
                        send_count = self.target.send_count,
                        receive_count = self.target.receive_count,
                        "Cancelled"
                    );
                    return Ok(self.finish(None).await);
                }
                _ = ticker.tick() => {
                    if let Err(err) = self.probe_once().await {
                        error!(%err, "Probe session stopped");
                        self.emit(ProbeEvent::Failed {
                            address: self.target.address,
                            error: err.to_string(),
                        });
                        self.finish(Some(err.to_string())).await;
                        return Err(err);
                    }
                }
            }
        }
    }

    /// Send one request and resolve it
    async fn probe_once(&mut self) -> Result<(), PingerError> {
        let address = self.target.address;
        let packet = self
            .target
            .next_request()
            .encode()
            .map_err(|e| PingerError::ProbeSendError(format!("{address}: {e}")))?;
        let sequence = self.target.send_count;

        self.transport
            .send_to(&packet, address)
            .await
            .map_err(|e| PingerError::ProbeSendError(format!("{address}: {e:#}")))?;
        let sent_at = Instant::now();
        trace!(sequence, "Echo request sent");

        match self.await_reply(sent_at + self.reply_timeout).await {
            Awaited::Reply(reply) => self.resolve(reply, sent_at, sequence),
            Awaited::Timeout => {
                debug!(sequence, "Request timed out");
                self.emit(ProbeEvent::Timeout { address, sequence });
            }
            Awaited::ReceiveFailed(error) => {
                warn!(sequence, %error, "Receive failed, giving up on this request");
                self.emit(ProbeEvent::ReceiveFailed {
                    address,
                    sequence,
                    error,
                });
            }
        }
        Ok(())
    }

    /// Read until a packet from the target arrives or `deadline` passes.
    ///
    /// The deadline is fixed for the whole attempt, so a stream of packets from
    /// other hosts cannot extend it. A receive error ends the attempt early.
    async fn await_reply(&mut self, deadline: Instant) -> Awaited {
        loop {
            let received =
                tokio::time::timeout_at(deadline, self.transport.recv_from(&mut self.recv_buf))
                    .await;
            let (len, from) = match received {
                Err(_elapsed) => return Awaited::Timeout,
                Ok(Err(err)) => return Awaited::ReceiveFailed(format!("{err:#}")),
                Ok(Ok(received)) => received,
            };
            let received_at = Instant::now();

            if from != self.target.address {
                trace!(%from, "Ignoring packet from unrelated host");
                continue;
            }
            let bytes = &self.recv_buf[..len];
            if is_own_request(bytes, self.target.identifier) {
                trace!("Ignoring looped back echo request");
                continue;
            }

            return Awaited::Reply(ProbeReply {
                from,
                bytes: bytes.to_vec(),
                received_at,
            });
        }
    }

    fn resolve(&mut self, reply: ProbeReply, sent_at: Instant, sequence: u64) {
        let rtt = reply.received_at.duration_since(sent_at);
        let verdict = validate(&reply, &self.target);

        if verdict.is_valid() {
            self.target.record_reply();
            trace!(sequence, ?rtt, "Valid reply");
            self.emit(ProbeEvent::Reply {
                from: reply.from,
                bytes: reply.len(),
                sequence,
                rtt,
            });
        } else {
            debug!(sequence, ?verdict, "Reply rejected");
            self.emit(ProbeEvent::Rejected {
                from: reply.from,
                bytes: reply.len(),
                sequence,
                expected_identifier: self.target.identifier,
                verdict,
            });
        }
    }

    fn emit(&self, event: ProbeEvent) {
        let _ = self.events.send(event);
    }

    async fn finish(self, failure: Option<String>) -> SessionReport {
        let report = SessionReport {
            address: self.target.address,
            identifier: self.target.identifier,
            send_count: self.target.send_count,
            receive_count: self.target.receive_count,
            failure,
        };
        self.shutdown.report(report.clone()).await;
        report
    }
}
