//! # Ingest Loop
//!
//! Single consumer that drains the delivery stream into the persistence
//! sink.
//!
//! ## Acknowledgment
//!
//! - [`AckMode::AfterPersist`] (default): save, then ack. A failed save is
//!   nacked with requeue once; if the redelivered copy fails too it is
//!   rejected without requeue and left to the broker's dead-letter policy.
//! - [`AckMode::OnReceipt`]: ack first, then save. A failed save loses the
//!   result.
//!
//! Payloads that do not decode are logged and rejected without requeue, so
//! they never hold a prefetch slot. The reachability flag is stored exactly
//! as published.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::constants::DEFAULT_REQUEUE_DELAY;
use crate::messaging::{ChannelMessage, MessageStream};
use crate::models::ProbeResult;
use crate::persistence::PersistenceSink;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AckMode {
    #[default]
    AfterPersist,
    OnReceipt,
}

impl FromStr for AckMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "after_persist" => Ok(Self::AfterPersist),
            "on_receipt" => Ok(Self::OnReceipt),
            other => Err(format!(
                "unknown ack mode '{other}', expected after_persist or on_receipt"
            )),
        }
    }
}

impl fmt::Display for AckMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AfterPersist => f.write_str("after_persist"),
            Self::OnReceipt => f.write_str("on_receipt"),
        }
    }
}

/// Why the loop returned
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum IngestExit {
    #[default]
    Cancelled,
    /// The broker ended the consumer stream
    StreamClosed,
    /// The stream failed, usually because the connection dropped
    StreamError(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub received: u64,
    pub persisted: u64,
    pub acked: u64,
    pub requeued: u64,
    pub malformed: u64,
    /// Results rejected after their redelivered copy also failed to save
    pub discarded: u64,
    pub persist_failures: u64,
    pub ack_failures: u64,
    pub exit: IngestExit,
}

pub struct IngestLoop {
    sink: Arc<dyn PersistenceSink>,
    ack_mode: AckMode,
    requeue_delay: Duration,
}

impl IngestLoop {
    pub fn new(sink: Arc<dyn PersistenceSink>, ack_mode: AckMode) -> Self {
        Self {
            sink,
            ack_mode,
            requeue_delay: DEFAULT_REQUEUE_DELAY,
        }
    }

    /// Pause before nacking a result whose write failed, so a store outage
    /// does not turn into a redelivery spin
    pub fn with_requeue_delay(mut self, requeue_delay: Duration) -> Self {
        self.requeue_delay = requeue_delay;
        self
    }

    /// Consume until cancelled or until the stream ends.
    ///
    /// Cancellation wins over a ready message: once `cancel` fires no new
    /// message is processed, and a message received in the same instant is
    /// left unacknowledged for redelivery.
    pub async fn run(&self, mut stream: MessageStream, cancel: CancellationToken) -> IngestReport {
        let mut report = IngestReport::default();
        info!(ack_mode = %self.ack_mode, "Ingest loop started");

        report.exit = loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break IngestExit::Cancelled,
                next = stream.next() => next,
            };

            match next {
                None => break IngestExit::StreamClosed,
                Some(Err(e)) => {
                    error!(error = %e, "Message stream failed");
                    break IngestExit::StreamError(e.to_string());
                }
                Some(Ok(message)) => {
                    if cancel.is_cancelled() {
                        debug!(
                            delivery_tag = message.delivery_tag(),
                            "Cancelled with a delivery in hand; leaving it for redelivery"
                        );
                        break IngestExit::Cancelled;
                    }
                    self.handle(message, &cancel, &mut report).await;
                }
            }
        };

        info!(
            exit = ?report.exit,
            received = report.received,
            persisted = report.persisted,
            acked = report.acked,
            requeued = report.requeued,
            malformed = report.malformed,
            discarded = report.discarded,
            "Ingest loop stopped"
        );
        report
    }

    #[instrument(skip_all, fields(delivery_tag = message.delivery_tag(), redelivered = message.redelivered()))]
    async fn handle(&self, message: ChannelMessage, cancel: &CancellationToken, report: &mut IngestReport) {
        report.received += 1;

        let result: ProbeResult = match message.decode() {
            Ok(result) => result,
            Err(e) => {
                report.malformed += 1;
                warn!(error = %e, payload_len = message.payload().len(), "Rejecting malformed message");
                if let Err(e) = message.nack(false).await {
                    report.ack_failures += 1;
                    warn!(error = %e, "Failed to reject malformed message");
                }
                return;
            }
        };

        match self.ack_mode {
            AckMode::AfterPersist => self.persist_then_ack(message, &result, cancel, report).await,
            AckMode::OnReceipt => self.ack_then_persist(message, &result, report).await,
        }
    }

    async fn persist_then_ack(
        &self,
        message: ChannelMessage,
        result: &ProbeResult,
        cancel: &CancellationToken,
        report: &mut IngestReport,
    ) {
        match self.sink.save(result).await {
            Ok(()) => {
                report.persisted += 1;
                match message.ack().await {
                    Ok(()) => report.acked += 1,
                    Err(e) => {
                        report.ack_failures += 1;
                        warn!(address = %result.address, error = %e, "Saved result but ack failed; expect a redelivery");
                    }
                }
            }
            Err(e) => {
                report.persist_failures += 1;

                if message.redelivered() {
                    error!(address = %result.address, error = %e, "Failed to save redelivered result; rejecting");
                    match message.nack(false).await {
                        Ok(()) => report.discarded += 1,
                        Err(e) => {
                            report.ack_failures += 1;
                            warn!(error = %e, "Reject failed; broker redelivers on reconnect");
                        }
                    }
                    return;
                }

                error!(address = %result.address, error = %e, "Failed to save result; requeueing once");
                if !self.requeue_delay.is_zero() {
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = tokio::time::sleep(self.requeue_delay) => {}
                    }
                }

                match message.nack(true).await {
                    Ok(()) => report.requeued += 1,
                    Err(e) => {
                        report.ack_failures += 1;
                        warn!(error = %e, "Requeue failed; broker redelivers on reconnect");
                    }
                }
            }
        }
    }

    async fn ack_then_persist(
        &self,
        message: ChannelMessage,
        result: &ProbeResult,
        report: &mut IngestReport,
    ) {
        if let Err(e) = message.ack().await {
            report.ack_failures += 1;
            // Unacked, so the broker will redeliver; saving now would duplicate
            warn!(address = %result.address, error = %e, "Ack failed; leaving result for redelivery");
            return;
        }
        report.acked += 1;

        match self.sink.save(result).await {
            Ok(()) => report.persisted += 1,
            Err(e) => {
                report.persist_failures += 1;
                error!(address = %result.address, error = %e, "Failed to save acknowledged result; result lost");
            }
        }
    }
}
