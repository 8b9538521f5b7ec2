//! Transmit loop.
//!
//! Sends one API transmit-request frame to a fixed peer every interval and
//! reports each attempt as a [`TransmissionRecord`]. Write failures are
//! recorded and the loop carries on; only a closed transport ends it.

use std::time::Duration;

use chrono::Local;
use radiolink_core::{
    Error, LinkEvent, LinkStatus, LoopKind, Result, TransmissionRecord, TransmissionStatus,
    Transport,
};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::frame::{self, Address64};

/// Payload sent when none is configured.
pub const DEFAULT_PAYLOAD: &[u8] = b"Test";

/// Configuration for the transmit loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransmitConfig {
    /// 64-bit address of the receiving modem.
    pub dest: Address64,
    pub payload: Vec<u8>,
    /// Pause between transmissions.
    pub interval: Duration,
}

impl TransmitConfig {
    /// Default payload and a 5 s interval towards `dest`.
    pub fn new(dest: Address64) -> Self {
        TransmitConfig {
            dest,
            payload: DEFAULT_PAYLOAD.to_vec(),
            interval: Duration::from_secs(5),
        }
    }
}

/// Counters reported when the loop stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransmitSummary {
    pub sent: u64,
    pub failed: u64,
}

/// The sending side of a link.
pub struct Transmitter {
    transport: Box<dyn Transport>,
    config: TransmitConfig,
    event_tx: broadcast::Sender<LinkEvent>,
    cancel: CancellationToken,
    summary: TransmitSummary,
}

impl Transmitter {
    pub fn new(
        transport: Box<dyn Transport>,
        config: TransmitConfig,
        event_tx: broadcast::Sender<LinkEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Transmitter {
            transport,
            config,
            event_tx,
            cancel,
            summary: TransmitSummary::default(),
        }
    }

    pub fn summary(&self) -> TransmitSummary {
        self.summary
    }

    fn publish_status(&self, status: LinkStatus) {
        let _ = self.event_tx.send(LinkEvent::Status {
            source: LoopKind::Transmitter,
            status,
        });
    }

    async fn close_transport(&mut self) {
        if let Err(e) = self.transport.close().await {
            debug!(error = %e, "error closing transport");
        }
    }

    /// Build and send one frame, then publish the record.
    ///
    /// Write timeouts and transport errors are recorded, not returned. The
    /// record for a closed transport is published before
    /// [`Error::NotConnected`] is returned. Frame construction errors are
    /// returned without a record.
    pub async fn cycle(&mut self) -> Result<TransmissionRecord> {
        let frame = frame::build(self.config.dest, &self.config.payload)?;
        debug_assert!(frame::validate(&frame).is_ok());
        let frame_hex = frame::to_hex(&frame);

        let mut fatal = None;
        let status = match self.transport.send(&frame).await {
            Ok(()) => {
                info!(dest = %self.config.dest, frame = %frame_hex, "sent API frame");
                TransmissionStatus::Success
            }
            Err(Error::Timeout) => {
                warn!(frame = %frame_hex, "timed out writing API frame");
                TransmissionStatus::Timeout
            }
            Err(Error::NotConnected) => {
                fatal = Some(Error::NotConnected);
                TransmissionStatus::TransportError
            }
            Err(e) => {
                warn!(error = %e, frame = %frame_hex, "failed to write API frame");
                TransmissionStatus::TransportError
            }
        };

        match status {
            TransmissionStatus::Success => self.summary.sent += 1,
            _ => self.summary.failed += 1,
        }

        let record = TransmissionRecord {
            timestamp: Local::now(),
            status,
            frame_hex,
        };
        let _ = self.event_tx.send(LinkEvent::Transmission(record.clone()));

        match fatal {
            Some(e) => Err(e),
            None => Ok(record),
        }
    }

    /// Loop until cancelled or the transport is closed.
    pub async fn run(mut self) -> Result<TransmitSummary> {
        info!(
            dest = %self.config.dest,
            interval_ms = self.config.interval.as_millis() as u64,
            "transmitter started"
        );
        self.publish_status(LinkStatus::Listening);

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            if let Err(e) = self.cycle().await {
                error!(error = %e, "transmitter stopped");
                self.publish_status(LinkStatus::Faulted(e.to_string()));
                self.close_transport().await;
                return Err(e);
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {}
                _ = tokio::time::sleep(self.config.interval) => {}
            }
        }

        self.close_transport().await;
        info!(
            sent = self.summary.sent,
            failed = self.summary.failed,
            "transmitter stopped"
        );
        self.publish_status(LinkStatus::Stopped);
        Ok(self.summary)
    }
}

/// Handle to a spawned transmit task.
pub struct TransmitHandle {
    pub cancel: CancellationToken,
    pub task: JoinHandle<Result<TransmitSummary>>,
}

impl TransmitHandle {
    /// Cancel the loop and wait for it to finish.
    pub async fn stop(self) -> Result<TransmitSummary> {
        self.cancel.cancel();
        self.join().await
    }

    pub async fn join(self) -> Result<TransmitSummary> {
        self.task
            .await
            .map_err(|e| Error::TaskFailed(format!("transmitter: {e}")))?
    }
}

/// Spawn a [`Transmitter`] on the current runtime.
pub fn spawn_transmitter(
    transport: Box<dyn Transport>,
    config: TransmitConfig,
    event_tx: broadcast::Sender<LinkEvent>,
    cancel: CancellationToken,
) -> TransmitHandle {
    let transmitter = Transmitter::new(transport, config, event_tx, cancel.clone());
    let task = tokio::spawn(transmitter.run());
    TransmitHandle { cancel, task }
}
