//! Link-monitor loop.
//!
//! One tokio task owns the receiving modem's transport exclusively. Each
//! iteration waits for inbound traffic, takes an RSSI sample through a
//! command-mode cycle, appends it to the [`RssiHistory`], and publishes the
//! result as a [`LinkEvent`] plus a fresh [`HistorySnapshot`]. A transport
//! fault ends the loop; everything else is absorbed and surfaced as a
//! [`LinkStatus`].

use std::time::Duration;

use radiolink_core::{Error, LinkEvent, LinkStatus, LoopKind, Result, Transport};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::command::CommandTiming;
use crate::history::{HISTORY_CAPACITY, HistorySnapshot, RssiHistory};
use crate::rssi::{self, RssiSampler, SampleOutcome};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Configuration for the link-monitor loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Command-mode timing used for every RSSI query.
    pub timing: CommandTiming,
    /// How long to wait for inbound traffic before reporting no activity.
    pub activity_timeout: Duration,
    /// Interval between `bytes_available` polls while waiting.
    pub poll_interval: Duration,
    /// Pause between iterations.
    pub cycle_interval: Duration,
    /// Samples kept in the history.
    pub history_capacity: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            timing: CommandTiming::default(),
            activity_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(100),
            cycle_interval: Duration::from_millis(100),
            history_capacity: HISTORY_CAPACITY,
        }
    }
}

/// What one monitor iteration did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorCycle {
    /// No traffic arrived within the activity window.
    NoActivity,
    /// Traffic arrived and a sampling attempt was made.
    Sampled(SampleOutcome),
}

/// The receiving side of a link: waits for traffic and records RSSI.
pub struct LinkMonitor {
    transport: Box<dyn Transport>,
    config: MonitorConfig,
    sampler: RssiSampler,
    history: RssiHistory,
    event_tx: broadcast::Sender<LinkEvent>,
    snapshot_tx: watch::Sender<HistorySnapshot>,
    cancel: CancellationToken,
}

impl LinkMonitor {
    /// Create a monitor that owns `transport` and stops when `cancel` fires.
    pub fn new(
        transport: Box<dyn Transport>,
        config: MonitorConfig,
        event_tx: broadcast::Sender<LinkEvent>,
        cancel: CancellationToken,
    ) -> Self {
        let (snapshot_tx, _) = watch::channel(HistorySnapshot::default());
        LinkMonitor {
            sampler: RssiSampler::new(config.timing.clone()),
            history: RssiHistory::with_capacity(config.history_capacity),
            transport,
            config,
            event_tx,
            snapshot_tx,
            cancel,
        }
    }

    /// Receiver that always holds the latest published history.
    pub fn subscribe_history(&self) -> watch::Receiver<HistorySnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn history(&self) -> &RssiHistory {
        &self.history
    }

    fn publish_status(&self, status: LinkStatus) {
        let _ = self.event_tx.send(LinkEvent::Status {
            source: LoopKind::Monitor,
            status,
        });
    }

    async fn close_transport(&mut self) {
        if let Err(e) = self.transport.close().await {
            debug!(error = %e, "error closing transport");
        }
    }

    /// Run one iteration without the trailing pause.
    ///
    /// Returns an error only for transport faults.
    pub async fn cycle(&mut self) -> Result<MonitorCycle> {
        let active = rssi::wait_for_activity(
            &mut *self.transport,
            self.config.activity_timeout,
            self.config.poll_interval,
            &self.cancel,
        )
        .await?;

        if !active {
            if !self.cancel.is_cancelled() {
                debug!("no inbound traffic within activity window");
                self.publish_status(LinkStatus::NoActivity);
            }
            return Ok(MonitorCycle::NoActivity);
        }

        let outcome = self.sampler.sample(&mut *self.transport).await?;
        match &outcome {
            SampleOutcome::Sample(sample) => {
                self.history.push(*sample);
                let snapshot = self.history.snapshot();
                if let Some(stats) = snapshot.stats {
                    info!(
                        dbm = sample.dbm,
                        quality = %sample.classification(),
                        avg = stats.avg,
                        "RSSI"
                    );
                    let _ = self.event_tx.send(LinkEvent::Sample {
                        sample: *sample,
                        stats,
                    });
                }
                self.snapshot_tx.send_replace(snapshot);
            }
            SampleOutcome::NoAcknowledgement => {
                self.publish_status(LinkStatus::NegotiationFailed);
            }
            SampleOutcome::Aborted(reason) => {
                self.publish_status(LinkStatus::CycleAborted(reason.clone()));
            }
            SampleOutcome::Malformed(_) => {
                self.publish_status(LinkStatus::MalformedReply);
            }
        }

        Ok(MonitorCycle::Sampled(outcome))
    }

    /// Loop until cancelled or the transport fails.
    ///
    /// Returns the final history on cancellation. On a transport fault the
    /// loop publishes [`LinkStatus::Faulted`] and returns the fault.
    pub async fn run(mut self) -> Result<RssiHistory> {
        info!("link monitor started");
        self.publish_status(LinkStatus::Listening);

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            if let Err(e) = self.cycle().await {
                error!(error = %e, "link monitor stopped on transport fault");
                self.publish_status(LinkStatus::Faulted(e.to_string()));
                self.close_transport().await;
                return Err(e);
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {}
                _ = tokio::time::sleep(self.config.cycle_interval) => {}
            }
        }

        self.close_transport().await;
        info!(samples = self.history.len(), "link monitor stopped");
        self.publish_status(LinkStatus::Stopped);
        Ok(self.history)
    }
}

// ---------------------------------------------------------------------------
// Spawn
// ---------------------------------------------------------------------------

/// Handle to a spawned monitor task.
pub struct MonitorHandle {
    /// Latest published history.
    pub history: watch::Receiver<HistorySnapshot>,
    /// Cancellation token shared with the task.
    pub cancel: CancellationToken,
    /// Join handle for the monitor task.
    pub task: JoinHandle<Result<RssiHistory>>,
}

impl MonitorHandle {
    /// Cancel the loop and wait for it to finish.
    pub async fn stop(self) -> Result<RssiHistory> {
        self.cancel.cancel();
        self.join().await
    }

    /// Wait for the loop to finish on its own.
    pub async fn join(self) -> Result<RssiHistory> {
        self.task
            .await
            .map_err(|e| Error::TaskFailed(format!("link monitor: {e}")))?
    }
}

/// Spawn a [`LinkMonitor`] on the current runtime.
pub fn spawn_monitor(
    transport: Box<dyn Transport>,
    config: MonitorConfig,
    event_tx: broadcast::Sender<LinkEvent>,
    cancel: CancellationToken,
) -> MonitorHandle {
    let monitor = LinkMonitor::new(transport, config, event_tx, cancel.clone());
    let history = monitor.subscribe_history();
    let task = tokio::spawn(monitor.run());

    MonitorHandle {
        history,
        cancel,
        task,
    }
}
