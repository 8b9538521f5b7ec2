//! Link event types.
//!
//! Events are emitted by the monitor and transmit loops through a
//! `tokio::sync::broadcast` channel. The terminal display and the CSV
//! sinks subscribe to them; the loops have no knowledge of who is listening.
//! Delivery is best-effort: a slow subscriber may lag and miss events.

use std::fmt;

use crate::types::{RssiSample, RssiStats, TransmissionRecord};

/// Which loop an event originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopKind {
    Monitor,
    Transmitter,
}

impl fmt::Display for LoopKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopKind::Monitor => f.write_str("monitor"),
            LoopKind::Transmitter => f.write_str("transmitter"),
        }
    }
}

/// Observable state of a loop, published for error surfacing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkStatus {
    /// The loop is running and waiting for traffic or its next tick.
    Listening,
    /// No inbound traffic arrived within the activity window.
    NoActivity,
    /// The modem did not acknowledge the command-mode escape.
    NegotiationFailed,
    /// The modem's reply to a query could not be parsed.
    MalformedReply,
    /// A command-mode cycle was abandoned on a recoverable error, such as
    /// a write timeout mid-query.
    CycleAborted(String),
    /// The transport failed; the loop has stopped.
    Faulted(String),
    /// The loop exited after cancellation.
    Stopped,
}

/// An event emitted by a link loop.
#[derive(Debug, Clone)]
pub enum LinkEvent {
    /// A new signal-strength sample was recorded.
    Sample {
        sample: RssiSample,
        /// Statistics over the history including this sample.
        stats: RssiStats,
    },

    /// A loop changed state.
    Status { source: LoopKind, status: LinkStatus },

    /// A transmit attempt completed (successfully or not).
    Transmission(TransmissionRecord),
}
