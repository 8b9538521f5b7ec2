//! Signal-strength sampling.
//!
//! The modem only knows the RSSI of the *last* packet it received, so a
//! reading is meaningful only right after inbound traffic. The monitor
//! therefore waits for bytes with [`wait_for_activity`] and then asks the
//! modem for `ATDB` through [`RssiSampler::sample`].

use std::time::Duration;

use chrono::Local;
use radiolink_core::{Error, Result, RssiSample, Transport};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::command::{self, AtCommand, CommandTiming};

/// Result of one sampling attempt that did not hit a transport fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SampleOutcome {
    /// The modem reported a valid reading.
    Sample(RssiSample),
    /// The guard escape was not acknowledged; no query was issued.
    NoAcknowledgement,
    /// The reply to `ATDB` was not a hex byte.
    Malformed(String),
    /// The cycle was abandoned for another recoverable reason, such as a
    /// write timeout.
    Aborted(String),
}

impl SampleOutcome {
    /// The reading, if there is one.
    pub fn into_sample(self) -> Option<RssiSample> {
        match self {
            SampleOutcome::Sample(s) => Some(s),
            _ => None,
        }
    }
}

/// Decode an `ATDB` reply into the unsigned RSSI magnitude.
///
/// Non-ASCII bytes are dropped and surrounding whitespace (including the
/// trailing carriage return) is trimmed before the remainder is parsed as
/// hexadecimal.
///
/// ```
/// use radiolink_xbee::rssi::parse_rssi_reply;
///
/// assert_eq!(parse_rssi_reply(b"4A\r").unwrap(), 0x4A);
/// assert!(parse_rssi_reply(b"\r").is_err());
/// ```
pub fn parse_rssi_reply(raw: &[u8]) -> Result<u8> {
    let text: String = raw
        .iter()
        .filter(|b| b.is_ascii())
        .map(|&b| b as char)
        .collect();
    let trimmed = text.trim();

    if trimmed.is_empty() {
        return Err(Error::MalformedReply("empty reply".into()));
    }

    u8::from_str_radix(trimmed, 16)
        .map_err(|e| Error::MalformedReply(format!("{trimmed:?}: {e}")))
}

/// Wait until the transport has unread bytes, then drain them.
///
/// Polls [`Transport::bytes_available`] every `poll_interval`. Returns
/// `true` once traffic was seen (the bytes are consumed as the trigger),
/// `false` when `timeout` elapses or `cancel` fires first. Checks at least
/// once even with a zero timeout.
pub async fn wait_for_activity(
    transport: &mut dyn Transport,
    timeout: Duration,
    poll_interval: Duration,
    cancel: &CancellationToken,
) -> Result<bool> {
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        let available = transport.bytes_available()?;
        if available > 0 {
            let mut buf = vec![0u8; available];
            let n = match transport.receive(&mut buf, poll_interval).await {
                Ok(n) => n,
                Err(Error::Timeout) => 0,
                Err(e) => return Err(e),
            };
            debug!(
                bytes = n,
                data = %String::from_utf8_lossy(&buf[..n]).trim(),
                "inbound activity"
            );
            return Ok(true);
        }

        if tokio::time::Instant::now() >= deadline {
            return Ok(false);
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(false),
            _ = tokio::time::sleep(poll_interval) => {}
        }
    }
}

/// Takes one RSSI reading per command-mode cycle.
#[derive(Debug, Clone, Default)]
pub struct RssiSampler {
    timing: CommandTiming,
}

impl RssiSampler {
    pub fn new(timing: CommandTiming) -> Self {
        RssiSampler { timing }
    }

    pub fn timing(&self) -> &CommandTiming {
        &self.timing
    }

    /// Run a full command-mode cycle and decode the `ATDB` reply.
    ///
    /// Only transport faults are returned as errors. A missing
    /// acknowledgement or an unparseable reply is reported through the
    /// [`SampleOutcome`] and logged at warn level.
    pub async fn sample(&self, transport: &mut dyn Transport) -> Result<SampleOutcome> {
        let raw = match command::query_once(transport, &self.timing, AtCommand::SignalStrength)
            .await
        {
            Ok(raw) => raw,
            Err(Error::NoAcknowledgement) => {
                warn!("failed to enter command mode");
                return Ok(SampleOutcome::NoAcknowledgement);
            }
            Err(e) if e.is_transport_fault() => return Err(e),
            Err(e) => {
                warn!(error = %e, "RSSI query abandoned");
                return Ok(SampleOutcome::Aborted(e.to_string()));
            }
        };

        match parse_rssi_reply(&raw) {
            Ok(magnitude) => {
                let sample = RssiSample::from_magnitude(Local::now(), magnitude);
                debug!(dbm = sample.dbm, "RSSI sample");
                Ok(SampleOutcome::Sample(sample))
            }
            Err(e) => {
                warn!(error = %e, "dropping RSSI reply");
                Ok(SampleOutcome::Malformed(e.to_string()))
            }
        }
    }
}
