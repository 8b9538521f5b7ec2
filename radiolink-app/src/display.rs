//! Terminal output for link events.

use radiolink_core::{LinkEvent, LinkStatus, LoopKind, RssiSample, RssiStats};
use radiolink_xbee::RssiHistory;
use tokio::sync::broadcast;

fn format_sample(sample: &RssiSample, stats: &RssiStats) -> String {
    format!(
        "[{}] RSSI {} dBm ({}) | avg {:.1} min {} max {} over {}",
        sample.timestamp.format("%H:%M:%S"),
        sample.dbm,
        sample.classification(),
        stats.avg,
        stats.min,
        stats.max,
        stats.count,
    )
}

fn format_status(source: LoopKind, status: &LinkStatus) -> String {
    let text = match status {
        LinkStatus::Listening => "running".to_string(),
        LinkStatus::NoActivity => "no packet received, waiting again".to_string(),
        LinkStatus::NegotiationFailed => "failed to enter command mode".to_string(),
        LinkStatus::MalformedReply => "invalid RSSI reply, sample dropped".to_string(),
        LinkStatus::CycleAborted(reason) => format!("RSSI query abandoned: {reason}"),
        LinkStatus::Faulted(reason) => format!("stopped: {reason}"),
        LinkStatus::Stopped => "stopped".to_string(),
    };
    format!("[{source}] {text}")
}

/// One terminal line per event.
pub fn render(event: &LinkEvent) -> String {
    match event {
        LinkEvent::Sample { sample, stats } => format_sample(sample, stats),
        LinkEvent::Status { source, status } => format_status(*source, status),
        LinkEvent::Transmission(record) => format!(
            "[{}] {} {}",
            record.timestamp.format("%H:%M:%S"),
            record.status,
            record.frame_hex
        ),
    }
}

/// Print events to stdout until the channel closes.
pub async fn print_events(mut events: broadcast::Receiver<LinkEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => println!("{}", render(&event)),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                println!("[warning] missed {n} events (consumer too slow)");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Closing summary for the monitor.
pub fn print_history_summary(history: &RssiHistory) {
    match history.stats() {
        Some(stats) => {
            println!();
            println!("RSSI summary");
            println!("  Samples:  {}", stats.count);
            println!("  Average:  {:.1} dBm", stats.avg);
            println!("  Weakest:  {} dBm", stats.min);
            println!("  Strongest: {} dBm", stats.max);
        }
        None => println!("No RSSI samples recorded."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeZone};
    use radiolink_core::{TransmissionRecord, TransmissionStatus};

    fn at() -> chrono::DateTime<Local> {
        Local.with_ymd_and_hms(2025, 3, 14, 15, 9, 26).unwrap()
    }

    #[test]
    fn sample_line() {
        let event = LinkEvent::Sample {
            sample: RssiSample {
                timestamp: at(),
                dbm: -74,
            },
            stats: RssiStats {
                count: 3,
                avg: -72.333,
                min: -80,
                max: -63,
            },
        };
        assert_eq!(
            render(&event),
            "[15:09:26] RSSI -74 dBm (Fair) | avg -72.3 min -80 max -63 over 3"
        );
    }

    #[test]
    fn status_lines() {
        let event = LinkEvent::Status {
            source: LoopKind::Monitor,
            status: LinkStatus::NoActivity,
        };
        assert_eq!(
            render(&event),
            "[monitor] no packet received, waiting again"
        );

        let event = LinkEvent::Status {
            source: LoopKind::Transmitter,
            status: LinkStatus::Faulted("not connected".into()),
        };
        assert_eq!(render(&event), "[transmitter] stopped: not connected");

        let event = LinkEvent::Status {
            source: LoopKind::Monitor,
            status: LinkStatus::CycleAborted("timeout waiting for transport".into()),
        };
        assert_eq!(
            render(&event),
            "[monitor] RSSI query abandoned: timeout waiting for transport"
        );
    }

    #[test]
    fn transmission_line() {
        let event = LinkEvent::Transmission(TransmissionRecord {
            timestamp: at(),
            status: TransmissionStatus::Success,
            frame_hex: "7e0012".into(),
        });
        assert_eq!(render(&event), "[15:09:26] Success 7e0012");
    }
}
