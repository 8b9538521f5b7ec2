//! Append-only CSV logs for RSSI samples and transmit attempts.
//!
//! Files are opened in append mode. The header row is written only when the
//! file is empty, so repeated runs keep extending the same log.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use radiolink_core::LinkEvent;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

pub const RSSI_HEADER: [&str; 2] = ["Timestamp", "RSSI (dBm)"];
pub const TX_HEADER: [&str; 3] = ["Timestamp", "Status", "Frame (Hex)"];
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn format_row<S: AsRef<str>>(fields: &[S]) -> String {
    let mut line = fields
        .iter()
        .map(|f| escape(f.as_ref()))
        .collect::<Vec<_>>()
        .join(",");
    line.push('\n');
    line
}

/// Row for a [`LinkEvent::Sample`]; `None` for every other event.
pub fn rssi_row(event: &LinkEvent) -> Option<Vec<String>> {
    match event {
        LinkEvent::Sample { sample, .. } => Some(vec![
            sample.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            sample.dbm.to_string(),
        ]),
        _ => None,
    }
}

/// Row for a [`LinkEvent::Transmission`]; `None` for every other event.
pub fn transmission_row(event: &LinkEvent) -> Option<Vec<String>> {
    match event {
        LinkEvent::Transmission(record) => Some(vec![
            record.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            record.status.to_string(),
            record.frame_hex.clone(),
        ]),
        _ => None,
    }
}

pub struct CsvLog {
    path: PathBuf,
    file: File,
}

impl CsvLog {
    /// Open `path` for appending, writing `header` if the file is empty.
    pub async fn open(path: &Path, header: &[&str]) -> Result<Self> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .with_context(|| format!("opening {}", path.display()))?;

        let len = file
            .metadata()
            .await
            .with_context(|| format!("reading metadata of {}", path.display()))?
            .len();
        if len == 0 {
            file.write_all(format_row(header).as_bytes())
                .await
                .with_context(|| format!("writing header to {}", path.display()))?;
            file.flush().await?;
        }

        info!(path = %path.display(), "CSV log open");
        Ok(CsvLog {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append_row<S: AsRef<str>>(&mut self, fields: &[S]) -> Result<()> {
        self.file
            .write_all(format_row(fields).as_bytes())
            .await
            .with_context(|| format!("appending to {}", self.path.display()))?;
        self.file.flush().await?;
        Ok(())
    }

    /// Append a row for every event `row` maps, until the channel closes.
    ///
    /// A failed write is logged and the sink stops; the loops keep running.
    pub async fn record<F>(mut self, mut events: broadcast::Receiver<LinkEvent>, row: F)
    where
        F: Fn(&LinkEvent) -> Option<Vec<String>>,
    {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let Some(fields) = row(&event) else { continue };
                    if let Err(e) = self.append_row(fields.as_slice()).await {
                        error!(error = %format!("{e:#}"), "CSV logging stopped");
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(path = %self.path.display(), missed = n, "CSV sink lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeZone};
    use radiolink_core::{RssiSample, RssiStats, TransmissionRecord, TransmissionStatus};

    fn temp_path(name: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "radiolink-{}-{}.csv",
            std::process::id(),
            name
        ));
        let _ = std::fs::remove_file(&path);
        path
    }

    fn fixed_time() -> chrono::DateTime<Local> {
        Local.with_ymd_and_hms(2025, 3, 14, 15, 9, 26).unwrap()
    }

    #[test]
    fn escape_only_when_needed() {
        assert_eq!(escape("Success"), "Success");
        assert_eq!(escape("a,b"), "\"a,b\"");
        assert_eq!(escape("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn rows_for_events() {
        let sample = LinkEvent::Sample {
            sample: RssiSample {
                timestamp: fixed_time(),
                dbm: -74,
            },
            stats: RssiStats {
                count: 1,
                avg: -74.0,
                min: -74,
                max: -74,
            },
        };
        assert_eq!(
            rssi_row(&sample).unwrap(),
            vec!["2025-03-14 15:09:26", "-74"]
        );
        assert!(transmission_row(&sample).is_none());

        let tx = LinkEvent::Transmission(TransmissionRecord {
            timestamp: fixed_time(),
            status: TransmissionStatus::Timeout,
            frame_hex: "7e00".into(),
        });
        assert_eq!(
            transmission_row(&tx).unwrap(),
            vec!["2025-03-14 15:09:26", "Timeout Error", "7e00"]
        );
        assert!(rssi_row(&tx).is_none());
    }

    #[tokio::test]
    async fn header_written_once() {
        let path = temp_path("header-once");

        let mut log = CsvLog::open(&path, &RSSI_HEADER).await.unwrap();
        log.append_row(&["2025-03-14 15:09:26", "-74"]).await.unwrap();
        drop(log);

        let mut log = CsvLog::open(&path, &RSSI_HEADER).await.unwrap();
        log.append_row(&["2025-03-14 15:09:27", "-80"]).await.unwrap();
        drop(log);

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "Timestamp,RSSI (dBm)\n2025-03-14 15:09:26,-74\n2025-03-14 15:09:27,-80\n"
        );
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn record_until_channel_closes() {
        let path = temp_path("record");
        let log = CsvLog::open(&path, &TX_HEADER).await.unwrap();
        let (tx, rx) = broadcast::channel(8);

        let sink = tokio::spawn(log.record(rx, transmission_row));
        tx.send(LinkEvent::Transmission(TransmissionRecord {
            timestamp: fixed_time(),
            status: TransmissionStatus::Success,
            frame_hex: "7e001210".into(),
        }))
        .unwrap();
        drop(tx);
        sink.await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "Timestamp,Status,Frame (Hex)\n2025-03-14 15:09:26,Success,7e001210\n"
        );
        let _ = std::fs::remove_file(&path);
    }
}
