//! TOML configuration file.
//!
//! Every key is optional. Missing keys fall back to the library defaults,
//! and command-line flags override whatever the file resolves to.
//!
//! ```toml
//! [serial]
//! baud_rate = 9600
//! port_filters = ["USB", "XBee", "CP210"]
//!
//! [timing]
//! guard_after_ms = 1000
//!
//! [monitor]
//! activity_timeout_ms = 10000
//!
//! [transmit]
//! dest_addr = "00:13:A2:00:42:6E:E7:77"
//! payload = "Test"
//! interval_ms = 5000
//!
//! [log]
//! rssi_csv = "rssi_log.csv"
//! tx_csv = "tx_log.csv"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use radiolink_transport::discovery::DEFAULT_PORT_FILTERS;
use radiolink_xbee::{Address64, CommandTiming, MonitorConfig};
use serde::Deserialize;

pub const DEFAULT_BAUD_RATE: u32 = 9600;
pub const DEFAULT_RSSI_CSV: &str = "rssi_log.csv";
pub const DEFAULT_TX_CSV: &str = "tx_log.csv";

// ---------------------------------------------------------------------------
// File representation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigInput {
    pub serial: SerialInput,
    pub timing: TimingInput,
    pub monitor: MonitorInput,
    pub transmit: TransmitInput,
    pub log: LogInput,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SerialInput {
    pub baud_rate: Option<u32>,
    pub port_filters: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimingInput {
    pub guard_before_ms: Option<u64>,
    pub guard_after_ms: Option<u64>,
    pub read_window_ms: Option<u64>,
    pub query_settle_ms: Option<u64>,
    pub exit_settle_ms: Option<u64>,
    pub reply_len: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonitorInput {
    pub activity_timeout_ms: Option<u64>,
    pub poll_interval_ms: Option<u64>,
    pub cycle_interval_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransmitInput {
    pub dest_addr: Option<String>,
    pub payload: Option<String>,
    pub interval_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogInput {
    pub rssi_csv: Option<PathBuf>,
    pub tx_csv: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialSettings {
    pub baud_rate: u32,
    pub port_filters: Vec<String>,
}

impl Default for SerialSettings {
    fn default() -> Self {
        SerialSettings {
            baud_rate: DEFAULT_BAUD_RATE,
            port_filters: DEFAULT_PORT_FILTERS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Transmit settings before a destination is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransmitSettings {
    pub dest: Option<Address64>,
    pub payload: Vec<u8>,
    pub interval: Duration,
}

impl Default for TransmitSettings {
    fn default() -> Self {
        TransmitSettings {
            dest: None,
            payload: radiolink_xbee::transmit::DEFAULT_PAYLOAD.to_vec(),
            interval: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub rssi_csv: PathBuf,
    pub tx_csv: PathBuf,
}

impl Default for LogSettings {
    fn default() -> Self {
        LogSettings {
            rssi_csv: PathBuf::from(DEFAULT_RSSI_CSV),
            tx_csv: PathBuf::from(DEFAULT_TX_CSV),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppConfig {
    pub serial: SerialSettings,
    pub monitor: MonitorConfig,
    pub transmit: TransmitSettings,
    pub log: LogSettings,
}

fn millis_or(value: Option<u64>, default: Duration) -> Duration {
    value.map(Duration::from_millis).unwrap_or(default)
}

impl ConfigInput {
    pub fn resolve(self) -> Result<AppConfig> {
        let serial_defaults = SerialSettings::default();
        let port_filters = self
            .serial
            .port_filters
            .map(|filters| {
                filters
                    .into_iter()
                    .map(|f| f.trim().to_string())
                    .filter(|f| !f.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|filters| !filters.is_empty())
            .unwrap_or(serial_defaults.port_filters);
        let serial = SerialSettings {
            baud_rate: self.serial.baud_rate.unwrap_or(serial_defaults.baud_rate),
            port_filters,
        };

        let t = CommandTiming::default();
        let timing = CommandTiming {
            guard_before: millis_or(self.timing.guard_before_ms, t.guard_before),
            guard_after: millis_or(self.timing.guard_after_ms, t.guard_after),
            read_window: millis_or(self.timing.read_window_ms, t.read_window),
            query_settle: millis_or(self.timing.query_settle_ms, t.query_settle),
            exit_settle: millis_or(self.timing.exit_settle_ms, t.exit_settle),
            reply_len: self.timing.reply_len.unwrap_or(t.reply_len).max(2),
        };

        let m = MonitorConfig::default();
        let monitor = MonitorConfig {
            timing,
            activity_timeout: millis_or(self.monitor.activity_timeout_ms, m.activity_timeout),
            poll_interval: millis_or(self.monitor.poll_interval_ms, m.poll_interval),
            cycle_interval: millis_or(self.monitor.cycle_interval_ms, m.cycle_interval),
            history_capacity: m.history_capacity,
        };

        let tx = TransmitSettings::default();
        let dest = self
            .transmit
            .dest_addr
            .as_deref()
            .map(|s| s.parse::<Address64>())
            .transpose()
            .context("invalid [transmit] dest_addr")?;
        let transmit = TransmitSettings {
            dest,
            payload: self
                .transmit
                .payload
                .map(String::into_bytes)
                .unwrap_or(tx.payload),
            interval: millis_or(self.transmit.interval_ms, tx.interval),
        };

        let l = LogSettings::default();
        let log = LogSettings {
            rssi_csv: self.log.rssi_csv.unwrap_or(l.rssi_csv),
            tx_csv: self.log.tx_csv.unwrap_or(l.tx_csv),
        };

        Ok(AppConfig {
            serial,
            monitor,
            transmit,
            log,
        })
    }
}

impl AppConfig {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        if input.trim().is_empty() {
            return Ok(AppConfig::default());
        }
        let parsed: ConfigInput = toml::from_str(input).context("invalid config TOML")?;
        parsed.resolve()
    }

    /// Load from `path`, or use defaults when no file was given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                Self::from_toml_str(&text)
                    .with_context(|| format!("loading config {}", path.display()))
            }
            None => Ok(AppConfig::default()),
        }
    }
}
