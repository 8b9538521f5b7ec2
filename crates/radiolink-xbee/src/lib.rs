//! radiolink-xbee: XBee link-quality protocol engines.
//!
//! - [`frame`] -- API transmit-request frame codec
//! - [`command`] -- `+++` / `ATDB` / `ATCN` command-mode session
//! - [`rssi`] -- activity detection and RSSI sampling
//! - [`history`] -- bounded sample history with statistics
//! - [`monitor`] -- the receiving loop
//! - [`transmit`] -- the sending loop
//!
//! Both loops own their transport, stop on a shared
//! [`CancellationToken`](tokio_util::sync::CancellationToken), and publish
//! [`LinkEvent`](radiolink_core::LinkEvent)s on a broadcast channel.
//!
//! # Example
//!
//! ```no_run
//! use radiolink_xbee::{MonitorConfig, spawn_monitor};
//! use tokio::sync::broadcast;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example(transport: Box<dyn radiolink_core::Transport>) -> radiolink_core::Result<()> {
//! let (event_tx, _event_rx) = broadcast::channel(64);
//! let cancel = CancellationToken::new();
//! let handle = spawn_monitor(transport, MonitorConfig::default(), event_tx, cancel);
//! let history = handle.stop().await?;
//! println!("{} samples", history.len());
//! # Ok(())
//! # }
//! ```

pub mod command;
pub mod frame;
pub mod history;
pub mod monitor;
pub mod rssi;
pub mod transmit;

pub use command::{AtCommand, CommandModeSession, CommandModeState, CommandTiming};
pub use frame::{Address64, TransmitRequest};
pub use history::{HISTORY_CAPACITY, HistorySnapshot, RssiHistory, classify};
pub use monitor::{LinkMonitor, MonitorConfig, MonitorCycle, MonitorHandle, spawn_monitor};
pub use rssi::{RssiSampler, SampleOutcome};
pub use transmit::{
    TransmitConfig, TransmitHandle, TransmitSummary, Transmitter, spawn_transmitter,
};
