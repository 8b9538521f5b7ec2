// radiolink -- link-quality monitor and test transmitter for XBee modems in
// transparent mode.
//
// Usage:
//   radiolink ports
//   radiolink monitor --port /dev/ttyUSB0
//   radiolink transmit --port /dev/ttyUSB1 --dest 00:13:A2:00:42:6E:E7:77
//   radiolink link --rx-port /dev/ttyUSB0 --tx-port /dev/ttyUSB1 \
//       --dest 00:13:A2:00:42:6E:E7:77
//   radiolink --config radiolink.toml monitor
//
// Logging goes to stderr and is controlled with RUST_LOG (default `info`).

mod config;
mod csv_log;
mod display;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use radiolink_core::LinkEvent;
use radiolink_transport::{PortCandidate, SerialTransport, list_candidate_ports, select_port};
use radiolink_xbee::{Address64, TransmitConfig, spawn_monitor, spawn_transmitter};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;
use crate::csv_log::{CsvLog, RSSI_HEADER, TX_HEADER};

/// Capacity of the event broadcast channel shared by loops and sinks.
const EVENT_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// radiolink -- measure XBee link quality from the command line.
#[derive(Parser)]
#[command(name = "radiolink", version, about)]
struct Cli {
    /// TOML configuration file. Flags override values from the file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Serial baud rate (default 9600).
    #[arg(long, global = true)]
    baud: Option<u32>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List serial ports that look like modem adapters.
    Ports,

    /// Receiver side: sample RSSI whenever traffic arrives.
    Monitor {
        /// Serial port of the receiving modem. Discovered when omitted.
        #[arg(long)]
        port: Option<String>,

        #[command(flatten)]
        rssi_log: RssiLogArgs,
    },

    /// Sender side: transmit a test frame to a peer at a fixed interval.
    Transmit {
        /// Serial port of the sending modem. Discovered when omitted.
        #[arg(long)]
        port: Option<String>,

        #[command(flatten)]
        tx: TransmitArgs,
    },

    /// Run both sides at once on two modems attached to this host.
    Link {
        /// Serial port of the receiving modem.
        #[arg(long)]
        rx_port: Option<String>,

        /// Serial port of the sending modem.
        #[arg(long)]
        tx_port: Option<String>,

        #[command(flatten)]
        rssi_log: RssiLogArgs,

        #[command(flatten)]
        tx: TransmitArgs,
    },
}

#[derive(Args)]
struct RssiLogArgs {
    /// CSV file for RSSI samples.
    #[arg(long)]
    rssi_csv: Option<PathBuf>,

    /// Do not write the RSSI CSV log.
    #[arg(long)]
    no_rssi_csv: bool,
}

#[derive(Args)]
struct TransmitArgs {
    /// 64-bit address of the receiving modem (e.g. 00:13:A2:00:42:6E:E7:77).
    #[arg(long, value_parser = parse_address)]
    dest: Option<Address64>,

    /// Payload text sent in every frame.
    #[arg(long)]
    payload: Option<String>,

    /// Milliseconds between transmissions.
    #[arg(long)]
    interval_ms: Option<u64>,

    /// CSV file for transmission records.
    #[arg(long)]
    tx_csv: Option<PathBuf>,

    /// Do not write the transmission CSV log.
    #[arg(long)]
    no_tx_csv: bool,
}

fn parse_address(s: &str) -> std::result::Result<Address64, String> {
    s.parse::<Address64>().map_err(|e| e.to_string())
}

// ---------------------------------------------------------------------------
// Setup helpers
// ---------------------------------------------------------------------------

/// Ask the operator which of several candidate ports to use.
fn prompt_for_port(role: &str, candidates: &[PortCandidate]) -> Option<usize> {
    println!("Several serial ports found for the {role} modem:");
    for (i, c) in candidates.iter().enumerate() {
        println!("  [{i}] {c}");
    }
    print!("Select port number: ");
    io::stdout().flush().ok()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line).ok()?;
    line.trim().parse().ok()
}

fn resolve_port(explicit: Option<String>, role: &str, config: &AppConfig) -> Result<String> {
    if let Some(port) = explicit {
        return Ok(port);
    }
    let filters: Vec<&str> = config.serial.port_filters.iter().map(String::as_str).collect();
    let candidates = list_candidate_ports(&filters)?;
    let chosen = select_port(candidates, |c| prompt_for_port(role, c))
        .with_context(|| format!("selecting the {role} port"))?;
    Ok(chosen.name)
}

async fn open_port(port: &str, config: &AppConfig) -> Result<SerialTransport> {
    let baud = config.serial.baud_rate;
    let transport = SerialTransport::open(port, baud)
        .await
        .with_context(|| format!("opening {port}"))?;
    println!("Connected to {port} at {baud} baud");
    Ok(transport)
}

fn transmit_config(args: &TransmitArgs, config: &AppConfig) -> Result<TransmitConfig> {
    let Some(dest) = args.dest.or(config.transmit.dest) else {
        bail!("no destination address: pass --dest or set [transmit] dest_addr");
    };
    Ok(TransmitConfig {
        dest,
        payload: args
            .payload
            .as_ref()
            .map(|p| p.clone().into_bytes())
            .unwrap_or_else(|| config.transmit.payload.clone()),
        interval: args
            .interval_ms
            .map(Duration::from_millis)
            .unwrap_or(config.transmit.interval),
    })
}

/// Cancel `cancel` on Ctrl-C.
fn cancel_on_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, stopping");
            cancel.cancel();
        }
    });
}

/// Terminal display and CSV writers subscribed to the event channel.
///
/// Each sink ends when every sender of the channel has been dropped.
struct Sinks {
    tasks: Vec<JoinHandle<()>>,
}

impl Sinks {
    async fn start(
        event_tx: &broadcast::Sender<LinkEvent>,
        rssi_csv: Option<PathBuf>,
        tx_csv: Option<PathBuf>,
    ) -> Result<Self> {
        let mut tasks = vec![tokio::spawn(display::print_events(event_tx.subscribe()))];

        if let Some(path) = rssi_csv {
            let log = CsvLog::open(&path, &RSSI_HEADER).await?;
            println!("Logging RSSI to {}", log.path().display());
            tasks.push(tokio::spawn(
                log.record(event_tx.subscribe(), csv_log::rssi_row),
            ));
        }
        if let Some(path) = tx_csv {
            let log = CsvLog::open(&path, &TX_HEADER).await?;
            println!("Logging transmissions to {}", log.path().display());
            tasks.push(tokio::spawn(
                log.record(event_tx.subscribe(), csv_log::transmission_row),
            ));
        }

        Ok(Sinks { tasks })
    }

    async fn finish(self) {
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "event sink failed");
            }
        }
    }
}

fn rssi_csv_path(args: &RssiLogArgs, config: &AppConfig) -> Option<PathBuf> {
    if args.no_rssi_csv {
        None
    } else {
        Some(args.rssi_csv.clone().unwrap_or_else(|| config.log.rssi_csv.clone()))
    }
}

fn tx_csv_path(args: &TransmitArgs, config: &AppConfig) -> Option<PathBuf> {
    if args.no_tx_csv {
        None
    } else {
        Some(args.tx_csv.clone().unwrap_or_else(|| config.log.tx_csv.clone()))
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn cmd_ports(config: &AppConfig) -> Result<()> {
    let filters: Vec<&str> = config.serial.port_filters.iter().map(String::as_str).collect();
    let candidates = list_candidate_ports(&filters)?;
    if candidates.is_empty() {
        println!("No matching serial ports (filters: {}).", filters.join(", "));
        return Ok(());
    }
    for c in &candidates {
        println!("{c}");
    }
    println!();
    println!("{} candidate port(s).", candidates.len());
    Ok(())
}

async fn cmd_monitor(config: AppConfig, port: Option<String>, rssi_log: RssiLogArgs) -> Result<()> {
    let port = resolve_port(port, "receiving", &config)?;
    let transport = open_port(&port, &config).await?;

    let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
    let sinks = Sinks::start(&event_tx, rssi_csv_path(&rssi_log, &config), None).await?;

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());
    println!("Listening for packets (Ctrl-C to stop)...");

    let monitor = spawn_monitor(Box::new(transport), config.monitor, event_tx.clone(), cancel);
    let result = monitor.join().await;

    drop(event_tx);
    sinks.finish().await;

    let history = result.context("link monitor failed")?;
    display::print_history_summary(&history);
    Ok(())
}

async fn cmd_transmit(config: AppConfig, port: Option<String>, tx: TransmitArgs) -> Result<()> {
    let tx_config = transmit_config(&tx, &config)?;
    let port = resolve_port(port, "sending", &config)?;
    let transport = open_port(&port, &config).await?;

    let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
    let sinks = Sinks::start(&event_tx, None, tx_csv_path(&tx, &config)).await?;

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());
    println!(
        "Transmitting to {} every {} ms (Ctrl-C to stop)...",
        tx_config.dest,
        tx_config.interval.as_millis()
    );

    let transmitter = spawn_transmitter(Box::new(transport), tx_config, event_tx.clone(), cancel);
    let result = transmitter.join().await;

    drop(event_tx);
    sinks.finish().await;

    let summary = result.context("transmitter failed")?;
    println!();
    println!("{} sent, {} failed.", summary.sent, summary.failed);
    Ok(())
}

async fn cmd_link(
    config: AppConfig,
    rx_port: Option<String>,
    tx_port: Option<String>,
    rssi_log: RssiLogArgs,
    tx: TransmitArgs,
) -> Result<()> {
    let tx_config = transmit_config(&tx, &config)?;
    let rx_port = resolve_port(rx_port, "receiving", &config)?;
    let tx_port = resolve_port(tx_port, "sending", &config)?;
    if rx_port == tx_port {
        bail!("receiving and sending modems must be on different ports ({rx_port})");
    }
    let rx_transport = open_port(&rx_port, &config).await?;
    let tx_transport = open_port(&tx_port, &config).await?;

    let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
    let sinks = Sinks::start(
        &event_tx,
        rssi_csv_path(&rssi_log, &config),
        tx_csv_path(&tx, &config),
    )
    .await?;

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());
    println!("Link test running (Ctrl-C to stop)...");

    let monitor = spawn_monitor(
        Box::new(rx_transport),
        config.monitor,
        event_tx.clone(),
        cancel.clone(),
    );
    let transmitter = spawn_transmitter(Box::new(tx_transport), tx_config, event_tx.clone(), cancel);

    // A fault in one loop leaves the other running until Ctrl-C.
    let (monitor_result, transmit_result) = tokio::join!(monitor.join(), transmitter.join());

    drop(event_tx);
    sinks.finish().await;

    match &monitor_result {
        Ok(history) => display::print_history_summary(history),
        Err(e) => eprintln!("link monitor failed: {e}"),
    }
    match &transmit_result {
        Ok(summary) => println!("{} sent, {} failed.", summary.sent, summary.failed),
        Err(e) => eprintln!("transmitter failed: {e}"),
    }

    monitor_result.context("link monitor failed")?;
    transmit_result.context("transmitter failed")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(baud) = cli.baud {
        config.serial.baud_rate = baud;
    }

    match cli.command {
        Command::Ports => cmd_ports(&config),
        Command::Monitor { port, rssi_log } => cmd_monitor(config, port, rssi_log).await,
        Command::Transmit { port, tx } => cmd_transmit(config, port, tx).await,
        Command::Link {
            rx_port,
            tx_port,
            rssi_log,
            tx,
        } => cmd_link(config, rx_port, tx_port, rssi_log, tx).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_link_command() {
        let cli = Cli::try_parse_from([
            "radiolink",
            "--baud",
            "115200",
            "link",
            "--rx-port",
            "/dev/ttyUSB0",
            "--tx-port",
            "/dev/ttyUSB1",
            "--dest",
            "0013A200426EE777",
            "--no-rssi-csv",
        ])
        .unwrap();
        assert_eq!(cli.baud, Some(115200));
        match cli.command {
            Command::Link {
                rx_port,
                tx_port,
                rssi_log,
                tx,
            } => {
                assert_eq!(rx_port.as_deref(), Some("/dev/ttyUSB0"));
                assert_eq!(tx_port.as_deref(), Some("/dev/ttyUSB1"));
                assert!(rssi_log.no_rssi_csv);
                assert_eq!(tx.dest.unwrap().to_string(), "00:13:A2:00:42:6E:E7:77");
            }
            _ => panic!("expected link command"),
        }
    }

    #[test]
    fn bad_dest_is_a_usage_error() {
        let result = Cli::try_parse_from(["radiolink", "transmit", "--dest", "zz"]);
        assert!(result.is_err());
    }

    #[test]
    fn transmit_needs_a_destination() {
        let args = TransmitArgs {
            dest: None,
            payload: None,
            interval_ms: None,
            tx_csv: None,
            no_tx_csv: false,
        };
        assert!(transmit_config(&args, &AppConfig::default()).is_err());
    }

    #[test]
    fn flags_override_config() {
        let config = AppConfig::from_toml_str(
            "[transmit]\ndest_addr = \"00:13:A2:00:42:6E:E7:77\"\ninterval_ms = 1000\n",
        )
        .unwrap();
        let args = TransmitArgs {
            dest: None,
            payload: Some("ping".into()),
            interval_ms: Some(250),
            tx_csv: None,
            no_tx_csv: true,
        };
        let tx = transmit_config(&args, &config).unwrap();
        assert_eq!(tx.dest.to_string(), "00:13:A2:00:42:6E:E7:77");
        assert_eq!(tx.payload, b"ping");
        assert_eq!(tx.interval, Duration::from_millis(250));
        assert!(tx_csv_path(&args, &config).is_none());
    }
}
