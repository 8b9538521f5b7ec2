//! Transport implementations for radiolink.
//!
//! - [`SerialTransport`]: USB-UART bridges and RS-232 connections to a modem
//! - [`discovery`]: enumerate and select the serial port a modem is on
//!
//! # Example
//!
//! ```no_run
//! use radiolink_transport::{SerialTransport, discovery};
//!
//! # async fn example() -> radiolink_core::Result<()> {
//! let candidates = discovery::list_candidate_ports(discovery::DEFAULT_PORT_FILTERS)?;
//! let port = discovery::select_port(candidates, |_| Some(0))?;
//! let transport = SerialTransport::open(&port.name, 9600).await?;
//! # Ok(())
//! # }
//! ```

pub mod discovery;
pub mod serial;

pub use discovery::{PortCandidate, list_candidate_ports, select_port};
pub use serial::{FlowControl, SerialConfig, SerialTransport};
