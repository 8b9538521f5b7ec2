//! radiolink-core: Core traits, types, and error definitions for radiolink.
//!
//! This crate defines the abstractions shared by the transport
//! implementations, the XBee protocol engines, and the application. It has
//! no knowledge of serial ports or of any particular modem.
//!
//! # Key types
//!
//! - [`Transport`] -- byte-level communication channel
//! - [`RssiSample`] / [`SignalQuality`] -- signal-strength readings
//! - [`LinkEvent`] -- notifications published by the link loops
//! - [`Error`] / [`Result`] -- error handling

pub mod error;
pub mod events;
pub mod transport;
pub mod types;

pub use error::{Error, Result};
pub use events::{LinkEvent, LinkStatus, LoopKind};
pub use transport::Transport;
pub use types::*;
