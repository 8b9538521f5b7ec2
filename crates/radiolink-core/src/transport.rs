//! Transport trait for modem communication.
//!
//! The [`Transport`] trait abstracts over the serial link to a radio modem.
//! The protocol engines in `radiolink-xbee` (command-mode session, activity
//! detection, transmit loop) operate on a `Transport` rather than directly on
//! a serial port, so they can run against real hardware through
//! `SerialTransport` or against the scripted `MockTransport` from the
//! `radiolink-test-harness` crate.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Asynchronous byte-level transport to a modem.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send raw bytes to the modem.
    ///
    /// Completes once all bytes have been handed to the serial driver.
    /// Returns [`Error::Timeout`](crate::error::Error::Timeout) if the driver
    /// does not accept them within the transport's write timeout.
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive bytes from the modem into the provided buffer.
    ///
    /// Returns the number of bytes actually read. Waits up to `timeout` for
    /// data to arrive; returns [`Error::Timeout`](crate::error::Error::Timeout)
    /// if nothing is received within the deadline.
    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Number of bytes waiting in the receive buffer, without consuming them.
    fn bytes_available(&self) -> Result<usize>;

    /// Close the transport.
    ///
    /// After calling `close()`, subsequent calls should return
    /// [`Error::NotConnected`](crate::error::Error::NotConnected).
    async fn close(&mut self) -> Result<()>;

    /// Check whether the transport is currently open.
    fn is_connected(&self) -> bool;
}

