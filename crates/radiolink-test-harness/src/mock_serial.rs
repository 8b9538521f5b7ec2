//! Mock transport for deterministic testing of protocol engines.
//!
//! [`MockTransport`] implements the [`Transport`] trait as a scripted modem.
//! Request/response pairs are consumed in order: each `send()` must match the
//! next expectation, and the paired response is appended to the receive
//! buffer. Unsolicited over-the-air traffic can be injected at any time, and
//! send/receive faults can be queued to exercise error paths.
//!
//! Clones share state, so a test can keep one handle for inspection after
//! moving another into a loop.
//!
//! # Example
//!
//! ```
//! use radiolink_test_harness::MockTransport;
//!
//! let mock = MockTransport::new();
//! // Incoming packet that wakes the monitor.
//! mock.inject(b"Hello from R&D1\r");
//! // Command-mode exchange.
//! mock.expect(b"+++", b"OK\r");
//! mock.expect(b"ATDB\r", b"4A\r");
//! mock.expect(b"ATCN\r", b"OK\r");
//! ```

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use radiolink_core::error::{Error, Result};
use radiolink_core::transport::Transport;

#[derive(Debug)]
struct Expectation {
    request: Vec<u8>,
    response: Vec<u8>,
    /// Returned from the matching `send()` instead of queueing `response`.
    fault: Option<Error>,
}

#[derive(Debug, Default)]
struct MockState {
    expectations: VecDeque<Expectation>,
    /// Bytes waiting to be read: scripted responses and injected traffic.
    rx: VecDeque<u8>,
    send_faults: VecDeque<Error>,
    receive_faults: VecDeque<Error>,
    closed: bool,
    /// Upper bound on bytes handed out per `receive()`; `None` drains all.
    read_chunk: Option<usize>,
    sent_log: Vec<Vec<u8>>,
    polls: usize,
}

/// A scripted [`Transport`] for testing protocol engines without hardware.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// Create a new mock transport in the connected state.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        // A panicking test thread poisons the lock; the state is still usable.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add an expected request/response pair.
    ///
    /// When `send()` is called with data matching `request`, `response` is
    /// appended to the receive buffer. Use an empty response for writes the
    /// modem does not answer.
    pub fn expect(&self, request: &[u8], response: &[u8]) {
        self.state().expectations.push_back(Expectation {
            request: request.to_vec(),
            response: response.to_vec(),
            fault: None,
        });
    }

    /// Add an expected request whose `send()` fails with `error`.
    ///
    /// Unlike [`fail_next_send`](Self::fail_next_send) the fault is tied to a
    /// position in the script, so later steps of an exchange can be made to
    /// fail while earlier ones succeed.
    pub fn expect_failure(&self, request: &[u8], error: Error) {
        self.state().expectations.push_back(Expectation {
            request: request.to_vec(),
            response: Vec::new(),
            fault: Some(error),
        });
    }

    /// Append unsolicited bytes to the receive buffer, as if a packet had
    /// arrived over the air.
    pub fn inject(&self, data: &[u8]) {
        self.state().rx.extend(data.iter().copied());
    }

    /// Make the next `send()` fail with `error` instead of matching an
    /// expectation. Faults queue up and are consumed one per call.
    pub fn fail_next_send(&self, error: Error) {
        self.state().send_faults.push_back(error);
    }

    /// Make the next `receive()` fail with `error`.
    pub fn fail_next_receive(&self, error: Error) {
        self.state().receive_faults.push_back(error);
    }

    /// Hand out at most `bytes` per `receive()`, so replies arrive split
    /// across several reads the way a slow serial line delivers them.
    pub fn set_read_chunk(&self, bytes: usize) {
        self.state().read_chunk = Some(bytes.max(1));
    }

    /// All data sent through this transport, one element per `send()` call.
    pub fn sent_data(&self) -> Vec<Vec<u8>> {
        self.state().sent_log.clone()
    }

    /// Number of expectations that have not yet been consumed.
    pub fn remaining_expectations(&self) -> usize {
        self.state().expectations.len()
    }

    /// Number of bytes still unread.
    pub fn unread(&self) -> usize {
        self.state().rx.len()
    }

    /// Number of times `bytes_available()` has been called.
    pub fn polls(&self) -> usize {
        self.state().polls
    }

    /// Set the connected state.
    ///
    /// When set to `false`, every subsequent call returns
    /// [`Error::NotConnected`].
    pub fn set_connected(&self, connected: bool) {
        self.state().closed = !connected;
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let mut state = self.state();
        if state.closed {
            return Err(Error::NotConnected);
        }
        state.sent_log.push(data.to_vec());

        if let Some(fault) = state.send_faults.pop_front() {
            return Err(fault);
        }

        match state.expectations.pop_front() {
            Some(expectation) if data == expectation.request.as_slice() => {
                if let Some(fault) = expectation.fault {
                    return Err(fault);
                }
                state.rx.extend(expectation.response);
                Ok(())
            }
            Some(expectation) => Err(Error::Protocol(format!(
                "unexpected send data: expected {:02X?}, got {:02X?}",
                expectation.request, data
            ))),
            None => Err(Error::Protocol(
                "no more expectations in mock transport".into(),
            )),
        }
    }

    async fn receive(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize> {
        let mut state = self.state();
        if state.closed {
            return Err(Error::NotConnected);
        }
        if let Some(fault) = state.receive_faults.pop_front() {
            return Err(fault);
        }
        if state.rx.is_empty() {
            return Err(Error::Timeout);
        }

        let chunk = state.read_chunk.unwrap_or(usize::MAX);
        let n = state.rx.len().min(buf.len()).min(chunk);
        for (slot, byte) in buf.iter_mut().zip(state.rx.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn bytes_available(&self) -> Result<usize> {
        let mut state = self.state();
        if state.closed {
            return Err(Error::NotConnected);
        }
        state.polls += 1;
        Ok(state.rx.len())
    }

    async fn close(&mut self) -> Result<()> {
        let mut state = self.state();
        state.closed = true;
        state.rx.clear();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.state().closed
    }
}
