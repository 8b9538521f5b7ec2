//! radiolink-test-harness: Test utilities for radiolink.
//!
//! This crate provides [`MockTransport`], a scripted modem for deterministic
//! unit testing of the protocol engines without radio hardware.

pub mod mock_serial;

pub use mock_serial::MockTransport;
