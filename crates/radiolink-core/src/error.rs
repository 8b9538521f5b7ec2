//! Error types for radiolink.
//!
//! All fallible operations across the workspace return [`Result<T>`], which
//! uses [`Error`] as the error type. Transport-layer faults, command-mode
//! negotiation failures, and malformed modem replies are all captured here.
//! The orchestration loops use [`Error::is_transport_fault`] to decide which
//! failures end a loop and which are absorbed.

/// The error type for all radiolink operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A transport-level error (serial port open, read, or write failure).
    #[error("transport error: {0}")]
    Transport(String),

    /// A framing error (bad delimiter, length mismatch, checksum mismatch).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Timed out waiting for the transport.
    ///
    /// On receive this means no bytes arrived within the window. On send it
    /// means the serial driver did not accept the bytes in time.
    #[error("timeout waiting for transport")]
    Timeout,

    /// The modem did not acknowledge the `+++` guard escape.
    ///
    /// Usually caused by traffic on the line inside the guard time, a wrong
    /// baud rate, or a modem already in API mode.
    #[error("no acknowledgement to command-mode escape")]
    NoAcknowledgement,

    /// The modem answered a query with something that is not a valid reading.
    #[error("malformed reply: {0}")]
    MalformedReply(String),

    /// An invalid parameter was supplied (bad address, oversize payload).
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The transport has been closed.
    #[error("not connected")]
    NotConnected,

    /// The connection to the modem was lost unexpectedly.
    #[error("connection lost")]
    ConnectionLost,

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A spawned loop task panicked or was aborted before returning.
    #[error("task failed: {0}")]
    TaskFailed(String),
}

impl Error {
    /// Returns `true` for failures of the physical link itself.
    ///
    /// These are fatal to the monitor loop that owns the transport. Every
    /// other kind is recoverable within a single cycle.
    pub fn is_transport_fault(&self) -> bool {
        matches!(
            self,
            Error::Transport(_) | Error::NotConnected | Error::ConnectionLost | Error::Io(_)
        )
    }
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_transport() {
        let e = Error::Transport("port busy".into());
        assert_eq!(e.to_string(), "transport error: port busy");
    }

    #[test]
    fn error_display_protocol() {
        let e = Error::Protocol("checksum mismatch".into());
        assert_eq!(e.to_string(), "protocol error: checksum mismatch");
    }

    #[test]
    fn error_display_timeout() {
        assert_eq!(Error::Timeout.to_string(), "timeout waiting for transport");
    }

    #[test]
    fn error_display_no_acknowledgement() {
        assert_eq!(
            Error::NoAcknowledgement.to_string(),
            "no acknowledgement to command-mode escape"
        );
    }

    #[test]
    fn error_display_malformed_reply() {
        let e = Error::MalformedReply("\"ZZ\"".into());
        assert_eq!(e.to_string(), "malformed reply: \"ZZ\"");
    }

    #[test]
    fn error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broken");
        let e: Error = io_err.into();
        assert!(matches!(e, Error::Io(_)));
        assert!(e.to_string().contains("pipe broken"));
    }

    #[test]
    fn transport_faults_are_classified() {
        assert!(Error::Transport("gone".into()).is_transport_fault());
        assert!(Error::NotConnected.is_transport_fault());
        assert!(Error::ConnectionLost.is_transport_fault());
        assert!(Error::Io(std::io::Error::other("x")).is_transport_fault());
    }

    #[test]
    fn recoverable_errors_are_not_transport_faults() {
        assert!(!Error::Timeout.is_transport_fault());
        assert!(!Error::NoAcknowledgement.is_transport_fault());
        assert!(!Error::MalformedReply(String::new()).is_transport_fault());
        assert!(!Error::Protocol(String::new()).is_transport_fault());
        assert!(!Error::InvalidParameter(String::new()).is_transport_fault());
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}
        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
