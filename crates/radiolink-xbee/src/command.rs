//! AT command-mode session.
//!
//! A modem in transparent mode forwards every serial byte over the air. To
//! talk to the modem itself the host must send the `+++` guard escape with
//! silence on either side, wait for `OK`, issue AT directives, and finally
//! send `ATCN` to drop back to transparent mode. [`CommandModeSession`]
//! drives that handshake as an explicit state machine:
//!
//! ```text
//! Idle -> AwaitingGuard -> Active -> Querying -> Exiting -> Idle
//!              |
//!              +--> Failed  (no OK within the ack window)
//! ```
//!
//! Steps are strictly sequential and the session holds the transport's only
//! mutable borrow for its whole lifetime, so two cycles on one transport
//! cannot interleave. There are no retries inside a cycle; the caller's loop
//! decides when to try again.

use std::fmt;
use std::time::Duration;

use radiolink_core::{Error, Result, Transport};
use tracing::{debug, trace, warn};

/// Guard escape that requests command mode. Sent without a terminator.
pub const ESCAPE_SEQUENCE: &[u8] = b"+++";

/// Token the modem answers with once it is in command mode.
pub const ACK_TOKEN: &[u8] = b"OK";

/// Terminator of AT directives and of the modem's replies.
pub const CR: u8 = b'\r';

/// The AT directives this session can issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtCommand {
    /// `ATDB`: received signal strength of the last packet, as hex `-dBm`.
    SignalStrength,
    /// `ATCN`: leave command mode.
    ExitCommandMode,
}

impl AtCommand {
    /// Two-letter mnemonic (`DB`, `CN`).
    pub fn mnemonic(&self) -> &'static str {
        match self {
            AtCommand::SignalStrength => "DB",
            AtCommand::ExitCommandMode => "CN",
        }
    }

    /// Wire form: `AT` + mnemonic + carriage return.
    pub fn encode(&self) -> Vec<u8> {
        format!("AT{}\r", self.mnemonic()).into_bytes()
    }
}

/// Guard times, settle delays and read limits for one command-mode cycle.
///
/// Defaults match the modem's factory guard time (`GT` = 1 s).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTiming {
    /// Silence kept on the line before `+++`.
    pub guard_before: Duration,
    /// Silence kept after `+++` before the acknowledgement is read.
    pub guard_after: Duration,
    /// How long each reply read may take.
    pub read_window: Duration,
    /// Delay between writing a query and reading its reply.
    pub query_settle: Duration,
    /// Delay between writing `ATCN` and discarding its echo.
    pub exit_settle: Duration,
    /// Maximum bytes read per reply.
    pub reply_len: usize,
}

impl Default for CommandTiming {
    fn default() -> Self {
        CommandTiming {
            guard_before: Duration::ZERO,
            guard_after: Duration::from_secs(1),
            read_window: Duration::from_secs(1),
            query_settle: Duration::from_millis(500),
            exit_settle: Duration::from_millis(500),
            reply_len: 10,
        }
    }
}

/// Position of a [`CommandModeSession`] in the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandModeState {
    Idle,
    AwaitingGuard,
    Active,
    Querying,
    Exiting,
    Failed,
}

impl fmt::Display for CommandModeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Read one reply of at most `max_len` bytes.
///
/// Always attempts at least one read, then keeps reading until `max_len`
/// bytes arrived, a carriage return was seen, the line went quiet, or
/// `window` elapsed. A quiet line is not an error; the bytes gathered so
/// far (possibly none) are returned.
async fn read_reply(
    transport: &mut dyn Transport,
    max_len: usize,
    window: Duration,
) -> Result<Vec<u8>> {
    let deadline = tokio::time::Instant::now() + window;
    let mut reply = Vec::with_capacity(max_len);
    let mut buf = [0u8; 64];

    while reply.len() < max_len {
        let want = (max_len - reply.len()).min(buf.len());
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        match transport.receive(&mut buf[..want], remaining).await {
            Ok(0) => break,
            Ok(n) => {
                reply.extend_from_slice(&buf[..n]);
                if buf[..n].contains(&CR) {
                    break;
                }
            }
            Err(Error::Timeout) => break,
            Err(e) => return Err(e),
        }
        if tokio::time::Instant::now() >= deadline {
            break;
        }
    }

    Ok(reply)
}

fn contains_token(haystack: &[u8], token: &[u8]) -> bool {
    haystack.windows(token.len()).any(|w| w == token)
}

/// One command-mode cycle over a borrowed transport.
pub struct CommandModeSession<'a> {
    transport: &'a mut dyn Transport,
    timing: &'a CommandTiming,
    state: CommandModeState,
}

impl<'a> CommandModeSession<'a> {
    /// Start a cycle in the [`Idle`](CommandModeState::Idle) state.
    pub fn new(transport: &'a mut dyn Transport, timing: &'a CommandTiming) -> Self {
        CommandModeSession {
            transport,
            timing,
            state: CommandModeState::Idle,
        }
    }

    pub fn state(&self) -> CommandModeState {
        self.state
    }

    fn transition(&mut self, next: CommandModeState) {
        debug!(from = %self.state, to = %next, "command-mode transition");
        self.state = next;
    }

    fn require(&self, allowed: &[CommandModeState], step: &str) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(Error::Protocol(format!(
                "cannot {step} in command-mode state {}",
                self.state
            )))
        }
    }

    /// Send the guard escape and wait for the modem's acknowledgement.
    ///
    /// Ends in [`Active`](CommandModeState::Active) on success. Without an
    /// `OK` the session moves to [`Failed`](CommandModeState::Failed) and
    /// [`Error::NoAcknowledgement`] is returned.
    pub async fn enter(&mut self) -> Result<()> {
        self.require(&[CommandModeState::Idle], "enter command mode")?;

        if !self.timing.guard_before.is_zero() {
            tokio::time::sleep(self.timing.guard_before).await;
        }

        if let Err(e) = self.transport.send(ESCAPE_SEQUENCE).await {
            self.transition(CommandModeState::Failed);
            return Err(e);
        }
        self.transition(CommandModeState::AwaitingGuard);

        tokio::time::sleep(self.timing.guard_after).await;

        let reply =
            match read_reply(&mut *self.transport, self.timing.reply_len, self.timing.read_window)
                .await
            {
                Ok(reply) => reply,
                Err(e) => {
                    self.transition(CommandModeState::Failed);
                    return Err(e);
                }
            };

        if contains_token(&reply, ACK_TOKEN) {
            self.transition(CommandModeState::Active);
            Ok(())
        } else {
            warn!(
                reply = %String::from_utf8_lossy(&reply).trim(),
                "modem did not acknowledge command-mode escape"
            );
            self.transition(CommandModeState::Failed);
            Err(Error::NoAcknowledgement)
        }
    }

    /// Issue `command` and return the raw reply bytes.
    ///
    /// The reply is not interpreted here; an empty vector means the modem
    /// stayed silent. The session stays in
    /// [`Querying`](CommandModeState::Querying) even if the write fails, so
    /// [`exit`](Self::exit) can still restore transparent mode.
    pub async fn query(&mut self, command: AtCommand) -> Result<Vec<u8>> {
        self.require(&[CommandModeState::Active], "query")?;
        self.transition(CommandModeState::Querying);

        self.transport.send(&command.encode()).await?;
        tokio::time::sleep(self.timing.query_settle).await;

        let reply =
            read_reply(&mut *self.transport, self.timing.reply_len, self.timing.read_window)
                .await?;
        trace!(command = command.mnemonic(), reply = ?reply, "AT reply");
        Ok(reply)
    }

    /// Send `ATCN`, discard its echo, and return to
    /// [`Idle`](CommandModeState::Idle).
    pub async fn exit(&mut self) -> Result<()> {
        self.require(
            &[CommandModeState::Active, CommandModeState::Querying],
            "exit command mode",
        )?;
        self.transition(CommandModeState::Exiting);

        self.transport
            .send(&AtCommand::ExitCommandMode.encode())
            .await?;
        tokio::time::sleep(self.timing.exit_settle).await;

        let discarded =
            read_reply(&mut *self.transport, self.timing.reply_len, self.timing.read_window)
                .await?;
        trace!(bytes = discarded.len(), "discarded ATCN reply");

        self.transition(CommandModeState::Idle);
        Ok(())
    }
}

/// Run one full cycle: enter, issue `command`, exit.
///
/// The exit directive is sent whatever the query reply looks like. If the
/// query itself fails with a recoverable error the exit is still attempted
/// before that error is returned; transport faults return immediately.
/// A recoverable failure of the exit step is logged and does not discard
/// the query reply.
pub async fn query_once(
    transport: &mut dyn Transport,
    timing: &CommandTiming,
    command: AtCommand,
) -> Result<Vec<u8>> {
    let mut session = CommandModeSession::new(transport, timing);
    session.enter().await?;

    let reply = session.query(command).await;
    if let Err(e) = &reply {
        if e.is_transport_fault() {
            return reply;
        }
    }

    if let Err(e) = session.exit().await {
        if e.is_transport_fault() {
            return Err(e);
        }
        warn!(error = %e, "failed to leave command mode cleanly");
    }
    reply
}

#[cfg(test)]
mod tests {
    use super::*;
    use radiolink_test_harness::MockTransport;

    fn fast_timing() -> CommandTiming {
        CommandTiming {
            guard_before: Duration::ZERO,
            guard_after: Duration::ZERO,
            read_window: Duration::from_millis(20),
            query_settle: Duration::ZERO,
            exit_settle: Duration::ZERO,
            reply_len: 10,
        }
    }

    // -----------------------------------------------------------------------
    // AtCommand
    // -----------------------------------------------------------------------

    #[test]
    fn at_command_encoding() {
        assert_eq!(AtCommand::SignalStrength.encode(), b"ATDB\r");
        assert_eq!(AtCommand::ExitCommandMode.encode(), b"ATCN\r");
    }

    #[test]
    fn default_timing_matches_factory_guard_time() {
        let t = CommandTiming::default();
        assert_eq!(t.guard_before, Duration::ZERO);
        assert_eq!(t.guard_after, Duration::from_secs(1));
        assert_eq!(t.read_window, Duration::from_secs(1));
        assert_eq!(t.query_settle, Duration::from_millis(500));
        assert_eq!(t.exit_settle, Duration::from_millis(500));
        assert_eq!(t.reply_len, 10);
    }

    #[test]
    fn token_search() {
        assert!(contains_token(b"OK\r", ACK_TOKEN));
        assert!(contains_token(b"\r\nOK\r", ACK_TOKEN));
        assert!(!contains_token(b"O", ACK_TOKEN));
        assert!(!contains_token(b"ERROR\r", ACK_TOKEN));
    }

    // -----------------------------------------------------------------------
    // Session state machine
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn full_cycle_walks_every_state() {
        let mut mock = MockTransport::new();
        mock.expect(b"+++", b"OK\r");
        mock.expect(b"ATDB\r", b"4A\r");
        mock.expect(b"ATCN\r", b"OK\r");
        let timing = fast_timing();

        let mut session = CommandModeSession::new(&mut mock, &timing);
        assert_eq!(session.state(), CommandModeState::Idle);

        session.enter().await.unwrap();
        assert_eq!(session.state(), CommandModeState::Active);

        let reply = session.query(AtCommand::SignalStrength).await.unwrap();
        assert_eq!(session.state(), CommandModeState::Querying);
        assert_eq!(reply, b"4A\r");

        session.exit().await.unwrap();
        assert_eq!(session.state(), CommandModeState::Idle);
        drop(session);

        assert_eq!(mock.remaining_expectations(), 0);
        assert_eq!(mock.unread(), 0);
    }

    #[tokio::test]
    async fn no_ack_fails_without_query() {
        let mut mock = MockTransport::new();
        mock.expect(b"+++", b"");
        let timing = fast_timing();

        let mut session = CommandModeSession::new(&mut mock, &timing);
        let result = session.enter().await;
        assert!(matches!(result, Err(Error::NoAcknowledgement)));
        assert_eq!(session.state(), CommandModeState::Failed);

        // Failed is terminal for the cycle.
        assert!(matches!(
            session.query(AtCommand::SignalStrength).await,
            Err(Error::Protocol(_))
        ));
        assert!(matches!(session.exit().await, Err(Error::Protocol(_))));
        drop(session);

        assert_eq!(mock.sent_data(), vec![b"+++".to_vec()]);
    }

    #[tokio::test]
    async fn garbage_instead_of_ack_fails() {
        let mut mock = MockTransport::new();
        mock.expect(b"+++", b"ERROR\r");
        let timing = fast_timing();

        let mut session = CommandModeSession::new(&mut mock, &timing);
        assert!(matches!(
            session.enter().await,
            Err(Error::NoAcknowledgement)
        ));
    }

    #[tokio::test]
    async fn reply_read_is_bounded() {
        let mut mock = MockTransport::new();
        mock.expect(b"+++", b"OK\r");
        mock.expect(b"ATDB\r", b"0123456789ABCDEF");
        let timing = fast_timing();

        let mut session = CommandModeSession::new(&mut mock, &timing);
        session.enter().await.unwrap();
        let reply = session.query(AtCommand::SignalStrength).await.unwrap();
        assert_eq!(reply, b"0123456789");
        drop(session);
        assert_eq!(mock.unread(), 6);
    }

    #[tokio::test]
    async fn query_before_enter_is_rejected() {
        let mut mock = MockTransport::new();
        let timing = fast_timing();
        let mut session = CommandModeSession::new(&mut mock, &timing);
        assert!(matches!(
            session.query(AtCommand::SignalStrength).await,
            Err(Error::Protocol(_))
        ));
        drop(session);
        assert!(mock.sent_data().is_empty());
    }

    #[tokio::test]
    async fn transport_fault_during_escape() {
        let mut mock = MockTransport::new();
        mock.set_connected(false);
        let timing = fast_timing();

        let mut session = CommandModeSession::new(&mut mock, &timing);
        let result = session.enter().await;
        assert!(matches!(result, Err(Error::NotConnected)));
        assert_eq!(session.state(), CommandModeState::Failed);
    }

    // -----------------------------------------------------------------------
    // query_once
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn query_once_exits_after_malformed_reply() {
        let mut mock = MockTransport::new();
        mock.expect(b"+++", b"OK\r");
        mock.expect(b"ATDB\r", b"??\r");
        mock.expect(b"ATCN\r", b"OK\r");

        let reply = query_once(&mut mock, &fast_timing(), AtCommand::SignalStrength)
            .await
            .unwrap();
        assert_eq!(reply, b"??\r");
        assert_eq!(mock.remaining_expectations(), 0);
    }

    #[tokio::test]
    async fn query_once_exits_after_silent_reply() {
        let mut mock = MockTransport::new();
        mock.expect(b"+++", b"OK\r");
        mock.expect(b"ATDB\r", b"");
        mock.expect(b"ATCN\r", b"");

        let reply = query_once(&mut mock, &fast_timing(), AtCommand::SignalStrength)
            .await
            .unwrap();
        assert!(reply.is_empty());
        assert_eq!(mock.sent_data().last().unwrap(), b"ATCN\r");
    }

    #[tokio::test]
    async fn exit_still_possible_after_failed_query_write() {
        let mut mock = MockTransport::new();
        mock.expect(b"+++", b"OK\r");
        mock.expect(b"ATCN\r", b"OK\r");
        let observer = mock.clone();
        let timing = fast_timing();

        let mut session = CommandModeSession::new(&mut mock, &timing);
        session.enter().await.unwrap();
        observer.fail_next_send(Error::Timeout);

        let result = session.query(AtCommand::SignalStrength).await;
        assert!(matches!(result, Err(Error::Timeout)));
        assert_eq!(session.state(), CommandModeState::Querying);

        session.exit().await.unwrap();
        assert_eq!(session.state(), CommandModeState::Idle);
        drop(session);
        assert_eq!(
            observer.sent_data(),
            vec![b"+++".to_vec(), b"ATDB\r".to_vec(), b"ATCN\r".to_vec()]
        );
    }

    #[tokio::test]
    async fn query_once_keeps_reply_when_exit_times_out() {
        let mut mock = MockTransport::new();
        mock.expect(b"+++", b"OK\r");
        mock.expect(b"ATDB\r", b"4A\r");
        mock.expect_failure(b"ATCN\r", Error::Timeout);

        let reply = query_once(&mut mock, &fast_timing(), AtCommand::SignalStrength)
            .await
            .unwrap();
        assert_eq!(reply, b"4A\r");
        assert_eq!(mock.sent_data().len(), 3);
    }

    #[tokio::test]
    async fn query_once_propagates_transport_fault_on_exit() {
        let mut mock = MockTransport::new();
        mock.expect(b"+++", b"OK\r");
        mock.expect(b"ATDB\r", b"4A\r");
        mock.expect_failure(b"ATCN\r", Error::ConnectionLost);

        let result = query_once(&mut mock, &fast_timing(), AtCommand::SignalStrength).await;
        assert!(matches!(result, Err(Error::ConnectionLost)));
    }

    #[tokio::test]
    async fn split_reply_is_assembled_and_stops_at_cr() {
        let mut mock = MockTransport::new();
        mock.set_read_chunk(1);
        mock.inject(b"4A\rXX");

        let reply = read_reply(&mut mock, 10, Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(reply, b"4A\r");
        assert_eq!(mock.unread(), 2);
    }

    #[tokio::test]
    async fn split_reply_through_query() {
        let mut mock = MockTransport::new();
        mock.set_read_chunk(2);
        mock.expect(b"+++", b"OK\r");
        mock.expect(b"ATDB\r", b"4A\r");
        let timing = fast_timing();

        let mut session = CommandModeSession::new(&mut mock, &timing);
        session.enter().await.unwrap();
        let reply = session.query(AtCommand::SignalStrength).await.unwrap();
        assert_eq!(reply, b"4A\r");
    }

    #[tokio::test]
    async fn guard_before_delays_escape() {
        let observer = MockTransport::new();
        observer.expect(b"+++", b"OK\r");
        let mut worker = observer.clone();

        let task = tokio::spawn(async move {
            let timing = CommandTiming {
                guard_before: Duration::from_millis(300),
                ..fast_timing()
            };
            let started = tokio::time::Instant::now();
            CommandModeSession::new(&mut worker, &timing).enter().await?;
            Ok::<_, Error>(started.elapsed())
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(observer.sent_data().is_empty());

        let elapsed = task.await.unwrap().unwrap();
        assert!(elapsed >= Duration::from_millis(300));
        assert_eq!(observer.sent_data(), vec![b"+++".to_vec()]);
    }

    #[tokio::test]
    async fn query_once_skips_query_without_ack() {
        let mut mock = MockTransport::new();
        mock.expect(b"+++", b"");

        let result = query_once(&mut mock, &fast_timing(), AtCommand::SignalStrength).await;
        assert!(matches!(result, Err(Error::NoAcknowledgement)));
        assert_eq!(mock.sent_data().len(), 1);
    }

    #[tokio::test]
    async fn read_fault_during_ack_propagates() {
        let mut mock = MockTransport::new();
        mock.expect(b"+++", b"OK\r");
        mock.fail_next_receive(Error::ConnectionLost);
        let timing = fast_timing();

        let mut session = CommandModeSession::new(&mut mock, &timing);
        assert!(matches!(session.enter().await, Err(Error::ConnectionLost)));
        assert_eq!(session.state(), CommandModeState::Failed);
    }

    #[tokio::test]
    async fn read_fault_during_query_propagates() {
        let mut mock = MockTransport::new();
        mock.expect(b"+++", b"OK\r");
        mock.expect(b"ATDB\r", b"");
        let observer = mock.clone();
        let timing = fast_timing();

        let mut session = CommandModeSession::new(&mut mock, &timing);
        session.enter().await.unwrap();
        observer.fail_next_receive(Error::ConnectionLost);
        let result = session.query(AtCommand::SignalStrength).await;
        assert!(matches!(result, Err(Error::ConnectionLost)));
    }
}
