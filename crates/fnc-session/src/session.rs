//! Duplex connection session for the controller.
//!
//! This module provides the `Session` which handles:
//! - Opening and closing the one duplex text connection
//! - Line commands correlated positionally with their reply
//! - Fire-and-forget realtime control bytes
//! - Status requests (the `?` byte plus its telegram)
//!
//! The wire protocol has no request identifiers: the next line read after
//! a write *is* the reply. The session therefore holds its lock for the
//! whole write-then-read exchange, so a poller and a foreground command
//! sharing one session can never read each other's replies.
//!
//! Any read or write failure drops the connection; the session is
//! disconnected afterwards and the caller may reconnect.
//!
//! **Panic-Free Policy:** This module follows the project's panic-free guidelines.
//! No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, or `todo!()`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use fnc_core::{Config, StatusSnapshot};
use fnc_protocol::{parse_status, Realtime, Reply};

use crate::error::{Result, SessionError};

/// Maximum length of a single reply line (64 KiB).
pub const MAX_LINE_LEN: usize = 65_536;

/// Maximum number of lines collected for one multi-line reply.
pub const MAX_REPLY_LINES: usize = 4_096;

// ============================================================================
// Configuration
// ============================================================================

/// Connection settings for a [`Session`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// `host:port` of the duplex text channel.
    pub addr: String,

    /// Bound on connect and on each individual read or write.
    pub timeout: Duration,
}

impl SessionConfig {
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            timeout,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for SessionConfig {
    fn from(config: &Config) -> Self {
        Self::new(config.duplex_addr(), config.timeout())
    }
}

// ============================================================================
// Connection
// ============================================================================

/// One open duplex connection, split into buffered read and write halves.
struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Connection {
    fn new(stream: TcpStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }

    async fn write_bytes(&mut self, bytes: &[u8], limit: Duration) -> Result<()> {
        let writer = &mut self.writer;
        let write = async {
            writer.write_all(bytes).await?;
            writer.flush().await
        };

        match timeout(limit, write).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(SessionError::Transport(format!("write failed: {e}"))),
            Err(_) => Err(SessionError::Transport(format!(
                "write timed out after {limit:?}"
            ))),
        }
    }

    async fn write_line(&mut self, text: &str, limit: Duration) -> Result<()> {
        let mut frame = String::with_capacity(text.len().saturating_add(1));
        frame.push_str(text);
        frame.push('\n');
        self.write_bytes(frame.as_bytes(), limit).await
    }

    /// Reads one `\n`-terminated line and returns it trimmed.
    async fn read_line(&mut self, limit: Duration) -> Result<String> {
        let mut line = String::new();
        let mut bounded = (&mut self.reader).take(MAX_LINE_LEN as u64 + 1);

        match timeout(limit, bounded.read_line(&mut line)).await {
            Ok(Ok(0)) => Err(SessionError::Transport(
                "connection closed by controller".to_string(),
            )),
            Ok(Ok(n)) if n > MAX_LINE_LEN => Err(SessionError::Transport(format!(
                "reply line exceeds {MAX_LINE_LEN} bytes"
            ))),
            Ok(Ok(_)) => Ok(line.trim().to_string()),
            Ok(Err(e)) => Err(SessionError::Transport(format!("read failed: {e}"))),
            Err(_) => Err(SessionError::Transport(format!(
                "read timed out after {limit:?}"
            ))),
        }
    }

    async fn exchange(&mut self, text: &str, limit: Duration) -> Result<String> {
        self.write_line(text, limit).await?;
        self.read_line(limit).await
    }

    /// Writes a line, then collects reply lines up to the `ok` / `error`
    /// terminator. The terminator itself is not returned.
    async fn query(&mut self, text: &str, limit: Duration) -> Result<Vec<String>> {
        self.write_line(text, limit).await?;

        let mut lines = Vec::new();
        while lines.len() < MAX_REPLY_LINES {
            let line = self.read_line(limit).await?;
            let reply = Reply::classify(&line);
            if reply.is_terminal() {
                return match reply {
                    Reply::Error { code } => Err(SessionError::Rejected {
                        command: text.to_string(),
                        code,
                        reply: line,
                    }),
                    _ => Ok(lines),
                };
            }
            if !line.is_empty() {
                lines.push(line);
            }
        }

        Err(SessionError::Transport(format!(
            "reply to '{text}' exceeded {MAX_REPLY_LINES} lines without a terminator"
        )))
    }

    async fn close(mut self) {
        // The connection is gone either way
        let _ = self.writer.shutdown().await;
    }
}

/// Drops the connection if `result` is a transport failure.
fn settle<T>(slot: &mut Option<Connection>, result: Result<T>) -> Result<T> {
    if let Err(SessionError::Transport(reason)) = &result {
        warn!(reason = %reason, "Dropping connection after transport failure");
        *slot = None;
    }
    result
}

// ============================================================================
// Session
// ============================================================================

/// Owner of the duplex connection to the controller.
///
/// Created disconnected. At most one physical connection exists per session;
/// every operation that touches it takes the session lock for its full
/// exchange, so sharing a session through an `Arc` is safe.
///
/// # Example
///
/// ```rust,ignore
/// use fnc_session::{Session, SessionConfig};
/// use std::time::Duration;
///
/// let session = Session::new(SessionConfig::new("192.168.1.100:23", Duration::from_secs(5)));
/// session.connect().await?;
/// let reply = session.send_command("G0 X10").await?;
/// session.disconnect().await;
/// ```
pub struct Session {
    config: SessionConfig,

    /// The live connection, `None` while disconnected.
    conn: Mutex<Option<Connection>>,

    /// Set while a poller is driving this session.
    monitoring: AtomicBool,
}

impl Session {
    /// Creates a disconnected session.
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            conn: Mutex::new(None),
            monitoring: AtomicBool::new(false),
        }
    }

    /// Creates a disconnected session for the configured controller.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(SessionConfig::from(config))
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Opens the duplex connection.
    ///
    /// If a connection is already open it is closed first, so a failed
    /// reconnect leaves the session disconnected rather than holding a
    /// stale handle.
    ///
    /// # Errors
    ///
    /// `SessionError::Connection` on DNS failure, refusal or timeout.
    pub async fn connect(&self) -> Result<()> {
        let mut slot = self.conn.lock().await;

        if let Some(previous) = slot.take() {
            debug!(addr = %self.config.addr, "Closing existing connection before reconnect");
            previous.close().await;
        }

        let addr = self.config.addr.as_str();
        let stream = match timeout(self.config.timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(SessionError::Connection {
                    addr: addr.to_string(),
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                return Err(SessionError::Connection {
                    addr: addr.to_string(),
                    reason: format!("timed out after {:?}", self.config.timeout),
                })
            }
        };

        // Realtime bytes must not sit in the Nagle buffer
        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "Failed to set TCP_NODELAY");
        }

        *slot = Some(Connection::new(stream));
        info!(addr = %addr, "Connected to controller");
        Ok(())
    }

    /// Closes the connection if one is open. Always succeeds.
    pub async fn disconnect(&self) {
        let previous = self.conn.lock().await.take();
        if let Some(conn) = previous {
            conn.close().await;
            info!(addr = %self.config.addr, "Disconnected from controller");
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.conn.lock().await.is_some()
    }

    /// Returns true while a poller is driving this session.
    pub fn is_monitoring(&self) -> bool {
        self.monitoring.load(Ordering::Acquire)
    }

    pub(crate) fn set_monitoring(&self, monitoring: bool) {
        self.monitoring.store(monitoring, Ordering::Release);
    }

    /// Sends a line command and returns the next line read as its reply.
    ///
    /// # Errors
    ///
    /// - `SessionError::NotConnected` if no connection is open (no I/O happens)
    /// - `SessionError::Transport` on write/read failure or timeout
    pub async fn send_command(&self, text: &str) -> Result<String> {
        let mut slot = self.conn.lock().await;
        let conn = slot.as_mut().ok_or(SessionError::NotConnected)?;

        debug!(command = %text, "Sending command");
        let result = conn.exchange(text, self.config.timeout).await;
        let reply = settle(&mut slot, result)?;
        debug!(command = %text, reply = %reply, "Received reply");

        Ok(reply)
    }

    /// Sends a line command and collects its multi-line reply.
    ///
    /// Reads until the controller's `ok` line. An `error:N` terminator
    /// becomes `SessionError::Rejected` and leaves the connection open.
    /// Other lines that merely mention an error are part of the reply.
    pub async fn query(&self, text: &str) -> Result<Vec<String>> {
        let mut slot = self.conn.lock().await;
        let conn = slot.as_mut().ok_or(SessionError::NotConnected)?;

        debug!(command = %text, "Sending query");
        let result = conn.query(text, self.config.timeout).await;
        let lines = settle(&mut slot, result)?;
        debug!(command = %text, lines = lines.len(), "Query complete");

        Ok(lines)
    }

    /// Writes a single raw byte. No delimiter is added and no reply is read.
    ///
    /// Writing `?` this way leaves its telegram unread on the connection;
    /// use [`Session::request_status`] for status.
    pub async fn send_realtime_byte(&self, byte: u8) -> Result<()> {
        let mut slot = self.conn.lock().await;
        let conn = slot.as_mut().ok_or(SessionError::NotConnected)?;

        match Realtime::from_byte(byte) {
            Some(control) => debug!(control = %control, "Sending realtime control"),
            None => debug!(byte = format!("{byte:#04x}"), "Sending realtime byte"),
        }
        let result = conn.write_bytes(&[byte], self.config.timeout).await;
        settle(&mut slot, result)
    }

    /// Writes a realtime control byte.
    pub async fn send_realtime(&self, control: Realtime) -> Result<()> {
        self.send_realtime_byte(control.byte()).await
    }

    /// Requests one status telegram and parses it.
    ///
    /// The `?` byte and the read of its reply happen as one exchange.
    /// An unrecognized reply is returned as an empty snapshot, not an error.
    pub async fn request_status(&self) -> Result<StatusSnapshot> {
        let mut slot = self.conn.lock().await;
        let conn = slot.as_mut().ok_or(SessionError::NotConnected)?;

        let limit = self.config.timeout;
        let result = async {
            conn.write_bytes(&[Realtime::StatusQuery.byte()], limit)
                .await?;
            conn.read_line(limit).await
        }
        .await;
        let line = settle(&mut slot, result)?;

        Ok(parse_status(&line))
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("monitoring", &self.is_monitoring())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_config() -> SessionConfig {
        SessionConfig::new("127.0.0.1:1", Duration::from_millis(500))
    }

    #[test]
    fn test_session_config_from_config() {
        let config = Config {
            host: "cnc.local".to_string(),
            duplex_port: 8023,
            timeout_ms: 1500,
            ..Default::default()
        };
        let session_config = SessionConfig::from(&config);

        assert_eq!(session_config.addr, "cnc.local:8023");
        assert_eq!(session_config.timeout, Duration::from_millis(1500));
    }

    #[test]
    fn test_session_config_default() {
        let config = SessionConfig::default();
        assert_eq!(config.addr, "192.168.1.100:23");
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_new_session_is_disconnected() {
        let session = Session::new(unreachable_config());
        assert!(!session.is_connected().await);
        assert!(!session.is_monitoring());
    }

    #[tokio::test]
    async fn test_send_command_when_disconnected() {
        let session = Session::new(unreachable_config());
        let result = session.send_command("$I").await;
        assert!(matches!(result, Err(SessionError::NotConnected)));
    }

    #[tokio::test]
    async fn test_realtime_and_status_when_disconnected() {
        let session = Session::new(unreachable_config());

        assert!(matches!(
            session.send_realtime(Realtime::FeedHold).await,
            Err(SessionError::NotConnected)
        ));
        assert!(matches!(
            session.request_status().await,
            Err(SessionError::NotConnected)
        ));
        assert!(matches!(
            session.query("$$").await,
            Err(SessionError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_disconnect_twice_is_noop() {
        let session = Session::new(unreachable_config());
        session.disconnect().await;
        session.disconnect().await;
        assert!(!session.is_connected().await);
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop to obtain a port with nothing listening
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let session = Session::new(SessionConfig::new(
            addr.to_string(),
            Duration::from_secs(2),
        ));
        let result = session.connect().await;

        match result {
            Err(SessionError::Connection { addr: failed, .. }) => {
                assert_eq!(failed, addr.to_string());
            }
            other => panic!("Expected Connection error, got {other:?}"),
        }
        assert!(!session.is_connected().await);
    }

    #[test]
    fn test_monitoring_flag() {
        let session = Session::new(unreachable_config());
        session.set_monitoring(true);
        assert!(session.is_monitoring());
        session.set_monitoring(false);
        assert!(!session.is_monitoring());
    }

    #[test]
    fn test_session_debug() {
        let session = Session::new(unreachable_config());
        let debug = format!("{session:?}");
        assert!(debug.contains("Session"));
        assert!(debug.contains("127.0.0.1:1"));
    }
}
