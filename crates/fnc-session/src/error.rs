//! Error types for the session layer.
//!
//! `NotConnected` and `Connection` are recoverable by (re)connecting.
//! `Transport` means the connection was dropped and must be re-established.
//! `Rejected` is the controller refusing a command; the connection stays up.
//!
//! **Panic-Free Policy:** This module follows the project's panic-free guidelines.
//! No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, or `todo!()`.

use std::io;

use thiserror::Error;

// ============================================================================
// Session Error Type
// ============================================================================

/// Session, poller and command surface errors.
#[derive(Error, Debug)]
pub enum SessionError {
    /// An operation needed the duplex connection but none is open.
    ///
    /// No I/O was attempted.
    #[error("Not connected to controller")]
    NotConnected,

    /// Opening the duplex connection failed (DNS, refused, timeout).
    #[error("Failed to connect to {addr}: {reason}")]
    Connection { addr: String, reason: String },

    /// A read or write on an open connection failed.
    ///
    /// The session has already dropped the connection when this is returned.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The controller answered with an error reply.
    #[error("Controller rejected '{command}': {reply}")]
    Rejected {
        command: String,
        code: Option<u32>,
        reply: String,
    },

    /// A G-code job failed on a specific source line.
    #[error("Job failed on line {line}: {source}")]
    JobLine {
        line: usize,
        #[source]
        source: Box<SessionError>,
    },

    /// Local I/O, e.g. reading a job file.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl SessionError {
    /// Returns true if the connection is gone and must be re-established.
    pub fn is_disconnect(&self) -> bool {
        match self {
            Self::NotConnected | Self::Connection { .. } | Self::Transport(_) => true,
            Self::JobLine { source, .. } => source.is_disconnect(),
            Self::Rejected { .. } | Self::Io(_) => false,
        }
    }
}

// ============================================================================
// Result Type Alias
// ============================================================================

/// Convenience Result type alias for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;

// ============================================================================
// Tests
// ============================================================================
