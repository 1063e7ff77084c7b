//! Machine control and information commands.
//!
//! Thin mappings onto [`Session`] primitives. Errors from the session are
//! returned unchanged; the only local check is turning an `error:N` reply
//! to `$H`/`$X` into `SessionError::Rejected`.

use fnc_core::{AlarmRecord, StatusSnapshot};
use fnc_protocol::{parse_alarms, LineCommand, Realtime, Reply};

use crate::error::{Result, SessionError};
use crate::session::Session;

impl Session {
    /// Pauses motion (`!`).
    pub async fn feed_hold(&self) -> Result<()> {
        self.send_realtime(Realtime::FeedHold).await
    }

    /// Resumes after a feed hold (`~`).
    pub async fn cycle_start(&self) -> Result<()> {
        self.send_realtime(Realtime::CycleStart).await
    }

    /// Soft-resets the controller (Ctrl-X).
    pub async fn soft_reset(&self) -> Result<()> {
        self.send_realtime(Realtime::SoftReset).await
    }

    /// Runs the homing cycle (`$H`).
    pub async fn home(&self) -> Result<()> {
        self.run_checked(LineCommand::Home).await
    }

    /// Clears an alarm lock (`$X`).
    pub async fn unlock(&self) -> Result<()> {
        self.run_checked(LineCommand::Unlock).await
    }

    /// One-shot status snapshot.
    pub async fn status(&self) -> Result<StatusSnapshot> {
        self.request_status().await
    }

    /// Active alarms reported by `$alarms`.
    pub async fn alarms(&self) -> Result<Vec<AlarmRecord>> {
        let lines = self.query(LineCommand::Alarms.as_str()).await?;
        Ok(parse_alarms(&lines.join("\n")))
    }

    /// Settings dump (`$$`).
    pub async fn settings(&self) -> Result<String> {
        self.query_text(LineCommand::Settings).await
    }

    /// Available `$` commands.
    pub async fn commands(&self) -> Result<String> {
        self.query_text(LineCommand::Commands).await
    }

    /// Firmware build and version information (`$I`).
    pub async fn version(&self) -> Result<String> {
        self.query_text(LineCommand::Version).await
    }

    async fn query_text(&self, command: LineCommand) -> Result<String> {
        Ok(self.query(command.as_str()).await?.join("\n"))
    }

    /// Sends `command`, discarding the reply unless it reports an error.
    async fn run_checked(&self, command: LineCommand) -> Result<()> {
        let reply = self.send_command(command.as_str()).await?;
        match Reply::classify(&reply) {
            Reply::Error { code } => Err(SessionError::Rejected {
                command: command.to_string(),
                code,
                reply,
            }),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionConfig;
    use std::time::Duration;

    fn disconnected() -> Session {
        Session::new(SessionConfig::new("127.0.0.1:1", Duration::from_millis(200)))
    }

    #[tokio::test]
    async fn test_controls_fail_verbatim_when_disconnected() {
        let session = disconnected();

        assert!(matches!(session.feed_hold().await, Err(SessionError::NotConnected)));
        assert!(matches!(session.cycle_start().await, Err(SessionError::NotConnected)));
        assert!(matches!(session.soft_reset().await, Err(SessionError::NotConnected)));
        assert!(matches!(session.home().await, Err(SessionError::NotConnected)));
        assert!(matches!(session.unlock().await, Err(SessionError::NotConnected)));
        assert!(matches!(session.alarms().await, Err(SessionError::NotConnected)));
        assert!(matches!(session.version().await, Err(SessionError::NotConnected)));
    }
}
