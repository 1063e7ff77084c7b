//! Line-by-line G-code job execution.
//!
//! Each executable line is sent with [`Session::send_command`] and its
//! reply checked for errors. With monitoring enabled a [`Poller`] runs on
//! the same session; because every exchange holds the session lock from
//! write to read, status requests slot in between job lines and never
//! split a command from its reply.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use fnc_core::StatusSnapshot;
use fnc_protocol::Reply;

use crate::error::{Result, SessionError};
use crate::poller::Poller;
use crate::session::Session;

/// Settings for one job run.
#[derive(Debug, Clone, Default)]
pub struct JobOptions {
    /// Pause after each sent line.
    pub command_delay: Duration,

    /// Poll status at this interval while the job runs.
    pub monitor_interval: Option<Duration>,
}

/// Outcome of a job that ran without errors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobSummary {
    /// Lines sent to the controller.
    pub sent: usize,

    /// Blank and comment lines skipped.
    pub skipped: usize,

    /// True if the job stopped early on cancellation.
    pub cancelled: bool,
}

/// Returns true for lines that should be sent: not blank, not a
/// `;` comment, not a `(` comment.
pub fn is_executable_line(line: &str) -> bool {
    let line = line.trim();
    !(line.is_empty() || line.starts_with(';') || line.starts_with('('))
}

/// Reads `path` and runs it with [`run_gcode`].
pub async fn run_gcode_file<F>(
    session: Arc<Session>,
    path: &Path,
    options: JobOptions,
    sink: F,
    cancel_token: CancellationToken,
) -> Result<JobSummary>
where
    F: FnMut(StatusSnapshot) + Send + 'static,
{
    let program = tokio::fs::read_to_string(path).await?;
    info!(path = %path.display(), "Running G-code file");
    run_gcode(session, &program, options, sink, cancel_token).await
}

/// Sends every executable line of `program`, in order.
///
/// Connects the session if needed and disconnects it when done. Stops at
/// the first failing line with `SessionError::JobLine` carrying the
/// 1-based source line number. Cancellation is checked between lines.
pub async fn run_gcode<F>(
    session: Arc<Session>,
    program: &str,
    options: JobOptions,
    sink: F,
    cancel_token: CancellationToken,
) -> Result<JobSummary>
where
    F: FnMut(StatusSnapshot) + Send + 'static,
{
    if !session.is_connected().await {
        session.connect().await?;
    }

    let poller_token = CancellationToken::new();
    let poller_handle = options.monitor_interval.map(|interval| {
        Poller::new(Arc::clone(&session), interval).spawn(sink, poller_token.clone())
    });

    let result = send_lines(&session, program, &options, &cancel_token).await;

    poller_token.cancel();
    if let Some(handle) = poller_handle {
        match handle.await {
            Ok(Ok(summary)) => debug!(
                snapshots = summary.snapshots,
                errors = summary.errors,
                "Job monitor stopped"
            ),
            Ok(Err(e)) => warn!(error = %e, "Job monitor failed"),
            Err(e) => warn!(error = %e, "Job monitor task panicked"),
        }
    }

    session.disconnect().await;
    result
}

async fn send_lines(
    session: &Session,
    program: &str,
    options: &JobOptions,
    cancel_token: &CancellationToken,
) -> Result<JobSummary> {
    let mut summary = JobSummary::default();

    for (index, raw) in program.lines().enumerate() {
        let line_number = index.saturating_add(1);
        let line = raw.trim();

        if !is_executable_line(line) {
            summary.skipped = summary.skipped.saturating_add(1);
            continue;
        }

        if cancel_token.is_cancelled() {
            info!(line = line_number, "Job cancelled");
            summary.cancelled = true;
            return Ok(summary);
        }

        debug!(line = line_number, gcode = %line, "Sending job line");
        let reply = session
            .send_command(line)
            .await
            .map_err(|e| SessionError::JobLine {
                line: line_number,
                source: Box::new(e),
            })?;

        if Reply::mentions_error(&reply) {
            let code = match Reply::classify(&reply) {
                Reply::Error { code } => code,
                _ => None,
            };
            return Err(SessionError::JobLine {
                line: line_number,
                source: Box::new(SessionError::Rejected {
                    command: line.to_string(),
                    code,
                    reply,
                }),
            });
        }
        debug!(line = line_number, reply = %reply, "Job line acknowledged");
        summary.sent = summary.sent.saturating_add(1);

        if !options.command_delay.is_zero() {
            sleep(options.command_delay).await;
        }
    }

    info!(sent = summary.sent, skipped = summary.skipped, "Job complete");
    Ok(summary)
}
