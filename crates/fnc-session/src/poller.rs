//! Periodic status polling.
//!
//! The `Poller` drives a [`Session`] on a timer: each tick sends the `?`
//! realtime byte, reads the telegram, parses it and hands the snapshot to
//! a caller-supplied sink.
//!
//! Failures on a tick are logged and counted, never fatal. A transport
//! failure on the poller's own exchange drops the connection, and the next
//! tick reconnects once. Cancellation ends the loop, and so does finding
//! the session disconnected by someone else (`Session::disconnect`): the
//! poller does not reopen a connection it did not lose itself.
//!
//! Cancellation is checked between ticks. A tick already in flight runs
//! to completion, so a stuck read delays shutdown by up to the session
//! timeout.
//!
//! # Panic-Free Guarantees
//!
//! All code follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use fnc_core::StatusSnapshot;

use crate::error::{Result, SessionError};
use crate::session::Session;

/// Shortest tick period accepted.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Counters describing one polling run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    /// Ticks executed.
    pub ticks: u64,

    /// Snapshots delivered to the sink.
    pub snapshots: u64,

    /// Ticks that failed (reconnect, write or read).
    pub errors: u64,

    /// True if the loop ended because the session was disconnected
    /// elsewhere rather than by cancellation.
    pub disconnected: bool,
}

/// What the loop does after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tick {
    Continue,
    /// The poller's own exchange lost the connection; reconnect next tick.
    Reconnect,
    /// The session was disconnected elsewhere.
    Stop,
}

/// Status poller bound to one session.
///
/// The poller owns the session's connection for the duration of
/// [`Poller::monitor`]: it connects if needed and disconnects on exit.
pub struct Poller {
    session: Arc<Session>,
    interval: Duration,
}

impl Poller {
    /// Creates a poller ticking every `interval`.
    #[must_use]
    pub fn new(session: Arc<Session>, interval: Duration) -> Self {
        Self { session, interval }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Polls until `cancel_token` is cancelled or the session is
    /// disconnected by another caller.
    ///
    /// Connects the session first if it is not connected; that initial
    /// connect is the only error returned. On exit the session is
    /// disconnected and its monitoring flag cleared.
    pub async fn monitor<F>(
        &self,
        mut sink: F,
        cancel_token: CancellationToken,
    ) -> Result<PollSummary>
    where
        F: FnMut(StatusSnapshot),
    {
        if !self.session.is_connected().await {
            self.session.connect().await?;
        }

        self.session.set_monitoring(true);
        let mut summary = PollSummary::default();
        // tokio's interval rejects a zero period
        let mut tick = interval(self.interval.max(MIN_INTERVAL));
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            addr = %self.session.config().addr,
            interval_ms = self.interval.as_millis() as u64,
            "Status poller started"
        );

        let mut reconnect = false;
        loop {
            tokio::select! {
                biased;

                _ = cancel_token.cancelled() => {
                    info!("Status poller shutting down");
                    break;
                }

                _ = tick.tick() => {
                    match self.poll_once(&mut sink, &mut summary, reconnect).await {
                        Tick::Continue => reconnect = false,
                        Tick::Reconnect => reconnect = true,
                        Tick::Stop => {
                            info!("Session disconnected, status poller stopping");
                            summary.disconnected = true;
                            break;
                        }
                    }
                }
            }
        }

        self.session.set_monitoring(false);
        self.session.disconnect().await;

        debug!(
            ticks = summary.ticks,
            snapshots = summary.snapshots,
            errors = summary.errors,
            "Status poller completed"
        );
        Ok(summary)
    }

    /// Spawns [`Poller::monitor`] as a task.
    pub fn spawn<F>(
        self,
        sink: F,
        cancel_token: CancellationToken,
    ) -> tokio::task::JoinHandle<Result<PollSummary>>
    where
        F: FnMut(StatusSnapshot) + Send + 'static,
    {
        tokio::spawn(async move { self.monitor(sink, cancel_token).await })
    }

    /// Runs one tick. Never fails; problems are logged and counted.
    ///
    /// `reconnect` is set when the previous tick lost the connection
    /// itself; only then is a closed session reopened.
    async fn poll_once<F>(&self, sink: &mut F, summary: &mut PollSummary, reconnect: bool) -> Tick
    where
        F: FnMut(StatusSnapshot),
    {
        summary.ticks = summary.ticks.saturating_add(1);

        if !self.session.is_connected().await {
            if !reconnect {
                return Tick::Stop;
            }
            if let Err(e) = self.session.connect().await {
                summary.errors = summary.errors.saturating_add(1);
                warn!(error = %e, "Status poll reconnect failed");
                return Tick::Reconnect;
            }
            info!("Status poller reconnected");
        }

        match self.session.request_status().await {
            Ok(snapshot) => {
                if !snapshot.is_recognized() {
                    debug!(raw = %snapshot.raw, "Unrecognized status reply");
                }
                summary.snapshots = summary.snapshots.saturating_add(1);
                sink(snapshot);
                Tick::Continue
            }
            // Closed between the check above and the request
            Err(SessionError::NotConnected) => Tick::Stop,
            Err(e) => {
                summary.errors = summary.errors.saturating_add(1);
                warn!(error = %e, "Status poll failed");
                if e.is_disconnect() {
                    Tick::Reconnect
                } else {
                    Tick::Continue
                }
            }
        }
    }
}
