//! fnc - command-line client for FluidNC motion controllers
//!
//! Talks to the controller over its duplex text channel: one-shot
//! commands, live status, machine control, G-code jobs and an
//! interactive prompt.
//!
//! # Usage
//!
//! ```text
//! fnc status               # live status until Ctrl-C
//! fnc status --once        # one snapshot
//! fnc cmd G0 X10 Y10       # send one line, print the reply
//! fnc control hold         # feed hold
//! fnc info version         # firmware version
//! fnc run part.nc          # stream a G-code file with live status
//! fnc interactive          # REPL
//!
//! # Target another controller, JSON output, debug logs on stderr
//! fnc --host 10.0.0.7 --output json -v status --once
//! ```
//!
//! Settings come from `fnc.toml` (see `Config::load`), then `FNC_*`
//! environment variables, then the flags above.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use fnc_core::{AlarmRecord, Config, OutputFormat, StatusSnapshot};
use fnc_protocol::Reply;
use fnc_session::{run_gcode_file, JobOptions, Poller, Session, SessionError};

// ============================================================================
// CLI Arguments
// ============================================================================

/// fnc - FluidNC controller client
#[derive(Parser, Debug)]
#[command(name = "fnc")]
#[command(about = "Control and monitor FluidNC controllers")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Controller host name or IP address
    #[arg(long, global = true)]
    host: Option<String>,

    /// Port of the controller's text channel
    #[arg(long, global = true)]
    duplex_port: Option<u16>,

    /// Enable debug logging on stderr
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Output format: text or json
    #[arg(long, short = 'o', global = true)]
    output: Option<OutputFormat>,

    /// Config file to use instead of the standard locations
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send one line command and print the reply
    Cmd {
        /// Command text; multiple words are joined with spaces
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
    /// Show machine status
    Status {
        /// Print a single snapshot and exit
        #[arg(long)]
        once: bool,
    },
    /// List active alarms
    Alarms,
    /// Machine control
    Control {
        #[command(subcommand)]
        action: ControlAction,
    },
    /// Controller information
    Info {
        #[command(subcommand)]
        topic: InfoTopic,
    },
    /// Stream a G-code file to the controller
    Run {
        /// G-code file
        file: PathBuf,

        /// Do not poll status while the job runs
        #[arg(long)]
        no_monitor: bool,
    },
    /// Interactive prompt
    Interactive,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum ControlAction {
    /// Pause motion (feed hold)
    Hold,
    /// Resume after a hold (cycle start)
    Start,
    /// Soft reset
    Reset,
    /// Run the homing cycle
    Home,
    /// Clear an alarm lock
    Unlock,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum InfoTopic {
    /// Settings dump ($$)
    Settings,
    /// Available $ commands
    Commands,
    /// Firmware version ($I)
    Version,
}

// ============================================================================
// Setup
// ============================================================================

/// Loads the config file and environment, then applies command-line flags.
fn load_config(args: &Args) -> Result<Config> {
    let mut config =
        Config::load(args.config.as_deref()).context("Failed to load configuration")?;

    if let Some(host) = &args.host {
        config.host = host.clone();
    }
    if let Some(port) = args.duplex_port {
        config.duplex_port = port;
    }
    if let Some(format) = args.output {
        config.output_format = format;
    }
    if args.verbose {
        config.verbose = true;
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn init_logging(verbose: bool) -> Result<()> {
    let level = if verbose { "debug" } else { "warn" };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(format!("fnc={level}").parse()?)
                .add_directive(format!("fnc_core={level}").parse()?)
                .add_directive(format!("fnc_protocol={level}").parse()?)
                .add_directive(format!("fnc_session={level}").parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

/// Connects, retrying up to `retry_attempts` times with exponential backoff.
///
/// Returns early with an error if `cancel_token` fires between attempts.
async fn connect_with_retry(
    session: &Session,
    config: &Config,
    cancel_token: &CancellationToken,
) -> Result<()> {
    let attempts = config.retry_attempts.max(1);
    let mut delay = config.retry_delay();
    let mut attempt = 0u32;

    loop {
        attempt = attempt.saturating_add(1);
        debug!(attempt, addr = %session.config().addr, "Attempting to connect");

        match session.connect().await {
            Ok(()) => return Ok(()),
            Err(e) if attempt < attempts => {
                warn!(attempt, error = %e, "Connection attempt failed, retrying");
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Could not connect to controller after {attempt} attempt(s)")
                })
            }
        }

        tokio::select! {
            _ = sleep(delay) => {
                delay = delay.saturating_mul(2);
            }
            _ = cancel_token.cancelled() => {
                bail!("Connection cancelled");
            }
        }
    }
}

/// Waits for a shutdown signal (SIGTERM or SIGINT).
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}

// ============================================================================
// Rendering
// ============================================================================

fn render_snapshot(snapshot: &StatusSnapshot, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(snapshot.status_line()),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(snapshot)?),
    }
}

fn render_alarms(alarms: &[AlarmRecord], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(alarms)?),
        OutputFormat::Text if alarms.is_empty() => Ok("No active alarms".to_string()),
        OutputFormat::Text => Ok(alarms
            .iter()
            .map(|alarm| format!("ALARM:{} {}", alarm.code, alarm.description))
            .collect::<Vec<_>>()
            .join("\n")),
    }
}

fn render_text(label: &str, text: &str, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(text.to_string()),
        OutputFormat::Json => {
            let mut object = serde_json::Map::new();
            object.insert(label.to_string(), serde_json::Value::from(text));
            Ok(serde_json::to_string_pretty(&object)?)
        }
    }
}

/// Prints each polled snapshot; rendering failures are logged, not fatal.
fn snapshot_printer(format: OutputFormat) -> impl FnMut(StatusSnapshot) + Send + 'static {
    move |snapshot| match render_snapshot(&snapshot, format) {
        Ok(text) => println!("{text}"),
        Err(e) => warn!(error = %e, "Failed to render status"),
    }
}

// ============================================================================
// Commands
// ============================================================================

async fn run_command(
    command: Command,
    session: Arc<Session>,
    config: &Config,
    cancel_token: CancellationToken,
) -> Result<()> {
    let format = config.output_format;

    match command {
        Command::Cmd { text } => {
            let text = text.join(" ");
            connect_with_retry(&session, config, &cancel_token).await?;
            let reply = session.send_command(&text).await?;
            println!("{}", render_text("reply", &reply, format)?);
            if Reply::classify(&reply).is_error() {
                bail!("Controller rejected '{text}': {reply}");
            }
        }
        Command::Status { once: true } => {
            connect_with_retry(&session, config, &cancel_token).await?;
            let snapshot = session.status().await?;
            println!("{}", render_snapshot(&snapshot, format)?);
            if snapshot.is_alarm() {
                eprintln!("Controller is in alarm; clear it with `fnc control unlock`");
            }
        }
        Command::Status { once: false } => {
            connect_with_retry(&session, config, &cancel_token).await?;
            let poller = Poller::new(Arc::clone(&session), config.status_interval());
            let summary = poller
                .spawn(snapshot_printer(format), cancel_token)
                .await
                .context("Status poller task failed")??;
            info!(
                snapshots = summary.snapshots,
                errors = summary.errors,
                disconnected = summary.disconnected,
                "Monitoring stopped"
            );
        }
        Command::Alarms => {
            connect_with_retry(&session, config, &cancel_token).await?;
            let alarms = session.alarms().await?;
            println!("{}", render_alarms(&alarms, format)?);
        }
        Command::Control { action } => {
            connect_with_retry(&session, config, &cancel_token).await?;
            control(&session, action).await?;
            if format == OutputFormat::Text {
                println!("{}", control_done(action));
            } else {
                println!("{}", render_text("result", control_done(action), format)?);
            }
        }
        Command::Info { topic } => {
            connect_with_retry(&session, config, &cancel_token).await?;
            let (label, text) = match topic {
                InfoTopic::Settings => ("settings", session.settings().await?),
                InfoTopic::Commands => ("commands", session.commands().await?),
                InfoTopic::Version => ("version", session.version().await?),
            };
            println!("{}", render_text(label, &text, format)?);
        }
        Command::Run { file, no_monitor } => {
            connect_with_retry(&session, config, &cancel_token).await?;
            let options = JobOptions {
                command_delay: config.command_delay(),
                monitor_interval: (!no_monitor).then(|| config.status_interval()),
            };
            let summary = run_gcode_file(
                Arc::clone(&session),
                &file,
                options,
                snapshot_printer(format),
                cancel_token,
            )
            .await
            .with_context(|| format!("Job {} failed", file.display()))?;

            if summary.cancelled {
                println!("Job cancelled after {} line(s)", summary.sent);
            } else {
                println!(
                    "Job complete: {} line(s) sent, {} skipped",
                    summary.sent, summary.skipped
                );
            }
        }
        Command::Interactive => {
            connect_with_retry(&session, config, &cancel_token).await?;
            interactive(&session, config, &cancel_token).await?;
        }
    }

    Ok(())
}

async fn control(session: &Session, action: ControlAction) -> fnc_session::Result<()> {
    match action {
        ControlAction::Hold => session.feed_hold().await,
        ControlAction::Start => session.cycle_start().await,
        ControlAction::Reset => session.soft_reset().await,
        ControlAction::Home => session.home().await,
        ControlAction::Unlock => session.unlock().await,
    }
}

fn control_done(action: ControlAction) -> &'static str {
    match action {
        ControlAction::Hold => "Feed hold sent",
        ControlAction::Start => "Cycle start sent",
        ControlAction::Reset => "Soft reset sent",
        ControlAction::Home => "Homing complete",
        ControlAction::Unlock => "Alarm lock cleared",
    }
}

// ============================================================================
// Interactive Mode
// ============================================================================

const INTERACTIVE_HELP: &str = "\
Commands:
  status   one status snapshot
  alarms   active alarms
  hold     feed hold
  start    cycle start
  reset    soft reset
  home     homing cycle
  unlock   clear alarm lock
  help     this text
  exit     leave
Anything else is sent to the controller as-is.";

fn prompt() {
    print!("fnc> ");
    // Nothing useful to do if stdout is gone
    let _ = std::io::stdout().flush();
}

async fn interactive(
    session: &Session,
    config: &Config,
    cancel_token: &CancellationToken,
) -> Result<()> {
    let format = config.output_format;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("Connected to {}. Type 'help' for commands.", session.config().addr);

    loop {
        prompt();

        let line = tokio::select! {
            _ = cancel_token.cancelled() => break,
            line = lines.next_line() => line.context("Failed to read stdin")?,
        };
        let Some(line) = line else { break };
        let input = line.trim();

        let outcome = match input {
            "" => continue,
            "exit" | "quit" => break,
            "help" => {
                println!("{INTERACTIVE_HELP}");
                continue;
            }
            "status" => session
                .status()
                .await
                .map(|snapshot| render_snapshot(&snapshot, format)),
            "alarms" => session
                .alarms()
                .await
                .map(|alarms| render_alarms(&alarms, format)),
            "hold" => interactive_control(session, ControlAction::Hold).await,
            "start" => interactive_control(session, ControlAction::Start).await,
            "reset" => interactive_control(session, ControlAction::Reset).await,
            "home" => interactive_control(session, ControlAction::Home).await,
            "unlock" => interactive_control(session, ControlAction::Unlock).await,
            text => session
                .send_command(text)
                .await
                .map(|reply| render_text("reply", &reply, format)),
        };

        match outcome {
            Ok(Ok(text)) => println!("{text}"),
            Ok(Err(e)) => eprintln!("Error: {e:#}"),
            Err(e) if e.is_disconnect() => {
                eprintln!("Error: {e}");
                eprintln!("Reconnecting...");
                connect_with_retry(session, config, cancel_token).await?;
            }
            Err(e) => eprintln!("Error: {e}"),
        }
    }

    Ok(())
}

async fn interactive_control(
    session: &Session,
    action: ControlAction,
) -> Result<Result<String>, SessionError> {
    control(session, action)
        .await
        .map(|()| Ok(control_done(action).to_string()))
}

// ============================================================================
// Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;
    init_logging(config.verbose)?;

    debug!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %config.duplex_addr(),
        "fnc starting"
    );

    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let session = Arc::new(Session::from_config(&config));
    let result = run_command(args.command, Arc::clone(&session), &config, cancel_token).await;

    // Close the connection on the error path too
    session.disconnect().await;
    result
}
