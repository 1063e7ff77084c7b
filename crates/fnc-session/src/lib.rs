//! Duplex session, status poller and command surface for FluidNC controllers.
//!
//! - [`Session`] owns the one text connection and serializes exchanges on it
//! - [`Poller`] samples status on a timer until cancelled
//! - The command surface (`feed_hold`, `home`, `alarms`, ...) lives on `Session`
//! - [`run_gcode`] streams a G-code program line by line
//!
//! # Panic-Free Guarantees
//!
//! All code follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`

mod control;
pub mod error;
pub mod job;
pub mod poller;
pub mod session;

pub use error::{Result, SessionError};
pub use job::{is_executable_line, run_gcode, run_gcode_file, JobOptions, JobSummary};
pub use poller::{PollSummary, Poller};
pub use session::{Session, SessionConfig, MAX_LINE_LEN, MAX_REPLY_LINES};
