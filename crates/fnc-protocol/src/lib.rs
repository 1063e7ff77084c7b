//! fnc Protocol - Text grammar of the controller's duplex channel
//!
//! This crate turns controller output into domain values and names the
//! bytes and commands the client sends:
//! - `telegram` - `<State|MPos:...|...>` status telegrams
//! - `alarm` - `ALARM:<code>` reports
//! - `reply` - `ok` / `error:N` reply classification
//! - `command` - realtime control bytes and `$` line commands
//!
//! Everything here is pure: no I/O, no state.

pub mod alarm;
pub mod command;
pub mod reply;
pub mod telegram;

pub use alarm::{alarm_code, parse_alarms, ALARM_PREFIX};
pub use command::{LineCommand, Realtime};
pub use reply::Reply;
pub use telegram::parse_status;
