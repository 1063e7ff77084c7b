//! fnc Core - Shared types for the FluidNC client
//!
//! This crate provides the domain values shared by the protocol,
//! session and CLI layers: status snapshots, alarm records and the
//! client configuration.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod alarm;
pub mod config;
pub mod error;
pub mod snapshot;

// Re-exports for convenience
pub use alarm::{alarm_description, AlarmRecord};
pub use config::{Config, OutputFormat};
pub use error::{ConfigError, ConfigResult};
pub use snapshot::{BufferState, Overrides, Position, StatusSnapshot};
