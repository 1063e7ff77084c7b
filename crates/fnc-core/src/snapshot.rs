//! Status snapshot value types.
//!
//! A `StatusSnapshot` is the structured form of one status telegram.
//! Every field has a zero value, and a field missing from the telegram
//! simply keeps it.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Position
// ============================================================================

/// Cartesian coordinates reported by the controller (millimetres or inches,
/// whatever the controller is configured for).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    /// Creates a new position.
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "X{:.3} Y{:.3} Z{:.3}", self.x, self.y, self.z)
    }
}

// ============================================================================
// Overrides / Buffer
// ============================================================================

/// Override percentages currently applied by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Overrides {
    pub feed: u32,
    pub rapid: u32,
    pub spindle: u32,
}

/// Planner and serial buffer occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BufferState {
    pub planner: u32,
    pub serial: u32,
}

// ============================================================================
// Status Snapshot
// ============================================================================

/// Structured result of parsing one status telegram.
///
/// Snapshots are plain values: once produced they are never mutated
/// by the session layer. A snapshot with an empty `state` is the
/// "unrecognized line" outcome; `raw` always carries the original text.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Controller state token, e.g. "Idle", "Run", "Hold:0", "Alarm".
    pub state: String,

    #[serde(rename = "machine_position")]
    pub machine_pos: Position,

    #[serde(rename = "work_position")]
    pub work_pos: Position,

    pub feed_rate: u32,
    pub spindle_speed: u32,
    pub overrides: Overrides,

    /// Input pin letters, kept opaque (e.g. "XYZP").
    pub pins: String,

    pub buffer: BufferState,
    pub line_number: u32,

    /// When the telegram was parsed.
    pub timestamp: DateTime<Utc>,

    /// The text the snapshot was parsed from, verbatim.
    #[serde(rename = "raw_response")]
    pub raw: String,
}

impl StatusSnapshot {
    /// Creates an empty snapshot carrying only the raw text and a capture time.
    pub fn unrecognized(raw: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            timestamp: Utc::now(),
            ..Default::default()
        }
    }

    /// Returns true if a state token was extracted from the telegram.
    pub fn is_recognized(&self) -> bool {
        !self.state.is_empty()
    }

    /// Returns true if the controller reports an alarm state.
    pub fn is_alarm(&self) -> bool {
        self.state.starts_with("Alarm")
    }

    /// Renders the single-line text form used by `status` output.
    pub fn status_line(&self) -> String {
        format!(
            "State: {} | MPos: {} | WPos: {} | F:{} S:{} | Line:{}",
            self.state,
            self.machine_pos,
            self.work_pos,
            self.feed_rate,
            self.spindle_speed,
            self.line_number,
        )
    }
}
