//! Alarm records and the alarm code description table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Descriptions for the alarm codes the controller reports.
const ALARM_DESCRIPTIONS: &[(u32, &str)] = &[
    (1, "Hard limit triggered"),
    (2, "G-code motion target exceeds machine travel"),
    (3, "Reset while in motion"),
    (4, "Probe fail"),
    (5, "Probe fail"),
    (6, "Homing fail"),
    (7, "Homing fail"),
    (8, "Homing fail"),
    (9, "Homing fail"),
    (10, "Homing fail"),
];

/// Returns the human-readable description for an alarm code.
///
/// Unknown codes render as `"Unknown alarm code: N"`.
pub fn alarm_description(code: u32) -> String {
    ALARM_DESCRIPTIONS
        .iter()
        .find(|(known, _)| *known == code)
        .map(|(_, text)| (*text).to_string())
        .unwrap_or_else(|| format!("Unknown alarm code: {code}"))
}

/// One alarm reported by the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmRecord {
    pub code: u32,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

impl AlarmRecord {
    /// Creates a record for `code`, looking up its description.
    pub fn new(code: u32) -> Self {
        Self {
            code,
            description: alarm_description(code),
            timestamp: Utc::now(),
        }
    }
}
