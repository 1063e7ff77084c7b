//! Classification of reply lines on the duplex channel.

use crate::alarm::alarm_code;

/// What kind of line the controller sent back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `ok` - command accepted
    Ok,
    /// `error:N`
    Error { code: Option<u32> },
    /// `ALARM:N`
    Alarm { code: u32 },
    /// A `<...>` status telegram
    Status,
    /// Anything else: settings dumps, `[MSG:...]`, banners
    Other,
}

impl Reply {
    /// Classifies a single reply line.
    pub fn classify(line: &str) -> Self {
        let line = line.trim();
        if line.eq_ignore_ascii_case("ok") {
            return Self::Ok;
        }
        if let Some(code) = alarm_code(line) {
            return Self::Alarm { code };
        }
        if line.starts_with('<') && line.ends_with('>') {
            return Self::Status;
        }

        let lower = line.to_ascii_lowercase();
        if let Some(rest) = lower.strip_prefix("error:") {
            return Self::Error {
                code: rest.trim().parse().ok(),
            };
        }

        Self::Other
    }

    /// Returns true if `line` mentions an error anywhere, case-insensitively.
    ///
    /// Looser than [`Reply::classify`]; only for judging the single reply to
    /// a G-code line. Informational lines inside multi-line dumps may
    /// mention errors too, so this must never decide where a reply ends.
    pub fn mentions_error(line: &str) -> bool {
        line.to_ascii_lowercase().contains("error")
    }

    /// Returns true for lines that end a multi-line reply: `ok` or `error:N`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ok | Self::Error { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}
