//! Realtime control bytes and line commands.

use std::fmt;

// ============================================================================
// Realtime Bytes
// ============================================================================

/// Single control bytes the controller handles immediately, out of band
/// from the line-oriented command stream.
///
/// Only [`Realtime::StatusQuery`] produces a reply (a status telegram);
/// the others are fire-and-forget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Realtime {
    /// `!` - pause motion
    FeedHold,
    /// `~` - resume after a feed hold
    CycleStart,
    /// `0x18` (Ctrl-X) - soft reset
    SoftReset,
    /// `?` - request a status telegram
    StatusQuery,
}

impl Realtime {
    /// Wire byte for this control.
    pub const fn byte(self) -> u8 {
        match self {
            Self::FeedHold => b'!',
            Self::CycleStart => b'~',
            Self::SoftReset => 0x18,
            Self::StatusQuery => b'?',
        }
    }

    /// Maps a wire byte back to its control, if it is one.
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'!' => Some(Self::FeedHold),
            b'~' => Some(Self::CycleStart),
            0x18 => Some(Self::SoftReset),
            b'?' => Some(Self::StatusQuery),
            _ => None,
        }
    }
}

impl fmt::Display for Realtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::FeedHold => "feed-hold",
            Self::CycleStart => "cycle-start",
            Self::SoftReset => "soft-reset",
            Self::StatusQuery => "status-query",
        };
        write!(f, "{name}")
    }
}

// ============================================================================
// Line Commands
// ============================================================================

/// `$` system commands used by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LineCommand {
    /// `$H` - run the homing cycle
    Home,
    /// `$X` - clear an alarm lock
    Unlock,
    /// `$$` - dump settings
    Settings,
    /// `$` - list available commands
    Commands,
    /// `$I` - build and version info
    Version,
    /// `$alarms` - list alarm codes
    Alarms,
}

impl LineCommand {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Home => "$H",
            Self::Unlock => "$X",
            Self::Settings => "$$",
            Self::Commands => "$",
            Self::Version => "$I",
            Self::Alarms => "$alarms",
        }
    }
}

impl fmt::Display for LineCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_realtime_bytes() {
        assert_eq!(Realtime::FeedHold.byte(), b'!');
        assert_eq!(Realtime::CycleStart.byte(), b'~');
        assert_eq!(Realtime::SoftReset.byte(), 0x18);
        assert_eq!(Realtime::StatusQuery.byte(), b'?');
    }

    #[test]
    fn test_realtime_from_byte() {
        for rt in [
            Realtime::FeedHold,
            Realtime::CycleStart,
            Realtime::SoftReset,
            Realtime::StatusQuery,
        ] {
            assert_eq!(Realtime::from_byte(rt.byte()), Some(rt));
        }
        assert_eq!(Realtime::from_byte(b'G'), None);
    }

    #[test]
    fn test_line_commands() {
        assert_eq!(LineCommand::Home.as_str(), "$H");
        assert_eq!(LineCommand::Unlock.as_str(), "$X");
        assert_eq!(LineCommand::Settings.to_string(), "$$");
        assert_eq!(LineCommand::Alarms.to_string(), "$alarms");
    }
}
