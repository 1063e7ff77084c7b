//! Alarm report parsing.

use fnc_core::AlarmRecord;

/// Line prefix that marks an alarm report.
pub const ALARM_PREFIX: &str = "ALARM:";

/// Extracts alarm records from a multi-line alarm query response.
///
/// Only lines starting with `ALARM:` are considered. A marked line with
/// no leading numeric code is skipped, since the firmware does not
/// guarantee line-clean framing.
pub fn parse_alarms(raw: &str) -> Vec<AlarmRecord> {
    raw.lines()
        .filter_map(|line| alarm_code(line.trim()))
        .map(AlarmRecord::new)
        .collect()
}

/// Returns the code of a single `ALARM:<code>` line.
pub fn alarm_code(line: &str) -> Option<u32> {
    let rest = line.strip_prefix(ALARM_PREFIX)?.trim_start();
    let digits_end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    rest.get(..digits_end)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_unknown_and_noise() {
        let alarms = parse_alarms("ALARM:1\nALARM:99\nnoise");

        assert_eq!(alarms.len(), 2);
        assert_eq!(alarms[0].code, 1);
        assert_eq!(alarms[0].description, "Hard limit triggered");
        assert_eq!(alarms[1].code, 99);
        assert_eq!(alarms[1].description, "Unknown alarm code: 99");
    }

    #[test]
    fn test_prefix_without_code_is_skipped() {
        let alarms = parse_alarms("ALARM:\nALARM:abc\nALARM:6\n");

        assert_eq!(alarms.len(), 1);
        assert_eq!(alarms[0].code, 6);
        assert_eq!(alarms[0].description, "Homing fail");
    }

    #[test]
    fn test_crlf_and_indentation() {
        let alarms = parse_alarms("  ALARM:3\r\nok\r\n");

        assert_eq!(alarms.len(), 1);
        assert_eq!(alarms[0].code, 3);
    }

    #[test]
    fn test_trailing_text_after_code() {
        assert_eq!(alarm_code("ALARM:2 (soft limit)"), Some(2));
        assert_eq!(alarm_code("ALARM:10"), Some(10));
    }

    #[test]
    fn test_prefix_must_start_the_line() {
        assert_eq!(alarm_code("[MSG: ALARM:1]"), None);
        assert!(parse_alarms("error:9\n[MSG:Reset to continue]").is_empty());
    }

    #[test]
    fn test_empty_input() {
        assert!(parse_alarms("").is_empty());
    }

    #[test]
    fn test_overflowing_code_is_skipped() {
        assert_eq!(alarm_code("ALARM:99999999999"), None);
    }
}
