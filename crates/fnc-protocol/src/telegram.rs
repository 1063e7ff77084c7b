//! Status telegram parsing.
//!
//! A telegram looks like:
//!
//! ```text
//! <Idle|MPos:0.000,0.000,0.000|WPos:0.000,0.000,0.000|FS:0,0|Ov:100,100,100|Pn:XYZ|Bf:15,128|Ln:3>
//! ```
//!
//! The first field is the state and is mandatory; every other field is
//! optional and recognised by its `Key:` prefix regardless of position.
//! Parsing is total: whatever cannot be extracted stays at zero and the
//! raw text is always preserved.

use fnc_core::{BufferState, Overrides, Position, StatusSnapshot};

/// Parses one status telegram into a snapshot.
///
/// Never fails. Input without a `<...>` frame or without a state token
/// yields [`StatusSnapshot::unrecognized`], which callers must tolerate
/// (banners, echoed commands and empty lines all end up here).
pub fn parse_status(raw: &str) -> StatusSnapshot {
    let mut snapshot = StatusSnapshot::unrecognized(raw);

    let Some(body) = frame_body(raw) else {
        return snapshot;
    };

    let mut fields = body.split('|');
    let state = fields.next().map(str::trim).unwrap_or_default();
    if state.is_empty() {
        return snapshot;
    }
    snapshot.state = state.to_string();

    for field in fields {
        let Some((key, value)) = field.split_once(':') else {
            continue;
        };
        match key.trim() {
            "MPos" => snapshot.machine_pos = parse_position(value),
            "WPos" => snapshot.work_pos = parse_position(value),
            "FS" => {
                let mut parts = value.split(',');
                snapshot.feed_rate = next_int(&mut parts);
                snapshot.spindle_speed = next_int(&mut parts);
            }
            // Feed-only variant sent by firmware built without a spindle
            "F" => snapshot.feed_rate = parse_int(value),
            "Ov" => {
                let mut parts = value.split(',');
                snapshot.overrides = Overrides {
                    feed: next_int(&mut parts),
                    rapid: next_int(&mut parts),
                    spindle: next_int(&mut parts),
                };
            }
            "Pn" => snapshot.pins = value.trim().to_string(),
            "Bf" => {
                let mut parts = value.split(',');
                snapshot.buffer = BufferState {
                    planner: next_int(&mut parts),
                    serial: next_int(&mut parts),
                };
            }
            "Ln" => snapshot.line_number = parse_int(value),
            _ => {}
        }
    }

    snapshot
}

/// Returns the text between the first `<` and the following `>`.
fn frame_body(raw: &str) -> Option<&str> {
    let start = raw.find('<')?;
    let rest = raw.get(start + 1..)?;
    let end = rest.find('>')?;
    rest.get(..end)
}

fn parse_position(value: &str) -> Position {
    let mut parts = value.split(',');
    Position {
        x: next_float(&mut parts),
        y: next_float(&mut parts),
        z: next_float(&mut parts),
    }
}

fn next_float<'a>(parts: &mut impl Iterator<Item = &'a str>) -> f64 {
    parts.next().map(parse_float).unwrap_or_default()
}

fn next_int<'a>(parts: &mut impl Iterator<Item = &'a str>) -> u32 {
    parts.next().map(parse_int).unwrap_or_default()
}

/// Coordinate sub-field; anything non-numeric or non-finite is zero.
fn parse_float(value: &str) -> f64 {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or_default()
}

/// Integer sub-field; accepts `500` and `500.0`, anything else is zero.
fn parse_int(value: &str) -> u32 {
    let value = value.trim();
    if let Ok(n) = value.parse::<u32>() {
        return n;
    }
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0 && *v <= f64::from(u32::MAX))
        .map(|v| v.round() as u32)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = "<Run|MPos:10.500,-2.250,3.000|WPos:0.500,-12.250,1.000|FS:1200,8000|Ov:110,50,90|Pn:XZ|Bf:12,96|Ln:57>";

    #[test]
    fn test_full_telegram() {
        let s = parse_status(FULL);

        assert_eq!(s.state, "Run");
        assert_eq!(s.machine_pos, Position::new(10.5, -2.25, 3.0));
        assert_eq!(s.work_pos, Position::new(0.5, -12.25, 1.0));
        assert_eq!(s.feed_rate, 1200);
        assert_eq!(s.spindle_speed, 8000);
        assert_eq!(
            s.overrides,
            Overrides {
                feed: 110,
                rapid: 50,
                spindle: 90
            }
        );
        assert_eq!(s.pins, "XZ");
        assert_eq!(
            s.buffer,
            BufferState {
                planner: 12,
                serial: 96
            }
        );
        assert_eq!(s.line_number, 57);
        assert_eq!(s.raw, FULL);
    }

    #[test]
    fn test_partial_telegram_leaves_absent_fields_zero() {
        let s = parse_status("<Idle|MPos:1.200,3.400,0.000|FS:500,1000>");

        assert_eq!(s.state, "Idle");
        assert_eq!(s.machine_pos, Position::new(1.2, 3.4, 0.0));
        assert_eq!(s.feed_rate, 500);
        assert_eq!(s.spindle_speed, 1000);
        assert_eq!(s.work_pos, Position::default());
        assert_eq!(s.overrides, Overrides::default());
        assert!(s.pins.is_empty());
        assert_eq!(s.buffer, BufferState::default());
        assert_eq!(s.line_number, 0);
    }

    #[test]
    fn test_not_a_telegram() {
        let s = parse_status("not a telegram");

        assert!(s.state.is_empty());
        assert_eq!(s.raw, "not a telegram");
        assert_eq!(s.machine_pos, Position::default());
    }

    #[test]
    fn test_empty_and_unterminated_input() {
        assert!(!parse_status("").is_recognized());
        assert!(!parse_status("<Idle|MPos:1,2,3").is_recognized());
        assert!(!parse_status("<>").is_recognized());
        assert!(!parse_status("<|MPos:1,2,3>").is_recognized());
    }

    #[test]
    fn test_bad_coordinate_defaults_to_zero_without_losing_others() {
        let s = parse_status("<Alarm|MPos:abc,1,1>");

        assert_eq!(s.state, "Alarm");
        assert_eq!(s.machine_pos.x, 0.0);
        assert_eq!(s.machine_pos.y, 1.0);
        assert_eq!(s.machine_pos.z, 1.0);
    }

    #[test]
    fn test_short_coordinate_list() {
        let s = parse_status("<Idle|WPos:4.5,6.5>");
        assert_eq!(s.work_pos, Position::new(4.5, 6.5, 0.0));
    }

    #[test]
    fn test_non_finite_coordinate_is_zero() {
        let s = parse_status("<Idle|MPos:inf,NaN,2>");
        assert_eq!(s.machine_pos, Position::new(0.0, 0.0, 2.0));
    }

    #[test]
    fn test_fields_out_of_order() {
        let s = parse_status("<Jog|Ln:9|FS:300,0|MPos:1,2,3>");

        assert_eq!(s.state, "Jog");
        assert_eq!(s.line_number, 9);
        assert_eq!(s.feed_rate, 300);
        assert_eq!(s.machine_pos, Position::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_state_with_substate() {
        let s = parse_status("<Hold:0|MPos:0.000,0.000,0.000|FS:0,0>");
        assert_eq!(s.state, "Hold:0");
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let s = parse_status("<Idle|MPos:1,1,1|WCO:0.000,0.000,0.000|A:S|FS:10,20>");

        assert_eq!(s.state, "Idle");
        assert_eq!(s.feed_rate, 10);
        assert_eq!(s.spindle_speed, 20);
    }

    #[test]
    fn test_feed_only_field() {
        let s = parse_status("<Idle|F:750>");
        assert_eq!(s.feed_rate, 750);
        assert_eq!(s.spindle_speed, 0);
    }

    #[test]
    fn test_decimal_feed_is_rounded() {
        let s = parse_status("<Run|FS:500.0,999.6>");
        assert_eq!(s.feed_rate, 500);
        assert_eq!(s.spindle_speed, 1000);
    }

    #[test]
    fn test_negative_integer_is_zero() {
        let s = parse_status("<Run|Ln:-4|Bf:-1,15>");
        assert_eq!(s.line_number, 0);
        assert_eq!(s.buffer.planner, 0);
        assert_eq!(s.buffer.serial, 15);
    }

    #[test]
    fn test_surrounding_noise_is_tolerated() {
        let raw = "ok <Idle|MPos:5,5,5> trailing";
        let s = parse_status(raw);

        assert_eq!(s.state, "Idle");
        assert_eq!(s.machine_pos, Position::new(5.0, 5.0, 5.0));
        assert_eq!(s.raw, raw);
    }

    #[test]
    fn test_empty_pins_field() {
        let s = parse_status("<Idle|Pn:>");
        assert!(s.pins.is_empty());
    }

    #[test]
    fn test_present_values_survive_exactly() {
        let s = parse_status("<Idle|MPos:-123.456,0.001,99999.999>");
        assert_eq!(s.machine_pos.x, -123.456);
        assert_eq!(s.machine_pos.y, 0.001);
        assert_eq!(s.machine_pos.z, 99999.999);
    }
}
