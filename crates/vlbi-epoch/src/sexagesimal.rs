//! Fractional turns -> sexagesimal strings.
//!
//! One turn is a full day in `Hours` mode and a full circle in `Degrees`
//! mode. The whole turns are split off before scaling so the seconds field
//! keeps full precision however many turns are carried.

/// Unit of the leading sexagesimal field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SexagesimalUnit {
    /// `HH:MM:SS[.ffff]`, up to 4 decimal places.
    Hours,
    /// `DDD:MM:SS[.fff]`, up to 3 decimal places.
    Degrees,
}

impl SexagesimalUnit {
    fn seconds_per_turn(self) -> u64 {
        match self {
            Self::Hours => 86_400,
            Self::Degrees => 1_296_000,
        }
    }

    fn units_per_turn(self) -> u64 {
        match self {
            Self::Hours => 24,
            Self::Degrees => 360,
        }
    }

    /// Maximum supported decimal places on the seconds field.
    pub fn max_decimal_places(self) -> u32 {
        match self {
            Self::Hours => 4,
            Self::Degrees => 3,
        }
    }
}

/// Format `turns` as a signed sexagesimal string, rounding at the last
/// requested decimal place.
pub fn format_sexagesimal(turns: f64, unit: SexagesimalUnit, decimal_places: u32) -> String {
    let dp = decimal_places.min(unit.max_decimal_places());
    if dp != decimal_places {
        tracing::warn!(
            requested = decimal_places,
            enforced = dp,
            "invalid number of decimal places requested"
        );
    }

    let negative = turns < 0.0;
    let turns = turns.abs();
    let whole_turns = turns.trunc() as u64;
    let fraction = turns - whole_turns as f64;

    let scale = 10u64.pow(dp);
    // Adding 0.5 before truncation rounds to the nearest unit.
    let mut work = (0.5 + (unit.seconds_per_turn() * scale) as f64 * fraction) as u64;

    let right_of_dp = work % scale;
    work /= scale;
    let seconds = work % 60;
    work /= 60;
    let minutes = work % 60;
    let units = (work / 60).saturating_add(unit.units_per_turn().saturating_mul(whole_turns));

    let mut out = String::with_capacity(16);
    if negative {
        out.push('-');
    }
    if units > 99 {
        out.push_str(&units.to_string());
    } else {
        out.push_str(&format!("{:02}", units));
    }
    out.push_str(&format!(":{:02}:{:02}", minutes, seconds));
    if dp > 0 {
        out.push_str(&format!(".{:0width$}", right_of_dp, width = dp as usize));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn parse_hms(s: &str) -> f64 {
        let (sign, body) = match s.strip_prefix('-') {
            Some(rest) => (-1.0, rest),
            None => (1.0, s),
        };
        let parts: Vec<f64> = body.split(':').map(|p| p.parse().unwrap()).collect();
        sign * (parts[0] * 3600.0 + parts[1] * 60.0 + parts[2]) / 86_400.0
    }

    #[test]
    fn formats_hours() {
        assert_eq!(format_sexagesimal(0.0, SexagesimalUnit::Hours, 0), "00:00:00");
        assert_eq!(format_sexagesimal(0.5, SexagesimalUnit::Hours, 2), "12:00:00.00");
        assert_eq!(
            format_sexagesimal(0.25 + 1.5 / 86_400.0, SexagesimalUnit::Hours, 1),
            "06:00:01.5"
        );
    }

    #[test]
    fn formats_degrees() {
        assert_eq!(format_sexagesimal(0.5, SexagesimalUnit::Degrees, 0), "180:00:00");
        assert_eq!(format_sexagesimal(0.125, SexagesimalUnit::Degrees, 1), "45:00:00.0");
    }

    #[test]
    fn rounds_instead_of_truncating() {
        // 0.6 s rounds up to the next whole second.
        assert_eq!(
            format_sexagesimal(0.6 / 86_400.0, SexagesimalUnit::Hours, 0),
            "00:00:01"
        );
        // ...and carries through minutes.
        assert_eq!(
            format_sexagesimal(59.96 / 86_400.0, SexagesimalUnit::Hours, 1),
            "00:01:00.0"
        );
    }

    #[test]
    fn preserves_sign() {
        assert_eq!(format_sexagesimal(-0.5, SexagesimalUnit::Hours, 0), "-12:00:00");
    }

    #[test]
    fn keeps_whole_turns() {
        assert_eq!(format_sexagesimal(1.5, SexagesimalUnit::Hours, 0), "36:00:00");
        assert_eq!(format_sexagesimal(5.0, SexagesimalUnit::Hours, 0), "120:00:00");
    }

    #[test]
    fn huge_turns_saturate() {
        let s = format_sexagesimal(1e30, SexagesimalUnit::Hours, 0);
        assert!(s.starts_with(&u64::MAX.to_string()), "{}", s);
        let s = format_sexagesimal(-1e30, SexagesimalUnit::Degrees, 0);
        assert!(s.starts_with('-'));
    }

    #[test]
    fn clamps_decimal_places() {
        assert_eq!(format_sexagesimal(0.0, SexagesimalUnit::Hours, 9), "00:00:00.0000");
        assert_eq!(format_sexagesimal(0.0, SexagesimalUnit::Degrees, 9), "00:00:00.000");
    }

    proptest! {
        #[test]
        fn prop_hours_round_trip(turns in 0.0f64..1.0, dp in 0u32..=4) {
            let s = format_sexagesimal(turns, SexagesimalUnit::Hours, dp);
            let back = parse_hms(&s);
            let tolerance = 0.5 * 10f64.powi(-(dp as i32)) / 86_400.0 + 1e-12;
            prop_assert!((back - turns).abs() <= tolerance, "{} -> {} -> {}", turns, s, back);
        }
    }
}
