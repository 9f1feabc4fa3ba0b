//! Proleptic Gregorian calendar <-> Modified Julian Day conversions.
//!
//! All conversions use closed-form integer arithmetic. Inputs are assumed
//! to be validated by the caller; nothing here panics on odd values, it
//! simply produces the arithmetic result.

use chrono::{DateTime, Datelike, Timelike, Utc};
use thiserror::Error;

use crate::SECONDS_PER_DAY;
use crate::sexagesimal::{SexagesimalUnit, format_sexagesimal};

/// Offset between Julian Day Number and MJD, plus one for the day boundary
/// convention used by the decomposition below.
const JD_OFFSET: i64 = 2_400_001;

/// MJD of 1 March, year 0 of the shifted calendar used by `calendar_to_mjd`.
const MJD_SHIFT: i64 = 678_882;

const DAYS_IN_MONTH: [u32; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

/// A calendar date with the time of day expressed as a fraction of a day.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalendarDate {
    pub day: u32,
    pub month: u32,
    pub year: i32,
    /// Fraction of the day, `0 <= day_fraction < 1`.
    pub day_fraction: f64,
}

/// A time-of-day string could not be parsed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("could not parse time of day {input:?} (expected HH:MM:SS, HH:MM or SS)")]
pub struct TimeParseError {
    pub input: String,
}

/// Gregorian leap year rule.
pub fn is_leap(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

fn month_lengths(year: i32) -> [u32; 12] {
    let mut days = DAYS_IN_MONTH;
    if is_leap(year) {
        days[1] = 29;
    }
    days
}

/// Convert a calendar date to the whole-day MJD at 0h UT.
pub fn calendar_to_mjd(day: u32, month: u32, year: i32) -> i64 {
    // Shift the year to start in March so the leap day falls at the end.
    let (m, y) = if month <= 2 {
        (month as i64 + 9, year as i64 - 1)
    } else {
        (month as i64 - 3, year as i64)
    };

    let c = y / 100;
    let y = y - c * 100;

    let x1 = 146_097 * c / 4;
    let x2 = 1461 * y / 4;
    let x3 = (153 * m + 2) / 5;

    x1 + x2 + x3 + day as i64 - MJD_SHIFT
}

/// Convert a (possibly fractional) MJD to a calendar date and day fraction.
pub fn mjd_to_calendar(mjd: f64) -> CalendarDate {
    let whole = mjd.floor();
    let day_fraction = mjd - whole;

    let jd = whole as i64 + JD_OFFSET;

    let temp1 = 4 * (jd + ((6 * ((4 * jd - 17_918) / 146_097)) / 4 + 1) / 2 - 37);
    let temp2 = 10 * (((temp1 - 237) % 1461) / 4) + 5;

    CalendarDate {
        day: ((temp2 % 306) / 10 + 1) as u32,
        month: ((temp2 / 306 + 2) % 12 + 1) as u32,
        year: (temp1 / 1461 - 4712) as i32,
        day_fraction,
    }
}

/// Day of year (1-based) for a calendar date.
pub fn day_of_year(day: u32, month: u32, year: i32) -> u32 {
    let days = month_lengths(year);
    let prior: u32 = days.iter().take(month.saturating_sub(1) as usize).sum();
    prior + day
}

/// Convert a 1-based day of year to `(day, month)`.
///
/// Returns `None` if `dayno` is zero or past the end of `year`.
pub fn from_day_of_year(dayno: u32, year: i32) -> Option<(u32, u32)> {
    if dayno == 0 {
        return None;
    }
    let mut remaining = dayno;
    for (idx, &len) in month_lengths(year).iter().enumerate() {
        if remaining <= len {
            return Some((remaining, idx as u32 + 1));
        }
        remaining -= len;
    }
    None
}

/// Convert an MJD to `(day_of_year, year, day_fraction)`.
pub fn mjd_to_day_of_year(mjd: f64) -> (u32, i32, f64) {
    let date = mjd_to_calendar(mjd);
    (
        day_of_year(date.day, date.month, date.year),
        date.year,
        date.day_fraction,
    )
}

/// Render the time-of-day part of an MJD as `HH:MM:SS[.f]`.
pub fn mjd_to_time_string(mjd: f64, decimal_places: u32) -> String {
    let date = mjd_to_calendar(mjd);
    format_sexagesimal(date.day_fraction, SexagesimalUnit::Hours, decimal_places)
}

/// MJD of a UTC timestamp, including the sub-second part.
pub fn datetime_to_mjd(t: &DateTime<Utc>) -> f64 {
    let day = calendar_to_mjd(t.day(), t.month(), t.year()) as f64;
    let seconds = t.num_seconds_from_midnight() as f64 + t.nanosecond() as f64 / 1e9;
    day + seconds / SECONDS_PER_DAY
}

/// Current wall-clock time as an MJD.
pub fn current_mjd() -> f64 {
    datetime_to_mjd(&Utc::now())
}

/// Parse `HH:MM:SS`, `HH:MM` or `SS` into a fraction of a day.
pub fn parse_time_of_day(input: &str) -> Result<f64, TimeParseError> {
    let err = || TimeParseError {
        input: input.to_string(),
    };

    let fields = input
        .trim()
        .split(':')
        .map(|f| f.trim().parse::<u32>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| err())?;

    let (hour, min, sec) = match fields.as_slice() {
        [h, m, s] => (*h, *m, *s),
        [h, m] => (*h, *m, 0),
        [s] => (0, 0, *s),
        _ => return Err(err()),
    };

    Ok((hour as f64 + (min as f64 + sec as f64 / 60.0) / 60.0) / 24.0)
}
