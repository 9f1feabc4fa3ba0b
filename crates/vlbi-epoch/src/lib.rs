//! VLBI epoch arithmetic: calendar <-> Modified Julian Day conversions,
//! day-of-year helpers, wall-clock sampling and sexagesimal formatting
//! of fractional turns for timestamp reporting.

pub mod calendar;
pub mod sexagesimal;

pub use calendar::{
    CalendarDate, TimeParseError, calendar_to_mjd, current_mjd, datetime_to_mjd, day_of_year,
    from_day_of_year, is_leap, mjd_to_calendar, mjd_to_day_of_year, mjd_to_time_string,
    parse_time_of_day,
};
pub use sexagesimal::{SexagesimalUnit, format_sexagesimal};

/// Seconds in one civil day.
pub const SECONDS_PER_DAY: f64 = 86_400.0;
