use crate::error::{ExtractionError, Result};
use chrono::{Datelike, Months, NaiveDate};

/// First day of the given month. Years outside `1..=9999` yield `None`.
pub fn first_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    if !(1..=9999).contains(&year) {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month, 1)
}

/// Truncates any date to the first day of its month.
pub fn truncate_to_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

pub fn add_months(date: NaiveDate, months: u32) -> Result<NaiveDate> {
    date.checked_add_months(Months::new(months)).ok_or_else(|| {
        ExtractionError::DateError(format!("Adding {} months to {} overflows", months, date))
    })
}

pub fn months_between(start: NaiveDate, end: NaiveDate) -> i32 {
    let year_diff = end.year() - start.year();
    let month_diff = end.month() as i32 - start.month() as i32;
    year_diff * 12 + month_diff
}

/// Maps a two-digit year onto a century: `00..=79` lands in the 2000s,
/// `80..=99` in the 1900s.
pub fn pivot_two_digit_year(yy: u32) -> i32 {
    if yy <= 79 {
        2000 + yy as i32
    } else {
        1900 + yy as i32
    }
}
