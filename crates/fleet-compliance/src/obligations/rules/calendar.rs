use chrono::{Datelike, NaiveDate};

/// Last valid day of `month` in `year`, or `None` outside chrono's range.
pub fn last_day_of_month(year: i32, month: u32) -> Option<u32> {
    let (next_year, next_month) = if month == 12 {
        (year.checked_add(1)?, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)?
        .pred_opt()
        .map(|date| date.day())
}

/// Builds a date, pulling `day` back to the month's last day when it overflows.
pub fn clamped_date(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    let last = last_day_of_month(year, month)?;
    NaiveDate::from_ymd_opt(year, month, day.min(last))
}

pub fn add_months_clamped(date: NaiveDate, months: u32) -> Option<NaiveDate> {
    let zero_based = date.month0().checked_add(months)?;
    let year = date.year().checked_add(i32::try_from(zero_based / 12).ok()?)?;
    clamped_date(year, zero_based % 12 + 1, date.day())
}

pub fn add_years_clamped(date: NaiveDate, years: i32) -> Option<NaiveDate> {
    clamped_date(date.year().checked_add(years)?, date.month(), date.day())
}
