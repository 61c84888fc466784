//! Period bucketing
//!
//! Pure date arithmetic: weeks start Monday, months and years follow the
//! calendar. Every function is total for dates chrono can represent.

use chrono::{Datelike, Duration, Months, NaiveDate};

use crate::models::PeriodType;

/// Start and end (inclusive) of the period containing `date`
pub fn period_bounds(date: NaiveDate, period_type: PeriodType) -> (NaiveDate, NaiveDate) {
    match period_type {
        PeriodType::Daily => (date, date),
        PeriodType::Weekly => {
            let start = date - Duration::days(date.weekday().num_days_from_monday() as i64);
            (start, start + Duration::days(6))
        }
        PeriodType::Monthly => {
            let start = first_of_month(date);
            let end = start
                .checked_add_months(Months::new(1))
                .and_then(|d| d.pred_opt())
                .unwrap_or(start);
            (start, end)
        }
        PeriodType::Yearly => {
            let start = NaiveDate::from_ymd_opt(date.year(), 1, 1).unwrap_or(date);
            let end = NaiveDate::from_ymd_opt(date.year(), 12, 31).unwrap_or(date);
            (start, end)
        }
    }
}

/// Start of the period containing `date`
pub fn period_start(date: NaiveDate, period_type: PeriodType) -> NaiveDate {
    period_bounds(date, period_type).0
}

/// End (inclusive) of the period containing `date`
pub fn period_end(date: NaiveDate, period_type: PeriodType) -> NaiveDate {
    period_bounds(date, period_type).1
}

/// Start of the period `n` periods away from the one containing `start`
pub fn shift_period(start: NaiveDate, period_type: PeriodType, n: i32) -> NaiveDate {
    let start = period_start(start, period_type);
    let shifted = match period_type {
        PeriodType::Daily => Some(start + Duration::days(n as i64)),
        PeriodType::Weekly => Some(start + Duration::weeks(n as i64)),
        PeriodType::Monthly => add_months(start, n),
        PeriodType::Yearly => add_months(start, n.saturating_mul(12)),
    };
    shifted.unwrap_or(start)
}

/// Start of the following period
pub fn next_period_start(start: NaiveDate, period_type: PeriodType) -> NaiveDate {
    shift_period(start, period_type, 1)
}

/// Start of the preceding period
pub fn previous_period_start(start: NaiveDate, period_type: PeriodType) -> NaiveDate {
    shift_period(start, period_type, -1)
}

/// A period is final once today is past its last day
pub fn is_finalized(period_start: NaiveDate, period_type: PeriodType, today: NaiveDate) -> bool {
    today > period_end(period_start, period_type)
}

/// Inclusive sequence of period starts covering `start..=end`
///
/// Empty when `end` is before `start`.
pub fn periods_in_range(start: NaiveDate, end: NaiveDate, period_type: PeriodType) -> Vec<NaiveDate> {
    let mut periods = Vec::new();
    if end < start {
        return periods;
    }

    let last = period_start(end, period_type);
    let mut current = period_start(start, period_type);
    while current <= last {
        periods.push(current);
        let next = next_period_start(current, period_type);
        if next <= current {
            break;
        }
        current = next;
    }
    periods
}

/// Number of days in the period containing `date`
pub fn days_in_period(date: NaiveDate, period_type: PeriodType) -> i64 {
    let (start, end) = period_bounds(date, period_type);
    (end - start).num_days() + 1
}

/// Number of days in the calendar month containing `date`
pub fn days_in_month(date: NaiveDate) -> i64 {
    days_in_period(date, PeriodType::Monthly)
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

fn add_months(date: NaiveDate, n: i32) -> Option<NaiveDate> {
    if n >= 0 {
        date.checked_add_months(Months::new(n as u32))
    } else {
        date.checked_sub_months(Months::new(n.unsigned_abs()))
    }
}
