//! Next-run computation for recurrence patterns.
//!
//! Pure date arithmetic: no clock reads, no storage. The scheduler feeds the
//! instant it just fired back in as the reference, so every result is
//! strictly later than its reference.
//!
//! Rules, evaluated in the pattern's timezone:
//!
//! - today's occurrence is used when today matches the pattern and the
//!   occurrence is strictly after the reference;
//! - `daily` otherwise adds `interval` days;
//! - `weekly` moves to the next selected weekday this week (0 = Sunday). When
//!   it has to wrap into a later week from a selected day, `interval - 1`
//!   extra weeks are skipped, so a single-weekday pattern jumps exactly
//!   `interval` weeks;
//! - `monthly` uses a later matching day this month, else `interval` months on;
//! - `yearly` uses the anniversary this year if still ahead, else `interval`
//!   years on.
//!
//! Days past the end of a month are clamped (31 → 30, Feb 29 → Feb 28).
//! Local times that fall into a DST gap resolve one hour later; ambiguous
//! local times take the earlier instant.

use std::collections::BTreeSet;

use chrono::{
    DateTime, Datelike, Days, Duration, LocalResult, Months, NaiveDate, NaiveDateTime, NaiveTime,
    TimeZone, Utc,
};
use chrono_tz::Tz;

use crate::error::{Error, Result};
use crate::model::{RecurrencePattern, RecurrenceType};

/// Compute the first occurrence of `pattern` strictly after `reference`.
///
/// # Errors
///
/// Returns [`Error::Validation`] for malformed patterns, including `custom`
/// ones, which have no computation rule.
pub fn next_run(pattern: &RecurrencePattern, reference: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let tz = pattern.validate()?;
    let time = NaiveTime::from_hms_opt(pattern.hour, pattern.minute, 0).ok_or_else(|| {
        Error::Validation(format!(
            "invalid time of day {:02}:{:02}",
            pattern.hour, pattern.minute
        ))
    })?;

    let today = reference.with_timezone(&tz).date_naive();
    let occurrence = |date: NaiveDate| resolve_local(&tz, date.and_time(time));
    let today_open = occurrence(today).is_some_and(|at| at > reference);

    let date = match pattern.kind {
        RecurrenceType::Daily => {
            if today_open {
                Some(today)
            } else {
                today.checked_add_days(Days::new(u64::from(pattern.interval)))
            }
        }
        RecurrenceType::Weekly => {
            next_weekly_date(&pattern.weekdays, pattern.interval, today, today_open)
        }
        RecurrenceType::Monthly => next_monthly_date(pattern, today, today_open),
        RecurrenceType::Yearly => next_yearly_date(pattern, today, today_open),
        RecurrenceType::Custom => {
            return Err(Error::Validation(
                "custom recurrence has no next-run rule".to_string(),
            ));
        }
    };

    date.and_then(occurrence)
        .ok_or_else(|| Error::Other(format!("next run for {} pattern is out of range", pattern.kind)))
}

/// The next `count` occurrences after `reference`, each computed from the
/// previous one.
pub fn upcoming_runs(
    pattern: &RecurrencePattern,
    reference: DateTime<Utc>,
    count: usize,
) -> Result<Vec<DateTime<Utc>>> {
    let mut runs = Vec::with_capacity(count);
    let mut cursor = reference;
    for _ in 0..count {
        cursor = next_run(pattern, cursor)?;
        runs.push(cursor);
    }
    Ok(runs)
}

fn next_weekly_date(
    weekdays: &BTreeSet<u8>,
    interval: u32,
    today: NaiveDate,
    today_open: bool,
) -> Option<NaiveDate> {
    let today_idx = today.weekday().num_days_from_sunday() as u8;
    let days: BTreeSet<u8> = if weekdays.is_empty() {
        BTreeSet::from([today_idx])
    } else {
        weekdays.clone()
    };
    let today_selected = days.contains(&today_idx);

    if today_selected && today_open {
        return Some(today);
    }

    if let Some(next) = days.range(today_idx + 1..).next() {
        return today.checked_add_days(Days::new(u64::from(next - today_idx)));
    }

    let first = u64::from(*days.iter().next()?);
    let skipped_weeks = if today_selected {
        u64::from(interval.saturating_sub(1))
    } else {
        0
    };
    let gap = 7 - u64::from(today_idx) + first + 7 * skipped_weeks;
    today.checked_add_days(Days::new(gap))
}

fn next_monthly_date(
    pattern: &RecurrencePattern,
    today: NaiveDate,
    today_open: bool,
) -> Option<NaiveDate> {
    let day = pattern.day_of_month.unwrap_or_else(|| today.day());
    let this_month = clamped_date(today.year(), today.month(), day)?;
    if this_month > today || (this_month == today && today_open) {
        return Some(this_month);
    }

    let ahead = today
        .with_day(1)?
        .checked_add_months(Months::new(pattern.interval))?;
    clamped_date(ahead.year(), ahead.month(), day)
}

fn next_yearly_date(
    pattern: &RecurrencePattern,
    today: NaiveDate,
    today_open: bool,
) -> Option<NaiveDate> {
    let month = pattern.month_of_year.unwrap_or_else(|| today.month());
    let day = pattern.day_of_month.unwrap_or_else(|| today.day());
    let this_year = clamped_date(today.year(), month, day)?;
    if this_year > today || (this_year == today && today_open) {
        return Some(this_year);
    }

    let year = today.year().checked_add(i32::try_from(pattern.interval).ok()?)?;
    clamped_date(year, month, day)
}

/// Build a date, pulling `day` back to the last day of the month if needed.
fn clamped_date(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    let last = last_day_of_month(year, month)?;
    NaiveDate::from_ymd_opt(year, month, day.clamp(1, last))
}

fn last_day_of_month(year: i32, month: u32) -> Option<u32> {
    let (y, m) = if month == 12 {
        (year.checked_add(1)?, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(y, m, 1)?.pred_opt().map(|d| d.day())
}

fn resolve_local(tz: &Tz, local: NaiveDateTime) -> Option<DateTime<Utc>> {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(at) => Some(at.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
        LocalResult::None => tz
            .from_local_datetime(&(local + Duration::hours(1)))
            .earliest()
            .map(|at| at.with_timezone(&Utc)),
    }
}
