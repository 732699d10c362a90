//! Tests for next-run computation.

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;
use rota_rs::model::{RecurrencePattern, RecurrenceType};
use rota_rs::recurrence::{next_run, upcoming_runs};

fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
}

// 2026-03-02 is a Monday.

// ---------------------------------------------------------------------------
// Daily
// ---------------------------------------------------------------------------

#[test]
fn daily_uses_today_when_time_is_still_ahead() {
    let p = RecurrencePattern::daily(9, 0, "UTC");
    assert_eq!(next_run(&p, utc(2026, 3, 2, 8, 0)).unwrap(), utc(2026, 3, 2, 9, 0));
}

#[test]
fn daily_is_strictly_after_reference() {
    let p = RecurrencePattern::daily(9, 0, "UTC");
    assert_eq!(next_run(&p, utc(2026, 3, 2, 9, 0)).unwrap(), utc(2026, 3, 3, 9, 0));
}

#[test]
fn daily_interval_skips_days() {
    let p = RecurrencePattern::daily(9, 0, "UTC").every(3);
    assert_eq!(next_run(&p, utc(2026, 3, 2, 10, 0)).unwrap(), utc(2026, 3, 5, 9, 0));
}

#[test]
fn daily_time_is_local_to_the_pattern_timezone() {
    // 09:00 in Bangkok (UTC+7) is 02:00 UTC.
    let p = RecurrencePattern::daily(9, 0, "Asia/Bangkok");
    assert_eq!(next_run(&p, utc(2026, 3, 2, 1, 0)).unwrap(), utc(2026, 3, 2, 2, 0));
    assert_eq!(next_run(&p, utc(2026, 3, 2, 3, 0)).unwrap(), utc(2026, 3, 3, 2, 0));
}

// ---------------------------------------------------------------------------
// Weekly
// ---------------------------------------------------------------------------

#[test]
fn weekly_monday_after_monday_morning_goes_to_next_monday() {
    let p = RecurrencePattern::weekly([1], 9, 0, "UTC");
    assert_eq!(next_run(&p, utc(2026, 3, 2, 10, 0)).unwrap(), utc(2026, 3, 9, 9, 0));
}

#[test]
fn weekly_picks_next_selected_weekday_this_week() {
    let p = RecurrencePattern::weekly([1, 3, 5], 9, 0, "UTC");
    assert_eq!(next_run(&p, utc(2026, 3, 2, 10, 0)).unwrap(), utc(2026, 3, 4, 9, 0));
    assert_eq!(next_run(&p, utc(2026, 3, 6, 10, 0)).unwrap(), utc(2026, 3, 9, 9, 0));
}

#[test]
fn weekly_from_unselected_day_moves_forward() {
    // Tuesday reference, Monday-only pattern.
    let p = RecurrencePattern::weekly([1], 9, 0, "UTC");
    assert_eq!(next_run(&p, utc(2026, 3, 3, 12, 0)).unwrap(), utc(2026, 3, 9, 9, 0));
}

#[test]
fn biweekly_single_day_jumps_two_weeks() {
    let p = RecurrencePattern::weekly([1], 9, 0, "UTC").every(2);
    assert_eq!(next_run(&p, utc(2026, 3, 2, 10, 0)).unwrap(), utc(2026, 3, 16, 9, 0));
}

#[test]
fn sunday_is_weekday_zero() {
    let p = RecurrencePattern::weekly([0], 7, 30, "UTC");
    assert_eq!(next_run(&p, utc(2026, 3, 2, 10, 0)).unwrap(), utc(2026, 3, 8, 7, 30));
}

// ---------------------------------------------------------------------------
// Monthly / yearly
// ---------------------------------------------------------------------------

#[test]
fn monthly_day_31_clamps_to_short_month() {
    let p = RecurrencePattern::monthly(31, 6, 0, "UTC");
    assert_eq!(next_run(&p, utc(2026, 4, 5, 0, 0)).unwrap(), utc(2026, 4, 30, 6, 0));
    assert_eq!(next_run(&p, utc(2026, 1, 31, 7, 0)).unwrap(), utc(2026, 2, 28, 6, 0));
}

#[test]
fn monthly_interval_moves_whole_months() {
    let p = RecurrencePattern::monthly(15, 6, 0, "UTC").every(3);
    assert_eq!(next_run(&p, utc(2026, 3, 20, 0, 0)).unwrap(), utc(2026, 6, 15, 6, 0));
}

#[test]
fn yearly_feb_29_clamps_in_common_years() {
    let p = RecurrencePattern::yearly(2, 29, 8, 0, "UTC");
    assert_eq!(next_run(&p, utc(2026, 1, 1, 0, 0)).unwrap(), utc(2026, 2, 28, 8, 0));
    assert_eq!(next_run(&p, utc(2027, 3, 1, 0, 0)).unwrap(), utc(2028, 2, 29, 8, 0));
}

// ---------------------------------------------------------------------------
// DST
// ---------------------------------------------------------------------------

#[test]
fn local_time_in_spring_gap_shifts_forward_an_hour() {
    // 2026-03-08 02:30 does not exist in New York; 03:30 EDT is 07:30 UTC.
    let p = RecurrencePattern::daily(2, 30, "America/New_York");
    assert_eq!(next_run(&p, utc(2026, 3, 8, 5, 0)).unwrap(), utc(2026, 3, 8, 7, 30));
}

#[test]
fn ambiguous_local_time_takes_the_earlier_instant() {
    // 2026-11-01 01:30 happens twice in New York; the EDT one is 05:30 UTC.
    let p = RecurrencePattern::daily(1, 30, "America/New_York");
    assert_eq!(next_run(&p, utc(2026, 11, 1, 4, 0)).unwrap(), utc(2026, 11, 1, 5, 30));
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[test]
fn custom_pattern_is_rejected() {
    let mut p = RecurrencePattern::daily(9, 0, "UTC");
    p.kind = RecurrenceType::Custom;
    assert!(next_run(&p, utc(2026, 3, 2, 0, 0)).unwrap_err().is_validation());
}

#[test]
fn malformed_patterns_are_rejected() {
    let reference = utc(2026, 3, 2, 0, 0);
    let cases = [
        RecurrencePattern::daily(9, 0, "UTC").every(0),
        RecurrencePattern::daily(24, 0, "UTC"),
        RecurrencePattern::daily(9, 60, "UTC"),
        RecurrencePattern::daily(9, 0, "Mars/Olympus_Mons"),
        RecurrencePattern::weekly([7], 9, 0, "UTC"),
        RecurrencePattern::monthly(0, 9, 0, "UTC"),
        RecurrencePattern::yearly(13, 1, 9, 0, "UTC"),
    ];
    for p in &cases {
        assert!(next_run(p, reference).unwrap_err().is_validation(), "{p:?}");
    }
}

#[test]
fn pattern_wire_format_uses_type_key() {
    let p: RecurrencePattern = serde_json::from_str(
        r#"{"type":"weekly","interval":1,"weekdays":[1,3],"hour":9,"minute":0,"timezone":"UTC"}"#,
    )
    .unwrap();
    assert_eq!(p.kind, RecurrenceType::Weekly);
    assert_eq!(p.weekdays.len(), 2);
}

// ---------------------------------------------------------------------------
// Sequences
// ---------------------------------------------------------------------------

#[test]
fn upcoming_runs_chain_from_each_result() {
    let p = RecurrencePattern::weekly([1, 4], 9, 0, "UTC");
    let runs = upcoming_runs(&p, utc(2026, 3, 2, 10, 0), 4).unwrap();
    assert_eq!(
        runs,
        vec![
            utc(2026, 3, 5, 9, 0),
            utc(2026, 3, 9, 9, 0),
            utc(2026, 3, 12, 9, 0),
            utc(2026, 3, 16, 9, 0),
        ]
    );
}

fn arb_pattern() -> impl Strategy<Value = RecurrencePattern> {
    let tz = prop::sample::select(vec![
        "UTC",
        "Asia/Bangkok",
        "America/New_York",
        "Europe/London",
        "Australia/Lord_Howe",
    ]);
    (
        0u8..4,
        1u32..5,
        proptest::collection::btree_set(0u8..7, 0..4),
        1u32..=31,
        1u32..=12,
        0u32..24,
        0u32..60,
        tz,
    )
        .prop_map(|(kind, interval, weekdays, day, month, hour, minute, tz)| {
            let p = match kind {
                0 => RecurrencePattern::daily(hour, minute, tz),
                1 => RecurrencePattern::weekly(weekdays, hour, minute, tz),
                2 => RecurrencePattern::monthly(day, hour, minute, tz),
                _ => RecurrencePattern::yearly(month, day, hour, minute, tz),
            };
            p.every(interval)
        })
}

proptest! {
    #[test]
    fn next_run_is_strictly_later_and_deterministic(
        pattern in arb_pattern(),
        secs in 1_700_000_000i64..1_900_000_000,
    ) {
        let reference = DateTime::from_timestamp(secs, 0).unwrap();
        let next = next_run(&pattern, reference).unwrap();
        prop_assert!(next > reference);
        prop_assert_eq!(next, next_run(&pattern, reference).unwrap());

        let after = next_run(&pattern, next).unwrap();
        prop_assert!(after > next);
    }
}
