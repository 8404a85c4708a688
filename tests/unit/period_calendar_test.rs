// Period calendar mapping for the Ethiopian academic year: thirteen billing
// periods, the last one short (Pagume).

#[path = "../helpers/mod.rs"]
mod helpers;

use helpers::{calendar, date};
use temaripay::modules::calendar::PeriodCalendar;

#[test]
fn test_thirteen_period_year() {
    let cal = calendar();
    assert_eq!(cal.period_start(1).unwrap(), date(2023, 9, 11));
    assert_eq!(cal.period_start(2).unwrap(), date(2023, 10, 11));
    // Period 13 starts 360 days after the epoch
    assert_eq!(cal.period_start(13).unwrap(), date(2024, 9, 5));
    assert_eq!(cal.period_length(13).unwrap(), 5);
    assert_eq!(cal.period_length(12).unwrap(), 30);
}

#[test]
fn test_due_date_adds_grace_once() {
    let cal = calendar();
    assert_eq!(cal.due_date(1, 30).unwrap(), date(2023, 10, 11));
    assert_eq!(cal.due_date(1, 0).unwrap(), date(2023, 9, 11));
    assert_eq!(cal.due_date(3, 10).unwrap(), date(2023, 11, 20));
}

#[test]
fn test_period_index_is_one_based() {
    let cal = calendar();
    assert!(cal.period_start(0).is_err());
    assert!(cal.period_length(0).is_err());
    assert!(cal.due_date(0, 30).is_err());
}

#[test]
fn test_negative_grace_rejected() {
    let cal = calendar();
    assert!(cal.due_date(1, -1).is_err());
}

#[test]
fn test_days_past_due_sign() {
    let due = date(2023, 10, 11);
    assert_eq!(PeriodCalendar::days_past_due(due, date(2023, 10, 11)), 0);
    assert_eq!(PeriodCalendar::days_past_due(due, date(2023, 10, 12)), 1);
    assert_eq!(PeriodCalendar::days_past_due(due, date(2023, 9, 30)), -11);
}
