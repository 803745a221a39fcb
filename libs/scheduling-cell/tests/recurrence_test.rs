// libs/scheduling-cell/tests/recurrence_test.rs
mod common;

use assert_matches::assert_matches;

use scheduling_cell::models::{
    ExplicitSession, RecurrenceRule, ScheduleRequest, SchedulingError, SessionOverride,
};
use scheduling_cell::services::ScheduleGenerator;

use common::{date, time};

fn request(count: i32, recurrence: RecurrenceRule) -> ScheduleRequest {
    ScheduleRequest {
        required_session_count: count,
        start_date: date(2024, 1, 1),
        start_time: time(9, 0),
        duration_minutes: 30,
        recurrence,
        overrides: vec![],
    }
}

#[test]
fn test_consecutive_days() {
    let candidates = ScheduleGenerator::new()
        .generate(&request(3, RecurrenceRule::Consecutive))
        .unwrap();

    let dates: Vec<_> = candidates.iter().map(|c| c.date).collect();
    assert_eq!(dates, vec![date(2024, 1, 1), date(2024, 1, 2), date(2024, 1, 3)]);
    assert!(candidates.iter().all(|c| c.start_time == time(9, 0) && c.duration_minutes == 30));
    assert_eq!(candidates.iter().map(|c| c.ordinal).collect::<Vec<_>>(), vec![1, 2, 3]);
}

#[test]
fn test_weekday_pattern() {
    // Monday and Wednesday, starting on Monday 2024-01-01
    let candidates = ScheduleGenerator::new()
        .generate(&request(4, RecurrenceRule::Weekdays { days: vec![1, 3] }))
        .unwrap();

    let dates: Vec<_> = candidates.iter().map(|c| c.date).collect();
    assert_eq!(
        dates,
        vec![date(2024, 1, 1), date(2024, 1, 3), date(2024, 1, 8), date(2024, 1, 10)]
    );
}

#[test]
fn test_weekday_pattern_skips_to_first_match() {
    let candidates = ScheduleGenerator::new()
        .generate(&request(2, RecurrenceRule::Weekdays { days: vec![5] }))
        .unwrap();

    assert_eq!(candidates[0].date, date(2024, 1, 5));
    assert_eq!(candidates[1].date, date(2024, 1, 12));
}

#[test]
fn test_sunday_is_zero() {
    let candidates = ScheduleGenerator::new()
        .generate(&request(1, RecurrenceRule::Weekdays { days: vec![0] }))
        .unwrap();

    assert_eq!(candidates[0].date, date(2024, 1, 7));
}

#[test]
fn test_duplicate_weekdays_are_harmless() {
    let candidates = ScheduleGenerator::new()
        .generate(&request(2, RecurrenceRule::Weekdays { days: vec![1, 1] }))
        .unwrap();

    assert_eq!(candidates[1].date, date(2024, 1, 8));
}

#[test]
fn test_invalid_recurrence() {
    let generator = ScheduleGenerator::new();

    assert_matches!(
        generator.generate(&request(2, RecurrenceRule::Weekdays { days: vec![] })),
        Err(SchedulingError::InvalidRecurrence(_))
    );
    assert_matches!(
        generator.generate(&request(2, RecurrenceRule::Weekdays { days: vec![7] })),
        Err(SchedulingError::InvalidRecurrence(_))
    );
}

#[test]
fn test_invalid_count() {
    let generator = ScheduleGenerator::new();

    assert_matches!(
        generator.generate(&request(0, RecurrenceRule::Consecutive)),
        Err(SchedulingError::InvalidCount(0))
    );
    assert_matches!(
        generator.generate(&request(-2, RecurrenceRule::Consecutive)),
        Err(SchedulingError::InvalidCount(-2))
    );
}

#[test]
fn test_per_session_overrides() {
    let mut req = request(3, RecurrenceRule::Consecutive);
    req.overrides = vec![SessionOverride {
        ordinal: 2,
        start_time: Some(time(11, 0)),
        duration_minutes: Some(60),
        notes: Some("longer evaluation".to_string()),
    }];

    let candidates = ScheduleGenerator::new().generate(&req).unwrap();

    assert_eq!(candidates[0].start_time, time(9, 0));
    assert_eq!(candidates[1].start_time, time(11, 0));
    assert_eq!(candidates[1].duration_minutes, 60);
    assert_eq!(candidates[1].notes.as_deref(), Some("longer evaluation"));
    assert_eq!(candidates[2].duration_minutes, 30);
}

#[test]
fn test_override_outside_range() {
    let mut req = request(3, RecurrenceRule::Consecutive);
    req.overrides = vec![SessionOverride {
        ordinal: 4,
        start_time: None,
        duration_minutes: Some(60),
        notes: None,
    }];

    assert_matches!(
        ScheduleGenerator::new().generate(&req),
        Err(SchedulingError::InvalidOverride { ordinal: 4, max: 3 })
    );
}

#[test]
fn test_override_named_twice() {
    let mut req = request(3, RecurrenceRule::Consecutive);
    req.overrides = vec![
        SessionOverride {
            ordinal: 1,
            start_time: Some(time(10, 0)),
            duration_minutes: None,
            notes: None,
        },
        SessionOverride {
            ordinal: 1,
            start_time: Some(time(11, 0)),
            duration_minutes: None,
            notes: None,
        },
    ];

    assert_matches!(
        ScheduleGenerator::new().generate(&req),
        Err(SchedulingError::InvalidOverride { ordinal: 1, max: 3 })
    );
}

#[test]
fn test_generation_ignores_clinic_rules() {
    // conflict-naive: out-of-hours times pass through untouched
    let mut req = request(1, RecurrenceRule::Consecutive);
    req.start_time = time(21, 0);

    assert_eq!(ScheduleGenerator::new().generate(&req).unwrap()[0].start_time, time(21, 0));
}

#[test]
fn test_explicit_candidates_are_numbered_in_order() {
    let sessions = vec![
        ExplicitSession {
            date: date(2024, 2, 1),
            start_time: time(9, 0),
            duration_minutes: None,
            notes: None,
        },
        ExplicitSession {
            date: date(2024, 1, 15),
            start_time: time(10, 0),
            duration_minutes: Some(90),
            notes: Some("initial".to_string()),
        },
    ];

    let candidates = ScheduleGenerator::new().explicit_candidates(&sessions, 45);

    assert_eq!(candidates[0].ordinal, 1);
    assert_eq!(candidates[0].duration_minutes, 45);
    assert_eq!(candidates[1].ordinal, 2);
    assert_eq!(candidates[1].date, date(2024, 1, 15));
    assert_eq!(candidates[1].duration_minutes, 90);
}
