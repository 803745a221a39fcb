// libs/scheduling-cell/tests/lifecycle_test.rs
mod common;

use assert_matches::assert_matches;
use uuid::Uuid;

use scheduling_cell::models::{
    AttendanceOutcome, AttendanceState, SchedulingError, Treatment, TreatmentStatus,
};
use scheduling_cell::services::{SessionAction, SessionLifecycleService};

use common::{date, package, session_at, time};

#[test]
fn test_valid_transitions() {
    let lifecycle = SessionLifecycleService::new();

    assert_eq!(
        lifecycle.get_valid_transitions(AttendanceState::Pending),
        vec![AttendanceState::Attended, AttendanceState::NotAttended]
    );
    assert!(lifecycle.get_valid_transitions(AttendanceState::Attended).is_empty());
    assert!(lifecycle.get_valid_transitions(AttendanceState::NotAttended).is_empty());
}

#[test]
fn test_recording_outcome_confirms_session() {
    let lifecycle = SessionLifecycleService::new();
    let mut session = session_at(date(2024, 1, 1), time(9, 0), 30);
    assert!(!session.is_confirmed());

    lifecycle
        .record_outcome(&mut session, AttendanceOutcome::NotAttended, Some("called in sick".to_string()))
        .unwrap();

    assert_eq!(session.attendance, AttendanceState::NotAttended);
    assert!(session.is_confirmed());
    assert_eq!(session.notes.as_deref(), Some("called in sick"));
}

#[test]
fn test_second_outcome_is_rejected() {
    let lifecycle = SessionLifecycleService::new();
    let mut session = session_at(date(2024, 1, 1), time(9, 0), 30);

    lifecycle.record_outcome(&mut session, AttendanceOutcome::Attended, None).unwrap();
    let result = lifecycle.record_outcome(&mut session, AttendanceOutcome::NotAttended, None);

    assert_matches!(
        result,
        Err(SchedulingError::SessionLocked { state: AttendanceState::Attended, .. })
    );
    assert_eq!(session.attendance, AttendanceState::Attended);
}

#[test]
fn test_confirmed_session_is_immutable() {
    let lifecycle = SessionLifecycleService::new();
    let mut session = session_at(date(2024, 1, 1), time(9, 0), 30);

    for action in [SessionAction::Reschedule, SessionAction::Delete, SessionAction::RecordAttendance] {
        assert!(lifecycle.ensure_mutable(&session, action).is_ok());
    }

    session.attendance = AttendanceState::Attended;

    for action in [SessionAction::Reschedule, SessionAction::Delete, SessionAction::RecordAttendance] {
        assert_matches!(
            lifecycle.ensure_mutable(&session, action),
            Err(SchedulingError::SessionLocked { session_id, .. }) if session_id == session.id
        );
    }
}

#[test]
fn test_treatment_transitions_are_terminal() {
    let lifecycle = SessionLifecycleService::new();
    let mut treatment = Treatment::new(Uuid::new_v4(), package(4, None), None);

    assert!(lifecycle
        .validate_treatment_transition(&treatment, TreatmentStatus::Finalized)
        .is_ok());
    assert!(lifecycle
        .validate_treatment_transition(&treatment, TreatmentStatus::Active)
        .is_err());

    treatment.status = TreatmentStatus::Finalized;

    assert_matches!(
        lifecycle.validate_treatment_transition(&treatment, TreatmentStatus::Cancelled),
        Err(SchedulingError::TreatmentClosed { status: TreatmentStatus::Finalized, .. })
    );
    assert_matches!(
        lifecycle.ensure_schedulable(&treatment),
        Err(SchedulingError::TreatmentClosed { .. })
    );
}
