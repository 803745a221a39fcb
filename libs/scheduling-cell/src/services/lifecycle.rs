// libs/scheduling-cell/src/services/lifecycle.rs
use chrono::Utc;
use std::fmt;
use tracing::{debug, info, warn};

use crate::models::{
    AttendanceOutcome, AttendanceState, SchedulingError, Session, Treatment, TreatmentStatus,
};

/// Mutations guarded by the session lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
    Reschedule,
    Delete,
    RecordAttendance,
}

impl fmt::Display for SessionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionAction::Reschedule => write!(f, "reschedule"),
            SessionAction::Delete => write!(f, "delete"),
            SessionAction::RecordAttendance => write!(f, "record attendance"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SessionLifecycleService;

impl SessionLifecycleService {
    pub fn new() -> Self {
        Self
    }

    /// Get all valid next states for a given attendance state
    pub fn get_valid_transitions(&self, current: AttendanceState) -> Vec<AttendanceState> {
        match current {
            AttendanceState::Pending => vec![
                AttendanceState::Attended,
                AttendanceState::NotAttended,
            ],
            // Terminal states - the session is locked
            AttendanceState::Attended => vec![],
            AttendanceState::NotAttended => vec![],
        }
    }

    pub fn validate_transition(
        &self,
        session: &Session,
        new_state: AttendanceState,
    ) -> Result<(), SchedulingError> {
        debug!(
            "Validating attendance transition for session {}: {} -> {}",
            session.id, session.attendance, new_state
        );

        if !self.get_valid_transitions(session.attendance).contains(&new_state) {
            warn!(
                "Rejected attendance transition on session {}: {} -> {}",
                session.id, session.attendance, new_state
            );
            return Err(SchedulingError::SessionLocked {
                session_id: session.id,
                state: session.attendance,
            });
        }

        Ok(())
    }

    /// Reject any mutation of a session whose outcome is already confirmed.
    pub fn ensure_mutable(&self, session: &Session, action: SessionAction) -> Result<(), SchedulingError> {
        if session.attendance.is_terminal() {
            warn!(
                "Cannot {} session {}: attendance already confirmed as {}",
                action, session.id, session.attendance
            );
            return Err(SchedulingError::SessionLocked {
                session_id: session.id,
                state: session.attendance,
            });
        }
        Ok(())
    }

    /// Apply an attendance outcome, locking the session.
    pub fn record_outcome(
        &self,
        session: &mut Session,
        outcome: AttendanceOutcome,
        notes: Option<String>,
    ) -> Result<(), SchedulingError> {
        let new_state = AttendanceState::from(outcome);
        self.validate_transition(session, new_state)?;

        session.attendance = new_state;
        if notes.is_some() {
            session.notes = notes;
        }
        session.updated_at = Utc::now();

        info!("Session {} confirmed as {}", session.id, new_state);
        Ok(())
    }

    /// Treatments move once, from active to a terminal status.
    pub fn validate_treatment_transition(
        &self,
        treatment: &Treatment,
        new_status: TreatmentStatus,
    ) -> Result<(), SchedulingError> {
        let allowed = treatment.status == TreatmentStatus::Active
            && matches!(new_status, TreatmentStatus::Finalized | TreatmentStatus::Cancelled);

        if !allowed {
            warn!(
                "Invalid treatment transition attempted on {}: {} -> {}",
                treatment.id, treatment.status, new_status
            );
            return Err(SchedulingError::TreatmentClosed {
                treatment_id: treatment.id,
                status: treatment.status,
            });
        }
        Ok(())
    }

    pub fn ensure_schedulable(&self, treatment: &Treatment) -> Result<(), SchedulingError> {
        if !treatment.is_active() {
            return Err(SchedulingError::TreatmentClosed {
                treatment_id: treatment.id,
                status: treatment.status,
            });
        }
        Ok(())
    }
}
