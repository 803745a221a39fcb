// libs/scheduling-cell/src/models.rs
use serde::{Deserialize, Serialize, Serializer};
use uuid::Uuid;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use std::fmt;

// ==============================================================================
// TREATMENT & PACKAGE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Package {
    pub id: Uuid,
    pub name: String,
    pub required_session_count: i32,
    /// Falls back to the clinic default when the package does not define one.
    pub session_duration_minutes: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Treatment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub package: Package,
    #[serde(default)]
    pub status: TreatmentStatus,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Treatment {
    pub fn new(patient_id: Uuid, package: Package, notes: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            patient_id,
            package,
            status: TreatmentStatus::Active,
            notes,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == TreatmentStatus::Active
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TreatmentStatus {
    #[default]
    Active,
    Finalized,
    Cancelled,
}

impl fmt::Display for TreatmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreatmentStatus::Active => write!(f, "active"),
            TreatmentStatus::Finalized => write!(f, "finalized"),
            TreatmentStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

// ==============================================================================
// SESSION MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub id: Uuid,
    pub treatment_id: Uuid,
    pub ordinal: i32,
    pub scheduled_date: NaiveDate,
    pub start_time: NaiveTime,
    pub duration_minutes: i32,
    pub attendance: AttendanceState,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn from_candidate(treatment_id: Uuid, candidate: &SessionCandidate) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            treatment_id,
            ordinal: candidate.ordinal,
            scheduled_date: candidate.date,
            start_time: candidate.start_time,
            duration_minutes: candidate.duration_minutes,
            attendance: AttendanceState::Pending,
            notes: candidate.notes.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Confirmation is derived from the attendance state, never stored.
    pub fn is_confirmed(&self) -> bool {
        self.attendance.is_terminal()
    }

    pub fn end_time(&self) -> NaiveTime {
        let (end, _) = self
            .start_time
            .overflowing_add_signed(Duration::minutes(self.duration_minutes as i64));
        end
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceState {
    Pending,
    Attended,
    NotAttended,
}

impl AttendanceState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AttendanceState::Pending)
    }
}

impl fmt::Display for AttendanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttendanceState::Pending => write!(f, "pending"),
            AttendanceState::Attended => write!(f, "attended"),
            AttendanceState::NotAttended => write!(f, "not_attended"),
        }
    }
}

/// Outcome a caller may record; `Pending` is deliberately not representable.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceOutcome {
    Attended,
    NotAttended,
}

impl From<AttendanceOutcome> for AttendanceState {
    fn from(outcome: AttendanceOutcome) -> Self {
        match outcome {
            AttendanceOutcome::Attended => AttendanceState::Attended,
            AttendanceOutcome::NotAttended => AttendanceState::NotAttended,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionResponse {
    #[serde(flatten)]
    pub session: Session,
    pub end_time: NaiveTime,
    pub confirmed: bool,
}

impl From<Session> for SessionResponse {
    fn from(session: Session) -> Self {
        Self {
            end_time: session.end_time(),
            confirmed: session.is_confirmed(),
            session,
        }
    }
}

// ==============================================================================
// SLOT & OCCUPANCY MODELS
// ==============================================================================

/// A fixed-width quantum of clinic time, identified by its start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Slot(NaiveTime);

impl Slot {
    pub fn new(start: NaiveTime) -> Self {
        Self(start)
    }

    pub fn start(&self) -> NaiveTime {
        self.0
    }

    pub fn label(&self) -> String {
        self.0.format("%H:%M").to_string()
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%H:%M"))
    }
}

impl Serialize for Slot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum DensityTier {
    Free,
    Low,
    Medium,
    High,
    VeryHigh,
    Full,
}

impl DensityTier {
    /// A full date is closed to new bookings regardless of free slots.
    pub fn is_closed(&self) -> bool {
        matches!(self, DensityTier::Full)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConflictingSession {
    pub session_id: Uuid,
    pub treatment_id: Uuid,
    pub ordinal: i32,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

impl fmt::Display for ConflictingSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "session {} ({}-{})",
            self.session_id,
            self.start_time.format("%H:%M"),
            self.end_time.format("%H:%M")
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DayOverview {
    pub date: NaiveDate,
    pub session_count: usize,
    pub density: DensityTier,
    pub closed: bool,
    pub occupied_slots: Vec<Slot>,
    pub sessions: Vec<ConflictingSession>,
    /// Start slots where a session of the requested duration would fit.
    pub available_starts: Vec<Slot>,
}

// ==============================================================================
// RECURRENCE & CANDIDATE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecurrenceRule {
    /// Every calendar day.
    Consecutive,
    /// Only the listed weekdays, 0 = Sunday .. 6 = Saturday.
    Weekdays { days: Vec<u8> },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionOverride {
    pub ordinal: i32,
    pub start_time: Option<NaiveTime>,
    pub duration_minutes: Option<i32>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduleRequest {
    pub required_session_count: i32,
    pub start_date: NaiveDate,
    pub start_time: NaiveTime,
    pub duration_minutes: i32,
    pub recurrence: RecurrenceRule,
    #[serde(default)]
    pub overrides: Vec<SessionOverride>,
}

/// A provisional session produced by generation or supplied explicitly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionCandidate {
    pub ordinal: i32,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub duration_minutes: i32,
    pub notes: Option<String>,
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SchedulePlan {
    Recurring {
        start_date: NaiveDate,
        start_time: NaiveTime,
        recurrence: RecurrenceRule,
        duration_minutes: Option<i32>,
        #[serde(default)]
        overrides: Vec<SessionOverride>,
    },
    Explicit {
        sessions: Vec<ExplicitSession>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplicitSession {
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub duration_minutes: Option<i32>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddSessionRequest {
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub duration_minutes: Option<i32>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleSessionRequest {
    pub date: NaiveDate,
    pub start_time: NaiveTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordAttendanceRequest {
    pub outcome: AttendanceOutcome,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceUpdate {
    pub session_id: Uuid,
    pub outcome: AttendanceOutcome,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchAttendanceRequest {
    pub updates: Vec<AttendanceUpdate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttendanceUpdateResult {
    pub session_id: Uuid,
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TreatmentProgress {
    pub treatment_id: Uuid,
    pub status: TreatmentStatus,
    pub required_sessions: i32,
    pub scheduled_sessions: usize,
    pub attended: usize,
    pub not_attended: usize,
    pub pending: usize,
}

impl TreatmentProgress {
    pub fn remaining_to_schedule(&self) -> usize {
        (self.required_sessions.max(0) as usize).saturating_sub(self.scheduled_sessions)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CalendarQuery {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub duration_minutes: Option<i32>,
}

// ==============================================================================
// ERROR MODELS
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SchedulingError {
    #[error("Session duration must be positive, got {0} minutes")]
    InvalidDuration(i32),

    #[error("Start time {} is outside clinic hours", .0.format("%H:%M"))]
    OutOfHours(NaiveTime),

    #[error("Start time {} is not on a slot boundary", .0.format("%H:%M"))]
    MisalignedStart(NaiveTime),

    #[error("Invalid recurrence rule: {0}")]
    InvalidRecurrence(String),

    #[error("Session count must be positive, got {0}")]
    InvalidCount(i32),

    #[error("Override for ordinal {ordinal} is invalid: ordinals run 1..={max}, one override each")]
    InvalidOverride { ordinal: i32, max: i32 },

    #[error("Date range {from}..={to} is invalid: {reason}")]
    InvalidDateRange {
        from: NaiveDate,
        to: NaiveDate,
        reason: String,
    },

    #[error("Date {date} already holds {limit} sessions and is closed to new bookings")]
    DayCapacityExceeded { date: NaiveDate, limit: usize },

    #[error("Slot {slot} on {date} collides with {conflicting}")]
    SlotConflict {
        date: NaiveDate,
        slot: Slot,
        conflicting: ConflictingSession,
    },

    #[error("Session {session_id} is locked (attendance {state})")]
    SessionLocked { session_id: Uuid, state: AttendanceState },

    #[error("Session {0} not found")]
    SessionNotFound(Uuid),

    #[error("Treatment {0} not found")]
    TreatmentNotFound(Uuid),

    #[error("Treatment {treatment_id} is {status} and can no longer be scheduled")]
    TreatmentClosed { treatment_id: Uuid, status: TreatmentStatus },

    #[error("Package requires exactly {expected} sessions, got {actual}")]
    PackageMismatch { expected: i32, actual: i32 },

    #[error("Treatment {0} already has a schedule")]
    ScheduleAlreadyAssigned(Uuid),

    #[error("Treatment {treatment_id} already holds all {required} sessions of its package")]
    PackageFull { treatment_id: Uuid, required: i32 },

    #[error("Treatment {treatment_id} still has {pending} pending sessions")]
    PendingSessionsRemain { treatment_id: Uuid, pending: usize },

    #[error("Session {ordinal} on {date} rejected: {reason}")]
    BatchRejected {
        ordinal: i32,
        date: NaiveDate,
        reason: Box<SchedulingError>,
    },

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl SchedulingError {
    /// Unwraps a batch rejection to the underlying cause.
    pub fn root_cause(&self) -> &SchedulingError {
        match self {
            SchedulingError::BatchRejected { reason, .. } => reason.root_cause(),
            other => other,
        }
    }
}
