// libs/scheduling-cell/src/services/scheduling.rs
use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use shared_config::{AppConfig, SchedulingPolicy};

use crate::models::{
    AddSessionRequest, AttendanceState, AttendanceUpdate, AttendanceUpdateResult, DayOverview,
    RecordAttendanceRequest, RescheduleSessionRequest, SchedulePlan, ScheduleRequest,
    SchedulingError, Session, SessionCandidate, Treatment, TreatmentProgress, TreatmentStatus,
};
use crate::services::conflict::ConflictDetectionService;
use crate::services::lifecycle::{SessionAction, SessionLifecycleService};
use crate::services::locks::{DateGuard, DateLockRegistry, TreatmentLockRegistry};
use crate::services::occupancy::OccupancyIndex;
use crate::services::recurrence::ScheduleGenerator;
use crate::store::{SessionStore, TreatmentDirectory};

/// Widest window the calendar preview will compute in one call.
pub const MAX_OVERVIEW_DAYS: i64 = 62;

/// Attempts at pinning a session's date before giving up on a concurrent mover.
const LOCK_ATTEMPTS: usize = 3;

/// Single authoritative entry point for every scheduling mutation.
///
/// Writers take the treatment lock (when a treatment is involved) and then
/// the locks of every date they read or write, reload state from storage,
/// validate and commit before releasing.
pub struct SchedulingService {
    sessions: Arc<dyn SessionStore>,
    treatments: Arc<dyn TreatmentDirectory>,
    policy: SchedulingPolicy,
    date_locks: DateLockRegistry,
    treatment_locks: TreatmentLockRegistry,
    conflicts: ConflictDetectionService,
    generator: ScheduleGenerator,
    lifecycle: SessionLifecycleService,
}

impl SchedulingService {
    pub fn new(
        config: &AppConfig,
        sessions: Arc<dyn SessionStore>,
        treatments: Arc<dyn TreatmentDirectory>,
    ) -> Self {
        Self::with_policy(config.scheduling.clone(), sessions, treatments)
    }

    pub fn with_policy(
        policy: SchedulingPolicy,
        sessions: Arc<dyn SessionStore>,
        treatments: Arc<dyn TreatmentDirectory>,
    ) -> Self {
        Self {
            sessions,
            treatments,
            policy,
            date_locks: DateLockRegistry::new(),
            treatment_locks: TreatmentLockRegistry::new(),
            conflicts: ConflictDetectionService::new(),
            generator: ScheduleGenerator::new(),
            lifecycle: SessionLifecycleService::new(),
        }
    }

    pub fn policy(&self) -> &SchedulingPolicy {
        &self.policy
    }

    // ==============================================================================
    // TREATMENT SCHEDULING
    // ==============================================================================

    /// Schedule a treatment's full package, all or nothing.
    pub async fn assign_schedule(
        &self,
        treatment_id: Uuid,
        plan: SchedulePlan,
    ) -> Result<Vec<Session>, SchedulingError> {
        let _treatment_guard = self.treatment_locks.lock(treatment_id).await;

        let treatment = self.load_treatment(treatment_id).await?;
        self.lifecycle.ensure_schedulable(&treatment)?;

        let required = treatment.package.required_session_count;
        if required <= 0 {
            return Err(SchedulingError::InvalidCount(required));
        }

        let default_duration = self.default_duration(&treatment);
        let candidates = match plan {
            SchedulePlan::Recurring {
                start_date,
                start_time,
                recurrence,
                duration_minutes,
                overrides,
            } => self.generator.generate(&ScheduleRequest {
                required_session_count: required,
                start_date,
                start_time,
                duration_minutes: duration_minutes.unwrap_or(default_duration),
                recurrence,
                overrides,
            })?,
            SchedulePlan::Explicit { sessions } => {
                if sessions.len() != required as usize {
                    return Err(SchedulingError::PackageMismatch {
                        expected: required,
                        actual: sessions.len() as i32,
                    });
                }
                self.generator.explicit_candidates(&sessions, default_duration)
            }
        };

        let existing = self.load_treatment_sessions(treatment_id).await?;
        if !existing.is_empty() {
            return Err(SchedulingError::ScheduleAlreadyAssigned(treatment_id));
        }

        let sessions = self.commit_batch(&treatment, candidates).await?;

        info!(
            "Assigned {} sessions to treatment {}",
            sessions.len(),
            treatment_id
        );
        Ok(sessions)
    }

    /// Schedule one session into the lowest free ordinal of the package.
    pub async fn add_session(
        &self,
        treatment_id: Uuid,
        request: AddSessionRequest,
    ) -> Result<Session, SchedulingError> {
        let _treatment_guard = self.treatment_locks.lock(treatment_id).await;

        let treatment = self.load_treatment(treatment_id).await?;
        self.lifecycle.ensure_schedulable(&treatment)?;

        let required = treatment.package.required_session_count;
        let taken: BTreeSet<i32> = self
            .load_treatment_sessions(treatment_id)
            .await?
            .iter()
            .map(|session| session.ordinal)
            .collect();

        let ordinal = (1..=required)
            .find(|ordinal| !taken.contains(ordinal))
            .ok_or(SchedulingError::PackageFull {
                treatment_id,
                required,
            })?;

        let candidate = SessionCandidate {
            ordinal,
            date: request.date,
            start_time: request.start_time,
            duration_minutes: request
                .duration_minutes
                .unwrap_or_else(|| self.default_duration(&treatment)),
            notes: request.notes,
        };

        let mut committed = self
            .commit_batch(&treatment, vec![candidate])
            .await
            .map_err(|e| match e {
                SchedulingError::BatchRejected { reason, .. } => *reason,
                other => other,
            })?;

        committed
            .pop()
            .ok_or_else(|| SchedulingError::DatabaseError("No session committed".to_string()))
    }

    pub async fn finalize_treatment(&self, treatment_id: Uuid) -> Result<Treatment, SchedulingError> {
        let _treatment_guard = self.treatment_locks.lock(treatment_id).await;

        let mut treatment = self.load_treatment(treatment_id).await?;
        self.lifecycle
            .validate_treatment_transition(&treatment, TreatmentStatus::Finalized)?;

        let pending = self
            .load_treatment_sessions(treatment_id)
            .await?
            .iter()
            .filter(|session| session.attendance == AttendanceState::Pending)
            .count();

        if pending > 0 {
            return Err(SchedulingError::PendingSessionsRemain {
                treatment_id,
                pending,
            });
        }

        treatment.status = TreatmentStatus::Finalized;
        treatment.updated_at = Utc::now();
        self.store_treatment(&treatment).await?;

        info!("Treatment {} finalized", treatment_id);
        Ok(treatment)
    }

    /// Cancel a treatment, releasing its pending sessions. Confirmed
    /// sessions stay as history.
    pub async fn cancel_treatment(&self, treatment_id: Uuid) -> Result<Treatment, SchedulingError> {
        let _treatment_guard = self.treatment_locks.lock(treatment_id).await;

        let mut treatment = self.load_treatment(treatment_id).await?;
        self.lifecycle
            .validate_treatment_transition(&treatment, TreatmentStatus::Cancelled)?;

        let mut released = 0;
        for attempt in 1..=LOCK_ATTEMPTS {
            let locked_dates = pending_dates(&self.load_treatment_sessions(treatment_id).await?);
            let _date_guard = self.date_locks.lock_all(locked_dates.iter().copied()).await;

            let sessions = self.load_treatment_sessions(treatment_id).await?;
            if locked_dates != pending_dates(&sessions) {
                debug!(
                    "Pending sessions of treatment {} moved while locking (attempt {})",
                    treatment_id, attempt
                );
                continue;
            }

            let pending_ids: Vec<Uuid> = sessions
                .iter()
                .filter(|session| session.attendance == AttendanceState::Pending)
                .map(|session| session.id)
                .collect();

            // Status is written before release; a failed release restores it.
            let previous = treatment.clone();
            treatment.status = TreatmentStatus::Cancelled;
            treatment.updated_at = Utc::now();
            self.store_treatment(&treatment).await?;

            if let Err(e) = self.sessions.delete_sessions(&pending_ids).await {
                warn!(
                    "Releasing sessions of treatment {} failed, restoring status: {}",
                    treatment_id, e
                );
                if let Err(restore) = self.store_treatment(&previous).await {
                    error!(
                        "Treatment {} left cancelled with pending sessions: {}",
                        treatment_id, restore
                    );
                }
                return Err(SchedulingError::DatabaseError(e.to_string()));
            }

            released = pending_ids.len();
            break;
        }

        if treatment.status != TreatmentStatus::Cancelled {
            return Err(concurrent_modification());
        }

        info!(
            "Treatment {} cancelled, released {} pending sessions",
            treatment_id, released
        );
        Ok(treatment)
    }

    // ==============================================================================
    // SESSION OPERATIONS
    // ==============================================================================

    pub async fn reschedule(
        &self,
        session_id: Uuid,
        request: RescheduleSessionRequest,
    ) -> Result<Session, SchedulingError> {
        let current = self.load_session(session_id).await?;
        self.lifecycle.ensure_mutable(&current, SessionAction::Reschedule)?;

        let treatment = self.load_treatment(current.treatment_id).await?;
        self.lifecycle.ensure_schedulable(&treatment)?;

        let (mut session, _date_guard) = self
            .pin_session(session_id, Some(request.date))
            .await?;
        self.lifecycle.ensure_mutable(&session, SessionAction::Reschedule)?;

        let mut index = self.build_index([request.date]).await?;
        index.remove(session.id);

        self.conflicts.check_candidate(
            &index,
            request.date,
            request.start_time,
            session.duration_minutes,
        )?;

        let previous = (session.scheduled_date, session.start_time);
        session.scheduled_date = request.date;
        session.start_time = request.start_time;
        session.updated_at = Utc::now();

        self.sessions
            .update_session(&session)
            .await
            .map_err(|e| SchedulingError::DatabaseError(e.to_string()))?;

        info!(
            "Session {} rescheduled from {} {} to {} {}",
            session.id,
            previous.0,
            previous.1.format("%H:%M"),
            session.scheduled_date,
            session.start_time.format("%H:%M")
        );
        Ok(session)
    }

    pub async fn record_attendance(
        &self,
        session_id: Uuid,
        request: RecordAttendanceRequest,
    ) -> Result<Session, SchedulingError> {
        let (mut session, _date_guard) = self.pin_session(session_id, None).await?;

        self.lifecycle
            .record_outcome(&mut session, request.outcome, request.notes)?;

        self.sessions
            .update_session(&session)
            .await
            .map_err(|e| SchedulingError::DatabaseError(e.to_string()))?;

        Ok(session)
    }

    /// Record many outcomes; each item succeeds or fails on its own.
    pub async fn record_attendance_batch(
        &self,
        updates: Vec<AttendanceUpdate>,
    ) -> Vec<AttendanceUpdateResult> {
        let mut results = Vec::with_capacity(updates.len());

        for update in updates {
            let request = RecordAttendanceRequest {
                outcome: update.outcome,
                notes: update.notes,
            };

            let result = match self.record_attendance(update.session_id, request).await {
                Ok(session) => AttendanceUpdateResult {
                    session_id: update.session_id,
                    success: true,
                    message: format!("Recorded {}", session.attendance),
                },
                Err(e) => {
                    warn!("Attendance update for {} failed: {}", update.session_id, e);
                    AttendanceUpdateResult {
                        session_id: update.session_id,
                        success: false,
                        message: e.to_string(),
                    }
                }
            };
            results.push(result);
        }

        results
    }

    pub async fn cancel_session(&self, session_id: Uuid) -> Result<(), SchedulingError> {
        let (session, _date_guard) = self.pin_session(session_id, None).await?;
        self.lifecycle.ensure_mutable(&session, SessionAction::Delete)?;

        self.sessions
            .delete_session(session_id)
            .await
            .map_err(|e| SchedulingError::DatabaseError(e.to_string()))?;

        info!(
            "Session {} (ordinal {}) of treatment {} cancelled",
            session.id, session.ordinal, session.treatment_id
        );
        Ok(())
    }

    // ==============================================================================
    // READ-ONLY VIEWS
    // ==============================================================================

    pub async fn treatment_sessions(&self, treatment_id: Uuid) -> Result<Vec<Session>, SchedulingError> {
        self.load_treatment(treatment_id).await?;
        self.load_treatment_sessions(treatment_id).await
    }

    pub async fn treatment_progress(
        &self,
        treatment_id: Uuid,
    ) -> Result<TreatmentProgress, SchedulingError> {
        let treatment = self.load_treatment(treatment_id).await?;
        let sessions = self.load_treatment_sessions(treatment_id).await?;

        let count = |state: AttendanceState| {
            sessions
                .iter()
                .filter(|session| session.attendance == state)
                .count()
        };

        Ok(TreatmentProgress {
            treatment_id,
            status: treatment.status,
            required_sessions: treatment.package.required_session_count,
            scheduled_sessions: sessions.len(),
            attended: count(AttendanceState::Attended),
            not_attended: count(AttendanceState::NotAttended),
            pending: count(AttendanceState::Pending),
        })
    }

    /// Calendar preview; advisory only, bookings are re-validated on commit.
    pub async fn day_overview(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        duration_minutes: Option<i32>,
    ) -> Result<Vec<DayOverview>, SchedulingError> {
        if to < from {
            return Err(SchedulingError::InvalidDateRange {
                from,
                to,
                reason: "end precedes start".to_string(),
            });
        }
        if (to - from).num_days() >= MAX_OVERVIEW_DAYS {
            return Err(SchedulingError::InvalidDateRange {
                from,
                to,
                reason: format!("spans more than {} days", MAX_OVERVIEW_DAYS),
            });
        }

        let duration = duration_minutes.unwrap_or(self.policy.default_session_minutes);
        if duration <= 0 {
            return Err(SchedulingError::InvalidDuration(duration));
        }

        let dates: Vec<NaiveDate> = from.iter_days().take_while(|date| *date <= to).collect();
        let index = self.build_index(dates.iter().copied()).await?;

        Ok(dates
            .into_iter()
            .map(|date| {
                let density = index.density_tier(date);
                DayOverview {
                    date,
                    session_count: index.session_count(date),
                    density,
                    closed: density.is_closed(),
                    occupied_slots: index.occupied_slots(date).into_iter().collect(),
                    sessions: index.sessions_on(date),
                    available_starts: self.conflicts.available_starts(&index, date, duration),
                }
            })
            .collect())
    }

    // ==============================================================================
    // PRIVATE HELPER METHODS
    // ==============================================================================

    /// Validate candidates in ordinal order against fresh occupancy plus the
    /// batch accepted so far, then insert them in one atomic write.
    async fn commit_batch(
        &self,
        treatment: &Treatment,
        mut candidates: Vec<SessionCandidate>,
    ) -> Result<Vec<Session>, SchedulingError> {
        candidates.sort_by_key(|candidate| candidate.ordinal);

        let dates: Vec<NaiveDate> = candidates.iter().map(|c| c.date).collect();
        let _date_guard = self.date_locks.lock_all(dates.iter().copied()).await;

        let mut index = self.build_index(dates).await?;
        let mut accepted = Vec::with_capacity(candidates.len());

        for candidate in &candidates {
            let rejected = |reason: SchedulingError| SchedulingError::BatchRejected {
                ordinal: candidate.ordinal,
                date: candidate.date,
                reason: Box::new(reason),
            };

            self.conflicts
                .check_candidate(
                    &index,
                    candidate.date,
                    candidate.start_time,
                    candidate.duration_minutes,
                )
                .map_err(rejected)?;

            let session = Session::from_candidate(treatment.id, candidate);
            index.insert(&session).map_err(rejected)?;
            accepted.push(session);
        }

        self.sessions
            .insert_sessions(&accepted)
            .await
            .map_err(|e| SchedulingError::DatabaseError(e.to_string()))?;

        debug!(
            "Committed {} sessions for treatment {}",
            accepted.len(),
            treatment.id
        );
        Ok(accepted)
    }

    /// Lock the session's current date (plus `extra`) and return a copy read
    /// under that lock. Retries when a concurrent reschedule moves it first.
    async fn pin_session(
        &self,
        session_id: Uuid,
        extra: Option<NaiveDate>,
    ) -> Result<(Session, DateGuard), SchedulingError> {
        for attempt in 1..=LOCK_ATTEMPTS {
            let observed = self.load_session(session_id).await?;
            let dates = std::iter::once(observed.scheduled_date).chain(extra);
            let guard = self.date_locks.lock_all(dates).await;

            let fresh = self.load_session(session_id).await?;
            if guard.covers(&fresh.scheduled_date) {
                return Ok((fresh, guard));
            }

            debug!(
                "Session {} moved while locking (attempt {})",
                session_id, attempt
            );
        }

        Err(concurrent_modification())
    }

    async fn build_index<I>(&self, dates: I) -> Result<OccupancyIndex, SchedulingError>
    where
        I: IntoIterator<Item = NaiveDate>,
    {
        let mut index = OccupancyIndex::new(&self.policy);
        let unique: BTreeSet<NaiveDate> = dates.into_iter().collect();

        for date in unique {
            let sessions = self
                .sessions
                .load_sessions_for_date(date)
                .await
                .map_err(|e| SchedulingError::DatabaseError(e.to_string()))?;

            for session in &sessions {
                index.insert(session)?;
            }
        }

        Ok(index)
    }

    async fn load_treatment(&self, treatment_id: Uuid) -> Result<Treatment, SchedulingError> {
        self.treatments
            .load_treatment(treatment_id)
            .await
            .map_err(|e| SchedulingError::DatabaseError(e.to_string()))?
            .ok_or(SchedulingError::TreatmentNotFound(treatment_id))
    }

    async fn store_treatment(&self, treatment: &Treatment) -> Result<(), SchedulingError> {
        self.treatments
            .update_treatment(treatment)
            .await
            .map_err(|e| SchedulingError::DatabaseError(e.to_string()))
    }

    async fn load_session(&self, session_id: Uuid) -> Result<Session, SchedulingError> {
        self.sessions
            .load_session(session_id)
            .await
            .map_err(|e| SchedulingError::DatabaseError(e.to_string()))?
            .ok_or(SchedulingError::SessionNotFound(session_id))
    }

    async fn load_treatment_sessions(&self, treatment_id: Uuid) -> Result<Vec<Session>, SchedulingError> {
        self.sessions
            .load_sessions_for_treatment(treatment_id)
            .await
            .map_err(|e| SchedulingError::DatabaseError(e.to_string()))
    }

    fn default_duration(&self, treatment: &Treatment) -> i32 {
        treatment
            .package
            .session_duration_minutes
            .unwrap_or(self.policy.default_session_minutes)
    }
}

fn pending_dates(sessions: &[Session]) -> BTreeSet<NaiveDate> {
    sessions
        .iter()
        .filter(|session| session.attendance == AttendanceState::Pending)
        .map(|session| session.scheduled_date)
        .collect()
}

fn concurrent_modification() -> SchedulingError {
    SchedulingError::DatabaseError("Concurrent modification, please retry".to_string())
}
