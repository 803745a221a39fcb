// libs/scheduling-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::error::AppError;

use crate::models::{
    AddSessionRequest, BatchAttendanceRequest, CalendarQuery, RecordAttendanceRequest,
    RescheduleSessionRequest, SchedulePlan, SchedulingError, SessionResponse,
};
use crate::services::scheduling::SchedulingService;

pub type SchedulingState = Arc<SchedulingService>;

// ==============================================================================
// TREATMENT SCHEDULING HANDLERS
// ==============================================================================

pub async fn assign_schedule(
    State(service): State<SchedulingState>,
    Path(treatment_id): Path<Uuid>,
    Json(plan): Json<SchedulePlan>,
) -> Result<Json<Value>, AppError> {
    let sessions = service
        .assign_schedule(treatment_id, plan)
        .await
        .map_err(map_scheduling_error)?;

    let count = sessions.len();
    let sessions: Vec<SessionResponse> = sessions.into_iter().map(SessionResponse::from).collect();

    Ok(Json(json!({
        "success": true,
        "sessions": sessions,
        "message": format!("Treatment scheduled with {} sessions", count)
    })))
}

pub async fn add_session(
    State(service): State<SchedulingState>,
    Path(treatment_id): Path<Uuid>,
    Json(request): Json<AddSessionRequest>,
) -> Result<Json<Value>, AppError> {
    let session = service
        .add_session(treatment_id, request)
        .await
        .map_err(map_scheduling_error)?;

    Ok(Json(json!({
        "success": true,
        "session": SessionResponse::from(session)
    })))
}

pub async fn get_treatment_sessions(
    State(service): State<SchedulingState>,
    Path(treatment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let sessions = service
        .treatment_sessions(treatment_id)
        .await
        .map_err(map_scheduling_error)?;

    let sessions: Vec<SessionResponse> = sessions.into_iter().map(SessionResponse::from).collect();

    Ok(Json(json!({
        "success": true,
        "sessions": sessions
    })))
}

pub async fn get_treatment_progress(
    State(service): State<SchedulingState>,
    Path(treatment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let progress = service
        .treatment_progress(treatment_id)
        .await
        .map_err(map_scheduling_error)?;

    Ok(Json(json!({
        "success": true,
        "progress": progress,
        "remaining_to_schedule": progress.remaining_to_schedule()
    })))
}

pub async fn finalize_treatment(
    State(service): State<SchedulingState>,
    Path(treatment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let treatment = service
        .finalize_treatment(treatment_id)
        .await
        .map_err(map_scheduling_error)?;

    Ok(Json(json!({
        "success": true,
        "treatment": treatment
    })))
}

pub async fn cancel_treatment(
    State(service): State<SchedulingState>,
    Path(treatment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let treatment = service
        .cancel_treatment(treatment_id)
        .await
        .map_err(map_scheduling_error)?;

    Ok(Json(json!({
        "success": true,
        "treatment": treatment
    })))
}

// ==============================================================================
// SESSION HANDLERS
// ==============================================================================

pub async fn reschedule_session(
    State(service): State<SchedulingState>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<RescheduleSessionRequest>,
) -> Result<Json<Value>, AppError> {
    let session = service
        .reschedule(session_id, request)
        .await
        .map_err(map_scheduling_error)?;

    Ok(Json(json!({
        "success": true,
        "session": SessionResponse::from(session)
    })))
}

pub async fn record_attendance(
    State(service): State<SchedulingState>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<RecordAttendanceRequest>,
) -> Result<Json<Value>, AppError> {
    let session = service
        .record_attendance(session_id, request)
        .await
        .map_err(map_scheduling_error)?;

    Ok(Json(json!({
        "success": true,
        "session": SessionResponse::from(session)
    })))
}

pub async fn record_attendance_batch(
    State(service): State<SchedulingState>,
    Json(request): Json<BatchAttendanceRequest>,
) -> Result<Json<Value>, AppError> {
    if request.updates.is_empty() {
        return Err(AppError::BadRequest("At least one attendance update is required".to_string()));
    }

    let results = service.record_attendance_batch(request.updates).await;
    let succeeded = results.iter().filter(|r| r.success).count();

    Ok(Json(json!({
        "success": true,
        "results": results,
        "message": format!("{} of {} updates applied", succeeded, results.len())
    })))
}

pub async fn cancel_session(
    State(service): State<SchedulingState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    service
        .cancel_session(session_id)
        .await
        .map_err(map_scheduling_error)?;

    Ok(Json(json!({
        "success": true,
        "message": "Session cancelled"
    })))
}

// ==============================================================================
// CALENDAR HANDLERS
// ==============================================================================

pub async fn get_calendar(
    State(service): State<SchedulingState>,
    Query(query): Query<CalendarQuery>,
) -> Result<Json<Value>, AppError> {
    let days = service
        .day_overview(query.from, query.to, query.duration_minutes)
        .await
        .map_err(map_scheduling_error)?;

    Ok(Json(json!({
        "success": true,
        "days": days
    })))
}

// ==============================================================================
// ERROR MAPPING
// ==============================================================================

pub fn map_scheduling_error(error: SchedulingError) -> AppError {
    let message = error.to_string();

    match error.root_cause() {
        SchedulingError::SessionNotFound(_) | SchedulingError::TreatmentNotFound(_) => {
            AppError::NotFound(message)
        }
        SchedulingError::DayCapacityExceeded { .. }
        | SchedulingError::SlotConflict { .. }
        | SchedulingError::ScheduleAlreadyAssigned(_)
        | SchedulingError::PackageFull { .. }
        | SchedulingError::PendingSessionsRemain { .. }
        | SchedulingError::TreatmentClosed { .. } => AppError::Conflict(message),
        SchedulingError::SessionLocked { .. } => AppError::Locked(message),
        SchedulingError::InvalidDuration(_)
        | SchedulingError::OutOfHours(_)
        | SchedulingError::MisalignedStart(_)
        | SchedulingError::InvalidRecurrence(_)
        | SchedulingError::InvalidCount(_)
        | SchedulingError::InvalidOverride { .. }
        | SchedulingError::InvalidDateRange { .. }
        | SchedulingError::PackageMismatch { .. } => AppError::BadRequest(message),
        SchedulingError::DatabaseError(_) => AppError::Database(message),
        SchedulingError::BatchRejected { .. } => AppError::Internal(message),
    }
}
