// libs/scheduling-cell/src/router.rs
use axum::{
    Router,
    routing::{get, post, patch, delete},
};

use crate::handlers::{self, SchedulingState};

pub fn scheduling_routes(state: SchedulingState) -> Router {
    let treatment_routes = Router::new()
        .route("/{treatment_id}/schedule", post(handlers::assign_schedule))
        .route(
            "/{treatment_id}/sessions",
            post(handlers::add_session).get(handlers::get_treatment_sessions),
        )
        .route("/{treatment_id}/progress", get(handlers::get_treatment_progress))
        .route("/{treatment_id}/finalize", post(handlers::finalize_treatment))
        .route("/{treatment_id}/cancel", post(handlers::cancel_treatment));

    let session_routes = Router::new()
        .route("/attendance/batch", patch(handlers::record_attendance_batch))
        .route("/{session_id}/reschedule", patch(handlers::reschedule_session))
        .route("/{session_id}/attendance", patch(handlers::record_attendance))
        .route("/{session_id}", delete(handlers::cancel_session));

    Router::new()
        .nest("/treatments", treatment_routes)
        .nest("/sessions", session_routes)
        .route("/calendar", get(handlers::get_calendar))
        .with_state(state)
}
