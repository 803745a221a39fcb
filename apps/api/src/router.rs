use axum::{
    Router,
    routing::get,
};

use scheduling_cell::handlers::SchedulingState;
use scheduling_cell::router::scheduling_routes;

pub fn create_router(state: SchedulingState) -> Router {
    Router::new()
        .route("/", get(|| async { "Clinic Scheduling API is running!" }))
        .nest("/api", scheduling_routes(state))
}
