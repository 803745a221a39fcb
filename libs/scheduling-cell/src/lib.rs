pub mod handlers;
pub mod models;
pub mod router;
pub mod services;
pub mod store;

pub use models::*;
pub use router::scheduling_routes;
pub use services::SchedulingService;
pub use store::{InMemoryStore, SessionStore, TreatmentDirectory};
