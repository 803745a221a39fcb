//! Clinic scheduling API server.
//!
//! Sessions live in memory. Treatments come from the JSON array named by
//! `TREATMENTS_FILE` (see `fixtures/treatments.json`); without it every
//! treatment route answers 404.

use std::net::SocketAddr;
use std::sync::Arc;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{CorsLayer, Any};
use tower_http::trace::{self, TraceLayer};
use tracing::{Level, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use scheduling_cell::{InMemoryStore, SchedulingService};
use shared_config::AppConfig;

#[tokio::main]
async fn main() {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Clinic Scheduling API server");

    // Load configuration
    let config = AppConfig::from_env();
    info!(
        "Clinic hours {}-{}, {} minute slots, at most {} sessions per day",
        config.scheduling.open_time.format("%H:%M"),
        config.scheduling.close_time.format("%H:%M"),
        config.scheduling.slot_minutes,
        config.scheduling.max_sessions_per_day
    );

    // Set up CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Create shared state
    let store = Arc::new(InMemoryStore::new());
    match &config.treatments_file {
        Some(path) => {
            let loaded = match tokio::fs::read_to_string(path).await {
                Ok(json) => store.seed_treatments(&json).await.map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };
            match loaded {
                Ok(count) => info!("Loaded {} treatments from {}", count, path),
                Err(e) => {
                    error!("Failed to load treatments from {}: {}", path, e);
                    return;
                }
            }
        }
        None => warn!("TREATMENTS_FILE not set, starting without treatments"),
    }
    let service = Arc::new(SchedulingService::new(&config, store.clone(), store));

    // Build the application router
    let app = router::create_router(service)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new()
                    .level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new()
                    .level(Level::INFO)),
        )
        .layer(cors);

    // Run the server
    let addr: SocketAddr = match config.bind_address.parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!("Invalid bind address {}: {}", config.bind_address, e);
            return;
        }
    };
    info!("Listening on {}", addr);

    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", addr, e);
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        error!("Server error: {}", e);
    }
}
