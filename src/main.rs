use axum::{routing::get, Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use duel_backend::api::{self, AppState};
use duel_backend::config::Config;
use duel_backend::engine::moves::MoveCatalog;
use duel_backend::engine::server::{spawn_expiry_worker, DuelEngine};
use duel_backend::matchmaking::MatchQueue;
use duel_backend::metrics;
use duel_backend::players::PlayerDirectory;

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok", "service": "duel-backend" }))
}

async fn metrics_handler() -> String {
    metrics::gather_metrics()
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    metrics::register_metrics();

    let config = Config::load();
    tracing::info!(?config, "Loaded configuration");

    let catalog = match &config.moves_file {
        Some(path) => match MoveCatalog::load(path) {
            Ok(catalog) => catalog,
            Err(e) => {
                tracing::error!("Failed to load move catalog from {}: {e}", path.display());
                std::process::exit(1);
            }
        },
        None => MoveCatalog::standard(),
    };
    tracing::info!("Move catalog ready with {} moves", catalog.len());

    let engine = Arc::new(DuelEngine::new(
        Arc::new(catalog),
        Arc::new(PlayerDirectory::new()),
        config.rng_seed,
        config.replay_capacity,
    ));

    // Background task that times out abandoned rounds
    spawn_expiry_worker(
        engine.clone(),
        config.round_timeout,
        config.expiry_scan_interval,
    );

    let state = AppState {
        engine,
        queue: MatchQueue::new(),
        rating_window: config.rating_window,
    };

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .merge(api::router(state))
        .layer(CorsLayer::permissive())
        .layer(axum::middleware::from_fn(api::track_requests));

    let listener = match tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("Failed to bind to port {}: {e}", config.port);
            std::process::exit(1);
        }
    };

    tracing::info!("Duel backend listening on port {}", config.port);
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {e}");
    }
}
