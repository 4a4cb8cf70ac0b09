use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        .route("/status", get(handlers::helper_status))
        // Playback
        .route("/play", post(handlers::play))
        .route("/play/stop-all", post(handlers::stop_all))
        .route("/play/:ref_num/stop", post(handlers::stop))
        .route("/play/:ref_num/pause", post(handlers::pause))
        .route("/play/:ref_num/resume", post(handlers::resume))
        .route("/play/:ref_num/status", get(handlers::play_status))
        // Recording
        .route("/record/start", post(handlers::record_start))
        .route("/record/stop", post(handlers::record_stop))
        .route("/record/pause", post(handlers::record_pause))
        .route("/record/continue", post(handlers::record_continue))
        .route("/record/status", get(handlers::record_status))
        .route(
            "/record/sound",
            get(handlers::take_recorded_sound).delete(handlers::discard_recorded_sound),
        )
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
