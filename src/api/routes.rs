//! API Routes
//!
//! Configures the Axum router with the exam session endpoints.

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    cache_stats_handler, get_session_handler, health_handler, results_handler,
    start_attempt_handler, submit_handler, sync_answers_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `POST /exams/:exam_id/attempts` - Start or resume an attempt
/// - `GET /sessions/:token` - Session content and buffered answers
/// - `PUT /sessions/:token/answers` - Sync answers
/// - `POST /sessions/:token/submit` - Submit and score
/// - `GET /sessions/:token/results` - Results of a finished attempt
/// - `GET /cache/stats` - Cache statistics
/// - `GET /health` - Health check endpoint
///
/// # Middleware
/// - CORS: Allows any origin (configurable for production)
/// - Tracing: Logs all requests for debugging
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/exams/:exam_id/attempts", post(start_attempt_handler))
        .route("/sessions/:token", get(get_session_handler))
        .route("/sessions/:token/answers", put(sync_answers_handler))
        .route("/sessions/:token/submit", post(submit_handler))
        .route("/sessions/:token/results", get(results_handler))
        .route("/cache/stats", get(cache_stats_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
