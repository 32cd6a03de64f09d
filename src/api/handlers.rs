//! API Handlers
//!
//! Thin adapters from HTTP to the session manager. Errors convert to
//! responses through `ExamError`'s `IntoResponse`.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::api::extract::CurrentUser;
use crate::error::{ExamError, Result};
use crate::exam::models::ExamId;
use crate::exam::{
    ExamSessionManager, ResultsView, SessionView, StartedAttempt, SubmissionReceipt, SyncReceipt,
};
use crate::models::{CacheStatsResponse, HealthResponse, StartAttemptRequest, SyncAnswersRequest};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<ExamSessionManager>,
}

impl AppState {
    pub fn new(sessions: ExamSessionManager) -> Self {
        Self {
            sessions: Arc::new(sessions),
        }
    }
}

/// Handler for POST /exams/:exam_id/attempts
///
/// 201 for a new attempt, 200 when an in-progress one is resumed.
pub async fn start_attempt_handler(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(exam_id): Path<ExamId>,
    Json(req): Json<StartAttemptRequest>,
) -> Result<(StatusCode, Json<StartedAttempt>)> {
    let started = state
        .sessions
        .start_attempt(user_id, exam_id, req.package_id)
        .await?;

    let status = if started.resumed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(started)))
}

/// Handler for GET /sessions/:token
pub async fn get_session_handler(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(token): Path<String>,
) -> Result<Json<SessionView>> {
    Ok(Json(state.sessions.get_session(&token, user_id).await?))
}

/// Handler for PUT /sessions/:token/answers
pub async fn sync_answers_handler(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(token): Path<String>,
    Json(req): Json<SyncAnswersRequest>,
) -> Result<Json<SyncReceipt>> {
    if let Some(error_msg) = req.validate() {
        return Err(ExamError::InvalidRequest(error_msg));
    }

    let receipt = state
        .sessions
        .sync_answers(&token, user_id, req.into_answers())
        .await?;
    Ok(Json(receipt))
}

/// Handler for POST /sessions/:token/submit
pub async fn submit_handler(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(token): Path<String>,
) -> Result<Json<SubmissionReceipt>> {
    Ok(Json(state.sessions.submit_attempt(&token, user_id).await?))
}

/// Handler for GET /sessions/:token/results
pub async fn results_handler(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(token): Path<String>,
) -> Result<Json<ResultsView>> {
    Ok(Json(state.sessions.get_results(&token, user_id).await?))
}

/// Handler for GET /cache/stats
pub async fn cache_stats_handler(State(state): State<AppState>) -> Json<CacheStatsResponse> {
    let report = state.sessions.cache().stats().await;
    Json(CacheStatsResponse::new(report))
}

/// Handler for GET /health
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse::healthy(
        state.sessions.cache().backend().as_str(),
    ))
}
