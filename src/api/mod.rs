//! API Module
//!
//! HTTP adapter over the exam session manager.
//!
//! # Endpoints
//! - `POST /exams/:exam_id/attempts` - Start or resume an attempt
//! - `GET /sessions/:token` - Session content and buffered answers
//! - `PUT /sessions/:token/answers` - Sync answers
//! - `POST /sessions/:token/submit` - Submit and score
//! - `GET /sessions/:token/results` - Results of a finished attempt
//! - `GET /cache/stats` - Cache statistics
//! - `GET /health` - Health check endpoint
//!
//! Every `/exams` and `/sessions` route requires the `x-user-id` header.

pub mod extract;
pub mod handlers;
pub mod routes;

pub use extract::{CurrentUser, USER_ID_HEADER};
pub use handlers::*;
pub use routes::create_router;
