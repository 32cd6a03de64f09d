//! Request and Response models for the exam session API
//!
//! This module defines the DTOs (Data Transfer Objects) used for
//! serializing/deserializing HTTP request and response bodies.

pub mod requests;
pub mod responses;

// Re-export commonly used types
pub use requests::{AnswerSync, Selection, StartAttemptRequest, SyncAnswersRequest};
pub use responses::{CacheStatsResponse, ErrorResponse, HealthResponse};
