//! Error types for the exam session service
//!
//! Three layers: the cache tier, the durable storage collaborator, and the
//! session lifecycle that sits on top of both.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Cache Error Enum ==
/// Errors raised by either cache backend.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Key not present in the cache
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Key was present but past its TTL; removed on discovery
    #[error("Key expired: {0}")]
    Expired(String),

    /// Networked backend unreachable or a command failed on the wire
    #[error("Cache connection error: {0}")]
    Connection(String),

    /// In-process store could not make room for the write
    #[error("Cache limit exceeded: {0}")]
    LimitExceeded(String),

    /// Invalid key or TTL
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Stored bytes could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl CacheError {
    /// True for the two kinds that callers treat as a plain cache miss.
    pub fn is_miss(&self) -> bool {
        matches!(self, CacheError::NotFound(_) | CacheError::Expired(_))
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}

impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::NotFound(_) | CacheError::Expired(_) => StatusCode::NOT_FOUND,
            CacheError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            CacheError::Connection(_) | CacheError::LimitExceeded(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            CacheError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

// == Storage Error Enum ==
/// Errors raised by the durable storage collaborator.
#[derive(Error, Debug)]
pub enum StorageError {
    /// A uniqueness rule rejected the write
    #[error("Storage conflict: {0}")]
    Conflict(String),

    /// The backing store failed
    #[error("Storage backend error: {0}")]
    Backend(String),
}

// == Exam Error Enum ==
/// Errors surfaced by the exam session lifecycle.
#[derive(Error, Debug)]
pub enum ExamError {
    #[error("User is not enrolled in package {0}")]
    NotEnrolled(u64),

    #[error("Exam not found: {0}")]
    ExamNotFound(u64),

    #[error("Exam {exam_id} does not belong to package {package_id}")]
    ExamNotInPackage { exam_id: u64, package_id: u64 },

    #[error("Exam session not found")]
    SessionNotFound,

    #[error("Exam session has expired")]
    SessionExpired,

    #[error("Exam session is not in progress")]
    NotInProgress,

    #[error("Exam attempt has not finished yet")]
    NotFinished,

    #[error("Exam already submitted")]
    AlreadySubmitted,

    #[error("Session does not belong to user")]
    SessionOwnershipMismatch,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Answers payload error: {0}")]
    Payload(String),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

// == IntoResponse Implementation ==
impl IntoResponse for ExamError {
    fn into_response(self) -> Response {
        let status = match &self {
            ExamError::NotEnrolled(_) | ExamError::SessionOwnershipMismatch => {
                StatusCode::FORBIDDEN
            }
            ExamError::ExamNotFound(_) | ExamError::SessionNotFound => StatusCode::NOT_FOUND,
            ExamError::ExamNotInPackage { .. } | ExamError::InvalidRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            ExamError::SessionExpired => StatusCode::GONE,
            ExamError::NotInProgress | ExamError::NotFinished | ExamError::AlreadySubmitted => {
                StatusCode::CONFLICT
            }
            ExamError::Cache(CacheError::LimitExceeded(_)) => {
                return (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(json!({ "error": "Answer not saved, please retry" })),
                )
                    .into_response();
            }
            ExamError::Cache(_) => StatusCode::SERVICE_UNAVAILABLE,
            ExamError::Payload(_) | ExamError::Storage(_) => {
                tracing::error!(error = %self, "Internal error while serving exam session");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

// == Result Type Aliases ==
/// Result type for cache operations.
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Result type for session lifecycle operations.
pub type Result<T> = std::result::Result<T, ExamError>;
