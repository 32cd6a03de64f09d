//! Durable Storage Collaborator
//!
//! The record store the session manager and the cleanup scheduler depend on.
//! A relational implementation lives outside this crate; [`InMemoryExamStore`]
//! backs demo mode and tests.

mod memory;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StorageResult;
use crate::exam::models::{
    AttemptCompletion, AttemptId, Exam, ExamAttempt, ExamId, NewAttempt, PackageId, UserId,
};

pub use memory::InMemoryExamStore;

// == Exam Catalog ==
/// Read-only exam content.
#[async_trait]
pub trait ExamCatalog: Send + Sync {
    async fn find_exam(&self, exam_id: ExamId) -> StorageResult<Option<Exam>>;

    async fn package_contains_exam(
        &self,
        package_id: PackageId,
        exam_id: ExamId,
    ) -> StorageResult<bool>;
}

// == Enrollment Repository ==
#[async_trait]
pub trait EnrollmentRepository: Send + Sync {
    async fn is_enrolled(&self, user_id: UserId, package_id: PackageId) -> StorageResult<bool>;
}

// == Attempt Repository ==
/// Attempt records. Every terminal transition is conditional on the stored
/// status still being STARTED.
#[async_trait]
pub trait AttemptRepository: Send + Sync {
    /// Most recent attempt for the tuple, in any status.
    async fn find_attempt_for_exam(
        &self,
        user_id: UserId,
        exam_id: ExamId,
        package_id: PackageId,
    ) -> StorageResult<Option<ExamAttempt>>;

    /// Inserts a STARTED attempt. Fails with `Conflict` when the tuple already
    /// has a STARTED attempt.
    async fn create_attempt(&self, attempt: NewAttempt) -> StorageResult<ExamAttempt>;

    /// STARTED attempt holding `token`.
    async fn find_active_by_session(&self, token: &str) -> StorageResult<Option<ExamAttempt>>;

    /// Terminal attempt holding `token`.
    async fn find_finished_by_session(&self, token: &str) -> StorageResult<Option<ExamAttempt>>;

    /// Attempt holding `token` and owned by `user_id`, in any status.
    async fn find_by_session_and_user(
        &self,
        token: &str,
        user_id: UserId,
    ) -> StorageResult<Option<ExamAttempt>>;

    /// Applies the terminal write if the attempt is still STARTED.
    /// Returns false when another writer got there first.
    async fn complete_attempt(
        &self,
        attempt_id: AttemptId,
        completion: AttemptCompletion,
    ) -> StorageResult<bool>;

    /// STARTED attempts with `started_at + duration + grace < now`.
    async fn count_expired(&self, now: DateTime<Utc>, grace: Duration) -> StorageResult<u64>;

    /// Moves every attempt matched by [`count_expired`](Self::count_expired)
    /// to ABANDONED in one bulk update and returns how many rows changed.
    async fn mark_expired_abandoned(&self, now: DateTime<Utc>, grace: Duration)
        -> StorageResult<u64>;
}
