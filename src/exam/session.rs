//! Exam Session Manager
//!
//! Owns the attempt lifecycle: start, answer sync through the cache,
//! submission and scoring, and results. Status transitions out of STARTED
//! made here are conditional writes, so a second submission can never
//! overwrite the first.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::Cache;
use crate::config::DEFAULT_ANSWER_BUFFER_TTL_SECS;
use crate::error::{CacheError, ExamError, Result, StorageError};
use crate::exam::models::{
    AnswerBuffer, AttemptCompletion, AttemptId, AttemptStatus, Exam, ExamAttempt, ExamId,
    NewAttempt, PackageId, QuestionId, SecureQuestion, UserId,
};
use crate::exam::results::{reconstruct, AnswersPayload, ResultsView};
use crate::exam::scoring::score_exam;
use crate::exam::token::{answer_buffer_key, generate_session_token};
use crate::storage::{AttemptRepository, EnrollmentRepository, ExamCatalog};

// == Operation Results ==
#[derive(Debug, Clone, Serialize)]
pub struct StartedAttempt {
    pub attempt_id: AttemptId,
    pub session_token: String,
    pub exam_id: ExamId,
    pub package_id: PackageId,
    pub started_at: DateTime<Utc>,
    pub time_limit_seconds: i64,
    pub remaining_seconds: i64,
    /// True when an in-progress attempt was returned instead of a new one
    pub resumed: bool,
}

impl StartedAttempt {
    fn from_attempt(attempt: ExamAttempt, session_token: String, resumed: bool) -> Self {
        Self {
            attempt_id: attempt.id,
            remaining_seconds: attempt.remaining_seconds(Utc::now()),
            session_token,
            exam_id: attempt.exam_id,
            package_id: attempt.package_id,
            started_at: attempt.started_at,
            time_limit_seconds: attempt.time_limit_seconds,
            resumed,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReceipt {
    pub synced_count: usize,
    pub remaining_seconds: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmissionReceipt {
    pub attempt_id: AttemptId,
    pub status: AttemptStatus,
    pub score: f64,
    pub total_marks: u32,
    pub correct_answers: u32,
    pub total_questions: u32,
    pub passed: bool,
    pub time_taken_seconds: i64,
    pub completed_at: DateTime<Utc>,
}

/// An in-progress attempt as shown to its owner. Carries no correctness data.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub attempt_id: AttemptId,
    pub exam_id: ExamId,
    pub title: String,
    pub instructions: Option<String>,
    pub status: AttemptStatus,
    pub started_at: DateTime<Utc>,
    pub time_limit_seconds: i64,
    pub remaining_seconds: i64,
    pub questions: Vec<SecureQuestion>,
    pub answers: AnswerBuffer,
}

// == Exam Session Manager ==
pub struct ExamSessionManager {
    catalog: Arc<dyn ExamCatalog>,
    enrollments: Arc<dyn EnrollmentRepository>,
    attempts: Arc<dyn AttemptRepository>,
    cache: Arc<Cache>,
    answer_ttl: Duration,
}

impl ExamSessionManager {
    /// A zero `answer_ttl` is replaced by the default buffer lifetime.
    pub fn new(
        catalog: Arc<dyn ExamCatalog>,
        enrollments: Arc<dyn EnrollmentRepository>,
        attempts: Arc<dyn AttemptRepository>,
        cache: Arc<Cache>,
        answer_ttl: Duration,
    ) -> Self {
        let answer_ttl = if answer_ttl.is_zero() {
            warn!(
                default_secs = DEFAULT_ANSWER_BUFFER_TTL_SECS,
                "Zero answer buffer TTL, using default"
            );
            Duration::from_secs(DEFAULT_ANSWER_BUFFER_TTL_SECS)
        } else {
            answer_ttl
        };

        Self {
            catalog,
            enrollments,
            attempts,
            cache,
            answer_ttl,
        }
    }

    /// Builds a manager over one store that implements every storage trait.
    pub fn with_store<S>(store: Arc<S>, cache: Arc<Cache>, answer_ttl: Duration) -> Self
    where
        S: ExamCatalog + EnrollmentRepository + AttemptRepository + 'static,
    {
        Self::new(store.clone(), store.clone(), store, cache, answer_ttl)
    }

    pub fn cache(&self) -> &Arc<Cache> {
        &self.cache
    }

    // == Start Attempt ==
    /// Returns the tuple's in-progress attempt, or creates one.
    ///
    /// # Errors
    /// `NotEnrolled`, `ExamNotFound`, `ExamNotInPackage`, and
    /// `AlreadySubmitted` when the tuple's attempt is already terminal.
    pub async fn start_attempt(
        &self,
        user_id: UserId,
        exam_id: ExamId,
        package_id: PackageId,
    ) -> Result<StartedAttempt> {
        if !self.enrollments.is_enrolled(user_id, package_id).await? {
            return Err(ExamError::NotEnrolled(package_id));
        }

        let exam = self.find_exam(exam_id).await?;
        if !self.catalog.package_contains_exam(package_id, exam_id).await? {
            return Err(ExamError::ExamNotInPackage {
                exam_id,
                package_id,
            });
        }

        if let Some(existing) = self
            .attempts
            .find_attempt_for_exam(user_id, exam_id, package_id)
            .await?
        {
            return resume(existing);
        }

        let new_attempt = NewAttempt {
            user_id,
            exam_id,
            package_id,
            session_token: generate_session_token(),
            started_at: Utc::now(),
            time_limit_seconds: exam.time_limit_seconds(),
            total_questions: exam.total_questions(),
            passing_score: exam.passing_score,
        };

        match self.attempts.create_attempt(new_attempt).await {
            Ok(attempt) => {
                let token = attempt.session_token.clone().unwrap_or_default();
                info!(
                    attempt_id = attempt.id,
                    user_id,
                    exam_id,
                    package_id,
                    "Exam attempt started"
                );
                Ok(StartedAttempt::from_attempt(attempt, token, false))
            }
            // A concurrent start for the same tuple won the insert.
            Err(StorageError::Conflict(reason)) => {
                debug!(user_id, exam_id, %reason, "Start raced another request, resuming");
                match self
                    .attempts
                    .find_attempt_for_exam(user_id, exam_id, package_id)
                    .await?
                {
                    Some(existing) => resume(existing),
                    None => Err(StorageError::Conflict(reason).into()),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    // == Sync Answers ==
    /// Merges `answers` into the session's buffer, last write per question winning.
    ///
    /// Cache failures fail this call only; the client can resync.
    pub async fn sync_answers(
        &self,
        token: &str,
        user_id: UserId,
        answers: Vec<(QuestionId, String)>,
    ) -> Result<SyncReceipt> {
        let attempt = self.locate(token, user_id).await?;
        let now = Utc::now();
        ensure_in_progress(&attempt, now)?;

        let key = answer_buffer_key(token);
        let mut buffer = match self.cache.get_json::<AnswerBuffer>(&key).await {
            Ok(buffer) => buffer,
            Err(e) if e.is_miss() => AnswerBuffer::new(),
            Err(CacheError::Serialization(e)) => {
                warn!(session = %token, error = %e, "Discarding unreadable answer buffer");
                AnswerBuffer::new()
            }
            Err(e) => return Err(e.into()),
        };

        let synced_count = answers.len();
        buffer.extend(answers);
        self.cache.set_json(&key, &buffer, self.answer_ttl).await?;

        debug!(session = %token, synced_count, buffered = buffer.len(), "Answers synced");

        Ok(SyncReceipt {
            synced_count,
            remaining_seconds: attempt.remaining_seconds(now),
        })
    }

    // == Submit Attempt ==
    /// Scores the buffered answers and records the terminal status.
    ///
    /// A submission after the time limit is recorded as AUTO_SUBMITTED. The
    /// answer buffer is left in the cache to expire on its own.
    pub async fn submit_attempt(&self, token: &str, user_id: UserId) -> Result<SubmissionReceipt> {
        let attempt = self.locate(token, user_id).await?;
        if attempt.status.is_terminal() {
            return Err(ExamError::AlreadySubmitted);
        }

        let exam = self.find_exam(attempt.exam_id).await?;
        let key = answer_buffer_key(token);
        let buffer = match self.cache.get_json::<AnswerBuffer>(&key).await {
            Ok(buffer) => buffer,
            Err(e) if e.is_miss() => AnswerBuffer::new(),
            Err(CacheError::Serialization(e)) => {
                warn!(session = %token, error = %e, "Unreadable answer buffer, scoring as empty");
                AnswerBuffer::new()
            }
            Err(e) => return Err(e.into()),
        };

        let now = Utc::now();
        let status = if attempt.is_time_expired(now) {
            AttemptStatus::AutoSubmitted
        } else {
            AttemptStatus::Completed
        };

        let card = score_exam(&exam, &buffer, attempt.passing_score);
        let payload = AnswersPayload::new(&attempt, &card, now);
        let answers_data =
            serde_json::to_string(&payload).map_err(|e| ExamError::Payload(e.to_string()))?;
        let time_taken = attempt
            .elapsed_seconds(now)
            .min(attempt.time_limit_seconds);

        let completion = AttemptCompletion {
            status,
            completed_at: now,
            score: card.score,
            correct_answers: card.correct_answers,
            passed: card.passed,
            actual_time_spent: time_taken,
            answers_data,
        };

        if !self.attempts.complete_attempt(attempt.id, completion).await? {
            return Err(ExamError::AlreadySubmitted);
        }

        info!(
            attempt_id = attempt.id,
            user_id,
            status = %status,
            score = card.score,
            passed = card.passed,
            "Exam attempt submitted"
        );

        Ok(SubmissionReceipt {
            attempt_id: attempt.id,
            status,
            score: card.score,
            total_marks: card.total_marks,
            correct_answers: card.correct_answers,
            total_questions: attempt.total_questions,
            passed: card.passed,
            time_taken_seconds: time_taken,
            completed_at: now,
        })
    }

    // == Get Session ==
    /// Exam content without correctness flags, remaining time and any
    /// buffered answers. A cache failure yields an empty answer set.
    pub async fn get_session(&self, token: &str, user_id: UserId) -> Result<SessionView> {
        let attempt = self.locate(token, user_id).await?;
        let now = Utc::now();
        ensure_in_progress(&attempt, now)?;

        let exam = self.find_exam(attempt.exam_id).await?;
        let answers = self.buffered_answers(token).await;

        Ok(SessionView {
            attempt_id: attempt.id,
            exam_id: exam.id,
            title: exam.title,
            instructions: exam.instructions,
            status: attempt.status,
            started_at: attempt.started_at,
            time_limit_seconds: attempt.time_limit_seconds,
            remaining_seconds: attempt.remaining_seconds(now),
            questions: exam.questions.iter().map(|q| q.secure()).collect(),
            answers,
        })
    }

    // == Get Results ==
    /// Persisted results for a terminal attempt, or a reconstruction from
    /// the question set and leftover buffer when nothing was scored.
    pub async fn get_results(&self, token: &str, user_id: UserId) -> Result<ResultsView> {
        let attempt = self.locate(token, user_id).await?;
        if !attempt.status.is_terminal() {
            return Err(ExamError::NotFinished);
        }

        if !attempt.answers_data.is_empty() {
            let payload: AnswersPayload = serde_json::from_str(&attempt.answers_data)
                .map_err(|e| ExamError::Payload(e.to_string()))?;
            return Ok(ResultsView::scored(&attempt, payload));
        }

        self.reconstruct_results(token, &attempt).await
    }

    /// Secondary path for attempts that never reached scoring.
    async fn reconstruct_results(&self, token: &str, attempt: &ExamAttempt) -> Result<ResultsView> {
        let exam = self.find_exam(attempt.exam_id).await?;
        let buffer = self.buffered_answers(token).await;

        debug!(
            attempt_id = attempt.id,
            buffered = buffer.len(),
            "Reconstructing results from question set"
        );
        Ok(reconstruct(attempt, &exam, &buffer))
    }

    // == Helpers ==
    /// Finds the attempt for `token` and checks it belongs to `user_id`.
    async fn locate(&self, token: &str, user_id: UserId) -> Result<ExamAttempt> {
        if let Some(attempt) = self.attempts.find_by_session_and_user(token, user_id).await? {
            return Ok(attempt);
        }

        let other = match self.attempts.find_active_by_session(token).await? {
            Some(attempt) => Some(attempt),
            None => self.attempts.find_finished_by_session(token).await?,
        };

        match other {
            Some(attempt) => {
                warn!(
                    session = %token,
                    user_id,
                    owner_id = attempt.user_id,
                    "Session token used by a different user"
                );
                Err(ExamError::SessionOwnershipMismatch)
            }
            None => Err(ExamError::SessionNotFound),
        }
    }

    async fn find_exam(&self, exam_id: ExamId) -> Result<Exam> {
        self.catalog
            .find_exam(exam_id)
            .await?
            .ok_or(ExamError::ExamNotFound(exam_id))
    }

    /// Best-effort read of the answer buffer.
    async fn buffered_answers(&self, token: &str) -> AnswerBuffer {
        match self.cache.get_json(&answer_buffer_key(token)).await {
            Ok(buffer) => buffer,
            Err(e) if e.is_miss() => AnswerBuffer::new(),
            Err(e) => {
                warn!(session = %token, error = %e, "Could not read answer buffer");
                AnswerBuffer::new()
            }
        }
    }
}

fn resume(attempt: ExamAttempt) -> Result<StartedAttempt> {
    if attempt.status.is_terminal() {
        return Err(ExamError::AlreadySubmitted);
    }
    let token = attempt.session_token.clone().unwrap_or_default();
    debug!(attempt_id = attempt.id, "Resuming exam attempt");
    Ok(StartedAttempt::from_attempt(attempt, token, true))
}

fn ensure_in_progress(attempt: &ExamAttempt, now: DateTime<Utc>) -> Result<()> {
    if attempt.status.is_terminal() {
        return Err(ExamError::NotInProgress);
    }
    if attempt.is_time_expired(now) {
        return Err(ExamError::SessionExpired);
    }
    Ok(())
}
