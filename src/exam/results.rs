//! Results
//!
//! The answers payload persisted on submission, and the two ways results are
//! produced: read back from that payload, or reconstructed from the question
//! set and the leftover answer buffer when nothing was ever scored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::exam::models::{AnswerBuffer, AttemptId, AttemptStatus, Exam, ExamAttempt, ExamId};
use crate::exam::scoring::{score_exam, AnswerDetail, ScoreCard};

// == Answers Payload ==
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamSnapshot {
    pub total_questions: u32,
    pub passing_score: f64,
    pub duration_minutes: i64,
}

/// Stored in `ExamAttempt::answers_data` when an attempt is scored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswersPayload {
    pub submission_timestamp: DateTime<Utc>,
    pub answers: Vec<AnswerDetail>,
    pub exam_snapshot: ExamSnapshot,
}

impl AnswersPayload {
    pub fn new(attempt: &ExamAttempt, card: &ScoreCard, submitted_at: DateTime<Utc>) -> Self {
        Self {
            submission_timestamp: submitted_at,
            answers: card.answers.clone(),
            exam_snapshot: ExamSnapshot {
                total_questions: attempt.total_questions,
                passing_score: attempt.passing_score,
                duration_minutes: attempt.time_limit_seconds / 60,
            },
        }
    }

    pub fn total_marks(&self) -> u32 {
        self.answers.iter().map(|a| a.max_points).sum()
    }
}

// == Results View ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultSource {
    /// Read from the payload written at submission
    Scored,
    /// Computed on request; never persisted
    Reconstructed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultsView {
    pub attempt_id: AttemptId,
    pub exam_id: ExamId,
    pub status: AttemptStatus,
    pub source: ResultSource,
    /// Persisted score; absent for attempts that were never scored
    pub score: Option<f64>,
    /// Sum of per-question points in `answers`
    pub computed_score: f64,
    pub total_marks: u32,
    pub correct_answers: Option<u32>,
    pub passed: Option<bool>,
    pub passing_score: f64,
    pub time_limit_seconds: i64,
    pub actual_time_spent: Option<i64>,
    pub completed_at: Option<DateTime<Utc>>,
    pub submission_timestamp: Option<DateTime<Utc>>,
    pub answers: Vec<AnswerDetail>,
}

impl ResultsView {
    /// Authoritative results from a stored payload.
    pub fn scored(attempt: &ExamAttempt, payload: AnswersPayload) -> Self {
        Self {
            attempt_id: attempt.id,
            exam_id: attempt.exam_id,
            status: attempt.status,
            source: ResultSource::Scored,
            score: attempt.score,
            computed_score: payload.answers.iter().map(|a| a.points_earned).sum(),
            total_marks: payload.total_marks(),
            correct_answers: attempt.correct_answers,
            passed: attempt.passed,
            passing_score: attempt.passing_score,
            time_limit_seconds: attempt.time_limit_seconds,
            actual_time_spent: attempt.actual_time_spent,
            completed_at: attempt.completed_at,
            submission_timestamp: Some(payload.submission_timestamp),
            answers: payload.answers,
        }
    }
}

// == Reconstruction ==
/// Best-effort results for a terminal attempt that has no stored payload.
///
/// Scores `buffer` against the exam's current questions with the same rules
/// as submission. The attempt's own score fields are passed through untouched.
pub fn reconstruct(attempt: &ExamAttempt, exam: &Exam, buffer: &AnswerBuffer) -> ResultsView {
    let card = score_exam(exam, buffer, attempt.passing_score);

    ResultsView {
        attempt_id: attempt.id,
        exam_id: attempt.exam_id,
        status: attempt.status,
        source: ResultSource::Reconstructed,
        score: attempt.score,
        computed_score: card.score,
        total_marks: card.total_marks,
        correct_answers: attempt.correct_answers,
        passed: attempt.passed,
        passing_score: attempt.passing_score,
        time_limit_seconds: attempt.time_limit_seconds,
        actual_time_spent: attempt.actual_time_spent,
        completed_at: attempt.completed_at,
        submission_timestamp: None,
        answers: card.answers,
    }
}
