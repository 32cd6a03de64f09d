//! Exam Domain Model
//!
//! Attempts, exams and questions as the session manager sees them.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type UserId = u64;
pub type ExamId = u64;
pub type PackageId = u64;
pub type AttemptId = u64;
pub type QuestionId = u64;

/// Buffered selections for one session: question id to raw selection string.
pub type AnswerBuffer = BTreeMap<QuestionId, String>;

// == Attempt Status ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttemptStatus {
    Started,
    Completed,
    AutoSubmitted,
    Abandoned,
}

impl AttemptStatus {
    /// Terminal statuses are final.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AttemptStatus::Started)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::Started => "STARTED",
            AttemptStatus::Completed => "COMPLETED",
            AttemptStatus::AutoSubmitted => "AUTO_SUBMITTED",
            AttemptStatus::Abandoned => "ABANDONED",
        }
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// == Exam Attempt ==
/// One user's timed run through one exam within one package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamAttempt {
    pub id: AttemptId,
    pub user_id: UserId,
    pub exam_id: ExamId,
    pub package_id: PackageId,
    pub status: AttemptStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub session_token: Option<String>,
    /// Exam duration at start, in seconds
    pub time_limit_seconds: i64,
    pub total_questions: u32,
    pub passing_score: f64,
    pub score: Option<f64>,
    pub correct_answers: Option<u32>,
    pub passed: Option<bool>,
    /// Seconds between start and submission, capped at the time limit
    pub actual_time_spent: Option<i64>,
    /// Serialized scored answers; empty until completion
    pub answers_data: String,
}

impl ExamAttempt {
    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> i64 {
        (now - self.started_at).num_seconds().max(0)
    }

    /// Seconds left before the time limit; never negative.
    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> i64 {
        (self.time_limit_seconds - self.elapsed_seconds(now)).max(0)
    }

    /// The limit is inclusive: an attempt at exactly its limit is still on time.
    pub fn is_time_expired(&self, now: DateTime<Utc>) -> bool {
        self.elapsed_seconds(now) > self.time_limit_seconds
    }
}

/// Fields for a fresh STARTED attempt.
#[derive(Debug, Clone)]
pub struct NewAttempt {
    pub user_id: UserId,
    pub exam_id: ExamId,
    pub package_id: PackageId,
    pub session_token: String,
    pub started_at: DateTime<Utc>,
    pub time_limit_seconds: i64,
    pub total_questions: u32,
    pub passing_score: f64,
}

/// The one-time terminal write made on submission.
#[derive(Debug, Clone)]
pub struct AttemptCompletion {
    pub status: AttemptStatus,
    pub completed_at: DateTime<Utc>,
    pub score: f64,
    pub correct_answers: u32,
    pub passed: bool,
    pub actual_time_spent: i64,
    pub answers_data: String,
}

// == Questions ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuestionType {
    #[serde(rename = "SBA")]
    Sba,
    #[serde(rename = "TRUE_FALSE")]
    TrueFalse,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionOption {
    pub text: String,
    pub is_correct: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub question_text: String,
    pub question_type: QuestionType,
    /// Options keyed by their label ("a", "b", ...)
    pub options: BTreeMap<String, QuestionOption>,
    pub points: u32,
    #[serde(default)]
    pub explanation: Option<String>,
}

impl Question {
    /// The question with every correctness flag removed.
    pub fn secure(&self) -> SecureQuestion {
        SecureQuestion {
            id: self.id,
            question_text: self.question_text.clone(),
            question_type: self.question_type,
            options: self
                .options
                .iter()
                .map(|(key, option)| (key.clone(), option.text.clone()))
                .collect(),
            points: self.points,
        }
    }
}

/// Client-safe projection of a [`Question`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecureQuestion {
    pub id: QuestionId,
    pub question_text: String,
    pub question_type: QuestionType,
    /// Option key to display text
    pub options: BTreeMap<String, String>,
    pub points: u32,
}

// == Exam ==
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exam {
    pub id: ExamId,
    pub title: String,
    pub duration_minutes: u32,
    pub passing_score: f64,
    #[serde(default)]
    pub instructions: Option<String>,
    pub questions: Vec<Question>,
}

impl Exam {
    pub fn total_questions(&self) -> u32 {
        self.questions.len() as u32
    }

    pub fn total_marks(&self) -> u32 {
        self.questions.iter().map(|q| q.points).sum()
    }

    pub fn time_limit_seconds(&self) -> i64 {
        i64::from(self.duration_minutes) * 60
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn attempt(started_at: DateTime<Utc>, limit: i64) -> ExamAttempt {
        ExamAttempt {
            id: 1,
            user_id: 1,
            exam_id: 1,
            package_id: 1,
            status: AttemptStatus::Started,
            started_at,
            completed_at: None,
            session_token: Some("token".to_string()),
            time_limit_seconds: limit,
            total_questions: 2,
            passing_score: 2.0,
            score: None,
            correct_answers: None,
            passed: None,
            actual_time_spent: None,
            answers_data: String::new(),
        }
    }

    #[test]
    fn test_status_serializes_screaming_snake() {
        let json = serde_json::to_string(&AttemptStatus::AutoSubmitted).unwrap();
        assert_eq!(json, "\"AUTO_SUBMITTED\"");
        assert_eq!(AttemptStatus::Abandoned.to_string(), "ABANDONED");
        assert!(!AttemptStatus::Started.is_terminal());
        assert!(AttemptStatus::Completed.is_terminal());
    }

    #[test]
    fn test_time_limit_is_inclusive() {
        let now = Utc::now();
        let on_limit = attempt(now - Duration::seconds(60), 60);
        let past_limit = attempt(now - Duration::seconds(61), 60);

        assert!(!on_limit.is_time_expired(now));
        assert_eq!(on_limit.remaining_seconds(now), 0);
        assert!(past_limit.is_time_expired(now));
        assert_eq!(past_limit.remaining_seconds(now), 0);
    }

    #[test]
    fn test_secure_projection_strips_correctness() {
        let question = Question {
            id: 7,
            question_text: "Pick one".to_string(),
            question_type: QuestionType::Sba,
            options: BTreeMap::from([(
                "a".to_string(),
                QuestionOption {
                    text: "Alpha".to_string(),
                    is_correct: true,
                },
            )]),
            points: 1,
            explanation: Some("Because".to_string()),
        };

        let json = serde_json::to_value(question.secure()).unwrap();

        assert_eq!(json["options"]["a"], "Alpha");
        assert!(!json.to_string().contains("is_correct"));
        assert!(json.get("explanation").is_none());
        assert_eq!(json["question_type"], "SBA");
    }
}
