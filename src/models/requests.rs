//! Request DTOs for the exam session API
//!
//! Defines the structure of incoming HTTP request bodies.

use serde::Deserialize;

use crate::exam::models::{PackageId, QuestionId};

/// Maximum answers accepted in one sync call.
pub const MAX_ANSWERS_PER_SYNC: usize = 500;

/// Request body for POST /exams/:exam_id/attempts
#[derive(Debug, Clone, Deserialize)]
pub struct StartAttemptRequest {
    pub package_id: PackageId,
}

/// A selection as sent by the client: a raw string (`"b"`, `"a:true,b:false"`)
/// or a list of parts (`["a:true", "b:false"]`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Selection {
    Raw(String),
    Parts(Vec<String>),
}

impl Selection {
    /// The string stored in the answer buffer. Lists are kept as JSON arrays.
    pub fn into_raw(self) -> String {
        match self {
            Selection::Raw(raw) => raw,
            Selection::Parts(parts) => {
                serde_json::to_string(&parts).unwrap_or_else(|_| parts.join(","))
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnswerSync {
    pub question_id: QuestionId,
    pub selected_option: Selection,
}

/// Request body for PUT /sessions/:token/answers
#[derive(Debug, Clone, Deserialize)]
pub struct SyncAnswersRequest {
    pub answers: Vec<AnswerSync>,
}

impl SyncAnswersRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.answers.is_empty() {
            return Some("At least one answer is required".to_string());
        }
        if self.answers.len() > MAX_ANSWERS_PER_SYNC {
            return Some(format!(
                "At most {} answers can be synced at once",
                MAX_ANSWERS_PER_SYNC
            ));
        }
        None
    }

    pub fn into_answers(self) -> Vec<(QuestionId, String)> {
        self.answers
            .into_iter()
            .map(|a| (a.question_id, a.selected_option.into_raw()))
            .collect()
    }
}
