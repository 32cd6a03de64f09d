//! Exam Module
//!
//! The exam session lifecycle and everything it needs: the domain model,
//! session tokens, scoring and result views.

pub mod models;
pub mod results;
pub mod scoring;
pub mod session;
pub mod token;


pub use models::{
    AnswerBuffer, AttemptStatus, Exam, ExamAttempt, Question, QuestionOption, QuestionType,
    SecureQuestion,
};
pub use results::{AnswersPayload, ResultSource, ResultsView};
pub use scoring::{score_exam, AnswerDetail, CorrectAnswer, ScoreCard};
pub use session::{
    ExamSessionManager, SessionView, StartedAttempt, SubmissionReceipt, SyncReceipt,
};
pub use token::{answer_buffer_key, generate_session_token};
