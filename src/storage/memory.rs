//! In-Process Exam Store
//!
//! Exams, package membership, enrollments and attempts held in memory behind
//! one async lock. Implements every storage trait.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{StorageError, StorageResult};
use crate::exam::models::{
    AttemptCompletion, AttemptId, AttemptStatus, Exam, ExamAttempt, ExamId, NewAttempt,
    PackageId, Question, QuestionOption, QuestionType, UserId,
};
use crate::storage::{AttemptRepository, EnrollmentRepository, ExamCatalog};

#[derive(Debug, Default)]
struct State {
    exams: HashMap<ExamId, Exam>,
    packages: HashMap<PackageId, HashSet<ExamId>>,
    enrollments: HashSet<(UserId, PackageId)>,
    attempts: BTreeMap<AttemptId, ExamAttempt>,
    next_attempt_id: AttemptId,
}

impl State {
    /// Time limit used by the sweep: the exam's current duration, or the
    /// attempt's snapshot if the exam is gone.
    fn limit_seconds(&self, attempt: &ExamAttempt) -> i64 {
        self.exams
            .get(&attempt.exam_id)
            .map(Exam::time_limit_seconds)
            .unwrap_or(attempt.time_limit_seconds)
    }

    fn is_abandoned(&self, attempt: &ExamAttempt, now: DateTime<Utc>, grace: Duration) -> bool {
        if attempt.status != AttemptStatus::Started {
            return false;
        }
        let Ok(grace) = chrono::Duration::from_std(grace) else {
            return false;
        };
        let deadline = attempt
            .started_at
            .checked_add_signed(chrono::Duration::seconds(self.limit_seconds(attempt)))
            .and_then(|t| t.checked_add_signed(grace));

        match deadline {
            Some(deadline) => deadline < now,
            None => false,
        }
    }
}

// == In-Memory Exam Store ==
#[derive(Debug, Default)]
pub struct InMemoryExamStore {
    state: RwLock<State>,
}

impl InMemoryExamStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `exam` to the catalog and to `package_id`.
    pub async fn add_exam(&self, package_id: PackageId, exam: Exam) {
        let mut state = self.state.write().await;
        state.packages.entry(package_id).or_default().insert(exam.id);
        state.exams.insert(exam.id, exam);
    }

    pub async fn enroll(&self, user_id: UserId, package_id: PackageId) {
        self.state.write().await.enrollments.insert((user_id, package_id));
    }

    /// Stores `attempt` as-is, for seeding historical records.
    pub async fn insert_attempt(&self, attempt: ExamAttempt) {
        let mut state = self.state.write().await;
        state.next_attempt_id = state.next_attempt_id.max(attempt.id);
        state.attempts.insert(attempt.id, attempt);
    }

    pub async fn attempt(&self, attempt_id: AttemptId) -> Option<ExamAttempt> {
        self.state.read().await.attempts.get(&attempt_id).cloned()
    }

    pub async fn attempt_count(&self) -> usize {
        self.state.read().await.attempts.len()
    }

    // == Demo Data ==
    /// Loads package 1 with one two-question exam and enrolls users 1 and 2.
    pub async fn seed_demo(&self) {
        self.add_exam(1, demo_exam()).await;
        self.enroll(1, 1).await;
        self.enroll(2, 1).await;
        debug!("Seeded demo exam data");
    }
}

#[async_trait]
impl ExamCatalog for InMemoryExamStore {
    async fn find_exam(&self, exam_id: ExamId) -> StorageResult<Option<Exam>> {
        Ok(self.state.read().await.exams.get(&exam_id).cloned())
    }

    async fn package_contains_exam(
        &self,
        package_id: PackageId,
        exam_id: ExamId,
    ) -> StorageResult<bool> {
        Ok(self
            .state
            .read()
            .await
            .packages
            .get(&package_id)
            .map(|exams| exams.contains(&exam_id))
            .unwrap_or(false))
    }
}

#[async_trait]
impl EnrollmentRepository for InMemoryExamStore {
    async fn is_enrolled(&self, user_id: UserId, package_id: PackageId) -> StorageResult<bool> {
        Ok(self
            .state
            .read()
            .await
            .enrollments
            .contains(&(user_id, package_id)))
    }
}

#[async_trait]
impl AttemptRepository for InMemoryExamStore {
    async fn find_attempt_for_exam(
        &self,
        user_id: UserId,
        exam_id: ExamId,
        package_id: PackageId,
    ) -> StorageResult<Option<ExamAttempt>> {
        Ok(self
            .state
            .read()
            .await
            .attempts
            .values()
            .rev()
            .find(|a| a.user_id == user_id && a.exam_id == exam_id && a.package_id == package_id)
            .cloned())
    }

    async fn create_attempt(&self, attempt: NewAttempt) -> StorageResult<ExamAttempt> {
        let mut state = self.state.write().await;

        let duplicate = state.attempts.values().any(|a| {
            a.status == AttemptStatus::Started
                && a.user_id == attempt.user_id
                && a.exam_id == attempt.exam_id
                && a.package_id == attempt.package_id
        });
        if duplicate {
            return Err(StorageError::Conflict(format!(
                "user {} already has an attempt in progress for exam {}",
                attempt.user_id, attempt.exam_id
            )));
        }

        state.next_attempt_id += 1;
        let record = ExamAttempt {
            id: state.next_attempt_id,
            user_id: attempt.user_id,
            exam_id: attempt.exam_id,
            package_id: attempt.package_id,
            status: AttemptStatus::Started,
            started_at: attempt.started_at,
            completed_at: None,
            session_token: Some(attempt.session_token),
            time_limit_seconds: attempt.time_limit_seconds,
            total_questions: attempt.total_questions,
            passing_score: attempt.passing_score,
            score: None,
            correct_answers: None,
            passed: None,
            actual_time_spent: None,
            answers_data: String::new(),
        };
        state.attempts.insert(record.id, record.clone());

        Ok(record)
    }

    async fn find_active_by_session(&self, token: &str) -> StorageResult<Option<ExamAttempt>> {
        Ok(find_by_token(&*self.state.read().await, token, |a| {
            a.status == AttemptStatus::Started
        }))
    }

    async fn find_finished_by_session(&self, token: &str) -> StorageResult<Option<ExamAttempt>> {
        Ok(find_by_token(&*self.state.read().await, token, |a| {
            a.status.is_terminal()
        }))
    }

    async fn find_by_session_and_user(
        &self,
        token: &str,
        user_id: UserId,
    ) -> StorageResult<Option<ExamAttempt>> {
        Ok(find_by_token(&*self.state.read().await, token, |a| {
            a.user_id == user_id
        }))
    }

    async fn complete_attempt(
        &self,
        attempt_id: AttemptId,
        completion: AttemptCompletion,
    ) -> StorageResult<bool> {
        let mut state = self.state.write().await;
        let Some(attempt) = state.attempts.get_mut(&attempt_id) else {
            return Err(StorageError::Backend(format!(
                "attempt {} does not exist",
                attempt_id
            )));
        };

        if attempt.status != AttemptStatus::Started {
            return Ok(false);
        }

        attempt.status = completion.status;
        attempt.completed_at = Some(completion.completed_at);
        attempt.score = Some(completion.score);
        attempt.correct_answers = Some(completion.correct_answers);
        attempt.passed = Some(completion.passed);
        attempt.actual_time_spent = Some(completion.actual_time_spent);
        attempt.answers_data = completion.answers_data;

        Ok(true)
    }

    async fn count_expired(&self, now: DateTime<Utc>, grace: Duration) -> StorageResult<u64> {
        let state = self.state.read().await;
        Ok(state
            .attempts
            .values()
            .filter(|a| state.is_abandoned(a, now, grace))
            .count() as u64)
    }

    async fn mark_expired_abandoned(
        &self,
        now: DateTime<Utc>,
        grace: Duration,
    ) -> StorageResult<u64> {
        let mut state = self.state.write().await;
        let expired: Vec<AttemptId> = state
            .attempts
            .values()
            .filter(|a| state.is_abandoned(a, now, grace))
            .map(|a| a.id)
            .collect();

        for id in &expired {
            if let Some(attempt) = state.attempts.get_mut(id) {
                attempt.status = AttemptStatus::Abandoned;
                attempt.completed_at = Some(now);
            }
        }

        Ok(expired.len() as u64)
    }
}

fn find_by_token(
    state: &State,
    token: &str,
    predicate: impl Fn(&ExamAttempt) -> bool,
) -> Option<ExamAttempt> {
    state
        .attempts
        .values()
        .find(|a| a.session_token.as_deref() == Some(token) && predicate(a))
        .cloned()
}

fn demo_exam() -> Exam {
    let option = |text: &str, is_correct: bool| QuestionOption {
        text: text.to_string(),
        is_correct,
    };

    Exam {
        id: 1,
        title: "Clinical Pharmacology Basics".to_string(),
        duration_minutes: 60,
        passing_score: 3.0,
        instructions: Some("Answer every question. Answers are saved as you go.".to_string()),
        questions: vec![
            Question {
                id: 1,
                question_text: "Which drug class is first-line for uncomplicated hypertension?"
                    .to_string(),
                question_type: QuestionType::Sba,
                options: BTreeMap::from([
                    ("a".to_string(), option("Loop diuretics", false)),
                    ("b".to_string(), option("Thiazide diuretics", true)),
                    ("c".to_string(), option("Alpha blockers", false)),
                ]),
                points: 2,
                explanation: Some("Thiazides are recommended first-line.".to_string()),
            },
            Question {
                id: 2,
                question_text: "Judge each statement about ACE inhibitors.".to_string(),
                question_type: QuestionType::TrueFalse,
                options: BTreeMap::from([
                    ("a".to_string(), option("They can cause a dry cough", true)),
                    ("b".to_string(), option("They are safe in pregnancy", false)),
                ]),
                points: 2,
                explanation: None,
            },
        ],
    }
}
