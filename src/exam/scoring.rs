//! Scoring
//!
//! Per-question scoring for SBA and TRUE_FALSE questions and the
//! whole-exam score card written to durable storage on submission.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::exam::models::{AnswerBuffer, Exam, Question, QuestionId, QuestionType};

// == Selection Parsing ==
/// Splits a raw selection into its parts.
///
/// Accepts a JSON array (`["a:true","b:false"]`), a comma-separated list
/// (`a:true,b:false`) or a single option key (`b`). Blank parts are dropped.
pub fn parse_selection(raw: &str) -> Vec<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    if trimmed.starts_with('[') {
        if let Ok(parts) = serde_json::from_str::<Vec<String>>(trimmed) {
            return parts
                .into_iter()
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect();
        }
    }

    trimmed
        .split(',')
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

/// Parses TRUE_FALSE judgments (`key:true` / `key:false`). Later parts win.
fn parse_judgments(parts: &[String]) -> BTreeMap<String, bool> {
    let mut judgments = BTreeMap::new();
    for part in parts {
        let Some((key, verdict)) = part.split_once(':') else {
            continue;
        };
        let verdict = match verdict.trim().to_ascii_lowercase().as_str() {
            "true" => true,
            "false" => false,
            _ => continue,
        };
        judgments.insert(key.trim().to_string(), verdict);
    }
    judgments
}

// == Question Score ==
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionScore {
    pub points_earned: f64,
    /// Every part right
    pub is_correct: bool,
    /// Some but not all parts right (TRUE_FALSE only)
    pub is_partially_correct: bool,
}

impl QuestionScore {
    fn zero() -> Self {
        Self {
            points_earned: 0.0,
            is_correct: false,
            is_partially_correct: false,
        }
    }
}

/// Full points iff the question has exactly one correct option and the
/// selection names it; otherwise zero.
pub fn score_sba(question: &Question, selection: &[String]) -> QuestionScore {
    let correct: Vec<&String> = question
        .options
        .iter()
        .filter(|(_, option)| option.is_correct)
        .map(|(key, _)| key)
        .collect();

    match (correct.as_slice(), selection) {
        ([answer], [chosen]) if *answer == chosen => QuestionScore {
            points_earned: f64::from(question.points),
            is_correct: true,
            is_partially_correct: false,
        },
        _ => QuestionScore::zero(),
    }
}

/// `(matches / options) × points`, where an option matches when the
/// learner's judgment equals its correctness flag. Unjudged options never match.
pub fn score_true_false(question: &Question, selection: &[String]) -> QuestionScore {
    let total = question.options.len();
    if total == 0 || selection.is_empty() {
        return QuestionScore::zero();
    }

    let judgments = parse_judgments(selection);
    let matches = question
        .options
        .iter()
        .filter(|(key, option)| judgments.get(key.as_str()) == Some(&option.is_correct))
        .count();

    QuestionScore {
        points_earned: matches as f64 / total as f64 * f64::from(question.points),
        is_correct: matches == total,
        is_partially_correct: matches > 0 && matches < total,
    }
}

pub fn score_question(question: &Question, selection: &[String]) -> QuestionScore {
    match question.question_type {
        QuestionType::Sba => score_sba(question, selection),
        QuestionType::TrueFalse => score_true_false(question, selection),
    }
}

// == Answer Detail ==
/// The correct answer as shown in results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CorrectAnswer {
    /// SBA: the correct option key
    Single(String),
    /// TRUE_FALSE: option key to its correctness flag
    PerOption(BTreeMap<String, bool>),
}

impl CorrectAnswer {
    pub fn for_question(question: &Question) -> Self {
        match question.question_type {
            QuestionType::Sba => CorrectAnswer::Single(
                question
                    .options
                    .iter()
                    .find(|(_, option)| option.is_correct)
                    .map(|(key, _)| key.clone())
                    .unwrap_or_default(),
            ),
            QuestionType::TrueFalse => CorrectAnswer::PerOption(
                question
                    .options
                    .iter()
                    .map(|(key, option)| (key.clone(), option.is_correct))
                    .collect(),
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionDetail {
    pub key: String,
    pub text: String,
    pub is_correct: bool,
}

/// One question's answer and scoring, as persisted on submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerDetail {
    pub question_id: QuestionId,
    pub question_text: String,
    pub question_type: QuestionType,
    pub user_answer: Vec<String>,
    pub correct_answer: CorrectAnswer,
    pub is_correct: bool,
    #[serde(default)]
    pub is_partially_correct: bool,
    pub points_earned: f64,
    pub max_points: u32,
    #[serde(default)]
    pub explanation: Option<String>,
    pub options: Vec<OptionDetail>,
}

impl AnswerDetail {
    fn new(question: &Question, user_answer: Vec<String>, score: &QuestionScore) -> Self {
        Self {
            question_id: question.id,
            question_text: question.question_text.clone(),
            question_type: question.question_type,
            correct_answer: CorrectAnswer::for_question(question),
            is_correct: score.is_correct,
            is_partially_correct: score.is_partially_correct,
            points_earned: score.points_earned,
            max_points: question.points,
            explanation: question.explanation.clone(),
            options: question
                .options
                .iter()
                .map(|(key, option)| OptionDetail {
                    key: key.clone(),
                    text: option.text.clone(),
                    is_correct: option.is_correct,
                })
                .collect(),
            user_answer,
        }
    }
}

// == Score Card ==
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreCard {
    pub score: f64,
    pub total_marks: u32,
    /// Questions answered fully correctly
    pub correct_answers: u32,
    pub passed: bool,
    pub answers: Vec<AnswerDetail>,
}

/// Scores every question of `exam` against `buffer`.
///
/// `passing_score` is the snapshot taken when the attempt started, not the
/// exam's current value. Unanswered questions score zero.
pub fn score_exam(exam: &Exam, buffer: &AnswerBuffer, passing_score: f64) -> ScoreCard {
    let mut score = 0.0;
    let mut correct_answers = 0;
    let mut answers = Vec::with_capacity(exam.questions.len());

    for question in &exam.questions {
        let selection = buffer
            .get(&question.id)
            .map(|raw| parse_selection(raw))
            .unwrap_or_default();
        let result = score_question(question, &selection);

        score += result.points_earned;
        if result.is_correct {
            correct_answers += 1;
        }
        answers.push(AnswerDetail::new(question, selection, &result));
    }

    ScoreCard {
        score,
        total_marks: exam.total_marks(),
        correct_answers,
        passed: score >= passing_score,
        answers,
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::exam::models::QuestionOption;

    fn option(text: &str, is_correct: bool) -> QuestionOption {
        QuestionOption {
            text: text.to_string(),
            is_correct,
        }
    }

    fn sba() -> Question {
        Question {
            id: 1,
            question_text: "Pick the right one".to_string(),
            question_type: QuestionType::Sba,
            options: BTreeMap::from([
                ("a".to_string(), option("Alpha", false)),
                ("b".to_string(), option("Beta", true)),
            ]),
            points: 2,
            explanation: None,
        }
    }

    fn true_false() -> Question {
        Question {
            id: 2,
            question_text: "Judge each".to_string(),
            question_type: QuestionType::TrueFalse,
            options: BTreeMap::from([
                ("a".to_string(), option("Alpha", true)),
                ("b".to_string(), option("Beta", false)),
            ]),
            points: 2,
            explanation: Some("a holds, b does not".to_string()),
        }
    }

    fn exam() -> Exam {
        Exam {
            id: 1,
            title: "Example".to_string(),
            duration_minutes: 60,
            passing_score: 3.0,
            instructions: None,
            questions: vec![sba(), true_false()],
        }
    }

    #[test]
    fn test_parse_selection_formats() {
        assert_eq!(parse_selection("b"), vec!["b"]);
        assert_eq!(parse_selection(r#"["a:true","b:false"]"#), vec!["a:true", "b:false"]);
        assert_eq!(parse_selection("a:true, b:false"), vec!["a:true", "b:false"]);
        assert!(parse_selection("  ").is_empty());
        assert!(parse_selection("[]").is_empty());
    }

    #[test]
    fn test_sba_scoring() {
        let question = sba();
        assert_eq!(score_sba(&question, &["b".to_string()]).points_earned, 2.0);
        assert_eq!(score_sba(&question, &["a".to_string()]).points_earned, 0.0);
        assert_eq!(score_sba(&question, &[]).points_earned, 0.0);
        assert!(!score_sba(&question, &["b".to_string(), "a".to_string()]).is_correct);
    }

    #[test]
    fn test_sba_with_two_correct_options_never_scores() {
        let mut question = sba();
        question.options.insert("c".to_string(), option("Gamma", true));

        assert_eq!(score_sba(&question, &["b".to_string()]).points_earned, 0.0);
    }

    #[test]
    fn test_true_false_partial_credit() {
        let question = true_false();
        let parts = parse_selection(r#"["a:true","b:true"]"#);

        let result = score_true_false(&question, &parts);

        assert_eq!(result.points_earned, 1.0);
        assert!(!result.is_correct);
        assert!(result.is_partially_correct);
    }

    #[test]
    fn test_true_false_unjudged_option_does_not_match() {
        let question = true_false();
        let result = score_true_false(&question, &["a:true".to_string()]);

        assert_eq!(result.points_earned, 1.0);
        assert!(result.is_partially_correct);
    }

    #[test]
    fn test_true_false_last_judgment_wins() {
        let question = true_false();
        let parts = parse_selection("a:false,b:false,a:true");

        assert!(score_true_false(&question, &parts).is_correct);
    }

    #[test]
    fn test_full_marks_example() {
        let buffer = AnswerBuffer::from([
            (1, "b".to_string()),
            (2, r#"["a:true","b:false"]"#.to_string()),
        ]);

        let card = score_exam(&exam(), &buffer, 3.0);

        assert_eq!(card.score, 4.0);
        assert_eq!(card.total_marks, 4);
        assert_eq!(card.correct_answers, 2);
        assert!(card.passed);
    }

    #[test]
    fn test_partial_example() {
        let buffer = AnswerBuffer::from([
            (1, "a".to_string()),
            (2, r#"["a:true","b:true"]"#.to_string()),
        ]);

        let card = score_exam(&exam(), &buffer, 3.0);

        assert_eq!(card.score, 1.0);
        assert_eq!(card.correct_answers, 0);
        assert!(!card.passed);
        assert!(card.answers[1].is_partially_correct);
    }

    #[test]
    fn test_unanswered_questions_score_zero() {
        let card = score_exam(&exam(), &AnswerBuffer::new(), 0.0);

        assert_eq!(card.score, 0.0);
        assert_eq!(card.answers.len(), 2);
        assert!(card.answers.iter().all(|a| a.user_answer.is_empty()));
        assert!(card.passed, "a zero passing score is met by zero");
    }

    #[test]
    fn test_correct_answer_shapes() {
        let json = serde_json::to_value(CorrectAnswer::for_question(&sba())).unwrap();
        assert_eq!(json, serde_json::json!("b"));

        let json = serde_json::to_value(CorrectAnswer::for_question(&true_false())).unwrap();
        assert_eq!(json, serde_json::json!({"a": true, "b": false}));
    }
}
