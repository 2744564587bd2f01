//! Candidate validation for question/answer records.
//!
//! Every candidate the model emits passes through here before it can
//! become a [`QaPair`]. Rejection never throws and never aborts a batch:
//! the caller collects the accepted pairs and a rejection count, and each
//! rejection is logged with its reason.

use serde_json::Value;

use crate::types::QaPair;

/// Minimum question length, in characters.
pub const MIN_QUESTION_LEN: usize = 5;
/// Minimum answer length, in characters.
pub const MIN_ANSWER_LEN: usize = 3;

/// Answers that carry no information, rejected case-insensitively.
pub const PLACEHOLDER_ANSWERS: [&str; 7] =
    ["it", "this", "that", "something", "unknown", "n/a", "none"];

/// Why a candidate was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// The candidate is not a JSON object.
    NotAnObject,
    /// The question is missing or empty after trimming.
    EmptyQuestion,
    /// The question is shorter than [`MIN_QUESTION_LEN`] characters.
    QuestionTooShort {
        /// The offending question.
        question: String,
    },
    /// The answer is missing or empty after trimming.
    EmptyAnswer {
        /// Question whose answer was empty.
        question: String,
    },
    /// The answer is shorter than [`MIN_ANSWER_LEN`] characters.
    AnswerTooShort {
        /// The offending answer.
        answer: String,
    },
    /// The answer is one of [`PLACEHOLDER_ANSWERS`].
    PlaceholderAnswer {
        /// The offending answer.
        answer: String,
    },
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAnObject => write!(f, "candidate is not an object"),
            Self::EmptyQuestion => write!(f, "empty question"),
            Self::QuestionTooShort { question } => {
                write!(f, "question too short: '{question}'")
            }
            Self::EmptyAnswer { question } => {
                write!(f, "empty answer for question '{question}'")
            }
            Self::AnswerTooShort { answer } => write!(f, "answer too short: '{answer}'"),
            Self::PlaceholderAnswer { answer } => {
                write!(f, "generic placeholder answer: '{answer}'")
            }
        }
    }
}

/// Validate one candidate value into a [`QaPair`].
///
/// Both fields are trimmed before the checks; the returned pair carries
/// the trimmed text.
pub fn validate_candidate(candidate: &Value) -> Result<QaPair, RejectReason> {
    let Some(object) = candidate.as_object() else {
        return Err(RejectReason::NotAnObject);
    };

    let question = object
        .get("question")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim();
    let answer = object
        .get("answer")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim();

    if question.is_empty() {
        return Err(RejectReason::EmptyQuestion);
    }
    if question.chars().count() < MIN_QUESTION_LEN {
        return Err(RejectReason::QuestionTooShort {
            question: question.to_owned(),
        });
    }
    if answer.is_empty() {
        return Err(RejectReason::EmptyAnswer {
            question: question.to_owned(),
        });
    }
    if answer.chars().count() < MIN_ANSWER_LEN {
        return Err(RejectReason::AnswerTooShort {
            answer: answer.to_owned(),
        });
    }
    if PLACEHOLDER_ANSWERS
        .iter()
        .any(|p| p.eq_ignore_ascii_case(answer))
    {
        return Err(RejectReason::PlaceholderAnswer {
            answer: answer.to_owned(),
        });
    }

    Ok(QaPair::new(question, answer))
}

/// Accepted pairs plus the number of candidates dropped on the way.
#[derive(Debug, Default)]
pub struct ValidationOutcome {
    /// Candidates that passed every check, in input order.
    pub accepted: Vec<QaPair>,
    /// Candidates dropped, each already logged with its reason.
    pub rejected: usize,
}

/// Validate a batch of candidates, logging each rejection.
///
/// `segment_id` only labels the log lines; it does not affect validation.
#[must_use]
pub fn validate_candidates(segment_id: u64, candidates: &[Value]) -> ValidationOutcome {
    let mut outcome = ValidationOutcome::default();

    for candidate in candidates {
        match validate_candidate(candidate) {
            Ok(pair) => outcome.accepted.push(pair),
            Err(reason) => {
                tracing::warn!(segment = segment_id, %reason, "rejected QA candidate");
                outcome.rejected += 1;
            }
        }
    }

    outcome
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn well_formed_pair_is_accepted() {
        let pair =
            validate_candidate(&json!({"question": "What is X?", "answer": "X is Y."})).unwrap();
        assert_eq!(pair.question, "What is X?");
        assert_eq!(pair.answer, "X is Y.");
    }

    #[test]
    fn empty_question_is_rejected() {
        let err = validate_candidate(&json!({"question": "", "answer": "Something real."}));
        assert_eq!(err, Err(RejectReason::EmptyQuestion));
    }

    #[test]
    fn three_char_question_is_rejected() {
        let err = validate_candidate(&json!({"question": "Hi?", "answer": "A greeting."}));
        assert!(matches!(err, Err(RejectReason::QuestionTooShort { .. })));
    }

    #[test]
    fn placeholder_answer_is_rejected() {
        let err = validate_candidate(&json!({"question": "What is it?", "answer": "it"}));
        assert!(matches!(err, Err(RejectReason::PlaceholderAnswer { .. })));

        // Case-insensitive match.
        let err = validate_candidate(&json!({"question": "What is it?", "answer": "N/A"}));
        assert!(matches!(err, Err(RejectReason::PlaceholderAnswer { .. })));
    }

    #[test]
    fn short_answer_is_rejected() {
        let err = validate_candidate(&json!({"question": "What is X?", "answer": "ab"}));
        assert!(matches!(err, Err(RejectReason::AnswerTooShort { .. })));
    }

    #[test]
    fn missing_fields_count_as_empty() {
        let err = validate_candidate(&json!({"answer": "An orphaned answer."}));
        assert_eq!(err, Err(RejectReason::EmptyQuestion));

        let err = validate_candidate(&json!({"question": "What about this one?"}));
        assert!(matches!(err, Err(RejectReason::EmptyAnswer { .. })));
    }

    #[test]
    fn non_object_candidates_are_rejected() {
        assert_eq!(
            validate_candidate(&json!("just a string")),
            Err(RejectReason::NotAnObject)
        );
        assert_eq!(validate_candidate(&json!(42)), Err(RejectReason::NotAnObject));
    }

    #[test]
    fn fields_are_trimmed_before_checks() {
        let pair = validate_candidate(
            &json!({"question": "  What is X?  ", "answer": "  X is Y.  "}),
        )
        .unwrap();
        assert_eq!(pair.question, "What is X?");
        assert_eq!(pair.answer, "X is Y.");
    }

    #[test]
    fn batch_validation_counts_rejections() {
        let candidates = vec![
            json!({"question": "What is A?", "answer": "The first letter."}),
            json!({"question": "", "answer": "Nope."}),
            json!({"question": "What is B?", "answer": "it"}),
        ];
        let outcome = validate_candidates(0, &candidates);
        assert_eq!(outcome.accepted.len(), 1);
        assert_eq!(outcome.rejected, 2);
    }
}
