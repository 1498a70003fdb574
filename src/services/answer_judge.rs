use std::time::Duration;

use futures::{FutureExt, future::BoxFuture};
use tracing::warn;

use crate::error::JudgeError;

/// Everything the judge needs to evaluate one answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JudgeRequest {
    /// Category of the clue.
    pub category: String,
    /// Clue text.
    pub clue: String,
    /// Answer stored on the board.
    pub expected: String,
    /// What the contestant submitted.
    pub candidate: String,
}

/// Outcome of an evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    /// Whether the answer is accepted.
    pub is_correct: bool,
    /// Short justification, shown to the room.
    pub explanation: String,
    /// Set when the judge failed and the answer was ruled incorrect by default.
    pub unresolved: bool,
}

impl Verdict {
    /// Default verdict when the judge could not decide.
    pub fn unresolved(reason: impl Into<String>) -> Self {
        Self {
            is_correct: false,
            explanation: reason.into(),
            unresolved: true,
        }
    }
}

/// External collaborator deciding whether an answer is correct.
pub trait AnswerJudge: Send + Sync {
    /// Evaluate `request`.
    fn evaluate(&self, request: JudgeRequest) -> BoxFuture<'static, Result<Verdict, JudgeError>>;
}

/// Evaluate with a deadline; failures and timeouts become an unresolved incorrect verdict.
pub async fn evaluate_with_deadline(
    judge: &dyn AnswerJudge,
    request: JudgeRequest,
    deadline: Duration,
) -> Verdict {
    match tokio::time::timeout(deadline, judge.evaluate(request)).await {
        Ok(Ok(verdict)) => verdict,
        Ok(Err(err)) => {
            warn!(error = %err, "answer judge failed; ruling incorrect");
            Verdict::unresolved(err.to_string())
        }
        Err(_) => {
            warn!(deadline_ms = deadline.as_millis() as u64, "answer judge timed out; ruling incorrect");
            Verdict::unresolved(JudgeError::Timeout.to_string())
        }
    }
}

/// Local judge comparing normalized strings.
///
/// Ignores case, punctuation, leading articles and the "what is" phrasing, and
/// accepts a candidate that contains the expected answer.
#[derive(Debug, Default, Clone, Copy)]
pub struct LenientJudge;

const QUESTION_PREFIXES: &[&str] = &[
    "what is ", "what are ", "who is ", "who are ", "where is ", "where are ", "what was ",
    "who was ",
];
const ARTICLES: &[&str] = &["the ", "a ", "an "];

impl LenientJudge {
    /// Lowercase, strip punctuation, question phrasing and leading articles.
    pub fn normalize(text: &str) -> String {
        let cleaned: String = text
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
            .collect();
        let mut normalized = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");

        for prefix in QUESTION_PREFIXES {
            if let Some(rest) = normalized.strip_prefix(prefix) {
                normalized = rest.to_string();
                break;
            }
        }
        for article in ARTICLES {
            if let Some(rest) = normalized.strip_prefix(article) {
                normalized = rest.to_string();
                break;
            }
        }
        normalized
    }

    fn judge(request: &JudgeRequest) -> Verdict {
        let expected = Self::normalize(&request.expected);
        let candidate = Self::normalize(&request.candidate);
        let is_correct = !candidate.is_empty()
            && (candidate == expected || (expected.len() > 2 && candidate.contains(&expected)));

        Verdict {
            is_correct,
            explanation: if is_correct {
                format!("\"{}\" matches \"{}\"", request.candidate, request.expected)
            } else {
                format!("\"{}\" does not match", request.candidate)
            },
            unresolved: false,
        }
    }
}

impl AnswerJudge for LenientJudge {
    fn evaluate(&self, request: JudgeRequest) -> BoxFuture<'static, Result<Verdict, JudgeError>> {
        futures::future::ready(Ok(Self::judge(&request))).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(expected: &str, candidate: &str) -> JudgeRequest {
        JudgeRequest {
            category: "History".into(),
            clue: "clue".into(),
            expected: expected.into(),
            candidate: candidate.into(),
        }
    }

    struct StuckJudge;

    impl AnswerJudge for StuckJudge {
        fn evaluate(&self, _request: JudgeRequest) -> BoxFuture<'static, Result<Verdict, JudgeError>> {
            futures::future::pending().boxed()
        }
    }

    #[test]
    fn normalize_strips_phrasing_and_punctuation() {
        assert_eq!(LenientJudge::normalize("What is the Eiffel Tower?"), "eiffel tower");
        assert_eq!(LenientJudge::normalize("  An   apple!! "), "apple");
    }

    #[tokio::test]
    async fn lenient_judge_accepts_equivalent_phrasing() {
        let verdict = LenientJudge
            .evaluate(request("The Eiffel Tower", "what is eiffel tower"))
            .await
            .unwrap();
        assert!(verdict.is_correct);
        assert!(!verdict.unresolved);
    }

    #[tokio::test]
    async fn lenient_judge_rejects_other_answers() {
        let verdict = LenientJudge
            .evaluate(request("Paris", "London"))
            .await
            .unwrap();
        assert!(!verdict.is_correct);
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_judge_is_ruled_unresolved() {
        let verdict =
            evaluate_with_deadline(&StuckJudge, request("Paris", "Paris"), Duration::from_secs(1))
                .await;
        assert!(!verdict.is_correct);
        assert!(verdict.unresolved);
    }
}
