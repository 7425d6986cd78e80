//! Keyword-overlap answer grading.
//!
//! A single keyword hit is enough. Keywords are the whitespace tokens of the
//! reference answer longer than three characters; matching is a plain
//! lowercase substring test, so "cat" would match "category".

use crate::domain::{Capsule, EvaluationResult};

const MIN_KEYWORD_CHARS: usize = 4;

/// True when at least one keyword of `expected_answer` appears in `user_answer`.
/// Blank inputs and references without any keyword never earn credit.
pub fn evaluate_answer(user_answer: &str, expected_answer: &str) -> bool {
  if user_answer.is_empty() || expected_answer.is_empty() {
    return false;
  }

  let user = user_answer.to_lowercase();
  let expected = expected_answer.to_lowercase();

  let mut keywords = expected
    .split_whitespace()
    .filter(|t| t.chars().count() >= MIN_KEYWORD_CHARS)
    .peekable();
  if keywords.peek().is_none() {
    return false;
  }
  keywords.any(|t| user.contains(t))
}

/// Grade every question of a capsule in order. Missing answers count as blank.
pub fn grade_capsule(capsule: &Capsule, answers: &[String]) -> Vec<EvaluationResult> {
  capsule
    .questions
    .iter()
    .enumerate()
    .map(|(i, q)| {
      let user_answer = answers.get(i).cloned().unwrap_or_default();
      EvaluationResult {
        question: q.question.clone(),
        expected_answer: q.expected_answer.clone(),
        is_correct: evaluate_answer(&user_answer, &q.expected_answer),
        user_answer,
      }
    })
    .collect()
}
