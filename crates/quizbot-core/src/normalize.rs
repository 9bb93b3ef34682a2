//! Canonical answer normalization.
//!
//! Answers in trivia archives often carry a trailing explanatory clause and
//! a sentence-final period: `Париж (столица Франции).` is accepted as
//! `Париж`. Case folding is a separate step applied by the comparer.

use once_cell::sync::Lazy;
use regex::Regex;

/// From the first ` (` up to a closing parenthesis that ends the string.
static TRAILING_CLAUSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r" \(.+\)$").expect("trailing clause pattern compiles"));

/// Strip one trailing period and one trailing ` (...)` clause from `answer`.
///
/// The clause runs from the first ` (` to the final `)`, so several
/// trailing clauses go together. A period left at the end once the clause
/// is gone is removed too.
pub fn normalize_answer(answer: &str) -> &str {
    let text = answer.trim();
    let text = text.strip_suffix('.').unwrap_or(text).trim_end();
    match TRAILING_CLAUSE.find(text) {
        Some(clause) => {
            let head = text[..clause.start()].trim_end();
            head.strip_suffix('.').unwrap_or(head).trim_end()
        }
        None => text,
    }
}

/// Case-fold text for answer comparison.
pub fn fold_case(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Returns `true` if `candidate` matches the canonical `answer` after
/// normalization and case folding.
pub fn answers_match(answer: &str, candidate: &str) -> bool {
    fold_case(normalize_answer(answer)) == fold_case(candidate)
}
