//! Question/answer text parser.
//!
//! Extracts questions from plain-text trivia archives of the form
//!
//! ```text
//! Вопрос 1:
//! Question body, possibly over several lines.
//! Ответ:
//! Answer body.
//!
//! Комментарий:
//! ...
//! ```
//!
//! Numerals in the source markers are ignored; entries are renumbered from 1
//! across every block handed to the parser.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::model::QuestionSet;

/// Section headers that end an answer body.
const SECTION_HEADERS: &[&str] = &[
    "Комментарий",
    "Комментарии",
    "Зачет",
    "Зачёт",
    "Незачет",
    "Незачёт",
    "Источник",
    "Источники",
    "Автор",
    "Авторы",
];

/// Marker words that introduce questions and answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Markers {
    /// Word preceding the question numeral (`Вопрос 12:`).
    #[serde(default = "default_question_marker")]
    pub question: String,
    /// Word on the line preceding the answer body (`Ответ:`).
    #[serde(default = "default_answer_marker")]
    pub answer: String,
}

fn default_question_marker() -> String {
    "Вопрос".to_string()
}

fn default_answer_marker() -> String {
    "Ответ".to_string()
}

impl Default for Markers {
    fn default() -> Self {
        Self {
            question: default_question_marker(),
            answer: default_answer_marker(),
        }
    }
}

/// Compiled line patterns for one set of markers.
#[derive(Debug, Clone)]
pub struct QuestionParser {
    question_line: Regex,
    answer_line: Regex,
    section_line: Regex,
}

impl QuestionParser {
    /// Build a parser for the given markers.
    pub fn new(markers: &Markers) -> Self {
        let question = regex::escape(markers.question.trim());
        let answer = regex::escape(markers.answer.trim());
        let sections = SECTION_HEADERS
            .iter()
            .map(|h| regex::escape(h))
            .chain(std::iter::once(answer.clone()))
            .collect::<Vec<_>>()
            .join("|");

        Self {
            question_line: Regex::new(&format!(r"^\s*{question}\s+\d+\s*[:.]\s*$"))
                .expect("escaped question marker compiles"),
            answer_line: Regex::new(&format!(r"^\s*{answer}\s*:\s*$"))
                .expect("escaped answer marker compiles"),
            section_line: Regex::new(&format!(r"^\s*(?:{sections})\s*:"))
                .expect("escaped section headers compile"),
        }
    }

    /// Extract question/answer pairs from one block of text, in order.
    pub fn parse_block(&self, text: &str) -> Vec<(String, String)> {
        let lines: Vec<&str> = text.lines().collect();
        let mut pairs = Vec::new();
        let mut i = 0;

        while i < lines.len() {
            if !self.question_line.is_match(lines[i]) {
                i += 1;
                continue;
            }

            let question_start = i + 1;
            let mut j = question_start;
            while j < lines.len()
                && !self.answer_line.is_match(lines[j])
                && !self.question_line.is_match(lines[j])
            {
                j += 1;
            }

            if j >= lines.len() || self.question_line.is_match(lines[j]) {
                tracing::debug!(line = i + 1, "question without answer, skipping");
                i = j;
                continue;
            }

            let question = join_trimmed(&lines[question_start..j]);

            let answer_start = j + 1;
            let mut k = answer_start;
            while k < lines.len()
                && !lines[k].trim().is_empty()
                && !self.section_line.is_match(lines[k])
                && !self.question_line.is_match(lines[k])
            {
                k += 1;
            }

            let answer = join_trimmed(&lines[answer_start..k]);
            pairs.push((question, answer));
            i = k;
        }

        pairs
    }

    /// Parse several blocks into one set, numbering continuously in the
    /// order the blocks are given.
    pub fn parse_blocks<S: AsRef<str>>(&self, blocks: &[S]) -> QuestionSet {
        QuestionSet::from_pairs(
            blocks
                .iter()
                .flat_map(|block| self.parse_block(block.as_ref())),
        )
    }
}

impl Default for QuestionParser {
    fn default() -> Self {
        Self::new(&Markers::default())
    }
}

fn join_trimmed(lines: &[&str]) -> String {
    lines.join("\n").trim().to_string()
}

static DEFAULT_PARSER: Lazy<QuestionParser> = Lazy::new(QuestionParser::default);

/// Parse blocks with the default markers.
pub fn parse_questions<S: AsRef<str>>(blocks: &[S]) -> QuestionSet {
    DEFAULT_PARSER.parse_blocks(blocks)
}

/// A warning from question set validation.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    /// Index of the offending entry.
    pub index: u64,
    /// Warning message.
    pub message: String,
}

/// Validate a question set for entries that would make a poor quiz.
pub fn validate_question_set(set: &QuestionSet) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();
    let mut seen = std::collections::HashMap::new();

    for entry in set {
        if entry.question.is_empty() {
            warnings.push(ValidationWarning {
                index: entry.index,
                message: "question text is empty".into(),
            });
        }
        if entry.answer.is_empty() {
            warnings.push(ValidationWarning {
                index: entry.index,
                message: "answer text is empty".into(),
            });
        }
        if !entry.question.is_empty() {
            if let Some(first) = seen.insert(entry.question.as_str(), entry.index) {
                warnings.push(ValidationWarning {
                    index: entry.index,
                    message: format!("duplicate of question {first}"),
                });
            }
        }
    }

    warnings
}
