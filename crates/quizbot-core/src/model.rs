//! Core data model types for quizbot.
//!
//! Question sets are immutable once built; a refresh produces a new
//! `QuestionSet` value instead of mutating an existing one.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The chat platform a user talks to the bot through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Telegram,
    Vk,
    Console,
}

impl Platform {
    fn prefix(self) -> &'static str {
        match self {
            Platform::Telegram => "tg",
            Platform::Vk => "vk",
            Platform::Console => "console",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Telegram => write!(f, "telegram"),
            Platform::Vk => write!(f, "vk"),
            Platform::Console => write!(f, "console"),
        }
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "telegram" | "tg" => Ok(Platform::Telegram),
            "vk" => Ok(Platform::Vk),
            "console" => Ok(Platform::Console),
            other => Err(format!("unknown platform: {other}")),
        }
    }
}

/// Identifies one quiz participant across requests.
///
/// Ids are namespaced by platform so Telegram and VK users sharing one
/// store never collide.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct UserId {
    platform: Platform,
    id: i64,
}

impl UserId {
    #[must_use]
    pub const fn new(platform: Platform, id: i64) -> Self {
        Self { platform, id }
    }

    #[must_use]
    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// The platform-native id (Telegram chat id, VK peer id).
    #[must_use]
    pub fn id(&self) -> i64 {
        self.id
    }
}

impl fmt::Debug for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserId({self})")
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.platform.prefix(), self.id)
    }
}

impl FromStr for UserId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (platform, id) = s
            .split_once(':')
            .ok_or_else(|| format!("invalid user id: '{s}'"))?;
        let id = id
            .parse::<i64>()
            .map_err(|_| format!("invalid user id: '{s}'"))?;
        Ok(Self::new(platform.parse()?, id))
    }
}

/// A single trivia question with its canonical answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionEntry {
    /// 1-based position within its question set.
    pub index: u64,
    /// Question text, trimmed.
    pub question: String,
    /// Canonical answer text, trimmed but not normalized.
    pub answer: String,
}

/// An ordered, densely 1-indexed collection of questions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuestionSet {
    entries: Vec<QuestionEntry>,
}

impl QuestionSet {
    /// Build a set from question/answer pairs, numbering them from 1.
    pub fn from_pairs<I, Q, A>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (Q, A)>,
        Q: Into<String>,
        A: Into<String>,
    {
        let entries = pairs
            .into_iter()
            .zip(1u64..)
            .map(|((question, answer), index)| QuestionEntry {
                index,
                question: question.into(),
                answer: answer.into(),
            })
            .collect();
        Self { entries }
    }

    /// Number of questions; also the last valid index.
    pub fn len(&self) -> u64 {
        self.entries.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up the entry at a 1-based index.
    pub fn get(&self, index: u64) -> Option<&QuestionEntry> {
        let position = usize::try_from(index.checked_sub(1)?).ok()?;
        self.entries.get(position)
    }

    pub fn iter(&self) -> impl Iterator<Item = &QuestionEntry> {
        self.entries.iter()
    }
}

impl<'a> IntoIterator for &'a QuestionSet {
    type Item = &'a QuestionEntry;
    type IntoIter = std::slice::Iter<'a, QuestionEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
