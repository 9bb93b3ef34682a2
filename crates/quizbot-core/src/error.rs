//! Session error types.
//!
//! `QuizError::Exhausted` is an expected outcome that callers recover from
//! locally; the other variants are failures an operator should see.

use thiserror::Error;

/// Errors surfaced by session store adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// The key-value service did not respond or returned a transport error.
    #[error("session store unavailable: {0}")]
    Unavailable(String),

    /// A stored value could not be interpreted as a question counter.
    #[error("invalid counter value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

/// Errors returned by session operations.
#[derive(Debug, Error)]
pub enum QuizError {
    /// The user's counter no longer indexes an entry of the active set.
    #[error("question {index} is not in the active question set")]
    Exhausted { index: u64 },

    /// A question set with no entries was supplied.
    #[error("question set is empty")]
    EmptyQuestionSet,

    /// The session store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl QuizError {
    /// Returns `true` if the caller should restart the quiz rather than
    /// report a failure.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, QuizError::Exhausted { .. })
    }

    /// Name of the component responsible for this error, for operator alerts.
    pub fn component(&self) -> &'static str {
        match self {
            QuizError::Exhausted { .. } | QuizError::EmptyQuestionSet => "question bank",
            QuizError::Store(_) => "session store",
        }
    }
}
