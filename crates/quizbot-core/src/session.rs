//! Per-user quiz session state machine.
//!
//! A user is `Fresh` while their counter is 0 and `InProgress` once a
//! question has been served. The counter always names the most recently
//! served question of the set the caller passes in.

use std::sync::Arc;

use tracing::instrument;

use crate::error::QuizError;
use crate::model::{QuestionEntry, QuestionSet, UserId};
use crate::normalize::answers_match;
use crate::traits::SessionStore;

/// Where a user is in their quiz.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No question has been served since the last reset.
    Fresh,
    /// The question at this index is pending an answer.
    InProgress(u64),
}

/// Advances, reads and checks per-user progress through a question set.
#[derive(Clone)]
pub struct SessionController {
    store: Arc<dyn SessionStore>,
}

impl SessionController {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    /// Reset the user's counter to 0 unconditionally.
    #[instrument(skip_all, fields(user = %user))]
    pub async fn start(&self, user: &UserId) -> Result<(), QuizError> {
        self.store.set_counter(user, 0).await?;
        Ok(())
    }

    /// Read the user's state without changing it.
    pub async fn state(&self, user: &UserId) -> Result<SessionState, QuizError> {
        Ok(match self.store.get_counter(user).await? {
            0 => SessionState::Fresh,
            index => SessionState::InProgress(index),
        })
    }

    /// Move the user to the next question and return its index.
    ///
    /// A counter already at or past the end of `set` wraps to 1 in a single
    /// write. The returned index is always within `1..=set.len()`.
    #[instrument(skip_all, fields(user = %user, size = set.len()))]
    pub async fn advance(&self, user: &UserId, set: &QuestionSet) -> Result<u64, QuizError> {
        if set.is_empty() {
            return Err(QuizError::EmptyQuestionSet);
        }

        let current = self.store.get_counter(user).await?;
        if current >= set.len() {
            return self.wrap(user).await;
        }

        let next = self.store.increment_counter(user, 1).await?;
        if next > set.len() {
            // A concurrent advance for the same user got there first.
            return self.wrap(user).await;
        }
        Ok(next)
    }

    async fn wrap(&self, user: &UserId) -> Result<u64, QuizError> {
        tracing::debug!("question set finished, wrapping to the first question");
        self.store.set_counter(user, 1).await?;
        Ok(1)
    }

    /// Text of the question the user's counter points at.
    pub async fn current_question<'a>(
        &self,
        user: &UserId,
        set: &'a QuestionSet,
    ) -> Result<&'a str, QuizError> {
        Ok(&self.current_entry(user, set).await?.question)
    }

    /// Canonical (un-normalized) answer to the user's current question.
    pub async fn current_answer<'a>(
        &self,
        user: &UserId,
        set: &'a QuestionSet,
    ) -> Result<&'a str, QuizError> {
        Ok(&self.current_entry(user, set).await?.answer)
    }

    /// Answer to reveal when the user gives up. The counter is left as is,
    /// so the next "new question" request moves on.
    pub async fn reveal<'a>(
        &self,
        user: &UserId,
        set: &'a QuestionSet,
    ) -> Result<&'a str, QuizError> {
        self.current_answer(user, set).await
    }

    /// Compare a free-text guess with the current answer, ignoring case, a
    /// trailing parenthetical note and a final period.
    ///
    /// An exhausted counter is reported as `QuizError::Exhausted`, never as a
    /// mismatch.
    #[instrument(skip_all, fields(user = %user))]
    pub async fn check_answer(
        &self,
        user: &UserId,
        set: &QuestionSet,
        candidate: &str,
    ) -> Result<bool, QuizError> {
        let answer = self.current_answer(user, set).await?;
        Ok(answers_match(answer, candidate))
    }

    async fn current_entry<'a>(
        &self,
        user: &UserId,
        set: &'a QuestionSet,
    ) -> Result<&'a QuestionEntry, QuizError> {
        if set.is_empty() {
            return Err(QuizError::EmptyQuestionSet);
        }
        let index = self.store.get_counter(user).await?;
        set.get(index).ok_or(QuizError::Exhausted { index })
    }
}
