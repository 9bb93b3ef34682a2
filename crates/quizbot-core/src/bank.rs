//! Active question set and per-user pinning.
//!
//! A user's counter only means something relative to the set that was
//! active when they started their run. The bank pins each user to that set
//! so a refresh triggered by someone else never shifts their questions.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use anyhow::Result;

use crate::model::{QuestionSet, UserId};
use crate::traits::QuestionSource;

/// Where fresh question sets are drawn from.
#[derive(Debug, Clone)]
pub struct QuestionPool {
    /// Directory of question files.
    pub directory: PathBuf,
    /// How many files make up one quiz.
    pub files_per_quiz: usize,
}

/// Shared, read-mostly registry of question sets.
pub struct QuestionBank {
    source: Arc<dyn QuestionSource>,
    pool: QuestionPool,
    active: RwLock<Arc<QuestionSet>>,
    pins: RwLock<HashMap<UserId, Arc<QuestionSet>>>,
}

impl QuestionBank {
    /// Create a bank with an already-loaded initial set.
    pub fn new(source: Arc<dyn QuestionSource>, pool: QuestionPool, initial: QuestionSet) -> Self {
        Self {
            source,
            pool,
            active: RwLock::new(Arc::new(initial)),
            pins: RwLock::new(HashMap::new()),
        }
    }

    /// Create a bank whose initial set is drawn from the pool.
    pub fn load(source: Arc<dyn QuestionSource>, pool: QuestionPool) -> Result<Self> {
        let initial = draw(source.as_ref(), &pool)?;
        Ok(Self::new(source, pool, initial))
    }

    /// The set new runs start on.
    pub fn active(&self) -> Arc<QuestionSet> {
        Arc::clone(&*self.active.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// The set `user` is playing: their pinned set, or the active one.
    pub fn for_user(&self, user: &UserId) -> Arc<QuestionSet> {
        let pinned = self
            .pins
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(user)
            .cloned();
        pinned.unwrap_or_else(|| self.active())
    }

    /// Pin `user` to the active set and return it.
    pub fn pin_active(&self, user: &UserId) -> Arc<QuestionSet> {
        let active = self.active();
        self.pins
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(*user, Arc::clone(&active));
        active
    }

    /// The set `user` is pinned to, pinning them to the active set first if
    /// they have no pin yet.
    ///
    /// Pins live only in memory while counters may outlive the process, so a
    /// user can be mid-quiz without a pin.
    pub fn pin_if_absent(&self, user: &UserId) -> Arc<QuestionSet> {
        let active = self.active();
        let mut pins = self.pins.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(pins.entry(*user).or_insert(active))
    }

    /// Forget `user`'s pin; their next run starts on the active set.
    pub fn unpin(&self, user: &UserId) {
        self.pins
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(user);
    }

    /// Draw a new set from the pool and make it the active one.
    ///
    /// Sets pinned by other users are untouched.
    pub fn refresh(&self) -> Result<Arc<QuestionSet>> {
        let fresh = Arc::new(draw(self.source.as_ref(), &self.pool)?);
        tracing::info!(questions = fresh.len(), "installed a new question set");
        *self.active.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&fresh);
        Ok(fresh)
    }

    /// Number of users currently pinned to some set.
    pub fn pinned_users(&self) -> usize {
        self.pins
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

fn draw(source: &dyn QuestionSource, pool: &QuestionPool) -> Result<QuestionSet> {
    let files = source.pick_random(&pool.directory, pool.files_per_quiz)?;
    source.load(&files)
}
