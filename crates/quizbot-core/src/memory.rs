//! In-memory session store for tests, local play and single-process bots.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use crate::error::StoreError;
use crate::model::UserId;
use crate::traits::SessionStore;

/// Session store backed by a shared map. Clones share state.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    counters: Arc<Mutex<HashMap<UserId, u64>>>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<UserId, u64>> {
        // A panic while holding the lock cannot leave a counter half-written.
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl SessionStore for InMemoryStore {
    async fn get_counter(&self, user: &UserId) -> Result<u64, StoreError> {
        Ok(self.lock().get(user).copied().unwrap_or(0))
    }

    async fn set_counter(&self, user: &UserId, value: u64) -> Result<(), StoreError> {
        self.lock().insert(*user, value);
        Ok(())
    }

    async fn increment_counter(&self, user: &UserId, delta: u64) -> Result<u64, StoreError> {
        let mut guard = self.lock();
        let counter = guard.entry(*user).or_insert(0);
        *counter = counter.saturating_add(delta);
        Ok(*counter)
    }
}
