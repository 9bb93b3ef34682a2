//! Collaborator contracts consumed by the quiz core.
//!
//! Session stores live in `quizbot-store` (plus the in-memory store in this
//! crate), chat transports and alerters in `quizbot-transport`, and the
//! file-backed question source in [`crate::source`].

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::StoreError;
use crate::model::{QuestionSet, UserId};

// ---------------------------------------------------------------------------
// Session store
// ---------------------------------------------------------------------------

/// Per-user question counter storage.
///
/// `increment_counter` must be a single atomic operation against the backing
/// store so duplicate deliveries for one user cannot lose updates.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Current counter for `user`; 0 if the user has no record.
    async fn get_counter(&self, user: &UserId) -> Result<u64, StoreError>;

    /// Overwrite the counter for `user`.
    async fn set_counter(&self, user: &UserId, value: u64) -> Result<(), StoreError>;

    /// Atomically add `delta` and return the post-increment value.
    async fn increment_counter(&self, user: &UserId, delta: u64) -> Result<u64, StoreError>;
}

// ---------------------------------------------------------------------------
// Question source
// ---------------------------------------------------------------------------

/// Provider of question sets. Owns file I/O and text decoding.
pub trait QuestionSource: Send + Sync {
    /// Build one question set from the given locations, numbering entries
    /// continuously in the order the locations are supplied.
    fn load(&self, paths: &[PathBuf]) -> anyhow::Result<QuestionSet>;

    /// Choose up to `count` question files at random from `directory`.
    fn pick_random(&self, directory: &Path, count: usize) -> anyhow::Result<Vec<PathBuf>>;
}

// ---------------------------------------------------------------------------
// Chat transport
// ---------------------------------------------------------------------------

/// What the user asked the bot to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Start,
    NewQuestion,
    GiveUp,
    Cancel,
    Guess,
}

/// Label of the menu button that requests a new question.
pub const NEW_QUESTION_LABEL: &str = "Новый вопрос";
/// Label of the menu button that reveals the answer.
pub const GIVE_UP_LABEL: &str = "Сдаться";

impl ActionKind {
    /// Classify free text as typed or tapped by the user.
    pub fn classify(text: &str) -> Self {
        let text = text.trim();
        let command = text.split('@').next().unwrap_or(text);
        match command {
            "/start" => ActionKind::Start,
            "/cancel" => ActionKind::Cancel,
            NEW_QUESTION_LABEL => ActionKind::NewQuestion,
            GIVE_UP_LABEL => ActionKind::GiveUp,
            _ => ActionKind::Guess,
        }
    }
}

/// A normalized inbound chat event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub user: UserId,
    /// Name to greet the user by, when the platform provides one.
    pub display_name: Option<String>,
    pub text: String,
    pub action: ActionKind,
}

impl InboundEvent {
    /// Build an event, classifying the action from `text`.
    pub fn new(user: UserId, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            user,
            display_name: None,
            action: ActionKind::classify(&text),
            text,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

/// Whether the adapter should show or hide the quiz menu with a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuHint {
    Show,
    Hide,
}

/// A reply for the transport to render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub user: UserId,
    pub text: String,
    pub menu: MenuHint,
}

/// Trait for chat platforms that deliver user events and render replies.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Human-readable transport name (e.g. "telegram").
    fn name(&self) -> &str;

    /// Wait for the next batch of inbound events. May return an empty batch
    /// when a long poll times out.
    async fn poll(&self) -> anyhow::Result<Vec<InboundEvent>>;

    /// Deliver one reply.
    async fn send(&self, message: &OutboundMessage) -> anyhow::Result<()>;
}

// ---------------------------------------------------------------------------
// Operator alerts
// ---------------------------------------------------------------------------

/// Channel for reporting failures to an operator.
#[async_trait]
pub trait Alerter: Send + Sync {
    async fn alert(&self, component: &str, message: &str) -> anyhow::Result<()>;
}

/// Alerter that only writes to the log.
pub struct LogAlerter;

#[async_trait]
impl Alerter for LogAlerter {
    async fn alert(&self, component: &str, message: &str) -> anyhow::Result<()> {
        tracing::error!(component, "{message}");
        Ok(())
    }
}
