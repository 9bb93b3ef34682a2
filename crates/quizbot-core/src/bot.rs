//! Transport-independent request handling.
//!
//! `QuizBot` is the request-scoped context every inbound event is handled
//! with: it owns the session controller, the question bank and the operator
//! alert channel. Users never see raw error text; failures degrade to a
//! prompt to start a new quiz.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::instrument;

use crate::bank::QuestionBank;
use crate::error::QuizError;
use crate::session::{SessionController, SessionState};
use crate::traits::{ActionKind, Alerter, InboundEvent, MenuHint, OutboundMessage, NEW_QUESTION_LABEL};
use crate::UserId;

/// Texts sent back to users.
#[derive(Debug, Clone)]
pub struct Replies {
    pub greeting: String,
    pub correct: String,
    pub incorrect: String,
    pub give_up: String,
    pub no_question_yet: String,
    pub exhausted: String,
    pub goodbye: String,
    pub failure: String,
}

impl Default for Replies {
    fn default() -> Self {
        Self {
            greeting: "Привет{name}! Я бот для викторины!".into(),
            correct: format!(
                "Правильно! Поздравляю! Для следующего вопроса нажми \"{NEW_QUESTION_LABEL}\""
            ),
            incorrect: "Неверно, попробуй ещё!".into(),
            give_up: format!(
                "Вот тебе правильный ответ: {{answer}}\nЧтобы продолжить нажми \"{NEW_QUESTION_LABEL}\""
            ),
            no_question_yet: format!("Чтобы получить вопрос, нажми \"{NEW_QUESTION_LABEL}\""),
            exhausted: format!(
                "Вопросы данной викторины закончились! Чтобы начать новую нажми \"{NEW_QUESTION_LABEL}\""
            ),
            goodbye: "Пока! Надеюсь, мы ещё сыграем с тобой в викторину!".into(),
            failure: format!(
                "Что-то пошло не так. Чтобы начать новую викторину, нажми \"{NEW_QUESTION_LABEL}\""
            ),
        }
    }
}

/// Handles one inbound event at a time for any number of users.
pub struct QuizBot {
    sessions: SessionController,
    bank: Arc<QuestionBank>,
    alerter: Arc<dyn Alerter>,
    replies: Replies,
    ended: Mutex<HashSet<UserId>>,
}

impl QuizBot {
    pub fn new(
        sessions: SessionController,
        bank: Arc<QuestionBank>,
        alerter: Arc<dyn Alerter>,
    ) -> Self {
        Self {
            sessions,
            bank,
            alerter,
            replies: Replies::default(),
            ended: Mutex::new(HashSet::new()),
        }
    }

    #[must_use]
    pub fn with_replies(mut self, replies: Replies) -> Self {
        self.replies = replies;
        self
    }

    /// Handle one event and produce the reply to render, if any.
    ///
    /// Returns `None` for events from users who cancelled the quiz and have
    /// not restarted it.
    #[instrument(skip_all, fields(user = %event.user, action = ?event.action))]
    pub async fn handle(&self, event: &InboundEvent) -> Option<OutboundMessage> {
        if event.action != ActionKind::Start && self.is_ended(&event.user) {
            tracing::debug!("ignoring event from a user who ended the quiz");
            return None;
        }

        let result = match event.action {
            ActionKind::Start => self.start(event).await,
            ActionKind::NewQuestion => self.new_question(event).await,
            ActionKind::GiveUp => self.give_up(event).await,
            ActionKind::Guess => self.guess(event).await,
            ActionKind::Cancel => Ok(self.cancel(event)),
        };

        let text = match result {
            Ok(text) => text,
            Err(QuizError::Exhausted { index }) => self.recover_exhausted(&event.user, index).await,
            Err(err) => {
                self.report(err.component(), &err.to_string()).await;
                self.replies.failure.clone()
            }
        };

        let menu = if event.action == ActionKind::Cancel {
            MenuHint::Hide
        } else {
            MenuHint::Show
        };

        Some(OutboundMessage {
            user: event.user,
            text,
            menu,
        })
    }

    async fn start(&self, event: &InboundEvent) -> Result<String, QuizError> {
        self.ended
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&event.user);
        self.sessions.start(&event.user).await?;
        self.bank.unpin(&event.user);

        let name = event
            .display_name
            .as_deref()
            .map(|n| format!(" {n}"))
            .unwrap_or_default();
        Ok(self.replies.greeting.replace("{name}", &name))
    }

    async fn new_question(&self, event: &InboundEvent) -> Result<String, QuizError> {
        let user = &event.user;
        let set = match self.sessions.state(user).await? {
            SessionState::Fresh => self.bank.pin_active(user),
            SessionState::InProgress(_) => self.bank.pin_if_absent(user),
        };

        let index = self.sessions.advance(user, &set).await?;
        tracing::info!(index, "serving question");
        Ok(self.sessions.current_question(user, &set).await?.to_string())
    }

    async fn give_up(&self, event: &InboundEvent) -> Result<String, QuizError> {
        let user = &event.user;
        if self.sessions.state(user).await? == SessionState::Fresh {
            return Ok(self.replies.no_question_yet.clone());
        }

        let set = self.bank.pin_if_absent(user);
        let answer = self.sessions.reveal(user, &set).await?;
        Ok(self.replies.give_up.replace("{answer}", answer))
    }

    async fn guess(&self, event: &InboundEvent) -> Result<String, QuizError> {
        let user = &event.user;
        if self.sessions.state(user).await? == SessionState::Fresh {
            return Ok(self.replies.no_question_yet.clone());
        }

        let set = self.bank.pin_if_absent(user);
        if self.sessions.check_answer(user, &set, &event.text).await? {
            tracing::info!("correct answer");
            Ok(self.replies.correct.clone())
        } else {
            Ok(self.replies.incorrect.clone())
        }
    }

    fn cancel(&self, event: &InboundEvent) -> String {
        tracing::info!("user ended the quiz");
        self.ended
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(event.user);
        self.bank.unpin(&event.user);
        self.replies.goodbye.clone()
    }

    /// Start the user over on a freshly drawn question set.
    async fn recover_exhausted(&self, user: &UserId, index: u64) -> String {
        tracing::info!(index, "question set exhausted, starting a new quiz");

        if let Err(err) = self.bank.refresh() {
            self.report("question source", &format!("{err:#}")).await;
        }
        self.bank.unpin(user);

        if let Err(err) = self.sessions.start(user).await {
            self.report(err.component(), &err.to_string()).await;
            return self.replies.failure.clone();
        }
        self.replies.exhausted.clone()
    }

    async fn report(&self, component: &str, message: &str) {
        tracing::error!(component, "{message}");
        if let Err(err) = self.alerter.alert(component, message).await {
            tracing::warn!("failed to alert operator: {err:#}");
        }
    }

    fn is_ended(&self, user: &UserId) -> bool {
        self.ended
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(user)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use async_trait::async_trait;

    use super::*;
    use crate::bank::testing::{pool, ScriptedSource};
    use crate::error::StoreError;
    use crate::memory::InMemoryStore;
    use crate::model::{Platform, QuestionSet};
    use crate::traits::{SessionStore, GIVE_UP_LABEL};

    #[derive(Default)]
    struct RecordingAlerter {
        alerts: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl Alerter for RecordingAlerter {
        async fn alert(&self, component: &str, message: &str) -> anyhow::Result<()> {
            self.alerts
                .lock()
                .unwrap()
                .push((component.to_string(), message.to_string()));
            Ok(())
        }
    }

    struct Harness {
        bot: QuizBot,
        store: InMemoryStore,
        source: Arc<ScriptedSource>,
        alerter: Arc<RecordingAlerter>,
    }

    fn quiz(tag: &str, n: usize) -> QuestionSet {
        QuestionSet::from_pairs((1..=n).map(|i| (format!("{tag} {i}?"), format!("{tag}{i} (note)."))))
    }

    fn harness(sets: Vec<QuestionSet>) -> Harness {
        let store = InMemoryStore::new();
        let source = Arc::new(ScriptedSource::new(sets));
        let bank = Arc::new(QuestionBank::load(source.clone(), pool()).unwrap());
        let alerter = Arc::new(RecordingAlerter::default());
        let bot = QuizBot::new(
            SessionController::new(Arc::new(store.clone())),
            bank,
            alerter.clone(),
        );
        Harness {
            bot,
            store,
            source,
            alerter,
        }
    }

    fn user() -> UserId {
        UserId::new(Platform::Telegram, 1)
    }

    async fn say(bot: &QuizBot, text: &str) -> String {
        bot.handle(&InboundEvent::new(user(), text))
            .await
            .expect("reply")
            .text
    }

    #[tokio::test]
    async fn start_greets_by_name_and_resets() {
        let h = harness(vec![quiz("q", 3)]);
        h.store.set_counter(&user(), 2).await.unwrap();

        let reply = h
            .bot
            .handle(&InboundEvent::new(user(), "/start").with_display_name("Аня"))
            .await
            .unwrap();

        assert_eq!(reply.text, "Привет Аня! Я бот для викторины!");
        assert_eq!(reply.menu, MenuHint::Show);
        assert_eq!(h.store.get_counter(&user()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn question_guess_and_give_up_flow() {
        let h = harness(vec![quiz("q", 3)]);
        say(&h.bot, "/start").await;

        assert_eq!(say(&h.bot, "Новый вопрос").await, "q 1?");
        assert_eq!(say(&h.bot, "wrong").await, "Неверно, попробуй ещё!");
        assert!(say(&h.bot, "Q1").await.starts_with("Правильно"));

        assert_eq!(say(&h.bot, "Новый вопрос").await, "q 2?");
        let reveal = say(&h.bot, GIVE_UP_LABEL).await;
        assert!(reveal.contains("q2 (note)."));

        // Giving up keeps the counter; the next request moves on.
        assert_eq!(h.store.get_counter(&user()).await.unwrap(), 2);
        assert_eq!(say(&h.bot, "Новый вопрос").await, "q 3?");
        assert_eq!(say(&h.bot, "Новый вопрос").await, "q 1?");
    }

    #[tokio::test]
    async fn fresh_user_is_prompted_for_a_question() {
        let h = harness(vec![quiz("q", 3)]);
        say(&h.bot, "/start").await;
        assert!(say(&h.bot, "Париж").await.contains("Новый вопрос"));
        assert!(say(&h.bot, GIVE_UP_LABEL).await.contains("Новый вопрос"));
        assert_eq!(h.source.draws.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhaustion_refreshes_and_restarts() {
        let h = harness(vec![quiz("old", 3), quiz("new", 2)]);
        // Counter left over from a previous run against a bigger set.
        h.store.set_counter(&user(), 7).await.unwrap();

        let reply = say(&h.bot, "some guess").await;
        assert!(reply.contains("закончились"));
        assert_eq!(h.store.get_counter(&user()).await.unwrap(), 0);
        assert_eq!(h.source.draws.load(Ordering::SeqCst), 2);
        assert!(h.alerter.alerts.lock().unwrap().is_empty());

        assert_eq!(say(&h.bot, "Новый вопрос").await, "new 1?");
    }

    #[tokio::test]
    async fn pinned_user_is_unaffected_by_another_users_refresh() {
        let h = harness(vec![quiz("old", 3), quiz("new", 1)]);
        let alice = user();
        let bob = UserId::new(Platform::Vk, 2);

        say(&h.bot, "/start").await;
        assert_eq!(say(&h.bot, "Новый вопрос").await, "old 1?");

        h.store.set_counter(&bob, 9).await.unwrap();
        let reply = h.bot.handle(&InboundEvent::new(bob, "x")).await.unwrap();
        assert!(reply.text.contains("закончились"));

        assert_eq!(say(&h.bot, "Новый вопрос").await, "old 2?");
        let bob_q = h
            .bot
            .handle(&InboundEvent::new(bob, "Новый вопрос"))
            .await
            .unwrap();
        assert_eq!(bob_q.text, "new 1?");
        assert_eq!(h.store.get_counter(&alice).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn mid_quiz_user_without_pin_keeps_their_set_across_refresh() {
        let h = harness(vec![quiz("old", 3), quiz("new", 3)]);
        let alice = user();
        let bob = UserId::new(Platform::Vk, 2);

        // Counters survive a restart; pins do not.
        h.store.set_counter(&alice, 1).await.unwrap();
        assert_eq!(say(&h.bot, "Новый вопрос").await, "old 2?");

        h.store.set_counter(&bob, 9).await.unwrap();
        let reply = h.bot.handle(&InboundEvent::new(bob, "x")).await.unwrap();
        assert!(reply.text.contains("закончились"));
        assert_eq!(h.source.draws.load(Ordering::SeqCst), 2);

        assert!(say(&h.bot, "old2").await.starts_with("Правильно"));
        assert!(say(&h.bot, GIVE_UP_LABEL).await.contains("old2 (note)."));
    }

    #[tokio::test]
    async fn cancel_hides_menu_and_ignores_until_restart() {
        let h = harness(vec![quiz("q", 3)]);
        say(&h.bot, "/start").await;

        let bye = h
            .bot
            .handle(&InboundEvent::new(user(), "/cancel"))
            .await
            .unwrap();
        assert_eq!(bye.menu, MenuHint::Hide);
        assert!(h
            .bot
            .handle(&InboundEvent::new(user(), "Новый вопрос"))
            .await
            .is_none());

        say(&h.bot, "/start").await;
        assert_eq!(say(&h.bot, "Новый вопрос").await, "q 1?");
    }

    struct DownStore;

    #[async_trait]
    impl SessionStore for DownStore {
        async fn get_counter(&self, _: &UserId) -> Result<u64, StoreError> {
            Err(StoreError::Unavailable("timed out".into()))
        }
        async fn set_counter(&self, _: &UserId, _: u64) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("timed out".into()))
        }
        async fn increment_counter(&self, _: &UserId, _: u64) -> Result<u64, StoreError> {
            Err(StoreError::Unavailable("timed out".into()))
        }
    }

    #[tokio::test]
    async fn store_failure_alerts_operator_and_hides_raw_error() {
        let source = Arc::new(ScriptedSource::new(vec![quiz("q", 3)]));
        let bank = Arc::new(QuestionBank::load(source, pool()).unwrap());
        let alerter = Arc::new(RecordingAlerter::default());
        let bot = QuizBot::new(
            SessionController::new(Arc::new(DownStore)),
            bank,
            alerter.clone(),
        );

        let reply = say(&bot, "Новый вопрос").await;
        assert!(reply.starts_with("Что-то пошло не так"));
        assert!(!reply.contains("timed out"));

        let alerts = alerter.alerts.lock().unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].0, "session store");
        assert!(alerts[0].1.contains("timed out"));
    }

    #[tokio::test]
    async fn empty_question_set_is_reported_distinctly() {
        let h = harness(vec![QuestionSet::default()]);
        let reply = say(&h.bot, "Новый вопрос").await;
        assert!(reply.starts_with("Что-то пошло не так"));
        let alerts = h.alerter.alerts.lock().unwrap();
        assert_eq!(alerts[0].0, "question bank");
        assert!(alerts[0].1.contains("empty"));
    }
}
