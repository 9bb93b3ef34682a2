//! Scripted transport for tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::Notify;

use quizbot_core::traits::{ChatTransport, InboundEvent, OutboundMessage};
use quizbot_core::UserId;

/// A transport that replays pre-built batches and records every reply.
///
/// Once the script is exhausted `poll` never returns again and
/// [`MockTransport::drained`] resolves, which makes a convenient shutdown
/// signal for a dispatcher under test.
#[derive(Default)]
pub struct MockTransport {
    batches: Mutex<VecDeque<Vec<InboundEvent>>>,
    sent: Mutex<Vec<OutboundMessage>>,
    drained: Notify,
}

impl MockTransport {
    pub fn new(batches: Vec<Vec<InboundEvent>>) -> Self {
        Self {
            batches: Mutex::new(batches.into()),
            ..Self::default()
        }
    }

    /// Queue one more batch.
    pub fn push_batch(&self, batch: Vec<InboundEvent>) {
        self.batches.lock().unwrap().push_back(batch);
    }

    /// Every message sent so far.
    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().unwrap().clone()
    }

    /// Texts sent to one user, in order.
    pub fn sent_to(&self, user: UserId) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.user == user)
            .map(|m| m.text.clone())
            .collect()
    }

    /// Resolves once every scripted batch has been handed out.
    pub async fn drained(&self) {
        self.drained.notified().await;
    }
}

#[async_trait]
impl ChatTransport for MockTransport {
    fn name(&self) -> &str {
        "mock"
    }

    async fn poll(&self) -> anyhow::Result<Vec<InboundEvent>> {
        let next = self.batches.lock().unwrap().pop_front();
        match next {
            Some(batch) => Ok(batch),
            None => {
                self.drained.notify_one();
                std::future::pending::<()>().await;
                Ok(Vec::new())
            }
        }
    }

    async fn send(&self, message: &OutboundMessage) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}
