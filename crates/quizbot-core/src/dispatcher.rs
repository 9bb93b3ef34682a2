//! Long-poll dispatch loop.
//!
//! Each polled batch is grouped per user. Groups run concurrently, bounded
//! by `parallelism`; events of one user are handled strictly in the order
//! the transport delivered them.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use tracing::Instrument;
use uuid::Uuid;

use crate::bot::QuizBot;
use crate::model::UserId;
use crate::traits::{ChatTransport, InboundEvent};

/// Configuration for the dispatch loop.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Maximum number of users handled concurrently.
    pub parallelism: usize,
    /// Pause after a failed poll before polling again.
    pub poll_error_backoff: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            parallelism: 8,
            poll_error_backoff: Duration::from_secs(5),
        }
    }
}

/// Counters for one dispatched batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub events: usize,
    pub replies: usize,
    pub send_failures: usize,
}

impl BatchStats {
    fn merge(&mut self, other: BatchStats) {
        self.events += other.events;
        self.replies += other.replies;
        self.send_failures += other.send_failures;
    }
}

/// Drives a [`QuizBot`] from a [`ChatTransport`].
pub struct Dispatcher {
    bot: Arc<QuizBot>,
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn new(bot: Arc<QuizBot>, config: DispatcherConfig) -> Self {
        Self { bot, config }
    }

    /// Poll `transport` until `shutdown` resolves.
    pub async fn run<F>(&self, transport: &dyn ChatTransport, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        tracing::info!(
            transport = transport.name(),
            parallelism = self.config.parallelism,
            "dispatcher started"
        );

        loop {
            let polled = tokio::select! {
                () = &mut shutdown => break,
                polled = transport.poll() => polled,
            };

            match polled {
                Ok(events) if events.is_empty() => continue,
                Ok(events) => {
                    let stats = self.dispatch_batch(transport, events).await;
                    tracing::debug!(?stats, "batch dispatched");
                }
                Err(e) => {
                    tracing::warn!(
                        transport = transport.name(),
                        "poll failed: {e:#}; retrying in {:?}",
                        self.config.poll_error_backoff
                    );
                    tokio::select! {
                        () = &mut shutdown => break,
                        () = tokio::time::sleep(self.config.poll_error_backoff) => {}
                    }
                }
            }
        }

        tracing::info!(transport = transport.name(), "dispatcher stopped");
        Ok(())
    }

    /// Handle one batch of events and deliver the replies.
    pub async fn dispatch_batch(
        &self,
        transport: &dyn ChatTransport,
        events: Vec<InboundEvent>,
    ) -> BatchStats {
        let semaphore = Arc::new(Semaphore::new(self.config.parallelism.max(1)));
        let mut futures = FuturesUnordered::new();

        for (user, events) in group_by_user(events) {
            let semaphore = Arc::clone(&semaphore);
            futures.push(async move {
                let mut stats = BatchStats::default();
                let Ok(_permit) = semaphore.acquire().await else {
                    tracing::error!(%user, "semaphore closed, dropping events");
                    return stats;
                };
                for event in events {
                    let span = tracing::info_span!("event", id = %Uuid::new_v4(), user = %user);
                    stats.merge(self.handle_one(transport, &event).instrument(span).await);
                }
                stats
            });
        }

        let mut total = BatchStats::default();
        while let Some(stats) = futures.next().await {
            total.merge(stats);
        }
        total
    }

    async fn handle_one(&self, transport: &dyn ChatTransport, event: &InboundEvent) -> BatchStats {
        let mut stats = BatchStats {
            events: 1,
            ..BatchStats::default()
        };

        let Some(reply) = self.bot.handle(event).await else {
            return stats;
        };
        stats.replies = 1;

        if let Err(e) = transport.send(&reply).await {
            tracing::warn!(transport = transport.name(), "failed to send reply: {e:#}");
            stats.send_failures = 1;
        }
        stats
    }
}

/// Split a batch into per-user queues, keeping delivery order within each
/// queue and first-appearance order across queues.
fn group_by_user(events: Vec<InboundEvent>) -> Vec<(UserId, Vec<InboundEvent>)> {
    let mut positions: HashMap<UserId, usize> = HashMap::new();
    let mut groups: Vec<(UserId, Vec<InboundEvent>)> = Vec::new();

    for event in events {
        let slot = *positions.entry(event.user).or_insert_with(|| {
            groups.push((event.user, Vec::new()));
            groups.len() - 1
        });
        groups[slot].1.push(event);
    }
    groups
}
