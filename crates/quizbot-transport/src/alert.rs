//! Operator alerts delivered through a Telegram chat.

use async_trait::async_trait;
use chrono::Utc;

use quizbot_core::traits::Alerter;

use crate::error::TransportError;
use crate::telegram::TelegramApi;

const ALERT_TIMEOUT_SECS: u64 = 15;

/// Sends `[timestamp] component: message` to the developer chat.
pub struct TelegramAlerter {
    api: TelegramApi,
    chat_id: i64,
}

impl TelegramAlerter {
    pub fn new(
        token: &str,
        chat_id: i64,
        base_url: Option<String>,
    ) -> Result<Self, TransportError> {
        Ok(Self {
            api: TelegramApi::new(token, base_url, ALERT_TIMEOUT_SECS)?,
            chat_id,
        })
    }
}

/// Render one alert line.
pub fn format_alert(component: &str, message: &str) -> String {
    format!(
        "[{}] {component}: {message}",
        Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    )
}

#[async_trait]
impl Alerter for TelegramAlerter {
    async fn alert(&self, component: &str, message: &str) -> anyhow::Result<()> {
        self.api
            .send_text(self.chat_id, &format_alert(component, message), None)
            .await?;
        Ok(())
    }
}
