//! Telegram Bot API transport.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::instrument;

use quizbot_core::traits::{
    ChatTransport, InboundEvent, MenuHint, OutboundMessage, GIVE_UP_LABEL, NEW_QUESTION_LABEL,
};
use quizbot_core::{Platform, UserId};

use crate::error::{http_client, TransportError};

pub const DEFAULT_BASE_URL: &str = "https://api.telegram.org";
const DEFAULT_POLL_TIMEOUT_SECS: u64 = 25;
/// Headroom on top of the long-poll timeout for the HTTP request itself.
const REQUEST_SLACK_SECS: u64 = 10;

/// Thin client for Bot API method calls.
pub struct TelegramApi {
    token: String,
    base_url: String,
    client: reqwest::Client,
    timeout_secs: u64,
}

#[derive(Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error_code: Option<i64>,
}

impl TelegramApi {
    pub fn new(
        token: &str,
        base_url: Option<String>,
        timeout_secs: u64,
    ) -> Result<Self, TransportError> {
        Ok(Self {
            token: token.to_string(),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            client: http_client(timeout_secs)?,
            timeout_secs,
        })
    }

    /// Call `method` with a JSON body and decode its `result`.
    pub async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &Value,
    ) -> Result<T, TransportError> {
        let response = self
            .client
            .post(format!("{}/bot{}/{method}", self.base_url, self.token))
            .json(body)
            .send()
            .await
            .map_err(|e| TransportError::from_request(e, self.timeout_secs))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| TransportError::from_request(e, self.timeout_secs))?;
        let parsed: ApiResponse<T> = serde_json::from_str(&text).map_err(|e| {
            if status >= 400 {
                TransportError::Api {
                    status: i64::from(status),
                    message: text.clone(),
                }
            } else {
                TransportError::Decode(e.to_string())
            }
        })?;

        if !parsed.ok || status >= 400 {
            let code = parsed.error_code.unwrap_or(i64::from(status));
            let message = parsed.description.unwrap_or_default();
            if code == 401 {
                return Err(TransportError::Unauthorized(message));
            }
            return Err(TransportError::Api {
                status: code,
                message,
            });
        }

        parsed
            .result
            .ok_or_else(|| TransportError::Decode(format!("{method}: missing result")))
    }

    /// Send a plain text message to `chat_id`.
    pub async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        reply_markup: Option<Value>,
    ) -> Result<(), TransportError> {
        let mut body = json!({ "chat_id": chat_id, "text": text });
        if let Some(markup) = reply_markup {
            body["reply_markup"] = markup;
        }
        let _: Value = self.call("sendMessage", &body).await?;
        Ok(())
    }
}

#[derive(Deserialize)]
struct Update {
    update_id: i64,
    #[serde(default)]
    message: Option<Message>,
}

#[derive(Deserialize)]
struct Message {
    chat: Chat,
    #[serde(default)]
    from: Option<Sender>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct Chat {
    id: i64,
}

#[derive(Deserialize)]
struct Sender {
    first_name: String,
}

/// Telegram transport using `getUpdates` long polling.
pub struct TelegramTransport {
    api: TelegramApi,
    poll_timeout_secs: u64,
    offset: AtomicI64,
}

impl TelegramTransport {
    pub fn new(token: &str, base_url: Option<String>) -> Result<Self, TransportError> {
        Self::with_poll_timeout(token, base_url, DEFAULT_POLL_TIMEOUT_SECS)
    }

    pub fn with_poll_timeout(
        token: &str,
        base_url: Option<String>,
        poll_timeout_secs: u64,
    ) -> Result<Self, TransportError> {
        Ok(Self {
            api: TelegramApi::new(token, base_url, poll_timeout_secs + REQUEST_SLACK_SECS)?,
            poll_timeout_secs,
            offset: AtomicI64::new(0),
        })
    }

    /// Offset the next `getUpdates` call will acknowledge from.
    pub fn offset(&self) -> i64 {
        self.offset.load(Ordering::SeqCst)
    }
}

fn quiz_keyboard(menu: MenuHint) -> Value {
    match menu {
        MenuHint::Show => json!({
            "keyboard": [[{ "text": NEW_QUESTION_LABEL }, { "text": GIVE_UP_LABEL }]],
            "resize_keyboard": true,
        }),
        MenuHint::Hide => json!({ "remove_keyboard": true }),
    }
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    fn name(&self) -> &str {
        "telegram"
    }

    #[instrument(skip(self), fields(offset = self.offset()))]
    async fn poll(&self) -> anyhow::Result<Vec<InboundEvent>> {
        let body = json!({
            "offset": self.offset(),
            "timeout": self.poll_timeout_secs,
            "allowed_updates": ["message"],
        });
        let updates: Vec<Update> = self.api.call("getUpdates", &body).await?;

        if let Some(last) = updates.iter().map(|u| u.update_id).max() {
            self.offset.store(last + 1, Ordering::SeqCst);
        }

        let events = updates
            .into_iter()
            .filter_map(|update| {
                let message = update.message?;
                let text = message.text?;
                let event = InboundEvent::new(UserId::new(Platform::Telegram, message.chat.id), text);
                Some(match message.from {
                    Some(sender) => event.with_display_name(sender.first_name),
                    None => event,
                })
            })
            .collect::<Vec<_>>();

        if !events.is_empty() {
            tracing::debug!(count = events.len(), "received updates");
        }
        Ok(events)
    }

    async fn send(&self, message: &OutboundMessage) -> anyhow::Result<()> {
        self.api
            .send_text(message.user.id(), &message.text, Some(quiz_keyboard(message.menu)))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quizbot_core::traits::ActionKind;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn poll_parses_messages_and_advances_offset() {
        let server = MockServer::start().await;

        let body = json!({
            "ok": true,
            "result": [
                {
                    "update_id": 10,
                    "message": {
                        "message_id": 1,
                        "chat": { "id": 42, "type": "private" },
                        "from": { "id": 42, "is_bot": false, "first_name": "Аня" },
                        "text": "/start"
                    }
                },
                {
                    "update_id": 11,
                    "message": {
                        "message_id": 2,
                        "chat": { "id": 42, "type": "private" },
                        "sticker": {}
                    }
                },
                {
                    "update_id": 12,
                    "message": {
                        "message_id": 3,
                        "chat": { "id": 7, "type": "private" },
                        "text": "Новый вопрос"
                    }
                }
            ]
        });

        Mock::given(method("POST"))
            .and(path("/bottest-token/getUpdates"))
            .and(body_partial_json(json!({ "offset": 0 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(&body))
            .mount(&server)
            .await;

        let transport = TelegramTransport::with_poll_timeout("test-token", Some(server.uri()), 0).unwrap();
        let events = transport.poll().await.unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].user, UserId::new(Platform::Telegram, 42));
        assert_eq!(events[0].display_name.as_deref(), Some("Аня"));
        assert_eq!(events[0].action, ActionKind::Start);
        assert_eq!(events[1].action, ActionKind::NewQuestion);
        assert_eq!(transport.offset(), 13);
    }

    #[tokio::test]
    async fn send_includes_keyboard() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/bottest-token/sendMessage"))
            .and(body_partial_json(json!({
                "chat_id": 42,
                "text": "Вопрос?",
                "reply_markup": { "keyboard": [[{ "text": "Новый вопрос" }, { "text": "Сдаться" }]] }
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "result": {} })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let transport = TelegramTransport::new("test-token", Some(server.uri())).unwrap();
        transport
            .send(&OutboundMessage {
                user: UserId::new(Platform::Telegram, 42),
                text: "Вопрос?".into(),
                menu: MenuHint::Show,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn hide_menu_removes_keyboard() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/bottest-token/sendMessage"))
            .and(body_partial_json(json!({ "reply_markup": { "remove_keyboard": true } })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "result": {} })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let transport = TelegramTransport::new("test-token", Some(server.uri())).unwrap();
        transport
            .send(&OutboundMessage {
                user: UserId::new(Platform::Telegram, 42),
                text: "Пока!".into(),
                menu: MenuHint::Hide,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn unauthorized_token() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/botbad-token/getUpdates"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "ok": false,
                "error_code": 401,
                "description": "Unauthorized"
            })))
            .mount(&server)
            .await;

        let transport = TelegramTransport::with_poll_timeout("bad-token", Some(server.uri()), 0).unwrap();
        let err = transport.poll().await.unwrap_err();
        assert!(err.to_string().contains("authentication"));
    }

    #[tokio::test]
    async fn api_error_is_reported() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/bottest-token/sendMessage"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "ok": false,
                "error_code": 400,
                "description": "Bad Request: chat not found"
            })))
            .mount(&server)
            .await;

        let api = TelegramApi::new("test-token", Some(server.uri()), 5).unwrap();
        let err = api.send_text(1, "hi", None).await.unwrap_err();
        assert!(matches!(err, TransportError::Api { status: 400, .. }));
        assert!(err.to_string().contains("chat not found"));
    }
}
