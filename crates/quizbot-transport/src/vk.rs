//! VK community bot transport (Bots Long Poll API).

use async_trait::async_trait;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::instrument;

use quizbot_core::traits::{
    ChatTransport, InboundEvent, MenuHint, OutboundMessage, GIVE_UP_LABEL, NEW_QUESTION_LABEL,
};
use quizbot_core::{Platform, UserId};

use crate::error::{http_client, TransportError};

pub const DEFAULT_API_BASE: &str = "https://api.vk.com/method";
pub const DEFAULT_API_VERSION: &str = "5.199";
const DEFAULT_WAIT_SECS: u64 = 25;
const REQUEST_SLACK_SECS: u64 = 10;
/// VK error code for an invalid or revoked access token.
const ERROR_AUTH_FAILED: i64 = 5;

/// Long-poll session obtained from `groups.getLongPollServer`.
#[derive(Debug, Clone, Deserialize)]
struct LongPollServer {
    server: String,
    key: String,
    #[serde(deserialize_with = "string_or_number")]
    ts: String,
}

#[derive(Deserialize)]
struct ApiEnvelope<T> {
    response: Option<T>,
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct ApiError {
    error_code: i64,
    error_msg: String,
}

#[derive(Deserialize)]
struct PollResponse {
    #[serde(default)]
    failed: Option<u8>,
    #[serde(default, deserialize_with = "optional_string_or_number")]
    ts: Option<String>,
    #[serde(default)]
    updates: Vec<PollUpdate>,
}

#[derive(Deserialize)]
struct PollUpdate {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    object: Value,
}

#[derive(Deserialize)]
struct NewMessage {
    from_id: i64,
    #[serde(default)]
    peer_id: Option<i64>,
    #[serde(default)]
    text: String,
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

fn optional_string_or_number<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    string_or_number(deserializer).map(Some)
}

/// VK transport for community (group) bots.
pub struct VkTransport {
    token: String,
    group_id: u64,
    api_base: String,
    api_version: String,
    wait_secs: u64,
    client: reqwest::Client,
    session: Mutex<Option<LongPollServer>>,
}

impl VkTransport {
    pub fn new(
        token: &str,
        group_id: u64,
        api_base: Option<String>,
    ) -> Result<Self, TransportError> {
        Self::with_wait(token, group_id, api_base, DEFAULT_WAIT_SECS)
    }

    pub fn with_wait(
        token: &str,
        group_id: u64,
        api_base: Option<String>,
        wait_secs: u64,
    ) -> Result<Self, TransportError> {
        Ok(Self {
            token: token.to_string(),
            group_id,
            api_base: api_base.unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            api_version: DEFAULT_API_VERSION.to_string(),
            wait_secs,
            client: http_client(wait_secs + REQUEST_SLACK_SECS)?,
            session: Mutex::new(None),
        })
    }

    fn timeout_secs(&self) -> u64 {
        self.wait_secs + REQUEST_SLACK_SECS
    }

    async fn get_json(&self, url: Url) -> Result<Value, TransportError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| TransportError::from_request(e, self.timeout_secs()))?;

        let status = response.status().as_u16();
        if status >= 400 {
            let message = response.text().await.unwrap_or_default();
            return Err(TransportError::Api {
                status: i64::from(status),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))
    }

    /// Call a VK API method and decode its `response`.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &[(&str, String)],
    ) -> Result<T, TransportError> {
        let mut all = vec![
            ("access_token", self.token.clone()),
            ("v", self.api_version.clone()),
        ];
        all.extend(params.iter().cloned());

        let url = Url::parse_with_params(&format!("{}/{method}", self.api_base), &all)
            .map_err(|e| TransportError::Network(format!("invalid API URL: {e}")))?;
        let envelope: ApiEnvelope<T> = serde_json::from_value(self.get_json(url).await?)
            .map_err(|e| TransportError::Decode(e.to_string()))?;

        if let Some(error) = envelope.error {
            if error.error_code == ERROR_AUTH_FAILED {
                return Err(TransportError::Unauthorized(error.error_msg));
            }
            return Err(TransportError::Api {
                status: error.error_code,
                message: error.error_msg,
            });
        }
        envelope
            .response
            .ok_or_else(|| TransportError::Decode(format!("{method}: missing response")))
    }

    async fn fetch_server(&self) -> Result<LongPollServer, TransportError> {
        tracing::debug!(group_id = self.group_id, "requesting long poll server");
        self.call(
            "groups.getLongPollServer",
            &[("group_id", self.group_id.to_string())],
        )
        .await
    }
}

fn keyboard(menu: MenuHint) -> String {
    let keyboard = match menu {
        MenuHint::Show => json!({
            "one_time": true,
            "buttons": [[
                { "action": { "type": "text", "label": NEW_QUESTION_LABEL }, "color": "positive" },
                { "action": { "type": "text", "label": GIVE_UP_LABEL }, "color": "negative" }
            ]]
        }),
        MenuHint::Hide => json!({ "one_time": true, "buttons": [] }),
    };
    keyboard.to_string()
}

#[async_trait]
impl ChatTransport for VkTransport {
    fn name(&self) -> &str {
        "vk"
    }

    #[instrument(skip(self), fields(group_id = self.group_id))]
    async fn poll(&self) -> anyhow::Result<Vec<InboundEvent>> {
        let mut session = self.session.lock().await;
        let server = match session.clone() {
            Some(server) => server,
            None => {
                let server = self.fetch_server().await?;
                *session = Some(server.clone());
                server
            }
        };

        let url = Url::parse_with_params(
            &server.server,
            &[
                ("act", "a_check".to_string()),
                ("key", server.key.clone()),
                ("ts", server.ts.clone()),
                ("wait", self.wait_secs.to_string()),
            ],
        )
        .map_err(|e| TransportError::Decode(format!("invalid long poll server URL: {e}")))?;

        let response: PollResponse = serde_json::from_value(self.get_json(url).await?)
            .map_err(|e| TransportError::Decode(e.to_string()))?;

        match response.failed {
            None => {}
            Some(1) => {
                tracing::debug!("event history outdated, updating ts");
                if let (Some(current), Some(ts)) = (session.as_mut(), response.ts) {
                    current.ts = ts;
                }
                return Ok(Vec::new());
            }
            Some(code) => {
                tracing::debug!(code, "long poll key expired, requesting a new server");
                *session = None;
                return Ok(Vec::new());
            }
        }

        if let (Some(current), Some(ts)) = (session.as_mut(), response.ts) {
            current.ts = ts;
        }
        drop(session);

        let events = response
            .updates
            .into_iter()
            .filter(|update| update.kind == "message_new")
            .filter_map(|update| {
                let message = update.object.get("message").cloned().unwrap_or(update.object);
                match serde_json::from_value::<NewMessage>(message) {
                    Ok(message) => Some(message),
                    Err(e) => {
                        tracing::warn!("skipping malformed message_new update: {e}");
                        None
                    }
                }
            })
            .map(|message| {
                let peer = message.peer_id.unwrap_or(message.from_id);
                InboundEvent::new(UserId::new(Platform::Vk, peer), message.text)
            })
            .collect();

        Ok(events)
    }

    async fn send(&self, message: &OutboundMessage) -> anyhow::Result<()> {
        let _: Value = self
            .call(
                "messages.send",
                &[
                    ("peer_id", message.user.id().to_string()),
                    ("message", message.text.clone()),
                    ("random_id", rand::random::<i32>().to_string()),
                    ("keyboard", keyboard(message.menu)),
                ],
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quizbot_core::traits::ActionKind;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mount_server_info(server: &MockServer, ts: Value, expected_calls: u64) {
        Mock::given(method("GET"))
            .and(path("/method/groups.getLongPollServer"))
            .and(query_param("group_id", "77"))
            .and(query_param("access_token", "vk-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "response": {
                    "key": "k1",
                    "server": format!("{}/lp", server.uri()),
                    "ts": ts
                }
            })))
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    fn transport(server: &MockServer) -> VkTransport {
        VkTransport::with_wait("vk-token", 77, Some(format!("{}/method", server.uri())), 0).unwrap()
    }

    #[tokio::test]
    async fn poll_reads_new_messages() {
        let server = MockServer::start().await;
        mount_server_info(&server, json!(100), 1).await;

        Mock::given(method("GET"))
            .and(path("/lp"))
            .and(query_param("act", "a_check"))
            .and(query_param("key", "k1"))
            .and(query_param("ts", "100"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ts": "101",
                "updates": [
                    {
                        "type": "message_new",
                        "object": { "message": { "from_id": 5, "peer_id": 5, "text": "Сдаться" } }
                    },
                    { "type": "message_typing_state", "object": { "state": "typing" } }
                ]
            })))
            .mount(&server)
            .await;

        let vk = transport(&server);
        let events = vk.poll().await.unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].user, UserId::new(Platform::Vk, 5));
        assert_eq!(events[0].action, ActionKind::GiveUp);
        assert_eq!(vk.session.lock().await.as_ref().unwrap().ts, "101");
    }

    #[tokio::test]
    async fn failed_1_updates_ts_only() {
        let server = MockServer::start().await;
        mount_server_info(&server, json!("100"), 1).await;

        Mock::given(method("GET"))
            .and(path("/lp"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "failed": 1, "ts": 150 })),
            )
            .mount(&server)
            .await;

        let vk = transport(&server);
        assert!(vk.poll().await.unwrap().is_empty());
        assert_eq!(vk.session.lock().await.as_ref().unwrap().ts, "150");
    }

    #[tokio::test]
    async fn failed_2_refetches_server() {
        let server = MockServer::start().await;
        mount_server_info(&server, json!("100"), 2).await;

        Mock::given(method("GET"))
            .and(path("/lp"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "failed": 2 })))
            .mount(&server)
            .await;

        let vk = transport(&server);
        assert!(vk.poll().await.unwrap().is_empty());
        assert!(vk.session.lock().await.is_none());
        assert!(vk.poll().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn send_attaches_keyboard() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/method/messages.send"))
            .and(query_param("peer_id", "5"))
            .and(query_param("message", "Вопрос?"))
            .and(query_param("keyboard", keyboard(MenuHint::Show)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "response": 1 })))
            .expect(1)
            .mount(&server)
            .await;

        transport(&server)
            .send(&OutboundMessage {
                user: UserId::new(Platform::Vk, 5),
                text: "Вопрос?".into(),
                menu: MenuHint::Show,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn auth_error_maps_to_unauthorized() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/method/groups.getLongPollServer"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "error": { "error_code": 5, "error_msg": "User authorization failed: invalid access_token" }
            })))
            .mount(&server)
            .await;

        let err = transport(&server).poll().await.unwrap_err();
        let err = err.downcast::<TransportError>().unwrap();
        assert!(matches!(err, TransportError::Unauthorized(_)));
    }

    #[test]
    fn hidden_keyboard_has_no_buttons() {
        let parsed: Value = serde_json::from_str(&keyboard(MenuHint::Hide)).unwrap();
        assert_eq!(parsed["buttons"], json!([]));
    }
}
