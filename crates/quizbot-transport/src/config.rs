//! Bot configuration and transport factories.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use quizbot_core::bank::QuestionPool;
use quizbot_core::parser::Markers;
use quizbot_core::source::{FileQuestionSource, DEFAULT_ENCODING};
use quizbot_core::traits::{Alerter, LogAlerter};
use quizbot_store::{RedisConfig, StoreConfig};

use crate::alert::TelegramAlerter;
use crate::telegram::TelegramTransport;
use crate::vk::VkTransport;

/// Which chat platform to serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Telegram,
    Vk,
    Console,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransportKind::Telegram => "telegram",
            TransportKind::Vk => "vk",
            TransportKind::Console => "console",
        })
    }
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "telegram" | "tg" => Ok(TransportKind::Telegram),
            "vk" | "vkontakte" => Ok(TransportKind::Vk),
            "console" => Ok(TransportKind::Console),
            other => Err(format!(
                "unknown transport '{other}' (expected telegram, vk or console)"
            )),
        }
    }
}

/// Telegram bot credentials.
///
/// Note: Custom Debug impl masks the token to prevent accidental exposure in logs.
#[derive(Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub token: String,
    #[serde(default)]
    pub base_url: Option<String>,
}

impl fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("token", &"***")
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// VK community credentials.
#[derive(Clone, Serialize, Deserialize)]
pub struct VkConfig {
    pub token: String,
    #[serde(default)]
    pub group_id: u64,
    #[serde(default)]
    pub api_base: Option<String>,
}

impl fmt::Debug for VkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VkConfig")
            .field("token", &"***")
            .field("group_id", &self.group_id)
            .field("api_base", &self.api_base)
            .finish()
    }
}

/// Where question archives live and how to read them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionsConfig {
    #[serde(default = "default_questions_dir")]
    pub directory: PathBuf,
    /// Number of archive files drawn into one quiz.
    #[serde(default = "default_files_per_quiz")]
    pub files_per_quiz: usize,
    #[serde(default = "default_encoding")]
    pub encoding: String,
    #[serde(default = "default_question_marker")]
    pub question_marker: String,
    #[serde(default = "default_answer_marker")]
    pub answer_marker: String,
}

fn default_questions_dir() -> PathBuf {
    PathBuf::from("questions")
}
fn default_files_per_quiz() -> usize {
    1
}
fn default_encoding() -> String {
    DEFAULT_ENCODING.to_string()
}
fn default_question_marker() -> String {
    Markers::default().question
}
fn default_answer_marker() -> String {
    Markers::default().answer
}

impl Default for QuestionsConfig {
    fn default() -> Self {
        Self {
            directory: default_questions_dir(),
            files_per_quiz: default_files_per_quiz(),
            encoding: default_encoding(),
            question_marker: default_question_marker(),
            answer_marker: default_answer_marker(),
        }
    }
}

impl QuestionsConfig {
    pub fn markers(&self) -> Markers {
        Markers {
            question: self.question_marker.clone(),
            answer: self.answer_marker.clone(),
        }
    }

    pub fn pool(&self) -> QuestionPool {
        QuestionPool {
            directory: self.directory.clone(),
            files_per_quiz: self.files_per_quiz,
        }
    }

    /// Build the file-backed question source for this configuration.
    pub fn source(&self) -> Result<FileQuestionSource> {
        FileQuestionSource::new(&self.encoding, &self.markers())
    }
}

/// Operator alert settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertsConfig {
    /// Telegram chat that receives failure reports.
    #[serde(default)]
    pub developer_chat_id: Option<i64>,
}

/// Top-level quizbot configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizbotConfig {
    #[serde(default)]
    pub telegram: Option<TelegramConfig>,
    #[serde(default)]
    pub vk: Option<VkConfig>,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub questions: QuestionsConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
    /// Max users handled concurrently.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    /// Long-poll wait in seconds.
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,
}

fn default_parallelism() -> usize {
    8
}
fn default_poll_timeout() -> u64 {
    25
}

impl Default for QuizbotConfig {
    fn default() -> Self {
        Self {
            telegram: None,
            vk: None,
            store: StoreConfig::default(),
            questions: QuestionsConfig::default(),
            alerts: AlertsConfig::default(),
            parallelism: default_parallelism(),
            poll_timeout_secs: default_poll_timeout(),
        }
    }
}

/// Resolve references like `${VAR_NAME}` using `lookup`.
fn resolve_env_vars(s: &str, lookup: &impl Fn(&str) -> Option<String>) -> String {
    let mut result = s.to_string();
    while let Some(start) = result.find("${") {
        if let Some(end) = result[start..].find('}') {
            let var_name = &result[start + 2..start + end];
            let value = lookup(var_name).unwrap_or_default();
            result = format!(
                "{}{}{}",
                &result[..start],
                value,
                &result[start + end + 1..]
            );
        } else {
            break;
        }
    }
    result
}

fn parse_env<T: FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("invalid value for {name}: '{value}'"))
}

/// Apply environment overrides, then resolve `${VAR}` references.
///
/// Recognized variables: `TG_BOT_API_KEY`, `VK_API_KEY`, `VK_GROUP_ID`,
/// `REDIS_HOST`, `REDIS_PORT`, `REDIS_DB`, `REDIS_USERNAME`,
/// `REDIS_PASSWORD`, `DEVELOPER_CHAT_ID`, `QUIZBOT_QUESTIONS_DIR`.
/// Any `REDIS_*` variable switches the store to Redis.
pub fn apply_env_overrides(
    config: &mut QuizbotConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    if let Some(token) = lookup("TG_BOT_API_KEY") {
        config
            .telegram
            .get_or_insert_with(|| TelegramConfig {
                token: String::new(),
                base_url: None,
            })
            .token = token;
    }

    if let Some(token) = lookup("VK_API_KEY") {
        config
            .vk
            .get_or_insert_with(|| VkConfig {
                token: String::new(),
                group_id: 0,
                api_base: None,
            })
            .token = token;
    }
    if let Some(group_id) = lookup("VK_GROUP_ID") {
        if let Some(vk) = config.vk.as_mut() {
            vk.group_id = parse_env("VK_GROUP_ID", &group_id)?;
        }
    }

    let redis_vars = [
        "REDIS_HOST",
        "REDIS_PORT",
        "REDIS_DB",
        "REDIS_USERNAME",
        "REDIS_PASSWORD",
    ];
    if redis_vars.iter().any(|name| lookup(name).is_some()) {
        if !matches!(config.store, StoreConfig::Redis(_)) {
            config.store = StoreConfig::Redis(RedisConfig::default());
        }
        if let StoreConfig::Redis(redis) = &mut config.store {
            if let Some(host) = lookup("REDIS_HOST") {
                redis.host = host;
            }
            if let Some(port) = lookup("REDIS_PORT") {
                redis.port = parse_env("REDIS_PORT", &port)?;
            }
            if let Some(db) = lookup("REDIS_DB") {
                redis.db = parse_env("REDIS_DB", &db)?;
            }
            if let Some(username) = lookup("REDIS_USERNAME") {
                redis.username = Some(username).filter(|u| !u.is_empty());
            }
            if let Some(password) = lookup("REDIS_PASSWORD") {
                redis.password = Some(password).filter(|p| !p.is_empty());
            }
        }
    }

    if let Some(chat_id) = lookup("DEVELOPER_CHAT_ID") {
        config.alerts.developer_chat_id = Some(parse_env("DEVELOPER_CHAT_ID", &chat_id)?);
    }
    if let Some(dir) = lookup("QUIZBOT_QUESTIONS_DIR") {
        config.questions.directory = PathBuf::from(dir);
    }

    // Resolve ${VAR} references in secrets and endpoints
    if let Some(tg) = config.telegram.as_mut() {
        tg.token = resolve_env_vars(&tg.token, &lookup);
    }
    if let Some(vk) = config.vk.as_mut() {
        vk.token = resolve_env_vars(&vk.token, &lookup);
    }
    if let StoreConfig::Redis(redis) = &mut config.store {
        redis.host = resolve_env_vars(&redis.host, &lookup);
        redis.url = redis.url.as_ref().map(|u| resolve_env_vars(u, &lookup));
        redis.username = redis.username.as_ref().map(|u| resolve_env_vars(u, &lookup));
        redis.password = redis.password.as_ref().map(|p| resolve_env_vars(p, &lookup));
    }

    Ok(())
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `quizbot.toml` in the current directory
/// 2. `~/.config/quizbot/config.toml`
pub fn load_config() -> Result<QuizbotConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations,
/// then apply environment overrides.
pub fn load_config_from(path: Option<&Path>) -> Result<QuizbotConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("quizbot.toml");
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|dir| dir.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let mut config = match config_path {
        Some(path) => {
            tracing::debug!("loading config from {}", path.display());
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            toml::from_str::<QuizbotConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => QuizbotConfig::default(),
    };

    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
    Ok(config)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("quizbot"))
}

/// Build the Telegram transport, failing if no token is configured.
pub fn telegram_transport(config: &QuizbotConfig) -> Result<TelegramTransport> {
    let tg = config
        .telegram
        .as_ref()
        .filter(|tg| !tg.token.is_empty())
        .context("telegram token is not configured (set [telegram] token or TG_BOT_API_KEY)")?;
    Ok(TelegramTransport::with_poll_timeout(
        &tg.token,
        tg.base_url.clone(),
        config.poll_timeout_secs,
    )?)
}

/// Build the VK transport, failing if the token or group id is missing.
pub fn vk_transport(config: &QuizbotConfig) -> Result<VkTransport> {
    let vk = config
        .vk
        .as_ref()
        .filter(|vk| !vk.token.is_empty())
        .context("vk token is not configured (set [vk] token or VK_API_KEY)")?;
    if vk.group_id == 0 {
        anyhow::bail!("vk group_id is not configured (set [vk] group_id or VK_GROUP_ID)");
    }
    Ok(VkTransport::with_wait(
        &vk.token,
        vk.group_id,
        vk.api_base.clone(),
        config.poll_timeout_secs,
    )?)
}

/// Build the operator alert channel.
///
/// Alerts go to the developer chat when both a Telegram token and a chat id
/// are configured; otherwise they are only logged.
pub fn create_alerter(config: &QuizbotConfig) -> Result<Arc<dyn Alerter>> {
    Ok(match (&config.telegram, config.alerts.developer_chat_id) {
        (Some(tg), Some(chat_id)) if !tg.token.is_empty() => Arc::new(TelegramAlerter::new(
            &tg.token,
            chat_id,
            tg.base_url.clone(),
        )?),
        _ => Arc::new(LogAlerter),
    })
}
