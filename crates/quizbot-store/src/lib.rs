//! quizbot-store — Session store backends.
//!
//! Provides the Redis-backed [`SessionStore`] used in production and a
//! factory that builds whichever backend the configuration names. The
//! in-memory store lives in `quizbot-core` and is re-exported here.

pub mod redis_store;

use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use quizbot_core::traits::SessionStore;

pub use quizbot_core::memory::InMemoryStore;
pub use redis_store::RedisStore;

/// Which session store backend to use.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoreConfig {
    /// Remote Redis (or compatible) server.
    Redis(RedisConfig),
    /// Process-local map; progress is lost on restart.
    #[default]
    Memory,
}

/// Connection settings for [`RedisStore`].
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Full connection URL (`redis://...`); takes precedence over the
    /// individual fields when set.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub db: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Prefix prepended to every per-user key.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Seconds to wait for the initial connection.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    6379
}

fn default_key_prefix() -> String {
    "quizbot:".to_string()
}

fn default_connect_timeout() -> u64 {
    5
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: default_host(),
            port: default_port(),
            db: 0,
            username: None,
            password: None,
            key_prefix: default_key_prefix(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl fmt::Debug for RedisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisConfig")
            .field("url", &self.url.as_ref().map(|_| "***"))
            .field("host", &self.host)
            .field("port", &self.port)
            .field("db", &self.db)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("key_prefix", &self.key_prefix)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

/// Build the session store named by `config`.
pub async fn create_store(config: &StoreConfig) -> Result<Arc<dyn SessionStore>> {
    match config {
        StoreConfig::Memory => {
            tracing::info!("using in-memory session store");
            Ok(Arc::new(InMemoryStore::new()))
        }
        StoreConfig::Redis(redis) => {
            let store = RedisStore::connect(redis)
                .await
                .context("failed to connect to the session store")?;
            tracing::info!(host = %redis.host, port = redis.port, db = redis.db, "using redis session store");
            Ok(Arc::new(store))
        }
    }
}
