//! Redis-backed session store.
//!
//! Each user is one hash at `{key_prefix}{user}` with the counter in the
//! `question_counter` field. Increments use `HINCRBY`, so concurrent
//! deliveries for one user never lose an update.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, ConnectionAddr, ConnectionInfo, RedisConnectionInfo, RedisError};

use quizbot_core::error::StoreError;
use quizbot_core::traits::SessionStore;
use quizbot_core::UserId;

use crate::RedisConfig;

/// Hash field holding the question counter.
pub const COUNTER_FIELD: &str = "question_counter";

/// Session store over a multiplexed Redis connection.
#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
    key_prefix: String,
}

impl RedisStore {
    /// Open a connection using `config`.
    pub async fn connect(config: &RedisConfig) -> Result<Self, StoreError> {
        let client = match &config.url {
            Some(url) => redis::Client::open(url.as_str()),
            None => redis::Client::open(connection_info(config)),
        }
        .map_err(unavailable)?;

        let timeout = Duration::from_secs(config.connect_timeout_secs.max(1));
        let conn = tokio::time::timeout(timeout, client.get_multiplexed_async_connection())
            .await
            .map_err(|_| StoreError::Unavailable(format!("connection timed out after {timeout:?}")))?
            .map_err(unavailable)?;

        Ok(Self {
            conn,
            key_prefix: config.key_prefix.clone(),
        })
    }

    fn key(&self, user: &UserId) -> String {
        counter_key(&self.key_prefix, user)
    }
}

/// Key of the hash holding `user`'s session.
pub fn counter_key(prefix: &str, user: &UserId) -> String {
    format!("{prefix}{user}")
}

fn connection_info(config: &RedisConfig) -> ConnectionInfo {
    ConnectionInfo {
        addr: ConnectionAddr::Tcp(config.host.clone(), config.port),
        redis: RedisConnectionInfo {
            db: config.db,
            username: config.username.clone(),
            password: config.password.clone(),
            ..RedisConnectionInfo::default()
        },
    }
}

fn unavailable(err: RedisError) -> StoreError {
    StoreError::Unavailable(err.to_string())
}

fn parse_counter(key: &str, raw: &str) -> Result<u64, StoreError> {
    raw.trim().parse().map_err(|_| StoreError::InvalidValue {
        key: key.to_string(),
        value: raw.to_string(),
    })
}

#[async_trait]
impl SessionStore for RedisStore {
    async fn get_counter(&self, user: &UserId) -> Result<u64, StoreError> {
        let key = self.key(user);
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.hget(&key, COUNTER_FIELD).await.map_err(unavailable)?;
        match raw {
            Some(raw) => parse_counter(&key, &raw),
            None => Ok(0),
        }
    }

    async fn set_counter(&self, user: &UserId, value: u64) -> Result<(), StoreError> {
        let key = self.key(user);
        let mut conn = self.conn.clone();
        let _: () = conn
            .hset(&key, COUNTER_FIELD, value)
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn increment_counter(&self, user: &UserId, delta: u64) -> Result<u64, StoreError> {
        let key = self.key(user);
        let mut conn = self.conn.clone();
        let value: i64 = conn
            .hincr(&key, COUNTER_FIELD, delta)
            .await
            .map_err(unavailable)?;
        u64::try_from(value).map_err(|_| StoreError::InvalidValue {
            key,
            value: value.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quizbot_core::Platform;

    #[test]
    fn key_includes_platform_and_id() {
        let user = UserId::new(Platform::Telegram, 42);
        assert_eq!(counter_key("quizbot:", &user), "quizbot:tg:42");
        let user = UserId::new(Platform::Vk, 42);
        assert_eq!(counter_key("", &user), "vk:42");
    }

    #[test]
    fn counter_parsing() {
        assert_eq!(parse_counter("k", "7").unwrap(), 7);
        assert_eq!(parse_counter("k", " 12 ").unwrap(), 12);
        let err = parse_counter("k", "-1").unwrap_err();
        assert!(matches!(err, StoreError::InvalidValue { .. }));
        assert!(parse_counter("k", "abc").is_err());
    }

    #[test]
    fn connection_info_from_fields() {
        let config = RedisConfig {
            host: "cache".into(),
            port: 6380,
            db: 3,
            username: Some("bot".into()),
            password: Some("pw".into()),
            ..RedisConfig::default()
        };
        let info = connection_info(&config);
        assert!(matches!(&info.addr, ConnectionAddr::Tcp(host, 6380) if host == "cache"));
        assert_eq!(info.redis.db, 3);
        assert_eq!(info.redis.username.as_deref(), Some("bot"));
        assert_eq!(info.redis.password.as_deref(), Some("pw"));
    }

    #[tokio::test]
    async fn unreachable_server_is_unavailable() {
        let config = RedisConfig {
            host: "127.0.0.1".into(),
            // Reserved port; nothing listens here.
            port: 1,
            connect_timeout_secs: 1,
            ..RedisConfig::default()
        };
        let err = RedisStore::connect(&config).await.err().unwrap();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }
}
