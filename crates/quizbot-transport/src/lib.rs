//! quizbot-transport — Chat platform integrations.
//!
//! Implements the `ChatTransport` trait for Telegram, VK and a local
//! console, plus the Telegram operator alerter and the bot configuration.

pub mod alert;
pub mod config;
pub mod console;
pub mod error;
pub mod mock;
pub mod telegram;
pub mod vk;

pub use config::{
    create_alerter, load_config, load_config_from, telegram_transport, vk_transport,
    QuizbotConfig, TransportKind,
};
pub use error::TransportError;
