//! The `quizbot run` command.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use quizbot_core::bank::QuestionBank;
use quizbot_core::bot::QuizBot;
use quizbot_core::dispatcher::{Dispatcher, DispatcherConfig};
use quizbot_core::session::SessionController;
use quizbot_store::create_store;
use quizbot_transport::config::load_config_from;
use quizbot_transport::console::ConsoleTransport;
use quizbot_transport::{create_alerter, telegram_transport, vk_transport, TransportKind};

pub async fn execute(
    transport: TransportKind,
    config_path: Option<PathBuf>,
    parallelism: Option<usize>,
    questions: Option<PathBuf>,
) -> Result<()> {
    let mut config = load_config_from(config_path.as_deref())?;
    if let Some(parallelism) = parallelism {
        config.parallelism = parallelism;
    }
    if let Some(dir) = questions {
        config.questions.directory = dir;
    }
    anyhow::ensure!(config.parallelism >= 1, "parallelism must be at least 1");
    tracing::debug!(?config, "configuration loaded");

    let store = create_store(&config.store).await?;
    let source = Arc::new(config.questions.source()?);
    let bank = QuestionBank::load(source, config.questions.pool()).with_context(|| {
        format!(
            "failed to load questions from {}",
            config.questions.directory.display()
        )
    })?;
    tracing::info!(questions = bank.active().len(), "question set ready");

    let bot = QuizBot::new(
        SessionController::new(store),
        Arc::new(bank),
        create_alerter(&config)?,
    );
    let dispatcher = Dispatcher::new(
        Arc::new(bot),
        DispatcherConfig {
            parallelism: config.parallelism,
            ..DispatcherConfig::default()
        },
    );

    match transport {
        TransportKind::Telegram => {
            let telegram = telegram_transport(&config)?;
            dispatcher.run(&telegram, shutdown_signal()).await
        }
        TransportKind::Vk => {
            let vk = vk_transport(&config)?;
            dispatcher.run(&vk, shutdown_signal()).await
        }
        TransportKind::Console => {
            let mut console = ConsoleTransport::stdio();
            if let Ok(user) = std::env::var("USER") {
                console = console.with_display_name(user);
            }
            eprintln!("quizbot console: type /start to begin, Ctrl-D to quit.");
            dispatcher
                .run(&console, async {
                    tokio::select! {
                        () = shutdown_signal() => {}
                        () = console.closed() => {}
                    }
                })
                .await
        }
    }
}

/// Resolves on Ctrl-C.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
