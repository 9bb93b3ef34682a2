//! quizbot CLI — runs the quiz bot and checks question archives.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use quizbot_core::parser::Markers;
use quizbot_core::source::DEFAULT_ENCODING;
use quizbot_transport::TransportKind;

mod commands;

#[derive(Parser)]
#[command(name = "quizbot", version, about = "Trivia quiz bot for Telegram and VK")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve quizzes on a chat platform
    Run {
        /// Chat platform: telegram, vk or console
        #[arg(long, default_value = "console")]
        transport: TransportKind,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,

        /// Max users handled concurrently
        #[arg(long)]
        parallelism: Option<usize>,

        /// Directory of question archives (overrides config)
        #[arg(long)]
        questions: Option<PathBuf>,
    },

    /// Parse question archives and report problems
    Validate {
        /// Question file or directory of .txt files
        #[arg(long)]
        questions: PathBuf,

        /// Text encoding of the archives
        #[arg(long, default_value = DEFAULT_ENCODING)]
        encoding: String,

        /// Word introducing each question (default: Вопрос)
        #[arg(long)]
        question_marker: Option<String>,

        /// Word introducing each answer (default: Ответ)
        #[arg(long)]
        answer_marker: Option<String>,
    },

    /// Create a starter config and a sample question file
    Init,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("quizbot=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            transport,
            config,
            parallelism,
            questions,
        } => commands::run::execute(transport, config, parallelism, questions).await,
        Commands::Validate {
            questions,
            encoding,
            question_marker,
            answer_marker,
        } => {
            let defaults = Markers::default();
            let markers = Markers {
                question: question_marker.unwrap_or(defaults.question),
                answer: answer_marker.unwrap_or(defaults.answer),
            };
            commands::validate::execute(questions, encoding, &markers)
        }
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
