//! Local console transport: stdin lines in, stdout replies out.
//!
//! All input belongs to a single local user. Useful for trying a question
//! archive without a bot token.

use async_trait::async_trait;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, Lines, Stdin, Stdout,
};
use tokio::sync::{Mutex, Notify};

use quizbot_core::traits::{
    ChatTransport, InboundEvent, MenuHint, OutboundMessage, GIVE_UP_LABEL, NEW_QUESTION_LABEL,
};
use quizbot_core::{Platform, UserId};

/// The only user a console session has.
pub const CONSOLE_USER: UserId = UserId::new(Platform::Console, 0);

pub struct ConsoleTransport<R, W> {
    lines: Mutex<Lines<R>>,
    out: Mutex<W>,
    display_name: Option<String>,
    closed: Notify,
}

impl ConsoleTransport<BufReader<Stdin>, Stdout> {
    /// Console transport over the process's stdin and stdout.
    pub fn stdio() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl<R, W> ConsoleTransport<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(input: R, output: W) -> Self {
        Self {
            lines: Mutex::new(input.lines()),
            out: Mutex::new(output),
            display_name: None,
            closed: Notify::new(),
        }
    }

    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Resolves once input reaches end of file.
    pub async fn closed(&self) {
        self.closed.notified().await;
    }

    /// Consume the transport and return the output sink.
    pub fn into_output(self) -> W {
        self.out.into_inner()
    }
}

#[async_trait]
impl<R, W> ChatTransport for ConsoleTransport<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    fn name(&self) -> &str {
        "console"
    }

    async fn poll(&self) -> anyhow::Result<Vec<InboundEvent>> {
        let line = self.lines.lock().await.next_line().await?;
        let Some(line) = line else {
            self.closed.notify_one();
            // Nothing more will ever arrive; wait for shutdown.
            std::future::pending::<()>().await;
            return Ok(Vec::new());
        };

        if line.trim().is_empty() {
            return Ok(Vec::new());
        }

        let event = InboundEvent::new(CONSOLE_USER, line);
        Ok(vec![match &self.display_name {
            Some(name) => event.with_display_name(name.clone()),
            None => event,
        }])
    }

    async fn send(&self, message: &OutboundMessage) -> anyhow::Result<()> {
        let mut rendered = format!("{}\n", message.text);
        if message.menu == MenuHint::Show {
            rendered.push_str(&format!("[{NEW_QUESTION_LABEL}] [{GIVE_UP_LABEL}]\n"));
        }

        let mut out = self.out.lock().await;
        out.write_all(rendered.as_bytes()).await?;
        out.flush().await?;
        Ok(())
    }
}
