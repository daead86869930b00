//! Output sinks the answers are written to.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{BoxStream, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use tokio::io::{AsyncWrite, AsyncWriteExt, Stdout};

const ASSISTANT_PREFIX: &str = "Assistant>/ ";

/// A stream of answer text, as returned by
/// [`Agent::stream_chat`](luna_core::Agent::stream_chat).
pub type TextStream<'a> = BoxStream<'a, Result<String, luna_core::Error>>;

/// An error raised while forwarding an answer to a sink.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// The agent failed while the answer was streamed.
    #[error(transparent)]
    Agent(#[from] luna_core::Error),
    /// The output couldn't be written.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

/// A channel that answers are written to.
#[async_trait]
pub trait OutputSink: Send {
    /// Writes a complete answer.
    async fn send_output(&mut self, text: &str) -> Result<(), SinkError>;

    /// Writes an answer as its text arrives.
    ///
    /// The stream is drained until it ends or fails. Text written before a
    /// failure stays written.
    async fn stream_output(
        &mut self,
        stream: TextStream<'_>,
    ) -> Result<(), SinkError>;
}

/// A sink writing undecorated text.
#[derive(Debug, Default)]
pub struct WriterSink<W> {
    writer: W,
}

impl<W> WriterSink<W> {
    /// Creates a sink over `writer`.
    #[inline]
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Returns the underlying writer.
    #[inline]
    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    /// Consumes the sink, returning the underlying writer.
    #[inline]
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl WriterSink<Stdout> {
    /// Creates a sink writing to stdout.
    #[inline]
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> OutputSink for WriterSink<W> {
    async fn send_output(&mut self, text: &str) -> Result<(), SinkError> {
        self.writer.write_all(text.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn stream_output(
        &mut self,
        mut stream: TextStream<'_>,
    ) -> Result<(), SinkError> {
        while let Some(text) = stream.next().await {
            self.writer.write_all(text?.as_bytes()).await?;
            self.writer.flush().await?;
        }
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }
}

/// A sink for interactive terminals.
///
/// Answers are prefixed with a colored `Assistant>/ ` marker, and a spinner
/// is shown on stderr until the first piece of a streamed answer arrives.
pub struct TerminalSink<W = Stdout> {
    writer: W,
    spinner_style: Option<ProgressStyle>,
}

impl TerminalSink {
    /// Creates a sink writing to stdout.
    pub fn new() -> Self {
        let spinner_style = ProgressStyle::with_template("{spinner} {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
        Self {
            writer: tokio::io::stdout(),
            spinner_style: Some(spinner_style),
        }
    }
}

impl Default for TerminalSink {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<W> TerminalSink<W> {
    /// Creates a sink over `writer`, without a spinner.
    #[inline]
    pub fn with_writer(writer: W) -> Self {
        Self {
            writer,
            spinner_style: None,
        }
    }

    /// Consumes the sink, returning the underlying writer.
    #[inline]
    pub fn into_inner(self) -> W {
        self.writer
    }

    fn start_spinner(&self) -> Option<ProgressBar> {
        let style = self.spinner_style.as_ref()?;
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(style.clone());
        spinner.set_message("🤔 Thinking...");
        spinner.enable_steady_tick(Duration::from_millis(100));
        Some(spinner)
    }
}

impl<W: AsyncWrite + Unpin + Send> TerminalSink<W> {
    async fn write_prefix(&mut self) -> io::Result<()> {
        let prefix = ASSISTANT_PREFIX.bright_cyan().bold().to_string();
        self.writer.write_all(prefix.as_bytes()).await
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> OutputSink for TerminalSink<W> {
    async fn send_output(&mut self, text: &str) -> Result<(), SinkError> {
        self.write_prefix().await?;
        self.writer.write_all(text.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn stream_output(
        &mut self,
        mut stream: TextStream<'_>,
    ) -> Result<(), SinkError> {
        let mut spinner = self.start_spinner();
        let mut started = false;

        while let Some(text) = stream.next().await {
            let text = match text {
                Ok(text) => text,
                Err(err) => {
                    if let Some(spinner) = spinner.take() {
                        spinner.finish_and_clear();
                    }
                    return Err(err.into());
                }
            };

            // The spinner must be gone before anything is printed.
            if let Some(spinner) = spinner.take() {
                spinner.finish_and_clear();
            }
            if !started {
                self.write_prefix().await?;
                started = true;
            }
            self.writer.write_all(text.as_bytes()).await?;
            self.writer.flush().await?;
        }

        if let Some(spinner) = spinner.take() {
            spinner.finish_and_clear();
        }
        if !started {
            self.write_prefix().await?;
        }
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }
}
