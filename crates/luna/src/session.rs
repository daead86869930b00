use std::sync::Arc;

use luna_core::{Agent, AgentBuilder};
use luna_model::ModelProvider;
use luna_openai_model::OpenAIProvider;

use crate::config::{Config, Mode, OutputKind};
use crate::sink::{OutputSink, SinkError, TerminalSink, WriterSink};
use crate::tools::{ToolSetupError, builtin_registry};

const AGENT_NAME: &str = "Luna";

/// Errors returned by [`Session`] and [`SessionBuilder`].
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The built-in tools couldn't be assembled.
    #[error("failed to set up tools: {0}")]
    Setup(#[from] ToolSetupError),
    /// The agent failed to answer.
    #[error(transparent)]
    Agent(#[from] luna_core::Error),
    /// The answer couldn't be forwarded to the sink.
    #[error(transparent)]
    Sink(SinkError),
}

impl From<SinkError> for SessionError {
    fn from(err: SinkError) -> Self {
        match err {
            SinkError::Agent(err) => Self::Agent(err),
            err => Self::Sink(err),
        }
    }
}

/// A session builder.
///
/// See [`Session`].
pub struct SessionBuilder {
    agent_builder: AgentBuilder,
    sink: Option<Box<dyn OutputSink>>,
    mode: Mode,
}

impl SessionBuilder {
    /// Creates a session builder with a specified model provider.
    pub fn with_model_provider<M: ModelProvider + 'static>(
        provider: M,
    ) -> Self {
        let agent_builder =
            AgentBuilder::with_model_provider(provider).with_name(AGENT_NAME);
        Self {
            agent_builder,
            sink: None,
            mode: Mode::default(),
        }
    }

    /// Creates a session builder talking to the OpenAI-compatible provider
    /// described by `config`, with the configured mode, sink and limits.
    pub fn from_config(config: &Config) -> Self {
        let provider = OpenAIProvider::new(config.openai_config());
        let builder = Self::with_model_provider(provider)
            .with_mode(config.mode)
            .with_max_rounds(config.max_rounds)
            .with_tool_notices(config.tool_notices);
        match config.output {
            OutputKind::Terminal => builder.with_sink(TerminalSink::new()),
            OutputKind::Plain => builder.with_sink(WriterSink::stdout()),
        }
    }

    /// Sets the system prompt for the agent.
    #[inline]
    pub fn with_system_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.agent_builder = self.agent_builder.with_system_prompt(prompt);
        self
    }

    /// Sets the sink answers are written to, [`TerminalSink`] by default.
    #[inline]
    pub fn with_sink<S: OutputSink + 'static>(mut self, sink: S) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    /// Sets whether answers are streamed or delivered at once.
    #[inline]
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets how many model requests one prompt may issue.
    #[inline]
    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.agent_builder = self.agent_builder.with_max_rounds(max_rounds);
        self
    }

    /// Sets whether tool calls are announced in streamed answers.
    #[inline]
    pub fn with_tool_notices(mut self, enabled: bool) -> Self {
        self.agent_builder = self.agent_builder.with_tool_notices(enabled);
        self
    }

    /// Builds a new session with the built-in tools.
    pub fn build(self) -> Result<Session, SessionError> {
        let registry = builtin_registry()?;
        let agent = self
            .agent_builder
            .with_registry(Arc::new(registry))
            .build();
        let sink = self
            .sink
            .unwrap_or_else(|| Box::new(TerminalSink::new()));

        Ok(Session {
            agent,
            sink,
            mode: self.mode,
        })
    }
}

/// A chat session, like a window that displays messages and has an input
/// box.
///
/// The session holds a fully configured agent and the sink its answers go
/// to.
pub struct Session {
    agent: Agent,
    sink: Box<dyn OutputSink>,
    mode: Mode,
}

impl Session {
    /// Returns the underlying agent.
    #[inline]
    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    /// Returns whether answers are streamed or delivered at once.
    #[inline]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Sends a prompt and writes the answer to the sink.
    pub async fn respond(&mut self, prompt: &str) -> Result<(), SessionError> {
        debug!("responding in {:?} mode", self.mode);
        match self.mode {
            Mode::Stream => {
                let stream = self.agent.stream_chat(prompt);
                self.sink.stream_output(stream).await?;
            }
            Mode::Blocking => {
                let answer = self.agent.chat(prompt).await?;
                self.sink.send_output(&answer).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use futures_util::StreamExt;
    use luna_model::{ModelMessage, Role};
    use luna_test_model::{PresetEvent, PresetResponse, TestModelProvider};

    use super::*;
    use crate::sink::TextStream;

    #[derive(Clone, Default)]
    struct RecordingSink {
        outputs: Arc<Mutex<Vec<String>>>,
    }

    impl RecordingSink {
        fn outputs(&self) -> Vec<String> {
            self.outputs.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl OutputSink for RecordingSink {
        async fn send_output(&mut self, text: &str) -> Result<(), SinkError> {
            self.outputs.lock().unwrap().push(format!("send:{text}"));
            Ok(())
        }

        async fn stream_output(
            &mut self,
            mut stream: TextStream<'_>,
        ) -> Result<(), SinkError> {
            let mut text = String::new();
            while let Some(chunk) = stream.next().await {
                text.push_str(&chunk?);
            }
            self.outputs.lock().unwrap().push(format!("stream:{text}"));
            Ok(())
        }
    }

    fn clock_round() -> PresetResponse {
        PresetResponse::with_events([PresetEvent::tool_call(
            0,
            "call_1",
            "get_current_in_local_time",
            r#"{"utc": true}"#,
        )])
    }

    #[tokio::test]
    async fn test_stream_mode_uses_clock_tool() {
        let mut model_provider = TestModelProvider::default();
        model_provider.add_response(clock_round());
        model_provider.add_response(PresetResponse::with_events([
            PresetEvent::text("It is "),
            PresetEvent::text("late."),
        ]));
        let sink = RecordingSink::default();

        let mut session = SessionBuilder::with_model_provider(model_provider.clone())
            .with_system_prompt("You are Luna.")
            .with_sink(sink.clone())
            .build()
            .unwrap();
        assert_eq!(session.agent().name(), "Luna");

        session.respond("What time is it?").await.unwrap();
        assert_eq!(sink.outputs(), vec!["stream:It is late.".to_owned()]);

        let requests = model_provider.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].tools.len(), 1);
        assert_eq!(requests[0].tools[0].name, "get_current_in_local_time");

        let messages = session.agent().conversation().messages();
        let roles: Vec<Role> = messages.iter().map(ModelMessage::role).collect();
        assert_eq!(
            roles,
            [Role::System, Role::User, Role::Assistant, Role::Tool, Role::Assistant]
        );
        let ModelMessage::Tool(result) = &messages[3] else {
            panic!("expected a tool message");
        };
        assert!(result.content.starts_with(r#"{"time":""#));
        assert!(result.content.ends_with(r#" UTC"}"#));
    }

    #[tokio::test]
    async fn test_blocking_mode() {
        let mut model_provider = TestModelProvider::default();
        model_provider.add_response(PresetResponse::with_events([
            PresetEvent::text("Hello!"),
        ]));
        let sink = RecordingSink::default();

        let mut session = SessionBuilder::with_model_provider(model_provider)
            .with_sink(sink.clone())
            .with_mode(Mode::Blocking)
            .build()
            .unwrap();
        assert_eq!(session.mode(), Mode::Blocking);

        session.respond("Hi").await.unwrap();
        assert_eq!(sink.outputs(), vec!["send:Hello!".to_owned()]);
    }

    #[tokio::test]
    async fn test_agent_errors_are_surfaced() {
        let mut model_provider = TestModelProvider::default();
        model_provider.add_response(clock_round());
        let sink = RecordingSink::default();

        let mut session = SessionBuilder::with_model_provider(model_provider)
            .with_sink(sink.clone())
            .with_max_rounds(1)
            .build()
            .unwrap();

        let err = session.respond("What time is it?").await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Agent(luna_core::Error::RoundLimitExceeded { limit: 1 })
        ));
        assert!(sink.outputs().is_empty());
    }

    #[tokio::test]
    async fn test_tool_notices() {
        let mut model_provider = TestModelProvider::default();
        model_provider.add_response(clock_round());
        model_provider.add_response(PresetResponse::with_events([
            PresetEvent::text("Done."),
        ]));
        let sink = RecordingSink::default();

        let mut session = SessionBuilder::with_model_provider(model_provider)
            .with_sink(sink.clone())
            .with_tool_notices(true)
            .build()
            .unwrap();

        session.respond("Time?").await.unwrap();
        assert_eq!(
            sink.outputs(),
            vec!["stream:[Tool]: get_current_in_local_time\nDone.".to_owned()]
        );
    }
}
