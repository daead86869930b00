use std::sync::Arc;

use luna_model::{ModelMessage, ModelProvider};

use super::Agent;
use crate::conversation::Conversation;
use crate::model_client::{ModelClient, RetryPolicy};
use crate::tool::{Executor as ToolExecutor, RegistryError, Tool, ToolRegistry};

/// How many model requests one invocation may issue by default.
pub const DEFAULT_MAX_ROUNDS: usize = 10;

/// [`Agent`] builder.
pub struct AgentBuilder {
    name: String,
    model_client: ModelClient,
    registry: Arc<ToolRegistry>,
    system_prompt: Option<String>,
    max_rounds: usize,
    tool_notices: bool,
}

impl AgentBuilder {
    /// Creates a new builder with the specified model provider.
    #[inline]
    pub fn with_model_provider<P: ModelProvider + 'static>(
        provider: P,
    ) -> Self {
        Self {
            name: "agent".to_owned(),
            model_client: ModelClient::new(provider),
            registry: Default::default(),
            system_prompt: None,
            max_rounds: DEFAULT_MAX_ROUNDS,
            tool_notices: false,
        }
    }

    /// Sets the name used in logs.
    #[inline]
    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    /// Uses a shared tool registry, replacing any tool registered so far.
    #[inline]
    pub fn with_registry(mut self, registry: Arc<ToolRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Registers a tool.
    ///
    /// If the registry is shared with other builders or agents, it is
    /// copied first.
    #[inline]
    pub fn with_tool<T: Tool>(mut self, tool: T) -> Result<Self, RegistryError> {
        Arc::make_mut(&mut self.registry).register(tool)?;
        Ok(self)
    }

    /// Seeds the conversation with a system message.
    #[inline]
    pub fn with_system_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Sets how many model requests one invocation may issue.
    ///
    /// With `0`, every invocation fails before contacting the model.
    #[inline]
    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    /// Makes [`Agent::stream_chat`] announce each tool before running it.
    #[inline]
    pub fn with_tool_notices(mut self, enabled: bool) -> Self {
        self.tool_notices = enabled;
        self
    }

    /// Sets how rate-limited requests are retried.
    #[inline]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.model_client.set_retry_policy(policy);
        self
    }

    /// Builds the agent.
    pub fn build(self) -> Agent {
        let AgentBuilder {
            name,
            model_client,
            registry,
            system_prompt,
            max_rounds,
            tool_notices,
        } = self;

        let mut conversation = Conversation::default();
        if let Some(prompt) = system_prompt {
            conversation.append(ModelMessage::System(prompt));
        }
        debug!("[{name}] built with tools: {registry:?}");

        Agent {
            name,
            model_client,
            tool_executor: ToolExecutor::new(registry),
            conversation,
            max_rounds,
            tool_notices,
        }
    }
}
