mod builder;

use async_stream::try_stream;
use futures_util::stream::{BoxStream, StreamExt};
use luna_model::{AssistantMessage, ModelMessage, ModelRequest};

use crate::accumulator::StreamAccumulator;
use crate::conversation::Conversation;
use crate::error::Error;
use crate::model_client::ModelClient;
use crate::tool::Executor as ToolExecutor;
pub use builder::{AgentBuilder, DEFAULT_MAX_ROUNDS};

/// An agent instance, which maintains a conversation, a model provider and
/// the tools the model may call.
///
/// Each invocation runs rounds against the model until it answers with
/// plain text: tool calls requested in a round are executed in order, and
/// their results are fed back in the next round.
pub struct Agent {
    name: String,
    model_client: ModelClient,
    tool_executor: ToolExecutor,
    conversation: Conversation,
    max_rounds: usize,
    tool_notices: bool,
}

impl Agent {
    /// Returns the name of the agent.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the conversation so far.
    #[inline]
    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Returns how many model requests one invocation may issue.
    #[inline]
    pub fn max_rounds(&self) -> usize {
        self.max_rounds
    }

    /// Sends the prompt and waits for the final answer.
    ///
    /// Every round uses a blocking model request.
    pub async fn chat(&mut self, prompt: &str) -> Result<String, Error> {
        self.append_prompt(prompt);

        let limit = self.max_rounds;
        for round in 1..=limit {
            debug!("[{}] round {round}/{limit}", self.name);
            let request = self.make_request();
            let msg = self.model_client.send_blocking(&request).await?;
            if !msg.has_tool_calls() {
                let text = msg.text().to_owned();
                self.conversation.append(ModelMessage::Assistant(msg));
                return Ok(text);
            }

            let mut results = Vec::with_capacity(msg.tool_calls.len());
            for call in &msg.tool_calls {
                results.push(self.tool_executor.execute(call).await);
            }
            self.commit_tool_round(msg, results);
        }

        warn!("[{}] round limit of {limit} exceeded", self.name);
        Err(Error::RoundLimitExceeded { limit })
    }

    /// Sends the prompt and streams the answer as it is generated.
    ///
    /// Text of every round is yielded as soon as it arrives. Nothing happens
    /// until the stream is polled, and dropping it cancels the invocation.
    /// Tool calls of an unfinished round are then never recorded.
    pub fn stream_chat(
        &mut self,
        prompt: &str,
    ) -> BoxStream<'_, Result<String, Error>> {
        let prompt = prompt.to_owned();
        Box::pin(try_stream! {
            self.append_prompt(&prompt);

            let limit = self.max_rounds;
            let mut round = 0;
            loop {
                if round == limit {
                    warn!("[{}] round limit of {limit} exceeded", self.name);
                    Err(Error::RoundLimitExceeded { limit })?;
                }
                round += 1;
                debug!("[{}] round {round}/{limit}", self.name);

                let request = self.make_request();
                let mut events = self.model_client.send_request(&request).await?;
                let mut accumulator = StreamAccumulator::new();
                while let Some(event) = events.next().await {
                    if let Some(text) = accumulator.accept(event?) {
                        yield text;
                    }
                }

                let output = accumulator.finish();
                trace!("[{}] round finished: {:?}", self.name, output.finish_reason);
                let msg = output.into_message();
                if !msg.has_tool_calls() {
                    self.conversation.append(ModelMessage::Assistant(msg));
                    break;
                }

                let mut results = Vec::with_capacity(msg.tool_calls.len());
                for call in &msg.tool_calls {
                    if self.tool_notices {
                        yield format!("[Tool]: {}\n", call.name);
                    }
                    results.push(self.tool_executor.execute(call).await);
                }
                self.commit_tool_round(msg, results);
            }
        })
    }

    fn append_prompt(&mut self, prompt: &str) {
        if prompt.is_empty() {
            debug!("[{}] empty prompt, replaying the conversation", self.name);
            return;
        }
        self.conversation.append(ModelMessage::User(prompt.to_owned()));
    }

    fn make_request(&self) -> ModelRequest {
        ModelRequest {
            messages: self.conversation.snapshot(),
            tools: self.tool_executor.definitions(),
        }
    }

    /// Records an assistant tool call message together with its answers.
    fn commit_tool_round(&mut self, msg: AssistantMessage, results: Vec<String>) {
        let ids: Vec<String> =
            msg.tool_calls.iter().map(|call| call.id.clone()).collect();
        self.conversation.append(ModelMessage::Assistant(msg));
        for (id, content) in ids.into_iter().zip(results) {
            self.conversation.append(ModelMessage::tool(id, content));
        }
        debug_assert!(self.conversation.unanswered_tool_calls().is_empty());
    }
}
