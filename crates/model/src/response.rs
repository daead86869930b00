use std::pin::Pin;
use std::task::{self, Poll};

use serde::{Deserialize, Serialize};

use crate::provider::ModelProviderError;

/// A streamed response from the model provider.
pub trait ModelResponse: Sized + Send + 'static {
    /// The error type that may be returned by the provider.
    type Error: ModelProviderError;

    /// Attempts to pull out the next event from the response.
    ///
    /// # Return value
    ///
    /// There are several possible return values, each indicating a
    /// distinct response state:
    ///
    /// - `Poll::Pending` means that this response is still waiting for
    ///   the next event. Implementations will ensure that the current
    ///   task will be notified when the next event may be ready.
    /// - `Poll::Ready(Ok(Some(event)))` means the response has an event
    ///   to deliver, and may produce further events on subsequent
    ///   `poll_next_event` calls.
    /// - `Poll::Ready(Ok(None))` means the response has completed.
    /// - `Poll::Ready(Err(error))` means an error occurred while
    ///   processing the response.
    ///
    /// Calling this method after completion should always return `None`.
    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut task::Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>>;
}

/// The reason why a model round has finished.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelFinishReason {
    /// The model needs to call a tool.
    ToolCalls,
    /// The model has finished generating text.
    Stop,
    /// The output was cut by the token limit.
    Length,
    /// The output was withheld by a content filter.
    ContentFilter,
}

/// A fully assembled tool call request from the model.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// The identifier issued by the provider for this call.
    pub id: String,
    /// The name of the tool to call.
    pub name: String,
    /// The JSON-encoded arguments, exactly as the model produced them.
    ///
    /// Nothing guarantees this is valid JSON.
    pub arguments: String,
}

/// A piece of a tool call request.
///
/// Fragments belonging to the same call share the positional `index`, the
/// final `id` may only show up in a later fragment. Name and arguments are
/// split at arbitrary points and must be concatenated in arrival order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ToolCallFragment {
    /// The position of the call in the model's message.
    pub index: u32,
    /// The call identifier, if carried by this fragment.
    pub id: Option<String>,
    /// The call type (usually `function`), if carried by this fragment.
    pub kind: Option<String>,
    /// A piece of the function name.
    pub name: Option<String>,
    /// A piece of the JSON-encoded arguments.
    pub arguments: Option<String>,
}

/// The event from a model response.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelResponseEvent {
    /// Received a piece of the message text.
    TextFragment(String),
    /// Received a piece of a tool call.
    ToolCallFragment(ToolCallFragment),
    /// The round has ended.
    RoundComplete(ModelFinishReason),
}
