//! Conversation-related types.

use luna_model::ModelMessage;

/// An append-only, ordered log of messages.
///
/// The log is replayed to the model on every round. It doesn't enforce any
/// alternation between roles, the agent appends tool results right after
/// the assistant message whose calls they answer.
#[derive(Clone, Default, Debug)]
pub struct Conversation {
    messages: Vec<ModelMessage>,
}

impl Conversation {
    /// Appends a message to the end of the log.
    #[inline]
    pub fn append(&mut self, message: ModelMessage) {
        trace!("appending a {:?} message", message.role());
        self.messages.push(message);
    }

    /// Returns an owned copy of the log, suitable for sending.
    #[inline]
    pub fn snapshot(&self) -> Vec<ModelMessage> {
        self.messages.clone()
    }

    /// Returns the messages in order.
    #[inline]
    pub fn messages(&self) -> &[ModelMessage] {
        &self.messages
    }

    /// Returns the number of messages.
    #[inline]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns `true` if the log has no messages.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Returns the latest message.
    #[inline]
    pub fn last(&self) -> Option<&ModelMessage> {
        self.messages.last()
    }

    /// Returns the ids of the latest assistant tool calls that have no
    /// matching tool message after them.
    pub fn unanswered_tool_calls(&self) -> Vec<&str> {
        let Some(position) = self.messages.iter().rposition(|msg| {
            matches!(msg, ModelMessage::Assistant(msg) if msg.has_tool_calls())
        }) else {
            return vec![];
        };
        let ModelMessage::Assistant(assistant) = &self.messages[position]
        else {
            return vec![];
        };
        let answered: Vec<&str> = self.messages[position + 1..]
            .iter()
            .filter_map(|msg| match msg {
                ModelMessage::Tool(result) => Some(result.id.as_str()),
                _ => None,
            })
            .collect();
        assistant
            .tool_calls
            .iter()
            .map(|call| call.id.as_str())
            .filter(|id| !answered.contains(id))
            .collect()
    }
}
