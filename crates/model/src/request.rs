use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::response::ToolCallRequest;

/// A request to be sent to the model provider.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ModelRequest {
    /// The input messages, oldest first.
    pub messages: Vec<ModelMessage>,
    /// Tools that are available to the model.
    pub tools: Vec<ModelTool>,
}

/// The role of a message author.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions.
    System,
    /// The human on the other side.
    User,
    /// The model.
    Assistant,
    /// A local tool answering a tool call.
    Tool,
}

/// A complete message.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ModelMessage {
    /// The system instructions.
    System(String),
    /// A user input text.
    User(String),
    /// A message produced by the model.
    Assistant(AssistantMessage),
    /// A tool call result.
    Tool(ToolCallResult),
}

impl ModelMessage {
    /// Creates a text-only assistant message.
    #[inline]
    pub fn assistant<S: Into<String>>(content: S) -> Self {
        Self::Assistant(AssistantMessage {
            content: Some(content.into()),
            tool_calls: vec![],
        })
    }

    /// Creates a tool result message answering the tool call `id`.
    #[inline]
    pub fn tool<S1: Into<String>, S2: Into<String>>(id: S1, content: S2) -> Self {
        Self::Tool(ToolCallResult {
            id: id.into(),
            content: content.into(),
        })
    }

    /// Returns the role of the message author.
    #[inline]
    pub fn role(&self) -> Role {
        match self {
            ModelMessage::System(_) => Role::System,
            ModelMessage::User(_) => Role::User,
            ModelMessage::Assistant(_) => Role::Assistant,
            ModelMessage::Tool(_) => Role::Tool,
        }
    }
}

/// A message produced by the model.
///
/// `tool_calls` is only non-empty when the model asked for tools in this
/// message, in which case `content` may be absent.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct AssistantMessage {
    /// The text of the message.
    pub content: Option<String>,
    /// Tool calls requested by the model, in the order they were issued.
    pub tool_calls: Vec<ToolCallRequest>,
}

impl AssistantMessage {
    /// Returns the text of the message, or an empty string.
    #[inline]
    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or_default()
    }

    /// Returns `true` if the model requested tools in this message.
    #[inline]
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// The result of calling a tool.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ToolCallResult {
    /// The identifier of the tool call request this result answers.
    pub id: String,
    /// The result of the tool call.
    pub content: String,
}

/// Describes a tool that can be used by the model.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ModelTool {
    /// Name of the tool.
    pub name: String,
    /// Description of the tool.
    pub description: String,
    /// Parameters definition of the tool.
    ///
    /// For most model providers, the parameters should typically be
    /// defined by a [JSON schema](https://json-schema.org/).
    pub parameters: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roles() {
        assert_eq!(ModelMessage::System("x".to_owned()).role(), Role::System);
        assert_eq!(ModelMessage::User("x".to_owned()).role(), Role::User);
        assert_eq!(ModelMessage::assistant("x").role(), Role::Assistant);
        assert_eq!(ModelMessage::tool("call_0", "x").role(), Role::Tool);
    }

    #[test]
    fn test_assistant_text() {
        let msg = AssistantMessage {
            content: None,
            tool_calls: vec![ToolCallRequest {
                id: "call_0".to_owned(),
                name: "clock".to_owned(),
                arguments: "{}".to_owned(),
            }],
        };
        assert_eq!(msg.text(), "");
        assert!(msg.has_tool_calls());
    }
}
