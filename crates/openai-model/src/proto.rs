use luna_model::{
    AssistantMessage, ModelFinishReason, ModelMessage, ModelRequest,
    ModelResponseEvent, ModelTool, ToolCallFragment, ToolCallRequest,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::OpenAIConfig;

// ------------------------------
// Types received from the server
// ------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
pub struct FunctionDelta {
    pub name: Option<String>,
    pub arguments: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
pub struct ToolCallDelta {
    pub index: Option<u32>,
    pub id: Option<String>,
    pub r#type: Option<String>,
    pub function: Option<FunctionDelta>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
pub struct Delta {
    pub content: Option<String>,
    pub tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub delta: Delta,
    pub finish_reason: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
pub struct ChatCompletionChunk {
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
    pub usage: Option<Usage>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
pub struct CompletionMessage {
    pub content: Option<String>,
    pub tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
pub struct CompletionChoice {
    pub message: CompletionMessage,
    pub finish_reason: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
pub struct ChatCompletion {
    pub choices: Vec<CompletionChoice>,
    pub usage: Option<Usage>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
pub struct ErrorDetail {
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

// ---------------------------------------
// Types sent to (and echoed by) the server
// ---------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub r#type: String,
    pub function: FunctionCall,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
struct FunctionTool {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
struct Tool {
    r#type: &'static str,
    function: FunctionTool,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        content: Option<String>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        tool_call_id: String,
        content: String,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Tool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
    stream: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

// -----------
// Conversions
// -----------

pub fn create_request(
    req: &ModelRequest,
    config: &OpenAIConfig,
    stream: bool,
) -> ChatCompletionRequest {
    let tools: Vec<_> = req.tools.iter().map(create_tool).collect();
    ChatCompletionRequest {
        model: config.model.clone(),
        messages: req.messages.iter().map(create_message).collect(),
        tool_choice: (!tools.is_empty()).then_some("auto"),
        tools,
        stream_options: stream.then_some(StreamOptions {
            include_usage: true,
        }),
        stream,
    }
}

fn create_message(msg: &ModelMessage) -> Message {
    match msg {
        ModelMessage::System(content) => Message::System {
            content: content.clone(),
        },
        ModelMessage::User(content) => Message::User {
            content: content.clone(),
        },
        ModelMessage::Assistant(msg) => Message::Assistant {
            content: msg.content.clone(),
            tool_calls: msg
                .tool_calls
                .iter()
                .map(|call| ToolCall {
                    id: call.id.clone(),
                    r#type: "function".to_owned(),
                    function: FunctionCall {
                        name: call.name.clone(),
                        arguments: call.arguments.clone(),
                    },
                })
                .collect(),
        },
        ModelMessage::Tool(result) => Message::Tool {
            tool_call_id: result.id.clone(),
            content: result.content.clone(),
        },
    }
}

fn create_tool(tool: &ModelTool) -> Tool {
    Tool {
        r#type: "function",
        function: FunctionTool {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: tool.parameters.clone(),
        },
    }
}

pub fn finish_reason(reason: &str) -> ModelFinishReason {
    match reason {
        "tool_calls" | "function_call" => ModelFinishReason::ToolCalls,
        "length" => ModelFinishReason::Length,
        "content_filter" => ModelFinishReason::ContentFilter,
        _ => ModelFinishReason::Stop,
    }
}

/// Assigns slot indices to tool call deltas across the chunks of a stream.
///
/// Some compatible servers omit the index and stream one call after
/// another. A delta without an index continues the last call, unless it
/// carries an id that call didn't have, which starts a new slot.
#[derive(Debug, Default)]
pub struct ToolCallIndexer {
    last: Option<(u32, Option<String>)>,
    next: u32,
}

impl ToolCallIndexer {
    fn resolve(&mut self, index: Option<u32>, id: Option<&str>) -> u32 {
        let index = match (index, &self.last) {
            (Some(index), _) => index,
            (None, Some((last, last_id)))
                if id.is_none() || id == last_id.as_deref() =>
            {
                *last
            }
            (None, _) => self.next,
        };
        self.next = self.next.max(index.saturating_add(1));

        let known_id = match &self.last {
            Some((last, last_id)) if *last == index => last_id.clone(),
            _ => None,
        };
        self.last = Some((index, id.map(str::to_owned).or(known_id)));
        index
    }
}

impl ChatCompletionChunk {
    /// Splits the chunk into engine events, in the order they appear.
    pub fn into_events(
        self,
        indexer: &mut ToolCallIndexer,
    ) -> Vec<ModelResponseEvent> {
        let mut events = vec![];
        for choice in self.choices {
            if let Some(content) = choice.delta.content {
                if !content.is_empty() {
                    events.push(ModelResponseEvent::TextFragment(content));
                }
            }
            for tool_call in choice.delta.tool_calls.into_iter().flatten() {
                let (name, arguments) = match tool_call.function {
                    Some(function) => (function.name, function.arguments),
                    None => (None, None),
                };
                events.push(ModelResponseEvent::ToolCallFragment(
                    ToolCallFragment {
                        index: indexer.resolve(
                            tool_call.index,
                            tool_call.id.as_deref(),
                        ),
                        id: tool_call.id,
                        kind: tool_call.r#type,
                        name,
                        arguments,
                    },
                ));
            }
            if let Some(reason) = choice.finish_reason {
                events.push(ModelResponseEvent::RoundComplete(finish_reason(
                    &reason,
                )));
            }
        }
        events
    }
}

impl ChatCompletion {
    /// Takes the message of the first choice.
    pub fn into_message(self) -> Option<AssistantMessage> {
        let choice = self.choices.into_iter().next()?;
        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|call| ToolCallRequest {
                id: call.id,
                name: call.function.name,
                arguments: call.function.arguments,
            })
            .collect();
        Some(AssistantMessage {
            content: choice.message.content,
            tool_calls,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::OpenAIConfigBuilder;

    #[test]
    fn test_create_request() {
        let request = ModelRequest {
            messages: vec![
                ModelMessage::System("You are a helpful assistant.".to_owned()),
                ModelMessage::User("What time is it?".to_owned()),
                ModelMessage::Assistant(AssistantMessage {
                    content: None,
                    tool_calls: vec![ToolCallRequest {
                        id: "call_1".to_owned(),
                        name: "get_current_in_local_time".to_owned(),
                        arguments: "{}".to_owned(),
                    }],
                }),
                ModelMessage::tool("call_1", r#"{"time":"12:00"}"#),
            ],
            tools: vec![ModelTool {
                name: "get_current_in_local_time".to_owned(),
                description: "Get the current time.".to_owned(),
                parameters: json!({"type": "object", "properties": {}}),
            }],
        };
        let config = OpenAIConfigBuilder::with_api_key("xxx")
            .with_model("custom")
            .build();

        let body = serde_json::to_value(create_request(&request, &config, true))
            .unwrap();
        assert_eq!(
            body,
            json!({
                "model": "custom",
                "messages": [
                    {"role": "system", "content": "You are a helpful assistant."},
                    {"role": "user", "content": "What time is it?"},
                    {
                        "role": "assistant",
                        "content": null,
                        "tool_calls": [{
                            "id": "call_1",
                            "type": "function",
                            "function": {
                                "name": "get_current_in_local_time",
                                "arguments": "{}"
                            }
                        }]
                    },
                    {
                        "role": "tool",
                        "tool_call_id": "call_1",
                        "content": "{\"time\":\"12:00\"}"
                    }
                ],
                "tools": [{
                    "type": "function",
                    "function": {
                        "name": "get_current_in_local_time",
                        "description": "Get the current time.",
                        "parameters": {"type": "object", "properties": {}}
                    }
                }],
                "tool_choice": "auto",
                "stream_options": {"include_usage": true},
                "stream": true
            })
        );
    }

    #[test]
    fn test_blocking_request_without_tools() {
        let request = ModelRequest {
            messages: vec![ModelMessage::User("Hi".to_owned())],
            tools: vec![],
        };
        let config = OpenAIConfigBuilder::with_api_key("xxx").build();
        let body =
            serde_json::to_value(create_request(&request, &config, false))
                .unwrap();
        assert!(body.get("tools").is_none());
        assert!(body.get("tool_choice").is_none());
        assert!(body.get("stream_options").is_none());
        assert_eq!(body["stream"], json!(false));
    }

    #[test]
    fn test_calls_without_index() {
        let chunks = [
            json!({"choices": [{"delta": {"tool_calls": [
                {"id": "call_a", "type": "function",
                 "function": {"name": "calc", "arguments": "{\"a\":"}}
            ]}}]}),
            json!({"choices": [{"delta": {"tool_calls": [
                {"function": {"arguments": "1}"}}
            ]}}]}),
            json!({"choices": [{"delta": {"tool_calls": [
                {"id": "call_b", "type": "function",
                 "function": {"name": "get_time", "arguments": "{}"}}
            ]}}]}),
            json!({"choices": [{"delta": {"tool_calls": [
                {"id": "call_b", "function": {"arguments": ""}}
            ]}}]}),
        ];

        let mut indexer = ToolCallIndexer::default();
        let indices: Vec<u32> = chunks
            .into_iter()
            .map(|chunk| serde_json::from_value::<ChatCompletionChunk>(chunk).unwrap())
            .flat_map(|chunk| chunk.into_events(&mut indexer))
            .map(|event| match event {
                ModelResponseEvent::ToolCallFragment(fragment) => fragment.index,
                other => panic!("unexpected event: {other:?}"),
            })
            .collect();
        assert_eq!(indices, [0, 0, 1, 1]);
    }

    #[test]
    fn test_chunk_into_events() {
        let mut indexer = ToolCallIndexer::default();
        let chunk: ChatCompletionChunk = serde_json::from_value(json!({
            "id": "chatcmpl-1",
            "choices": [{
                "index": 0,
                "delta": {
                    "content": "",
                    "tool_calls": [
                        {"index": 1, "function": {"arguments": "{\"b\":"}},
                        {"id": "call_9", "type": "function",
                         "function": {"name": "calc"}}
                    ]
                },
                "finish_reason": null
            }]
        }))
        .unwrap();
        assert_eq!(
            chunk.into_events(&mut indexer),
            vec![
                ModelResponseEvent::ToolCallFragment(ToolCallFragment {
                    index: 1,
                    arguments: Some("{\"b\":".to_owned()),
                    ..Default::default()
                }),
                ModelResponseEvent::ToolCallFragment(ToolCallFragment {
                    index: 2,
                    id: Some("call_9".to_owned()),
                    kind: Some("function".to_owned()),
                    name: Some("calc".to_owned()),
                    arguments: None,
                }),
            ]
        );

        let chunk: ChatCompletionChunk = serde_json::from_value(json!({
            "choices": [{"delta": {}, "finish_reason": "length"}]
        }))
        .unwrap();
        assert_eq!(
            chunk.into_events(&mut indexer),
            vec![ModelResponseEvent::RoundComplete(ModelFinishReason::Length)]
        );

        let chunk: ChatCompletionChunk = serde_json::from_value(json!({
            "choices": [],
            "usage": {"prompt_tokens": 3, "completion_tokens": 4, "total_tokens": 7}
        }))
        .unwrap();
        assert_eq!(chunk.usage.map(|u| u.total_tokens), Some(7));
        assert!(chunk.into_events(&mut indexer).is_empty());
    }

    #[test]
    fn test_completion_into_message() {
        let completion: ChatCompletion = serde_json::from_value(json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "calc", "arguments": "{\"a\":1}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        }))
        .unwrap();
        let msg = completion.into_message().unwrap();
        assert_eq!(msg.content, None);
        assert_eq!(msg.tool_calls[0].name, "calc");
        assert_eq!(msg.tool_calls[0].arguments, "{\"a\":1}");
    }
}
