use luna_model::{ModelFinishReason, ToolCallFragment};
use serde::{Deserialize, Serialize};

/// The events in a preset response.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PresetEvent {
    #[serde(rename = "message_delta")]
    MessageDelta(String),
    #[serde(rename = "tool_call")]
    ToolCall(ToolCallFragment),
    #[serde(rename = "completed")]
    Completed(ModelFinishReason),
}

impl PresetEvent {
    /// A text fragment.
    #[inline]
    pub fn text<S: Into<String>>(text: S) -> Self {
        Self::MessageDelta(text.into())
    }

    /// The first fragment of a tool call, carrying its id and name.
    #[inline]
    pub fn tool_call<S1, S2, S3>(
        index: u32,
        id: S1,
        name: S2,
        arguments: S3,
    ) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
    {
        Self::ToolCall(ToolCallFragment {
            index,
            id: Some(id.into()),
            kind: Some("function".to_owned()),
            name: Some(name.into()),
            arguments: Some(arguments.into()),
        })
    }

    /// A follow-up fragment that only carries a piece of the arguments.
    #[inline]
    pub fn arguments<S: Into<String>>(index: u32, arguments: S) -> Self {
        Self::ToolCall(ToolCallFragment {
            index,
            arguments: Some(arguments.into()),
            ..Default::default()
        })
    }
}

/// How a preset response fails before it is served.
///
/// Failures are reported as rate limiting, which the engine retries.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PresetFailures {
    /// The response is served on the first attempt.
    #[default]
    Never,
    /// The first attempts fail, then the response is served.
    Times(u64),
    /// Every attempt fails.
    Always,
}

/// The preset response for one model round.
///
/// Unless the events contain an explicit [`PresetEvent::Completed`], the
/// response ends with a completion event whose reason depends on whether any
/// tool call fragment was emitted.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PresetResponse {
    /// Events in this response.
    pub events: Vec<PresetEvent>,
    /// How the request fails before this response is served.
    #[serde(default)]
    pub failures: PresetFailures,
}

impl PresetResponse {
    /// Creates a `PresetResponse` with the specified events.
    #[inline]
    pub fn with_events(events: impl Into<Vec<PresetEvent>>) -> Self {
        Self {
            events: events.into(),
            failures: PresetFailures::Never,
        }
    }

    /// Makes the first `times` attempts fail before the response is
    /// served.
    #[inline]
    pub fn with_failures(mut self, times: u64) -> Self {
        self.failures = PresetFailures::Times(times);
        self
    }

    /// Makes every attempt fail.
    #[inline]
    pub fn always_rate_limited(mut self) -> Self {
        self.failures = PresetFailures::Always;
        self
    }

    pub(crate) fn has_explicit_completion(&self) -> bool {
        self.events
            .iter()
            .any(|event| matches!(event, PresetEvent::Completed(_)))
    }

    pub(crate) fn finish_reason(&self) -> ModelFinishReason {
        let has_tool_call = self
            .events
            .iter()
            .any(|event| matches!(event, PresetEvent::ToolCall(_)));
        if has_tool_call {
            ModelFinishReason::ToolCalls
        } else {
            ModelFinishReason::Stop
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_deserialize() {
        let response = PresetResponse::with_events([
            PresetEvent::text("I have left a message for you."),
            PresetEvent::tool_call(
                0,
                "call_1",
                "write_file",
                r#"{"filename": "message.txt","#,
            ),
            PresetEvent::arguments(0, r#" "content": "Hello, world!"}"#),
        ]);

        let serialized = serde_json::to_string(&response).unwrap();
        let deserialized: PresetResponse =
            serde_json::from_str(&serialized).unwrap();

        assert_eq!(response, deserialized);
        assert_eq!(deserialized.failures, PresetFailures::Never);
        assert_eq!(response.finish_reason(), ModelFinishReason::ToolCalls);
        assert!(!response.has_explicit_completion());
    }
}
