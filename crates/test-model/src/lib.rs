//! A local fake model for testing purpose.

mod preset;

use std::collections::{BTreeMap, VecDeque};
use std::error::Error as StdError;
use std::fmt::{self, Debug, Display, Formatter};
use std::future::ready;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, ready};
use std::time::Duration;

use luna_model::{
    AssistantMessage, ErrorKind, ModelProvider, ModelProviderError,
    ModelRequest, ModelResponse, ModelResponseEvent, ToolCallRequest,
};
use tokio::time::{Sleep, sleep};

pub use preset::*;

#[derive(Debug)]
pub struct Error {
    message: &'static str,
    kind: ErrorKind,
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)
    }
}

impl StdError for Error {}

impl ModelProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

pub struct TestModelResponse {
    events: VecDeque<ModelResponseEvent>,
    delay: Duration,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl ModelResponse for TestModelResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.get_mut();

        if let Some(sleep) = &mut this.sleep {
            ready!(sleep.as_mut().poll(cx));
            this.sleep = None;
            return Poll::Ready(Ok(this.events.pop_front()));
        }
        if this.events.is_empty() {
            // In case this method is called after completion.
            return Poll::Ready(Ok(None));
        }
        this.sleep = Some(Box::pin(sleep(this.delay)));
        Pin::new(this).poll_next_event(cx)
    }
}

struct ScriptStep {
    response: PresetResponse,
    failures: PresetFailures,
}

#[derive(Default)]
struct Script {
    steps: VecDeque<ScriptStep>,
    requests: Vec<ModelRequest>,
}

/// A local fake model for testing purpose.
///
/// Before sending requests, you need to setup the conversation script, which
/// is how the model should respond to each request. Every request (streamed
/// or blocking) consumes the next response in the script, and is recorded so
/// that tests can inspect what the engine sent. If there are not enough
/// responses in the script, an error will be returned.
///
/// Clones share the same script.
///
/// # Note
///
/// This type is not optimized for production use, there are heavy memory
/// copies involved. You should only use it for testing.
#[derive(Clone, Default)]
pub struct TestModelProvider {
    script: Arc<Mutex<Script>>,
    delay: Option<Duration>,
}

impl TestModelProvider {
    /// Appends a response to the script.
    #[inline]
    pub fn add_response(&mut self, response: PresetResponse) {
        let failures = response.failures;
        self.lock().steps.push_back(ScriptStep { response, failures });
    }

    /// Sets the delay before each streamed event.
    #[inline]
    pub fn set_delay(&mut self, duration: Duration) {
        self.delay = Some(duration);
    }

    /// Returns every request received so far, failed attempts included.
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.lock().requests.clone()
    }

    /// Returns the number of responses not consumed yet.
    pub fn remaining(&self) -> usize {
        self.lock().steps.len()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_response(
        &self,
        req: &ModelRequest,
    ) -> Result<PresetResponse, Error> {
        let mut script = self.lock();
        script.requests.push(req.clone());

        let Some(step) = script.steps.front_mut() else {
            return Err(Error {
                message: "not enough steps",
                kind: ErrorKind::Other,
            });
        };
        match step.failures {
            PresetFailures::Always => {
                return Err(Error {
                    message: "preset failure",
                    kind: ErrorKind::RateLimitExceeded,
                });
            }
            PresetFailures::Times(times) if times > 0 => {
                step.failures = PresetFailures::Times(times - 1);
                return Err(Error {
                    message: "preset failure",
                    kind: ErrorKind::RateLimitExceeded,
                });
            }
            PresetFailures::Times(_) | PresetFailures::Never => {}
        }

        script
            .steps
            .pop_front()
            .map(|step| step.response)
            .ok_or(Error {
                message: "not enough steps",
                kind: ErrorKind::Other,
            })
    }
}

impl Debug for TestModelProvider {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestModelProvider")
            .field("remaining", &self.remaining())
            .field("delay", &self.delay)
            .finish()
    }
}

impl ModelProvider for TestModelProvider {
    type Error = crate::Error;
    type Response = TestModelResponse;

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        let delay = self.delay.unwrap_or(Duration::from_millis(1));
        let resp = self.next_response(req).map(|preset| {
            let mut events: VecDeque<_> = preset
                .events
                .iter()
                .map(|event| match event {
                    PresetEvent::MessageDelta(text) => {
                        ModelResponseEvent::TextFragment(text.clone())
                    }
                    PresetEvent::ToolCall(fragment) => {
                        ModelResponseEvent::ToolCallFragment(fragment.clone())
                    }
                    PresetEvent::Completed(reason) => {
                        ModelResponseEvent::RoundComplete(*reason)
                    }
                })
                .collect();
            if !preset.has_explicit_completion() {
                events.push_back(ModelResponseEvent::RoundComplete(
                    preset.finish_reason(),
                ));
            }
            TestModelResponse {
                events,
                delay,
                sleep: None,
            }
        });
        ready(resp)
    }

    fn send_blocking(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<AssistantMessage, Self::Error>> + Send + 'static
    {
        ready(self.next_response(req).map(|preset| collapse(&preset)))
    }
}

/// Folds a preset into the message a non-streaming call would return.
///
/// This mirrors `luna_core::accumulator`, which can't be used from here
/// since the engine depends on this crate for its tests. The engine checks
/// that both agree on the same preset.
fn collapse(preset: &PresetResponse) -> AssistantMessage {
    let mut text = String::new();
    let mut calls: BTreeMap<u32, ToolCallRequest> = BTreeMap::new();
    for event in &preset.events {
        match event {
            PresetEvent::MessageDelta(delta) => text.push_str(delta),
            PresetEvent::ToolCall(fragment) => {
                let call =
                    calls.entry(fragment.index).or_insert(ToolCallRequest {
                        id: String::new(),
                        name: String::new(),
                        arguments: String::new(),
                    });
                if let Some(id) = &fragment.id {
                    call.id = id.clone();
                }
                if let Some(name) = &fragment.name {
                    call.name.push_str(name);
                }
                if let Some(arguments) = &fragment.arguments {
                    call.arguments.push_str(arguments);
                }
            }
            PresetEvent::Completed(_) => {}
        }
    }
    let tool_calls: Vec<_> = calls
        .into_iter()
        .map(|(index, mut call)| {
            if call.id.is_empty() {
                call.id = format!("call_{index}");
            }
            call
        })
        .collect();
    AssistantMessage {
        content: if text.is_empty() && !tool_calls.is_empty() {
            None
        } else {
            Some(text)
        },
        tool_calls,
    }
}

#[cfg(test)]
mod tests {
    use std::future::poll_fn;
    use std::pin::pin;

    use luna_model::{ModelFinishReason, ModelMessage, ToolCallFragment};

    use super::*;

    async fn collect_response(
        resp: TestModelResponse,
    ) -> (String, Vec<ToolCallFragment>, ModelFinishReason) {
        let mut resp = pin!(resp);
        let mut msg = String::new();
        let mut fragments = vec![];
        loop {
            let event = poll_fn(|cx| resp.as_mut().poll_next_event(cx))
                .await
                .unwrap()
                .unwrap();
            match event {
                ModelResponseEvent::RoundComplete(reason) => {
                    assert_eq!(
                        poll_fn(|cx| resp.as_mut().poll_next_event(cx))
                            .await
                            .unwrap(),
                        None
                    );
                    return (msg, fragments, reason);
                }
                ModelResponseEvent::TextFragment(delta) => {
                    msg.push_str(&delta);
                }
                ModelResponseEvent::ToolCallFragment(fragment) => {
                    fragments.push(fragment)
                }
            }
        }
    }

    fn request(text: &str) -> ModelRequest {
        ModelRequest {
            messages: vec![ModelMessage::User(text.to_owned())],
            tools: vec![],
        }
    }

    #[tokio::test]
    async fn test_send_request() {
        let mut provider = TestModelProvider::default();
        provider.add_response(PresetResponse::with_events([
            PresetEvent::text("Hello, "),
            PresetEvent::text("world!"),
        ]));
        provider.add_response(PresetResponse::with_events([
            PresetEvent::text("Sure, let me take a look."),
            PresetEvent::tool_call(0, "call_1", "read_file", r#"{"filename":"#),
            PresetEvent::arguments(0, r#""todo.txt"}"#),
        ]));

        let resp = provider.send_request(&request("Hi")).await.unwrap();
        let (msg, fragments, reason) = collect_response(resp).await;
        assert_eq!(msg, "Hello, world!");
        assert!(fragments.is_empty());
        assert_eq!(reason, ModelFinishReason::Stop);

        let resp = provider
            .send_request(&request("Check my todo"))
            .await
            .unwrap();
        let (msg, fragments, reason) = collect_response(resp).await;
        assert_eq!(msg, "Sure, let me take a look.");
        assert_eq!(fragments.len(), 2);
        assert_eq!(reason, ModelFinishReason::ToolCalls);

        assert_eq!(provider.requests().len(), 2);
        assert_eq!(provider.remaining(), 0);
        assert!(provider.send_request(&request("More")).await.is_err());
    }

    #[tokio::test]
    async fn test_send_blocking() {
        let mut provider = TestModelProvider::default();
        provider.add_response(PresetResponse::with_events([
            PresetEvent::tool_call(1, "call_b", "b", "{}"),
            PresetEvent::tool_call(0, "call_a", "a", r#"{"x":"#),
            PresetEvent::arguments(0, "1}"),
        ]));

        let msg = provider.send_blocking(&request("Hi")).await.unwrap();
        assert_eq!(msg.content, None);
        assert_eq!(msg.tool_calls.len(), 2);
        assert_eq!(msg.tool_calls[0].id, "call_a");
        assert_eq!(msg.tool_calls[0].arguments, r#"{"x":1}"#);
        assert_eq!(msg.tool_calls[1].name, "b");
    }

    #[tokio::test]
    async fn test_failures() {
        let mut provider = TestModelProvider::default();
        provider.add_response(
            PresetResponse::with_events([PresetEvent::text("ok")])
                .with_failures(1),
        );

        let err = provider.send_blocking(&request("Hi")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RateLimitExceeded);
        let msg = provider.send_blocking(&request("Hi")).await.unwrap();
        assert_eq!(msg.text(), "ok");

        provider.add_response(
            PresetResponse::with_events([PresetEvent::text("never")])
                .always_rate_limited(),
        );
        for _ in 0..3 {
            assert!(provider.send_blocking(&request("Hi")).await.is_err());
        }
        assert_eq!(provider.remaining(), 1);
    }
}
