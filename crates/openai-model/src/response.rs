use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use luna_model::{ErrorKind, ModelResponse, ModelResponseEvent};
use pin_project_lite::pin_project;

use crate::Error;
use crate::io::Sse;
use crate::proto::{ChatCompletionChunk, ToolCallIndexer};

struct StreamState {
    sse: Sse,
    // Events decoded from the last chunk but not yet handed out. One chunk
    // may carry text, several tool call fragments and a finish reason.
    pending: VecDeque<ModelResponseEvent>,
    indexer: ToolCallIndexer,
    done: bool,
}

type PinnedFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type NextEvent = Result<(Option<ModelResponseEvent>, StreamState), Error>;

pin_project! {
    /// A streamed chat completion.
    ///
    /// Events are handed out in the order the server sent them. Tool calls
    /// are not assembled here, each delta becomes one fragment event.
    pub struct OpenAIResponse {
        next_event_fut: Option<PinnedFuture<NextEvent>>,
    }
}

impl OpenAIResponse {
    #[inline]
    pub fn from_sse(sse: Sse) -> Self {
        let state = StreamState {
            sse,
            pending: VecDeque::new(),
            indexer: ToolCallIndexer::default(),
            done: false,
        };
        Self {
            next_event_fut: Some(Box::pin(next_event(state))),
        }
    }
}

impl ModelResponse for OpenAIResponse {
    type Error = crate::Error;

    fn poll_next_event(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<ModelResponseEvent>, Self::Error>> {
        let this = self.project();
        let Some(next_event_fut) = this.next_event_fut else {
            return Poll::Ready(Ok(None));
        };
        let (event, state) = match ready!(next_event_fut.as_mut().poll(cx)) {
            Ok((Some(event), state)) => (event, state),
            Ok((None, _)) => {
                *this.next_event_fut = None;
                return Poll::Ready(Ok(None));
            }
            Err(err) => {
                *this.next_event_fut = None;
                return Poll::Ready(Err(err));
            }
        };

        *this.next_event_fut = Some(Box::pin(next_event(state)));
        Poll::Ready(Ok(Some(event)))
    }
}

async fn next_event(mut state: StreamState) -> NextEvent {
    loop {
        if let Some(event) = state.pending.pop_front() {
            return Ok((Some(event), state));
        }
        if state.done {
            return Ok((None, state));
        }

        let sse_event = match state.sse.next_event().await {
            Ok(Some(event)) => event,
            Ok(None) => {
                state.done = true;
                continue;
            }
            Err(err) => {
                return Err(Error::new(format!("{err}"), ErrorKind::Other));
            }
        };
        trace!("got sse event: {sse_event}");
        if sse_event == "[DONE]" {
            state.done = true;
            continue;
        }

        let chunk = serde_json::from_str::<ChatCompletionChunk>(&sse_event)
            .map_err(|err| {
                Error::new(format!("malformed chunk: {err}"), ErrorKind::Other)
            })?;
        if let Some(usage) = &chunk.usage {
            debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                total_tokens = usage.total_tokens,
                "token usage"
            );
        }
        let events = chunk.into_events(&mut state.indexer);
        state.pending.extend(events);
    }
}

#[cfg(test)]
mod tests {
    use std::future::poll_fn;
    use std::pin::pin;

    use bytes::Bytes;
    use luna_model::{ModelFinishReason, ToolCallFragment};

    use super::*;
    use crate::io::Chunks;

    async fn collect(chunks: Vec<Bytes>) -> Result<Vec<ModelResponseEvent>, Error> {
        let sse = Sse::new(Chunks::from_vec_deque(chunks.into()));
        let mut resp = pin!(OpenAIResponse::from_sse(sse));
        let mut events = vec![];
        while let Some(event) =
            poll_fn(|cx| resp.as_mut().poll_next_event(cx)).await?
        {
            events.push(event);
        }
        Ok(events)
    }

    #[tokio::test]
    async fn test_tool_call_stream() {
        let events = collect(vec![Bytes::from_static(include_bytes!(
            "../fixtures/stream_tool_calls.txt"
        ))])
        .await
        .unwrap();

        let text: String = events
            .iter()
            .filter_map(|event| match event {
                ModelResponseEvent::TextFragment(text) => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(text, "Let me check the time.");

        let fragments: Vec<&ToolCallFragment> = events
            .iter()
            .filter_map(|event| match event {
                ModelResponseEvent::ToolCallFragment(fragment) => {
                    Some(fragment)
                }
                _ => None,
            })
            .collect();
        assert_eq!(fragments.len(), 4);
        assert_eq!(fragments[0].id.as_deref(), Some("call_utc"));
        assert_eq!(fragments[1].arguments.as_deref(), Some("{\"utc\":"));
        assert_eq!(fragments[2].id, None);
        assert_eq!(fragments[3].index, 1);

        assert_eq!(
            events.last(),
            Some(&ModelResponseEvent::RoundComplete(
                ModelFinishReason::ToolCalls
            ))
        );
    }

    #[tokio::test]
    async fn test_stream_without_done_marker() {
        let events = collect(vec![
            Bytes::from_static(
                b"data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"},",
            ),
            Bytes::from_static(b"\"finish_reason\":null}]}\n\n"),
        ])
        .await
        .unwrap();
        assert_eq!(
            events,
            vec![ModelResponseEvent::TextFragment("Hi".to_owned())]
        );
    }

    #[tokio::test]
    async fn test_malformed_chunk() {
        let err = collect(vec![Bytes::from_static(b"data: {oops}\n\n")])
            .await
            .unwrap_err();
        assert!(err.message().starts_with("malformed chunk"));
        assert_eq!(luna_model::ModelProviderError::kind(&err), ErrorKind::Other);
    }
}
