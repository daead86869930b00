use std::sync::Arc;
use std::time::Duration;

use backoff::ExponentialBackoffBuilder;
use futures_util::future::BoxFuture;
use futures_util::stream::{self, BoxStream, StreamExt};
use luna_model::{
    AssistantMessage, ModelProvider, ModelRequest, ModelResponse,
    ModelResponseEvent,
};
use tracing::Instrument;

use crate::error::TransportError;

pub(crate) type EventStream =
    BoxStream<'static, Result<ModelResponseEvent, TransportError>>;

type OpenFuture = BoxFuture<'static, Result<EventStream, TransportError>>;
type BlockingFuture = BoxFuture<'static, Result<AssistantMessage, TransportError>>;
type StreamFn = Arc<dyn Fn(&ModelRequest) -> OpenFuture + Send + Sync>;
type BlockingFn = Arc<dyn Fn(&ModelRequest) -> BlockingFuture + Send + Sync>;

/// How rate-limited requests are retried.
///
/// Only [`ErrorKind::RateLimitExceeded`](luna_model::ErrorKind) is retried,
/// and only while opening a request. Once events are flowing, failures are
/// returned as they are.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: usize,
    /// The delay before the first retry.
    pub initial_interval: Duration,
    /// The upper bound of the delay between retries.
    pub max_interval: Duration,
}

impl RetryPolicy {
    /// A policy that never retries.
    #[inline]
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(8),
        }
    }
}

/// A wrapper around a model provider that provides a type-erased
/// interface for the other modules, and retries rate-limited requests.
#[derive(Clone)]
pub(crate) struct ModelClient {
    stream_fn: StreamFn,
    blocking_fn: BlockingFn,
    retry_policy: RetryPolicy,
}

impl ModelClient {
    pub fn new<P: ModelProvider + 'static>(provider: P) -> Self {
        // We have to erase the type `P`, since `ModelClient` doesn't have a
        // generic parameter and we don't want it either.
        let provider = Arc::new(provider);

        let stream_provider = Arc::clone(&provider);
        let stream_fn: StreamFn =
            Arc::new(move |req: &ModelRequest| -> OpenFuture {
                let fut = stream_provider.send_request(req);
                Box::pin(async move {
                    let resp = fut.await.map_err(TransportError::new)?;
                    Ok(into_event_stream(resp))
                })
            });

        let blocking_fn: BlockingFn =
            Arc::new(move |req: &ModelRequest| -> BlockingFuture {
                let fut = provider.send_blocking(req);
                Box::pin(async move { fut.await.map_err(TransportError::new) })
            });

        Self {
            stream_fn,
            blocking_fn,
            retry_policy: RetryPolicy::default(),
        }
    }

    #[inline]
    pub fn set_retry_policy(&mut self, retry_policy: RetryPolicy) {
        self.retry_policy = retry_policy;
    }

    /// Opens a streamed request.
    ///
    /// # Cancel safety
    ///
    /// This method is cancel safe. The response stops streaming further
    /// events when the returned stream is dropped.
    pub async fn send_request(
        &self,
        req: &ModelRequest,
    ) -> Result<EventStream, TransportError> {
        trace!("got a request: {req:?}");
        with_retry(self.retry_policy, || (self.stream_fn)(req))
            .instrument(debug_span!("model request", stream = true))
            .await
    }

    /// Sends a request and waits for the whole assistant message.
    pub async fn send_blocking(
        &self,
        req: &ModelRequest,
    ) -> Result<AssistantMessage, TransportError> {
        trace!("got a request: {req:?}");
        with_retry(self.retry_policy, || (self.blocking_fn)(req))
            .instrument(debug_span!("model request", stream = false))
            .await
    }
}

fn into_event_stream<R: ModelResponse>(resp: R) -> EventStream {
    let mut resp = Box::pin(resp);
    stream::poll_fn(move |cx| {
        resp.as_mut()
            .poll_next_event(cx)
            .map(|event| event.map_err(TransportError::new).transpose())
    })
    .boxed()
}

async fn with_retry<T, F, Fut>(
    policy: RetryPolicy,
    mut op: F,
) -> Result<T, TransportError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TransportError>>,
{
    let backoff = ExponentialBackoffBuilder::new()
        .with_initial_interval(policy.initial_interval)
        .with_max_interval(policy.max_interval)
        .with_max_elapsed_time(None)
        .build();

    let mut attempts = 0;
    let result = backoff::future::retry_notify(
        backoff,
        || {
            attempts += 1;
            let attempt = attempts;
            let fut = op();
            async move {
                match fut.await {
                    Ok(value) => Ok(value),
                    Err(err)
                        if err.kind().is_transient()
                            && attempt <= policy.max_retries =>
                    {
                        Err(backoff::Error::transient(err))
                    }
                    Err(err) => Err(backoff::Error::permanent(err)),
                }
            }
        },
        |err: TransportError, delay: Duration| {
            warn!("request failed ({err}), retrying in {delay:?}");
        },
    )
    .await;

    if let Err(err) = &result {
        error!("got an error: {err}");
    }
    result
}

#[cfg(test)]
mod tests {
    use luna_model::{ErrorKind, ModelMessage};
    use luna_test_model::{PresetEvent, PresetResponse, TestModelProvider};

    use super::*;
    use crate::accumulator::StreamAccumulator;

    fn request() -> ModelRequest {
        ModelRequest {
            messages: vec![ModelMessage::User("Hi".to_owned())],
            tools: vec![],
        }
    }

    fn fast_retries(max_retries: usize) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_interval: Duration::from_millis(1),
            max_interval: Duration::from_millis(2),
        }
    }

    #[tokio::test]
    async fn test_send_request() {
        let mut model_provider = TestModelProvider::default();
        model_provider.add_response(PresetResponse::with_events([
            PresetEvent::text("How "),
            PresetEvent::text("are "),
            PresetEvent::text("you?"),
        ]));
        let model_client = ModelClient::new(model_provider);

        let events: Vec<_> = model_client
            .send_request(&request())
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(events.len(), 4);
        assert!(matches!(
            events.last(),
            Some(Ok(ModelResponseEvent::RoundComplete(_)))
        ));
    }

    #[tokio::test]
    async fn test_blocking_matches_stream() {
        let preset = PresetResponse::with_events([
            PresetEvent::text("Let me see. "),
            PresetEvent::tool_call(0, "call_a", "calc", r#"{"a":"#),
            PresetEvent::tool_call(1, "call_b", "get_", ""),
            PresetEvent::arguments(0, "1}"),
            PresetEvent::text("One moment."),
        ]);
        let mut model_provider = TestModelProvider::default();
        model_provider.add_response(preset.clone());
        model_provider.add_response(preset);
        let model_client = ModelClient::new(model_provider);

        let mut events = model_client.send_request(&request()).await.unwrap();
        let mut accumulator = StreamAccumulator::new();
        while let Some(event) = events.next().await {
            accumulator.accept(event.unwrap());
        }
        let streamed = accumulator.finish().into_message();
        let blocking = model_client.send_blocking(&request()).await.unwrap();

        assert_eq!(streamed, blocking);
        assert_eq!(blocking.text(), "Let me see. One moment.");
        assert_eq!(blocking.tool_calls.len(), 2);
    }

    #[tokio::test]
    async fn test_error_handling() {
        let model_provider = TestModelProvider::default();
        let model_client = ModelClient::new(model_provider);
        let err = model_client.send_blocking(&request()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Other);
    }

    #[tokio::test]
    async fn test_retry_rate_limited() {
        let mut model_provider = TestModelProvider::default();
        model_provider.add_response(
            PresetResponse::with_events([PresetEvent::text("ok")])
                .with_failures(2),
        );
        let mut model_client = ModelClient::new(model_provider.clone());
        model_client.set_retry_policy(fast_retries(2));

        let msg = model_client.send_blocking(&request()).await.unwrap();
        assert_eq!(msg.text(), "ok");
        assert_eq!(model_provider.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up() {
        let mut model_provider = TestModelProvider::default();
        model_provider.add_response(
            PresetResponse::with_events([PresetEvent::text("never")])
                .always_rate_limited(),
        );
        let mut model_client = ModelClient::new(model_provider.clone());
        model_client.set_retry_policy(fast_retries(2));

        let err = model_client.send_request(&request()).await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::RateLimitExceeded);
        assert_eq!(model_provider.requests().len(), 3);

        model_client.set_retry_policy(RetryPolicy::none());
        assert!(model_client.send_request(&request()).await.is_err());
        assert_eq!(model_provider.requests().len(), 4);
    }

    #[tokio::test]
    async fn test_no_retry_for_other_errors() {
        let model_provider = TestModelProvider::default();
        let mut model_client = ModelClient::new(model_provider.clone());
        model_client.set_retry_policy(fast_retries(5));

        assert!(model_client.send_blocking(&request()).await.is_err());
        assert_eq!(model_provider.requests().len(), 1);
    }
}
