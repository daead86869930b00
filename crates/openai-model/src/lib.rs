//! A model provider for OpenAI-compatible chat completion APIs.

#[macro_use]
extern crate tracing;

mod config;
mod io;
mod proto;
mod response;

use std::error::Error as StdError;
use std::fmt::{self, Display};
use std::sync::Arc;

use luna_model::{
    AssistantMessage, ErrorKind, ModelProvider, ModelProviderError,
    ModelRequest,
};
use mime::Mime;
use reqwest::{Client, RequestBuilder, Response, StatusCode, header};

pub use config::{OpenAIConfig, OpenAIConfigBuilder};
use io::{Chunks, Sse};
use proto::{ChatCompletion, ErrorBody};
pub use response::OpenAIResponse;

/// Error type for [`OpenAIProvider`].
#[derive(Debug)]
pub struct Error {
    message: String,
    kind: ErrorKind,
}

impl Error {
    fn new(message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }

    /// Returns the error message.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl StdError for Error {}

impl ModelProviderError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::new(format!("request failed: {err}"), ErrorKind::Other)
    }
}

/// OpenAI-compatible model provider.
#[derive(Clone, Debug)]
pub struct OpenAIProvider {
    client: Client,
    config: Arc<OpenAIConfig>,
}

impl OpenAIProvider {
    /// Creates a new `OpenAIProvider` with the given configuration.
    #[inline]
    pub fn new(config: OpenAIConfig) -> Self {
        Self {
            client: Client::new(),
            config: Arc::new(config),
        }
    }

    /// Returns the configuration this provider was created with.
    #[inline]
    pub fn config(&self) -> &OpenAIConfig {
        &self.config
    }

    fn post(&self, accept: &'static str) -> RequestBuilder {
        self.client
            .post(self.config.endpoint())
            .bearer_auth(&self.config.api_key)
            .header(header::ACCEPT, accept)
            .timeout(self.config.timeout)
    }
}

impl ModelProvider for OpenAIProvider {
    type Error = Error;
    type Response = OpenAIResponse;

    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static
    {
        let body = proto::create_request(req, &self.config, true);
        debug!(
            model = self.config.model(),
            messages = req.messages.len(),
            tools = req.tools.len(),
            "sending streamed request"
        );
        let resp_fut = self.post("text/event-stream").json(&body).send();

        async move {
            let resp = check_status(resp_fut.await?).await?;

            let content_type = resp
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok());
            let is_event_stream = content_type
                .and_then(|v| v.parse().ok())
                .map(|m: Mime| {
                    m.type_() == mime::TEXT && m.subtype() == "event-stream"
                })
                .unwrap_or(false);
            if !is_event_stream {
                return Err(Error::new(
                    format!("unexpected content type: {content_type:?}"),
                    ErrorKind::Other,
                ));
            }

            let sse = Sse::new(Chunks::from_response(resp));
            Ok(OpenAIResponse::from_sse(sse))
        }
    }

    fn send_blocking(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<AssistantMessage, Self::Error>> + Send + 'static
    {
        let body = proto::create_request(req, &self.config, false);
        debug!(
            model = self.config.model(),
            messages = req.messages.len(),
            tools = req.tools.len(),
            "sending blocking request"
        );
        let resp_fut = self.post("application/json").json(&body).send();

        async move {
            let resp = check_status(resp_fut.await?).await?;
            let completion: ChatCompletion = resp.json().await.map_err(|err| {
                Error::new(
                    format!("malformed completion: {err}"),
                    ErrorKind::Other,
                )
            })?;
            if let Some(usage) = &completion.usage {
                debug!(
                    prompt_tokens = usage.prompt_tokens,
                    completion_tokens = usage.completion_tokens,
                    total_tokens = usage.total_tokens,
                    "token usage"
                );
            }
            completion.into_message().ok_or_else(|| {
                Error::new("completion has no choices", ErrorKind::Other)
            })
        }
    }
}

async fn check_status(resp: Response) -> Result<Response, Error> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ErrorBody>(&body)
        .map(|body| body.error.message)
        .unwrap_or(body);
    warn!("server responded with {status}: {detail}");
    Err(Error::new(
        format!("server responded with {status}: {detail}"),
        status_kind(status),
    ))
}

fn status_kind(status: StatusCode) -> ErrorKind {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ErrorKind::Unauthorized
        }
        StatusCode::TOO_MANY_REQUESTS => ErrorKind::RateLimitExceeded,
        _ => ErrorKind::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_kind() {
        assert_eq!(status_kind(StatusCode::UNAUTHORIZED), ErrorKind::Unauthorized);
        assert_eq!(status_kind(StatusCode::FORBIDDEN), ErrorKind::Unauthorized);
        assert_eq!(
            status_kind(StatusCode::TOO_MANY_REQUESTS),
            ErrorKind::RateLimitExceeded
        );
        assert_eq!(
            status_kind(StatusCode::INTERNAL_SERVER_ERROR),
            ErrorKind::Other
        );
    }

    #[test]
    fn test_error_body_detail() {
        let body: ErrorBody = serde_json::from_str(
            r#"{"error":{"message":"Invalid API key","type":"invalid_request_error"}}"#,
        )
        .unwrap();
        assert_eq!(body.error.message, "Invalid API key");
    }
}
