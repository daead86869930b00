use std::error::Error;

use crate::error::ErrorKind;
use crate::request::{AssistantMessage, ModelRequest};
use crate::response::ModelResponse;

/// The error type for a model provider.
pub trait ModelProviderError: Error + Send + Sync + 'static {
    /// Returns the kind of this error.
    fn kind(&self) -> ErrorKind;
}

/// A type that represents a model provider, which is the transport the
/// engine sends its conversation through.
///
/// Once the provider is created, it should behave like a stateless object.
/// It can still have internal state (a connection pool, for example), but
/// callers should not rely on it, and the provider should be prepared for
/// being dropped anytime. Request timeouts are the provider's own business.
pub trait ModelProvider: Send + Sync {
    /// The error type that may be returned by the provider.
    type Error: ModelProviderError;

    /// The streamed response type for this provider.
    type Response: ModelResponse<Error = Self::Error>;

    /// Sends a request to the model and streams the response back as
    /// incremental events.
    fn send_request(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<Self::Response, Self::Error>> + Send + 'static;

    /// Sends a request to the model and waits for the complete message.
    fn send_blocking(
        &self,
        req: &ModelRequest,
    ) -> impl Future<Output = Result<AssistantMessage, Self::Error>> + Send + 'static;
}
