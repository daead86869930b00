use std::fmt::{self, Debug, Display};

use luna_model::{ErrorKind, ModelProviderError};

/// Errors returned by [`Agent::chat`](crate::Agent::chat) and
/// [`Agent::stream_chat`](crate::Agent::stream_chat).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The model provider failed to serve a request.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    /// The model kept requesting tools beyond the allowed number of rounds.
    #[error("the model did not finish within {limit} rounds")]
    RoundLimitExceeded {
        /// The round budget of the invocation.
        limit: usize,
    },
}

/// A type-erased error reported by a model provider.
pub struct TransportError(Box<dyn ModelProviderError>);

impl TransportError {
    pub(crate) fn new<E: ModelProviderError>(err: E) -> Self {
        Self(Box::new(err))
    }

    /// Returns the kind of the underlying provider error.
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.0.kind()
    }

    /// Returns the underlying provider error.
    #[inline]
    pub fn inner(&self) -> &(dyn ModelProviderError + 'static) {
        self.0.as_ref()
    }
}

impl Debug for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TransportError").field(&self.0).finish()
    }
}

impl Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.0, self.0.kind())
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.0.as_ref())
    }
}
