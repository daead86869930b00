//! The conversation engine: reassembles streamed tool calls, runs the
//! execute-then-continue loop between the model and local tools, and keeps
//! the ordered message log replayed on every round.

#![deny(missing_docs)]
#![deny(clippy::missing_safety_doc)]

#[macro_use]
extern crate tracing;

pub mod accumulator;
mod agent;
pub mod conversation;
mod error;
mod model_client;
pub mod tool;

pub use agent::{Agent, AgentBuilder, DEFAULT_MAX_ROUNDS};
pub use error::{Error, TransportError};
pub use model_client::RetryPolicy;
