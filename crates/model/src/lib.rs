//! An abstraction layer for LLM providers.
//!
//! This crate establishes the protocol the conversation engine uses to talk
//! to a model provider: the messages it replays on every round, the tool
//! definitions it advertises, and the incremental events a streamed response
//! is made of.
//!
//! Types in this crate don't define any behavior, instead they are the
//! constraints that the implementors should adhere to. Reassembling the
//! streamed fragments is the engine's job, a provider only has to forward
//! them in arrival order.

#![deny(missing_docs)]

mod error;
mod provider;
mod request;
mod response;

pub use error::*;
pub use provider::*;
pub use request::*;
pub use response::*;
