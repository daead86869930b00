//! An out-of-the-box assistant that assembles the conversation engine, the
//! OpenAI-compatible provider and the built-in tools.
//!
//! The crate includes a CLI tool for using in the terminal. And you can also
//! use it as a library to bring the assistant into your own host apps, with
//! your own [`OutputSink`](sink::OutputSink).

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod config;
mod session;
pub mod sink;
pub mod tools;

pub use config::{Config, ConfigError, Mode, OutputKind};
pub use session::{Session, SessionBuilder, SessionError};

/// Re-exports of [`luna_core`] crate.
pub mod core {
    pub use luna_core::*;
}
