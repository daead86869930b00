//! Byte-level plumbing between the HTTP body and the JSON chunks.

mod chunks;
mod sse;

pub use chunks::{Chunks, Error as ChunksError};
pub use sse::Sse;
