//! Shared primitives with no domain logic of their own.

pub mod streaming;

pub use streaming::{SseDecoder, SseFrame};
