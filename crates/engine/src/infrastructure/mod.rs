//! Infrastructure implementations.
//!
//! Port traits for the engine's collaborators, and the adapters shipped with it.

pub mod clock;
pub mod ollama;
pub mod ports;
pub mod prompt_builder;
pub mod response_parser;
