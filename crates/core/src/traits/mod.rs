//! Core traits for pluggable external collaborators
//!
//! The agent depends only on these traits; concrete LLM-backed
//! implementations live in the llm crate and tests use hand-written mocks.

mod oracles;

pub use oracles::{ExtractionOracle, ProductOracle, ProductPick};
