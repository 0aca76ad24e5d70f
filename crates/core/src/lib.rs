//! Core traits and types for the loan intake agent
//!
//! This crate provides foundational types used across all other crates:
//! - Conversation stages and turns
//! - Typed field values collected from the customer
//! - Product records and match results
//! - Oracle traits for pluggable extraction and product matching backends
//! - Error types

pub mod conversation;
pub mod error;
pub mod field;
pub mod product;
pub mod traits;

pub use conversation::{Stage, Turn, TurnRole};
pub use error::{Error, Result};
pub use field::{FieldMap, FieldValue};
pub use product::{Product, ProductMatch, RequirementCheck};
pub use traits::{ExtractionOracle, ProductOracle, ProductPick};
