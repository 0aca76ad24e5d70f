//! Text processing for the loan intake agent
//!
//! This crate provides the deterministic language layer:
//! - **Field Extraction**: rule-based extraction of profile fields from
//!   customer turns, with negation handled before numeric patterns
//! - **Intent Detection**: explicit requests that steer the conversation
//!
//! # Example
//!
//! ```
//! use loan_agent_text_processing::FieldExtractor;
//!
//! let extractor = FieldExtractor::new();
//! let fields = extractor.extract("no ABN and GST, credit score 720");
//! assert_eq!(fields.len(), 3);
//! ```

pub mod intent;
pub mod slot_extraction;

pub use intent::{CustomerIntent, DetectedIntent, IntentDetector};
pub use slot_extraction::FieldExtractor;
