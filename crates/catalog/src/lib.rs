//! Lender product catalog and matching engine
//!
//! - **Loader**: parses markdown lender documents into [`Product`] records
//! - **Catalog**: the immutable product set shared by every session
//! - **Matching**: hard eligibility filter, preference narrowing, ranking
//!   and near-miss gap analysis
//! - **Finance**: monthly repayment and comparison rate
//!
//! [`Product`]: loan_agent_core::Product

pub mod catalog;
pub mod finance;
pub mod loader;
pub mod matching;

pub use catalog::ProductCatalog;
pub use finance::{comparison_rate, monthly_payment};
pub use loader::parse_lender_document;
pub use matching::{MatchResult, MatchStatus, MatchingEngine, Preferences};

use thiserror::Error;

/// Catalog errors
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to read lender document {path}: {message}")]
    Read { path: String, message: String },

    #[error("No products loaded")]
    Empty,
}

impl From<CatalogError> for loan_agent_core::Error {
    fn from(err: CatalogError) -> Self {
        loan_agent_core::Error::Catalog(err.to_string())
    }
}
