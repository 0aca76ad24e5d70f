//! Fallible oracle interfaces

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::conversation::Turn;
use crate::error::Result;
use crate::field::FieldMap;
use crate::product::Product;

/// Extracts profile fields from a window of conversation
///
/// Implementations may fail for any reason (network, status, malformed
/// output). Callers treat every error as "nothing extracted".
#[async_trait]
pub trait ExtractionOracle: Send + Sync {
    /// Extract field values from the given turns
    async fn extract(&self, window: &[Turn]) -> Result<FieldMap>;

    /// Oracle name for logging
    fn name(&self) -> &str;
}

/// A single product chosen by a [`ProductOracle`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductPick {
    pub product: String,
    #[serde(default)]
    pub lender: String,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Picks one product among candidates for a profile
#[async_trait]
pub trait ProductOracle: Send + Sync {
    async fn pick(&self, profile: &FieldMap, candidates: &[Product]) -> Result<ProductPick>;

    fn name(&self) -> &str;
}
