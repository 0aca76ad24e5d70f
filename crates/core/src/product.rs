//! Loan product records and match output

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::field::FieldValue;

/// A loan product parsed from a lender document
///
/// Built once at catalog load and shared read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub name: String,
    pub lender: String,
    /// Annual interest rate in percent
    pub interest_rate: f64,
    #[serde(default)]
    pub loan_amount_max: Option<f64>,
    /// Maximum term in months
    #[serde(default)]
    pub loan_term: Option<u32>,
    #[serde(default)]
    pub abn_years_min: Option<u32>,
    #[serde(default)]
    pub gst_years_min: Option<u32>,
    #[serde(default)]
    pub credit_score_min: Option<u32>,
    /// `Some(true)` requires a property owner, `Some(false)` a non-owner
    #[serde(default)]
    pub property_required: Option<bool>,
    #[serde(default)]
    pub fees: BTreeMap<String, f64>,
}

impl Product {
    /// Create a product with only a rate; requirements default to undeclared
    pub fn new(name: impl Into<String>, lender: impl Into<String>, interest_rate: f64) -> Self {
        Self {
            name: name.into(),
            lender: lender.into(),
            interest_rate,
            loan_amount_max: None,
            loan_term: None,
            abn_years_min: None,
            gst_years_min: None,
            credit_score_min: None,
            property_required: None,
            fees: BTreeMap::new(),
        }
    }

    /// Fees charged once (establishment, documentation, ...)
    pub fn fixed_fees(&self) -> f64 {
        self.fees
            .iter()
            .filter(|(name, _)| !is_periodic_fee(name))
            .map(|(_, amount)| amount)
            .sum()
    }

    /// Fees charged every month
    pub fn monthly_fees(&self) -> f64 {
        self.fees
            .iter()
            .filter(|(name, _)| is_periodic_fee(name))
            .map(|(_, amount)| amount)
            .sum()
    }

    /// One-line summary used in prompts and logs
    pub fn summary(&self) -> String {
        let mut parts = vec![format!("{:.2}%", self.interest_rate)];
        if let Some(max) = self.loan_amount_max {
            parts.push(format!("max ${:.0}", max));
        }
        if let Some(term) = self.loan_term {
            parts.push(format!("term {} months", term));
        }
        if let Some(abn) = self.abn_years_min {
            parts.push(format!("ABN {}+ years", abn));
        }
        if let Some(gst) = self.gst_years_min {
            parts.push(format!("GST {}+ years", gst));
        }
        if let Some(score) = self.credit_score_min {
            parts.push(format!("credit score {}+", score));
        }
        match self.property_required {
            Some(true) => parts.push("property owner".to_string()),
            Some(false) => parts.push("non-property owner".to_string()),
            None => {},
        }
        format!("{} ({}): {}", self.name, self.lender, parts.join(", "))
    }
}

fn is_periodic_fee(name: &str) -> bool {
    name.contains("monthly")
}

/// Outcome of checking one product requirement against the profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequirementCheck {
    pub required: FieldValue,
    pub actual: Option<FieldValue>,
    pub met: bool,
}

/// A product evaluated against a customer profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductMatch {
    pub product: String,
    pub lender: String,
    pub interest_rate: f64,
    pub comparison_rate: f64,
    pub monthly_payment: Option<f64>,
    /// Human-readable unmet requirements, e.g. "need 2 years ABN, have 1"
    pub gaps: Vec<String>,
    pub all_requirements_met: bool,
    pub eligibility_detail: BTreeMap<String, RequirementCheck>,
    /// Optional rationale supplied by the product-matching oracle
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fee_split() {
        let mut product = Product::new("Prime", "Acme", 6.89);
        product.fees.insert("establishment_fee".into(), 495.0);
        product.fees.insert("monthly_account_fee".into(), 8.0);
        product.fees.insert("documentation_fee".into(), 100.0);

        assert_eq!(product.fixed_fees(), 595.0);
        assert_eq!(product.monthly_fees(), 8.0);
    }

    #[test]
    fn test_summary_lists_declared_requirements() {
        let mut product = Product::new("Prime", "Acme", 6.89);
        product.credit_score_min = Some(600);
        product.property_required = Some(true);

        let summary = product.summary();
        assert!(summary.contains("6.89%"));
        assert!(summary.contains("credit score 600+"));
        assert!(summary.contains("property owner"));
        assert!(!summary.contains("ABN"));
    }
}
