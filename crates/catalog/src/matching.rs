//! Matching Engine
//!
//! Evaluates every catalog product against a customer profile:
//! 1. Hard filter on declared requirements (ABN, GST, credit score, property)
//! 2. Soft narrowing by rate ceiling and monthly budget
//! 3. Ranking by rate, then lender, then product name
//! 4. Near-miss gap analysis when nothing is fully eligible
//!
//! Matching never fails. An empty catalog is reported through
//! [`MatchStatus::Error`].

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::time::Duration;

use loan_agent_config::constants::fields;
use loan_agent_core::{FieldMap, FieldValue, Product, ProductMatch, ProductOracle, RequirementCheck};

use crate::catalog::ProductCatalog;
use crate::finance::{comparison_rate, monthly_payment};

/// Overall outcome of a matching run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    FullMatch,
    NoPerfectMatch,
    NoMatch,
    Error,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::FullMatch => "full_match",
            MatchStatus::NoPerfectMatch => "no_perfect_match",
            MatchStatus::NoMatch => "no_match",
            MatchStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ranked matches; the first entry is the selected product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub status: MatchStatus,
    pub matches: Vec<ProductMatch>,
}

impl MatchResult {
    fn empty(status: MatchStatus) -> Self {
        Self {
            status,
            matches: Vec::new(),
        }
    }

    pub fn best(&self) -> Option<&ProductMatch> {
        self.matches.first()
    }

    pub fn is_full_match(&self) -> bool {
        self.status == MatchStatus::FullMatch
    }
}

/// Soft preferences used to narrow and price eligible products
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Preferences {
    pub interest_rate_ceiling: Option<f64>,
    pub monthly_budget: Option<f64>,
    pub preferred_term_months: Option<u32>,
}

impl Preferences {
    /// Preferences present in the profile, or `None` when there are none
    pub fn from_profile(profile: &FieldMap) -> Option<Self> {
        let number = |name: &str| profile.get(name).and_then(FieldValue::as_f64);
        let prefs = Self {
            interest_rate_ceiling: number(fields::INTEREST_RATE_CEILING),
            monthly_budget: number(fields::MONTHLY_BUDGET),
            preferred_term_months: number(fields::PREFERRED_TERM_MONTHS)
                .filter(|t| *t >= 1.0)
                .map(|t| t as u32),
        };
        (!prefs.is_empty()).then_some(prefs)
    }

    pub fn is_empty(&self) -> bool {
        self.interest_rate_ceiling.is_none()
            && self.monthly_budget.is_none()
            && self.preferred_term_months.is_none()
    }
}

/// Deterministic matching engine over a shared catalog
#[derive(Debug, Clone)]
pub struct MatchingEngine {
    catalog: ProductCatalog,
    near_miss_threshold: usize,
}

impl MatchingEngine {
    pub fn new(catalog: ProductCatalog, near_miss_threshold: usize) -> Self {
        Self {
            catalog,
            near_miss_threshold,
        }
    }

    pub fn catalog(&self) -> &ProductCatalog {
        &self.catalog
    }

    /// Match a profile against the catalog
    pub fn match_profile(&self, profile: &FieldMap, preferences: Option<&Preferences>) -> MatchResult {
        if self.catalog.is_empty() {
            tracing::error!("Matching against an empty catalog");
            return MatchResult::empty(MatchStatus::Error);
        }

        let evaluated: Vec<ProductMatch> = self
            .catalog
            .products()
            .iter()
            .map(|p| evaluate(p, profile, preferences))
            .collect();

        let (eligible, ineligible): (Vec<_>, Vec<_>) =
            evaluated.into_iter().partition(|m| m.all_requirements_met);

        if !eligible.is_empty() {
            let mut matches = narrow(eligible, preferences);
            matches.sort_by(rank);
            tracing::debug!(
                eligible = matches.len(),
                best = %matches[0].product,
                "Full match"
            );
            return MatchResult {
                status: MatchStatus::FullMatch,
                matches,
            };
        }

        let mut near_misses: Vec<ProductMatch> = ineligible
            .into_iter()
            .filter(|m| m.gaps.len() <= self.near_miss_threshold)
            .collect();
        if near_misses.is_empty() {
            tracing::debug!("No product within the near-miss threshold");
            return MatchResult::empty(MatchStatus::NoMatch);
        }

        near_misses.sort_by(rank);
        tracing::debug!(
            near_misses = near_misses.len(),
            best = %near_misses[0].product,
            gaps = near_misses[0].gaps.len(),
            "No perfect match"
        );
        MatchResult {
            status: MatchStatus::NoPerfectMatch,
            matches: near_misses,
        }
    }

    /// Match, then let the product oracle choose among full matches
    ///
    /// The oracle gets one attempt bounded by `timeout`. Its pick is used
    /// only when it names one of the fully eligible products; otherwise
    /// the deterministic ranking stands. Near-misses never reach the oracle.
    pub async fn match_with_oracle(
        &self,
        profile: &FieldMap,
        preferences: Option<&Preferences>,
        oracle: Option<&dyn ProductOracle>,
        timeout: Duration,
    ) -> MatchResult {
        let mut result = self.match_profile(profile, preferences);
        let Some(oracle) = oracle else {
            return result;
        };
        if !result.is_full_match() {
            return result;
        }

        let candidates: Vec<Product> = result
            .matches
            .iter()
            .filter_map(|m| self.catalog.find(&m.lender, &m.product).cloned())
            .collect();

        let pick = match tokio::time::timeout(timeout, oracle.pick(profile, &candidates)).await {
            Ok(Ok(pick)) => pick,
            Ok(Err(e)) => {
                tracing::warn!(oracle = oracle.name(), error = %e, "Product oracle failed");
                return result;
            },
            Err(_) => {
                tracing::warn!(
                    oracle = oracle.name(),
                    timeout_secs = timeout.as_secs(),
                    "Product oracle timed out"
                );
                return result;
            },
        };

        let position = result.matches.iter().position(|m| {
            m.product.eq_ignore_ascii_case(pick.product.trim())
                && (pick.lender.is_empty() || m.lender.eq_ignore_ascii_case(pick.lender.trim()))
        });

        match position {
            Some(index) => {
                let mut chosen = result.matches.remove(index);
                chosen.reason = pick.reason;
                tracing::info!(product = %chosen.product, lender = %chosen.lender, "Using product oracle pick");
                result.matches.insert(0, chosen);
            },
            None => {
                tracing::warn!(
                    product = %pick.product,
                    lender = %pick.lender,
                    "Product oracle picked an ineligible product, keeping ranking"
                );
            },
        }
        result
    }
}

fn rank(a: &ProductMatch, b: &ProductMatch) -> Ordering {
    a.interest_rate
        .total_cmp(&b.interest_rate)
        .then_with(|| a.lender.cmp(&b.lender))
        .then_with(|| a.product.cmp(&b.product))
}

/// Apply rate ceiling and budget, falling back when nothing survives
fn narrow(eligible: Vec<ProductMatch>, preferences: Option<&Preferences>) -> Vec<ProductMatch> {
    let Some(prefs) = preferences else {
        return eligible;
    };

    let narrowed: Vec<ProductMatch> = eligible
        .iter()
        .filter(|m| {
            prefs
                .interest_rate_ceiling
                .map_or(true, |ceiling| m.interest_rate <= ceiling)
        })
        .filter(|m| match (prefs.monthly_budget, m.monthly_payment) {
            (Some(budget), Some(payment)) => payment <= budget,
            _ => true,
        })
        .cloned()
        .collect();

    if narrowed.is_empty() {
        tracing::debug!("Preferences excluded every eligible product, ignoring them");
        eligible
    } else {
        narrowed
    }
}

/// Repayment term: preferred term capped at the product maximum
fn effective_term(product: &Product, preferences: Option<&Preferences>) -> Option<u32> {
    let preferred = preferences.and_then(|p| p.preferred_term_months);
    match (preferred, product.loan_term) {
        (Some(preferred), Some(max)) => Some(preferred.min(max)),
        (Some(preferred), None) => Some(preferred),
        (None, max) => max,
    }
}

fn evaluate(product: &Product, profile: &FieldMap, preferences: Option<&Preferences>) -> ProductMatch {
    let mut detail = BTreeMap::new();
    let mut gaps = Vec::new();

    let minimums = [
        ("abn_years", fields::ABN_YEARS, product.abn_years_min, "years ABN"),
        ("gst_years", fields::GST_YEARS, product.gst_years_min, "years GST"),
        ("credit_score", fields::CREDIT_SCORE, product.credit_score_min, "credit score"),
    ];
    for (requirement, field, minimum, label) in minimums {
        let Some(minimum) = minimum else {
            continue;
        };
        let actual = profile.get(field).filter(|v| v.as_f64().is_some());
        let met = actual
            .and_then(FieldValue::as_f64)
            .is_some_and(|value| value >= minimum as f64);
        if !met {
            gaps.push(gap_text(&format!("{} {}", minimum, label), actual));
        }
        detail.insert(
            requirement.to_string(),
            RequirementCheck {
                required: FieldValue::from(minimum),
                actual: actual.cloned(),
                met,
            },
        );
    }

    if let Some(required) = product.property_required {
        let actual = profile.get(fields::PROPERTY_OWNER).filter(|v| v.as_bool().is_some());
        let met = actual.and_then(FieldValue::as_bool) == Some(required);
        if !met {
            let need = if required { "property owner" } else { "non-property owner" };
            gaps.push(gap_text(need, actual));
        }
        detail.insert(
            "property_owner".to_string(),
            RequirementCheck {
                required: FieldValue::Bool(required),
                actual: actual.cloned(),
                met,
            },
        );
    }

    let amount = profile
        .get(fields::DESIRED_LOAN_AMOUNT)
        .and_then(FieldValue::as_f64);

    // Reported only; the loan amount does not filter products
    if let Some(max) = product.loan_amount_max {
        detail.insert(
            "loan_amount".to_string(),
            RequirementCheck {
                required: FieldValue::Number(max),
                actual: amount.map(FieldValue::Number),
                met: amount.is_some_and(|a| a <= max),
            },
        );
    }

    let term = effective_term(product, preferences);
    let payment = match (amount, term) {
        (Some(amount), Some(term)) => monthly_payment(amount, product.interest_rate, term),
        _ => None,
    };

    ProductMatch {
        product: product.name.clone(),
        lender: product.lender.clone(),
        interest_rate: product.interest_rate,
        comparison_rate: comparison_rate(
            product.interest_rate,
            product.fixed_fees(),
            product.monthly_fees(),
            amount,
            term,
        ),
        monthly_payment: payment,
        all_requirements_met: gaps.is_empty(),
        gaps,
        eligibility_detail: detail,
        reason: None,
    }
}

fn gap_text(need: &str, actual: Option<&FieldValue>) -> String {
    match actual {
        Some(value) => format!("need {}, have {}", need, value),
        None => format!("need {}, not provided", need),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use loan_agent_core::{Error, ProductPick, Result};

    fn product(name: &str, lender: &str, rate: f64) -> Product {
        Product::new(name, lender, rate)
    }

    fn catalog() -> ProductCatalog {
        let mut prime = product("Prime", "Acme", 6.5);
        prime.abn_years_min = Some(2);
        prime.gst_years_min = Some(2);
        prime.credit_score_min = Some(700);
        prime.property_required = Some(true);
        prime.loan_term = Some(60);
        prime.loan_amount_max = Some(250_000.0);

        let mut standard = product("Standard", "Bolt", 8.0);
        standard.abn_years_min = Some(1);
        standard.credit_score_min = Some(550);
        standard.loan_term = Some(84);
        standard.fees.insert("establishment_fee".into(), 600.0);

        let mut flexi = product("Flexi", "Acme", 8.0);
        flexi.credit_score_min = Some(500);
        flexi.loan_term = Some(60);

        ProductCatalog::new(vec![prime, standard, flexi])
    }

    fn profile(pairs: &[(&str, FieldValue)]) -> FieldMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn strong_profile() -> FieldMap {
        profile(&[
            (fields::ABN_YEARS, 3.0.into()),
            (fields::GST_YEARS, 3.0.into()),
            (fields::CREDIT_SCORE, 720.0.into()),
            (fields::PROPERTY_OWNER, true.into()),
            (fields::DESIRED_LOAN_AMOUNT, 50_000.0.into()),
        ])
    }

    #[test]
    fn test_full_match_picks_lowest_rate() {
        let engine = MatchingEngine::new(catalog(), 2);
        let result = engine.match_profile(&strong_profile(), None);

        assert_eq!(result.status, MatchStatus::FullMatch);
        let best = result.best().unwrap();
        assert_eq!(best.product, "Prime");
        assert!(best.all_requirements_met);
        assert_eq!(best.monthly_payment, monthly_payment(50_000.0, 6.5, 60));
        assert!(best.eligibility_detail["loan_amount"].met);
        assert_eq!(best.eligibility_detail.len(), 5);
    }

    #[test]
    fn test_single_eligible_product_among_near_misses() {
        let engine = MatchingEngine::new(catalog(), 2);
        let p = profile(&[
            (fields::ABN_YEARS, 0.0.into()),
            (fields::GST_YEARS, 0.0.into()),
            (fields::CREDIT_SCORE, 600.0.into()),
            (fields::PROPERTY_OWNER, false.into()),
            (fields::DESIRED_LOAN_AMOUNT, 20_000.0.into()),
        ]);

        // Standard misses only on ABN years but a full match hides near-misses
        let result = engine.match_profile(&p, None);
        assert_eq!(result.status, MatchStatus::FullMatch);
        assert_eq!(result.matches.len(), 1);

        let only = &result.matches[0];
        assert_eq!(only.product, "Flexi");
        assert!(only.all_requirements_met);
        assert!(only.gaps.is_empty());
        assert!(only.eligibility_detail.values().all(|d| d.met));
        assert_eq!(only.monthly_payment, monthly_payment(20_000.0, 8.0, 60));
    }

    #[test]
    fn test_tie_broken_by_lender_then_name() {
        let engine = MatchingEngine::new(catalog(), 2);
        let mut p = strong_profile();
        p.insert(fields::PROPERTY_OWNER.into(), false.into());

        let result = engine.match_profile(&p, None);
        assert_eq!(result.status, MatchStatus::FullMatch);
        let order: Vec<_> = result.matches.iter().map(|m| m.lender.as_str()).collect();
        assert_eq!(order, vec!["Acme", "Bolt"]);
        assert_eq!(result.matches[0].product, "Flexi");
    }

    #[test]
    fn test_unknown_value_fails_declared_requirement() {
        let engine = MatchingEngine::new(catalog(), 2);
        let p = profile(&[(fields::ABN_YEARS, 3.0.into())]);

        let result = engine.match_profile(&p, None);
        // Flexi needs only a credit score, which is unknown
        assert_eq!(result.status, MatchStatus::NoPerfectMatch);
        let best = result.best().unwrap();
        assert_eq!(best.product, "Flexi");
        assert_eq!(best.gaps, vec!["need 500 credit score, not provided"]);
        assert_eq!(best.monthly_payment, None);
    }

    #[test]
    fn test_near_miss_threshold() {
        let engine = MatchingEngine::new(catalog(), 2);
        let p = profile(&[
            (fields::ABN_YEARS, 0.0.into()),
            (fields::CREDIT_SCORE, 400.0.into()),
        ]);

        let result = engine.match_profile(&p, None);
        assert_eq!(result.status, MatchStatus::NoPerfectMatch);
        // Prime has four gaps and is excluded
        assert!(result.matches.iter().all(|m| m.product != "Prime"));
        assert!(result.matches.iter().all(|m| m.gaps.len() <= 2));
        assert_eq!(result.matches[0].gaps[0], "need 500 credit score, have 400");

        let strict = MatchingEngine::new(catalog(), 0);
        let result = strict.match_profile(&p, None);
        assert_eq!(result.status, MatchStatus::NoMatch);
        assert!(result.matches.is_empty());
    }

    #[test]
    fn test_rate_ceiling_narrows_with_fallback() {
        let engine = MatchingEngine::new(catalog(), 2);
        let mut p = strong_profile();
        p.insert(fields::PROPERTY_OWNER.into(), false.into());

        let prefs = Preferences {
            interest_rate_ceiling: Some(7.0),
            ..Default::default()
        };
        // Nothing eligible is under 7%, so the ceiling is ignored
        let result = engine.match_profile(&p, Some(&prefs));
        assert_eq!(result.matches.len(), 2);

        let result = engine.match_profile(&strong_profile(), Some(&prefs));
        assert_eq!(result.matches.len(), 1);
        assert_eq!(result.matches[0].product, "Prime");
    }

    #[test]
    fn test_budget_and_preferred_term() {
        let engine = MatchingEngine::new(catalog(), 2);
        let mut p = strong_profile();
        p.insert(fields::PROPERTY_OWNER.into(), false.into());

        let prefs = Preferences {
            monthly_budget: Some(800.0),
            preferred_term_months: Some(84),
            ..Default::default()
        };
        let result = engine.match_profile(&p, Some(&prefs));
        // Flexi caps the term at 60 months and goes over budget
        assert_eq!(result.matches.len(), 1);
        assert_eq!(result.matches[0].product, "Standard");
        assert_eq!(
            result.matches[0].monthly_payment,
            monthly_payment(50_000.0, 8.0, 84)
        );
    }

    #[test]
    fn test_comparison_rate_uses_fees() {
        let engine = MatchingEngine::new(catalog(), 2);
        let p = profile(&[
            (fields::ABN_YEARS, 2.0.into()),
            (fields::CREDIT_SCORE, 600.0.into()),
        ]);
        let result = engine.match_profile(&p, None);
        let standard = result.matches.iter().find(|m| m.product == "Standard").unwrap();
        // $600 over 84 months on the $30k reference amount
        assert_eq!(standard.comparison_rate, 8.29);
    }

    #[test]
    fn test_empty_catalog() {
        let engine = MatchingEngine::new(ProductCatalog::default(), 2);
        let result = engine.match_profile(&strong_profile(), None);
        assert_eq!(result.status, MatchStatus::Error);
        assert!(result.matches.is_empty());
        assert_eq!(serde_json::to_value(result.status).unwrap(), "error");
    }

    struct Picker(std::result::Result<ProductPick, String>);

    #[async_trait]
    impl ProductOracle for Picker {
        async fn pick(&self, _profile: &FieldMap, candidates: &[Product]) -> Result<ProductPick> {
            assert!(!candidates.is_empty());
            self.0.clone().map_err(Error::Oracle)
        }

        fn name(&self) -> &str {
            "picker"
        }
    }

    fn relaxed_profile() -> FieldMap {
        let mut p = strong_profile();
        p.insert(fields::PROPERTY_OWNER.into(), false.into());
        p
    }

    #[tokio::test]
    async fn test_oracle_pick_accepted() {
        let engine = MatchingEngine::new(catalog(), 2);
        let oracle = Picker(Ok(ProductPick {
            product: "standard".into(),
            lender: "Bolt".into(),
            reason: Some("Longer term".into()),
        }));

        let result = engine
            .match_with_oracle(&relaxed_profile(), None, Some(&oracle), Duration::from_secs(1))
            .await;
        assert_eq!(result.matches[0].product, "Standard");
        assert_eq!(result.matches[0].reason.as_deref(), Some("Longer term"));
        assert_eq!(result.matches.len(), 2);
    }

    #[tokio::test]
    async fn test_oracle_pick_rejected() {
        let engine = MatchingEngine::new(catalog(), 2);
        let ineligible = Picker(Ok(ProductPick {
            product: "Prime".into(),
            lender: "Acme".into(),
            reason: None,
        }));
        let result = engine
            .match_with_oracle(&relaxed_profile(), None, Some(&ineligible), Duration::from_secs(1))
            .await;
        assert_eq!(result.matches[0].product, "Flexi");

        let failing = Picker(Err("HTTP 500".into()));
        let result = engine
            .match_with_oracle(&relaxed_profile(), None, Some(&failing), Duration::from_secs(1))
            .await;
        assert_eq!(result.matches[0].product, "Flexi");
        assert!(result.matches[0].reason.is_none());
    }
}
