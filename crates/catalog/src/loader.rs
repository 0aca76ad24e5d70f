//! Lender document loader
//!
//! Lender documents are markdown. Each `## ` heading opens a product
//! section (an optional `Product:` prefix is dropped) and attributes are
//! bullet lines of the form `- Label: value`. Labels are matched
//! case-insensitively; anything unrecognized is ignored.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

use loan_agent_config::CatalogConfig;
use loan_agent_core::Product;

use crate::CatalogError;

static ATTRIBUTE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*[-*]\s+(?:\*\*)?([^:*]+?)(?:\*\*)?\s*:\s*(?:\*\*)?\s*(.+?)\s*$").unwrap());

static NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d[\d,]*(?:\.\d+)?)").unwrap());

static AMOUNT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\d[\d,]*(?:\.\d+)?)\s*(million|thousand|mil|m|k)?\b").unwrap()
});

static DURATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*(years?|yrs?|months?|mths?)?").unwrap()
});

static PARENTHETICAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\([^)]*\)").unwrap());

/// Attribute recognized from a bullet label
#[derive(Debug, Clone, PartialEq)]
enum Attribute {
    Fee(String),
    CreditScore,
    AbnYears,
    GstYears,
    Property,
    LoanAmountMax,
    LoanTerm,
    InterestRate,
}

fn classify_label(label: &str) -> Option<Attribute> {
    let label = PARENTHETICAL.replace_all(label, "").trim().to_lowercase();

    if label.contains("fee") {
        return Some(Attribute::Fee(snake_case(&label)));
    }
    if label.contains("credit score") {
        return Some(Attribute::CreditScore);
    }
    if label.contains("abn") {
        return Some(Attribute::AbnYears);
    }
    if label.contains("gst") {
        return Some(Attribute::GstYears);
    }
    if label.contains("property") {
        return Some(Attribute::Property);
    }
    if label.contains("maximum loan amount") || label.contains("max loan") {
        return Some(Attribute::LoanAmountMax);
    }
    if label == "term" || label.contains("loan term") {
        return Some(Attribute::LoanTerm);
    }
    if (label == "rate" || label.contains("interest rate") || label.contains("base rate"))
        && !label.contains("comparison")
    {
        return Some(Attribute::InterestRate);
    }
    None
}

fn snake_case(label: &str) -> String {
    label
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

fn parse_plain_number(value: &str) -> Option<f64> {
    NUMBER
        .captures(value)
        .and_then(|c| c[1].replace(',', "").parse::<f64>().ok())
}

fn parse_amount(value: &str) -> Option<f64> {
    let caps = AMOUNT.captures(value)?;
    let number: f64 = caps[1].replace(',', "").parse().ok()?;
    let multiplier = match caps.get(2).map(|m| m.as_str().to_lowercase()) {
        Some(ref s) if s == "k" || s == "thousand" => 1_000.0,
        Some(ref s) if s == "m" || s == "mil" || s == "million" => 1_000_000.0,
        _ => 1.0,
    };
    Some(number * multiplier)
}

/// Duration in months; a bare number is read as `bare_unit_months` per unit
fn parse_months(value: &str, bare_unit_months: f64) -> Option<f64> {
    let caps = DURATION.captures(value)?;
    let number: f64 = caps[1].parse().ok()?;
    let per_unit = match caps.get(2).map(|m| m.as_str().to_lowercase()) {
        Some(unit) if unit.starts_with('y') => 12.0,
        Some(_) => 1.0,
        None => bare_unit_months,
    };
    Some(number * per_unit)
}

fn parse_property(value: &str) -> Option<bool> {
    let value = value.trim().to_lowercase();
    if value.starts_with("not required") || value.starts_with("either") || value.starts_with("n/a")
    {
        return None;
    }
    if value.starts_with("yes") || value.starts_with("required") || value.starts_with("true") {
        return Some(true);
    }
    if value.starts_with("no") || value.starts_with("false") {
        return Some(false);
    }
    None
}

fn parse_fee(value: &str) -> Option<f64> {
    let lowered = value.trim().to_lowercase();
    if ["nil", "none", "free", "no fee"].iter().any(|w| lowered.starts_with(w)) {
        return Some(0.0);
    }
    parse_amount(value)
}

/// Product section being assembled
struct Section {
    name: String,
    interest_rate: Option<f64>,
    product: Product,
}

impl Section {
    fn new(name: String, lender: &str) -> Self {
        Self {
            product: Product::new(name.clone(), lender, 0.0),
            name,
            interest_rate: None,
        }
    }

    fn apply(&mut self, attribute: Attribute, value: &str) {
        let product = &mut self.product;
        match attribute {
            Attribute::Fee(key) => match parse_fee(value) {
                Some(amount) => {
                    product.fees.insert(key, amount);
                },
                None => tracing::debug!(fee = %key, value = value, "Skipping unparseable fee"),
            },
            Attribute::CreditScore => {
                product.credit_score_min = parse_plain_number(value).map(|s| s.round() as u32);
            },
            Attribute::AbnYears => {
                product.abn_years_min =
                    parse_months(value, 12.0).map(|m| (m / 12.0).ceil() as u32);
            },
            Attribute::GstYears => {
                product.gst_years_min =
                    parse_months(value, 12.0).map(|m| (m / 12.0).ceil() as u32);
            },
            Attribute::Property => product.property_required = parse_property(value),
            Attribute::LoanAmountMax => product.loan_amount_max = parse_amount(value),
            Attribute::LoanTerm => {
                product.loan_term = parse_months(value, 1.0).map(|m| m.round() as u32);
            },
            Attribute::InterestRate => {
                if self.interest_rate.is_none() {
                    self.interest_rate = parse_plain_number(value);
                }
            },
        }
    }

    fn finish(self, lender: &str) -> Option<Product> {
        match self.interest_rate {
            Some(rate) => Some(Product {
                interest_rate: rate,
                ..self.product
            }),
            None => {
                tracing::warn!(
                    lender = lender,
                    product = %self.name,
                    "Skipping product section without an interest rate"
                );
                None
            },
        }
    }
}

fn product_name(heading: &str) -> String {
    let heading = heading.trim();
    let stripped = heading
        .get(..8)
        .filter(|prefix| prefix.eq_ignore_ascii_case("product:"))
        .map(|_| &heading[8..])
        .unwrap_or(heading);
    stripped.trim().to_string()
}

/// Parse one lender document into products
pub fn parse_lender_document(lender: &str, content: &str) -> Vec<Product> {
    let mut products = Vec::new();
    let mut current: Option<Section> = None;

    for line in content.lines() {
        if let Some(heading) = line.strip_prefix("## ") {
            if let Some(section) = current.take() {
                products.extend(section.finish(lender));
            }
            current = Some(Section::new(product_name(heading), lender));
            continue;
        }

        let Some(section) = current.as_mut() else {
            continue;
        };
        let Some(caps) = ATTRIBUTE.captures(line) else {
            continue;
        };
        if let Some(attribute) = classify_label(&caps[1]) {
            section.apply(attribute, &caps[2]);
        }
    }

    if let Some(section) = current.take() {
        products.extend(section.finish(lender));
    }

    products
}

/// Read and parse a single lender document
pub fn load_lender_file(lender: &str, path: &Path) -> Result<Vec<Product>, CatalogError> {
    let content = std::fs::read_to_string(path).map_err(|e| CatalogError::Read {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    Ok(parse_lender_document(lender, &content))
}

/// Load every configured lender document
///
/// Missing or unreadable documents are skipped with a warning.
pub fn load_products(config: &CatalogConfig) -> Vec<Product> {
    let mut products = Vec::new();

    for source in &config.lenders {
        let path = config.document_path(source);
        match load_lender_file(&source.name, &path) {
            Ok(loaded) => {
                tracing::info!(
                    lender = %source.name,
                    file = %path.display(),
                    products = loaded.len(),
                    "Loaded lender document"
                );
                products.extend(loaded);
            },
            Err(e) => {
                tracing::warn!(lender = %source.name, error = %e, "Skipping lender document");
            },
        }
    }

    products
}
