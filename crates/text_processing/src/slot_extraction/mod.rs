//! Rule-based field extraction
//!
//! Deterministic pattern extraction of loan intake fields from customer
//! utterances. Used on its own when no LLM oracle is configured and as the
//! fallback layer underneath the oracle otherwise.
//!
//! ## Ordering
//!
//! - Within one utterance, negation patterns are checked before numeric
//!   patterns for the same field and short-circuit them.
//! - Across a history, user turns are processed oldest to newest and a later
//!   mention of a field overrides an earlier one.
//!
//! All patterns are compiled once using `once_cell::sync::Lazy`.

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_segmentation::UnicodeSegmentation;

use loan_agent_config::constants::{fields, ranges};
use loan_agent_core::{FieldMap, FieldValue, Turn, TurnRole};

// =============================================================================
// STATIC REGEX PATTERNS - Compiled once at program start
// =============================================================================

/// Amount multiplier for parsing
#[derive(Debug, Clone, Copy, PartialEq)]
enum AmountMultiplier {
    Unit,
    Thousand,
    Million,
}

impl AmountMultiplier {
    fn from_suffix(suffix: Option<&str>) -> Self {
        match suffix.map(|s| s.trim().to_lowercase()).as_deref() {
            Some("k") | Some("thousand") => AmountMultiplier::Thousand,
            Some("m") | Some("mil") | Some("million") => AmountMultiplier::Million,
            _ => AmountMultiplier::Unit,
        }
    }

    fn value(&self) -> f64 {
        match self {
            AmountMultiplier::Unit => 1.0,
            AmountMultiplier::Thousand => 1_000.0,
            AmountMultiplier::Million => 1_000_000.0,
        }
    }
}

/// Time unit attached to a year/month count
#[derive(Debug, Clone, Copy, PartialEq)]
enum Period {
    Years,
    Months,
}

impl Period {
    fn from_unit(unit: Option<&str>) -> Self {
        match unit {
            Some(u) if u.to_lowercase().starts_with('m') => Period::Months,
            _ => Period::Years,
        }
    }
}

// Loan amount: dollar sign, suffix, or borrowing context
static AMOUNT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| vec![
    Regex::new(r"(?i)\$\s*(\d[\d,]*(?:\.\d+)?)\s*(k|thousand|million|mil|m)?\b").unwrap(),
    Regex::new(r"(?i)\b(\d[\d,]*(?:\.\d+)?)\s*(k|thousand|million|mil|m)\b").unwrap(),
    Regex::new(r"(?i)\b(?:borrow(?:ing)?|loan\s+(?:of|for)|financ(?:e|ing)|amount\s+(?:of|is)|looking\s+for|need(?:ing)?)\s+(?:about\s+|around\s+|roughly\s+|approximately\s+)?(\d[\d,]{3,}(?:\.\d+)?)\b").unwrap(),
]);

// Trailing text that turns an amount into a monthly figure
static MONTHLY_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?:(?:a|per|/|each|every)\s*(?:month|mth|mo)\b|monthly\b|p/?m\b)").unwrap()
});

static PERCENT_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*(?:%|percent|per\s*cent)").unwrap());

// ABN / GST negation (checked before numeric patterns)
static ABN_GST_NEGATION: Lazy<Vec<Regex>> = Lazy::new(|| vec![
    Regex::new(r"(?i)\b(?:no|without(?:\s+an?)?|don'?t\s+have\s+(?:an?\s+)?|do\s+not\s+have\s+(?:an?\s+)?|not\s+registered\s+for\s+(?:an?\s+)?)\s*abn\s*(?:and|or|&|/|nor)\s*gst\b").unwrap(),
    Regex::new(r"(?i)\bneither\s+(?:an?\s+)?abn\s+nor\s+gst\b").unwrap(),
]);

static ABN_NEGATION: Lazy<Vec<Regex>> = Lazy::new(|| vec![
    Regex::new(r"(?i)\b(?:no|without(?:\s+an)?|don'?t\s+have\s+(?:an\s+)?|do\s+not\s+have\s+(?:an\s+)?|haven'?t\s+got\s+(?:an\s+)?)\s*abn\b").unwrap(),
    Regex::new(r"(?i)\bnot\s+(?:yet\s+)?registered\s+for\s+(?:an\s+)?abn\b").unwrap(),
    Regex::new(r"(?i)\babn\s*:?\s*(?:none|n/a|nil)\b").unwrap(),
]);

static GST_NEGATION: Lazy<Vec<Regex>> = Lazy::new(|| vec![
    Regex::new(r"(?i)\b(?:no|without|don'?t\s+have|do\s+not\s+have)\s+gst\b").unwrap(),
    Regex::new(r"(?i)\bnot\s+(?:yet\s+)?(?:registered\s+(?:for\s+)?gst|gst[\s-]?registered)\b").unwrap(),
    Regex::new(r"(?i)\bgst\s*:?\s*(?:none|n/a|nil)\b").unwrap(),
]);

// "3 years ABN" form is tried before "ABN for 3 years" so that
// "3 years ABN and 2 years GST" does not read 2 for ABN
static ABN_YEARS_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| vec![
    Regex::new(r"(?i)\b(\d+(?:\.\d+)?)\s*(years?|yrs?|months?|mths?)\s*(?:of\s+|with\s+(?:an?\s+)?|on\s+)?(?:an?\s+)?abn\b").unwrap(),
    Regex::new(r"(?i)\babn\b[^.\d]{0,40}?(\d+(?:\.\d+)?)\s*(years?|yrs?|months?|mths?)\b").unwrap(),
]);

static GST_YEARS_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| vec![
    Regex::new(r"(?i)\b(\d+(?:\.\d+)?)\s*(years?|yrs?|months?|mths?)\s*(?:of\s+|with\s+)?gst\b").unwrap(),
    Regex::new(r"(?i)\bgst\b[^.\d]{0,40}?(\d+(?:\.\d+)?)\s*(years?|yrs?|months?|mths?)\b").unwrap(),
]);

static CREDIT_SCORE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| vec![
    Regex::new(r"(?i)\b(?:credit\s*score|credit\s+rating|score|equifax)\b[^.\d]{0,25}?(\d{3,4})\b").unwrap(),
    Regex::new(r"(?i)\b(\d{3,4})\s*(?:credit\s*score|credit\b)").unwrap(),
]);

static RATE_CEILING_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| vec![
    Regex::new(r"(?i)\b(?:under|below|less\s+than|lower\s+than|max(?:imum)?(?:\s+of)?|no\s+more\s+than|at\s+most|up\s+to|cap(?:ped)?\s+at|ceiling\s+of)\s*(\d+(?:\.\d+)?)\s*(?:%|percent|per\s*cent)").unwrap(),
    Regex::new(r"(?i)\b(\d+(?:\.\d+)?)\s*(?:%|percent)\s*(?:or\s+(?:less|lower|under|below)|max(?:imum)?|tops)").unwrap(),
]);

static MONTHLY_BUDGET_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| vec![
    Regex::new(r"(?i)\bmonthly\s+(?:budget|repayments?|payments?)\s*(?:of|is|around|about|under|below|:)?\s*(?:about\s+|around\s+|under\s+)?\$?\s*(\d[\d,]*(?:\.\d+)?)\s*(k)?\b").unwrap(),
    Regex::new(r"(?i)\$?\s*(\d[\d,]*(?:\.\d+)?)\s*(k)?\s*(?:a|per|/|each|every)\s*(?:month|mth|mo)\b").unwrap(),
    Regex::new(r"(?i)\$?\s*(\d[\d,]*(?:\.\d+)?)\s*(k)?\s*monthly\b").unwrap(),
]);

static TERM_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| vec![
    Regex::new(r"(?i)\b(?:over|term\s+of|loan\s+term\s+(?:of\s+|is\s+)?|repay\s+(?:it\s+)?(?:over|in|within)|pay\s+(?:it\s+)?(?:off|back)\s+(?:over|in|within)|spread\s+(?:it\s+)?over)\s*(\d+(?:\.\d+)?)\s*(years?|yrs?|months?|mths?)\b").unwrap(),
    Regex::new(r"(?i)\b(\d+)[\s-]*(years?|yrs?|months?|mths?)\s+(?:loan\s+)?term\b").unwrap(),
]);

// Words in the same clause that mark a duration as business history, not term
static BUSINESS_HISTORY_CONTEXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:abn|gst|trading|business|operating|registered)\b").unwrap());

static LOAN_TYPE_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| vec![
    (Regex::new(r"(?i)\bnot\s+(?:for\s+)?(?:a\s+|the\s+|my\s+)?(?:business|commercial|work)\b").unwrap(), "consumer"),
    (Regex::new(r"(?i)\bnot\s+(?:for\s+)?(?:personal|private)\b").unwrap(), "commercial"),
    (Regex::new(r"(?i)\b(?:business|commercial|company\s+(?:car|vehicle|use)|for\s+(?:my|our|the)\s+(?:business|company|work)|work\s+(?:use|vehicle|ute))\b").unwrap(), "commercial"),
    (Regex::new(r"(?i)\b(?:personal(?:\s+use)?|consumer|private(?:\s+use)?|for\s+(?:myself|me|my\s+family|the\s+family)|family\s+car)\b").unwrap(), "consumer"),
]);

static ASSET_TYPE_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| vec![
    (Regex::new(r"(?i)\b(?:cars?|vehicles?|utes?|vans?|trucks?|suv|sedan|hatchback|motorbike|motorcycle|motor\s+bike|prime\s+mover|4wd|wagon)\b").unwrap(), "motor_vehicle"),
    (Regex::new(r"(?i)\b(?:machinery|machines?|excavator|tractor|forklift|bulldozer|loader|crane|harvester)\b").unwrap(), "machinery"),
    (Regex::new(r"(?i)\b(?:equipment|tools|computers?|fit[\s-]?out)\b").unwrap(), "equipment"),
]);

static VEHICLE_TYPE_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| vec![
    (Regex::new(r"(?i)\b(?:motorbike|motorcycle|motor\s+bike|scooter|bike)\b").unwrap(), "motorcycle"),
    (Regex::new(r"(?i)\b(?:trucks?|prime\s+mover|heavy\s+(?:vehicle|commercial)|semi[\s-]trailer|tipper|bus)\b").unwrap(), "heavy_commercial"),
    (Regex::new(r"(?i)\b(?:utes?|vans?|light\s+commercial|pick[\s-]?up|utility)\b").unwrap(), "light_commercial"),
    (Regex::new(r"(?i)\b(?:cars?|sedan|suv|hatch(?:back)?|wagon|4wd|passenger)\b").unwrap(), "passenger"),
]);

static VEHICLE_CONDITION_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| vec![
    (Regex::new(r"(?i)\bdemo(?:nstrator)?\b").unwrap(), "demo"),
    (Regex::new(r"(?i)\bsecond[\s-]?hand\b|\bpre[\s-]?owned\b|\bused\s+(?:car|vehicle|ute|van|truck|one|bike|motorbike|motorcycle|suv)\b|\b(?:it'?s|is|buying|buy|get(?:ting)?)\s+(?:a\s+)?used\b|^\s*used\s*[.!]?\s*$").unwrap(), "used"),
    (Regex::new(r"(?i)\bbrand[\s-]new\b|\bnew\s+(?:car|vehicle|ute|van|truck|one|bike|motorbike|motorcycle|suv)\b|\b(?:it'?s|is|buying|buy|get(?:ting)?)\s+(?:a\s+)?new\b|^\s*new\s*[.!]?\s*$").unwrap(), "new"),
]);

static BUSINESS_STRUCTURE_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| vec![
    (Regex::new(r"(?i)\b(?:sole\s+trader|self[\s-]employed|sole\s+proprietor)\b").unwrap(), "sole_trader"),
    (Regex::new(r"(?i)\b(?:pty\.?\s*ltd|proprietary\s+limited|(?:a|my|our)\s+company|incorporated)\b").unwrap(), "company"),
    (Regex::new(r"(?i)\b(?:(?:a|family|discretionary|unit|trading)\s+trust|trust\s+structure)\b").unwrap(), "trust"),
    (Regex::new(r"(?i)\bpartnership\b").unwrap(), "partnership"),
]);

static PROPERTY_NEGATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:don'?t|do\s+not|doesn'?t)\s+own\b|\bnot\s+(?:a\s+)?(?:home|property|house)[\s-]?owner\b|\bno\s+(?:property|home|house)\b|\brenting\b|\bi\s+rent\b|\bnon[\s-]property[\s-]owner\b|\bboarding\b").unwrap()
});

static PROPERTY_POSITIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:own|owns|owned)\s+(?:my|our|a|the)\s+(?:own\s+)?(?:home|house|property|place|unit|apartment)\b|\b(?:home|house|property)[\s-]?owner\b|\bhave\s+a\s+mortgage\b|\bpaying\s+off\s+(?:a|my|our)\s+(?:home|house|mortgage)\b").unwrap()
});

// Short replies answered in the context of the previous question
static BARE_YES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*(?:yes|yep|yeah|yup|correct|sure|i\s+do|we\s+do)\b").unwrap());
static BARE_NO: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*(?:no|nope|nah|i\s+don'?t|we\s+don'?t)\b").unwrap());
static BARE_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?:about\s+|around\s+)?\$?\s*(\d[\d,]*(?:\.\d+)?)\s*(k|thousand|million|m|years?|yrs?|months?)?\s*[.!]?\s*$").unwrap()
});

static QUESTION_CUES: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| vec![
    (Regex::new(r"(?i)\bproperty\b|\bhome\s*owner|\bown\s+(?:a|your)\s+home").unwrap(), fields::PROPERTY_OWNER),
    (Regex::new(r"(?i)\bcredit\s+score").unwrap(), fields::CREDIT_SCORE),
    (Regex::new(r"(?i)\babn\b").unwrap(), fields::ABN_YEARS),
    (Regex::new(r"(?i)\bgst\b").unwrap(), fields::GST_YEARS),
    (Regex::new(r"(?i)\bborrow\b|\bloan\s+amount\b").unwrap(), fields::DESIRED_LOAN_AMOUNT),
]);

// =============================================================================
// FIELD EXTRACTOR
// =============================================================================

/// Rule-based extractor for loan intake fields
///
/// Stateless; every call is a pure function of its input.
#[derive(Debug, Clone, Default)]
pub struct FieldExtractor;

impl FieldExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract fields from the user turns of a conversation
    ///
    /// Turns are processed oldest to newest; a later mention of a field
    /// overrides an earlier one. Each user turn is read in the context of
    /// the assistant turn immediately before it.
    pub fn extract_history(&self, history: &[Turn]) -> FieldMap {
        let mut result = FieldMap::new();
        let mut previous_assistant: Option<&str> = None;

        for turn in history {
            match turn.role {
                TurnRole::User => {
                    let extracted = self.extract_with_context(&turn.content, previous_assistant);
                    result.extend(extracted);
                    previous_assistant = None;
                },
                TurnRole::Assistant => previous_assistant = Some(turn.content.as_str()),
                TurnRole::System => {},
            }
        }

        result
    }

    /// Extract fields from a single utterance
    pub fn extract(&self, utterance: &str) -> FieldMap {
        let mut result = FieldMap::new();

        for (field, value) in [
            (fields::LOAN_TYPE, first_label(&LOAN_TYPE_PATTERNS, utterance)),
            (fields::ASSET_TYPE, first_label(&ASSET_TYPE_PATTERNS, utterance)),
            (fields::VEHICLE_TYPE, first_label(&VEHICLE_TYPE_PATTERNS, utterance)),
            (fields::VEHICLE_CONDITION, first_label(&VEHICLE_CONDITION_PATTERNS, utterance)),
            (fields::BUSINESS_STRUCTURE, first_label(&BUSINESS_STRUCTURE_PATTERNS, utterance)),
        ] {
            if let Some(label) = value {
                result.insert(field.to_string(), FieldValue::Text(label.to_string()));
            }
        }

        if let Some(owner) = self.extract_property_owner(utterance) {
            result.insert(fields::PROPERTY_OWNER.to_string(), FieldValue::Bool(owner));
        }

        let (abn, gst) = self.extract_business_history(utterance);
        if let Some(years) = abn {
            result.insert(fields::ABN_YEARS.to_string(), FieldValue::Number(years));
        }
        if let Some(years) = gst {
            result.insert(fields::GST_YEARS.to_string(), FieldValue::Number(years));
        }

        let numeric = [
            (fields::CREDIT_SCORE, self.extract_credit_score(utterance)),
            (fields::DESIRED_LOAN_AMOUNT, self.extract_amount(utterance)),
            (fields::INTEREST_RATE_CEILING, self.extract_rate_ceiling(utterance)),
            (fields::MONTHLY_BUDGET, self.extract_monthly_budget(utterance)),
            (fields::PREFERRED_TERM_MONTHS, self.extract_term_months(utterance)),
        ];
        for (field, value) in numeric {
            if let Some(n) = value {
                result.insert(field.to_string(), FieldValue::Number(n));
            }
        }

        result
    }

    /// Extract fields, resolving short answers against the previous question
    ///
    /// A bare "yes"/"no" only fills a field when the previous assistant turn
    /// asked about exactly one candidate field. A bare number goes to the
    /// first field asked for which it is a plausible answer. Neither
    /// overrides a value stated explicitly in the same utterance.
    pub fn extract_with_context(&self, utterance: &str, previous_assistant: Option<&str>) -> FieldMap {
        let mut result = self.extract(utterance);

        let Some(question) = previous_assistant else {
            return result;
        };
        if utterance.unicode_words().count() > 4 {
            return result;
        }

        let cues = question_cues(question);

        if let Some((field, value)) = self.contextual_answer(utterance, &cues) {
            if !result.contains_key(field) {
                tracing::debug!(field = %field, value = %value, "Contextual answer");
                result.insert(field.to_string(), value);
            }
        }

        result
    }

    fn contextual_answer(&self, utterance: &str, cues: &[&'static str]) -> Option<(&'static str, FieldValue)> {
        if BARE_YES.is_match(utterance) || BARE_NO.is_match(utterance) {
            let yes = BARE_YES.is_match(utterance);
            let targets: Vec<&'static str> = cues
                .iter()
                .copied()
                .filter(|f| {
                    *f == fields::PROPERTY_OWNER
                        || (!yes && (*f == fields::ABN_YEARS || *f == fields::GST_YEARS))
                })
                .collect();
            return match targets.as_slice() {
                [f] if *f == fields::PROPERTY_OWNER => Some((*f, FieldValue::Bool(yes))),
                [f] => Some((*f, FieldValue::Number(0.0))),
                _ => None,
            };
        }

        let caps = BARE_NUMBER.captures(utterance)?;
        let raw = parse_number(caps.get(1)?.as_str())?;
        let unit = caps.get(2).map(|m| m.as_str());

        cues.iter()
            .copied()
            .filter(|f| *f != fields::PROPERTY_OWNER)
            .find_map(|field| bare_number_for(field, raw, unit).map(|v| (field, FieldValue::Number(v))))
    }

    /// Extract property ownership; negation wins over a positive mention
    pub fn extract_property_owner(&self, utterance: &str) -> Option<bool> {
        if PROPERTY_NEGATION.is_match(utterance) {
            return Some(false);
        }
        if PROPERTY_POSITIVE.is_match(utterance) {
            return Some(true);
        }
        None
    }

    /// Extract ABN and GST registration years
    ///
    /// Negation is checked first. "No ABN and GST" sets both to zero and
    /// suppresses the numeric patterns for both fields.
    pub fn extract_business_history(&self, utterance: &str) -> (Option<f64>, Option<f64>) {
        if ABN_GST_NEGATION.iter().any(|re| re.is_match(utterance)) {
            return (Some(0.0), Some(0.0));
        }

        let abn = if ABN_NEGATION.iter().any(|re| re.is_match(utterance)) {
            Some(0.0)
        } else {
            first_period(&ABN_YEARS_PATTERNS, utterance)
                .and_then(|(n, period)| normalize_years(n, period))
        };

        let gst = if GST_NEGATION.iter().any(|re| re.is_match(utterance)) {
            Some(0.0)
        } else {
            first_period(&GST_YEARS_PATTERNS, utterance)
                .and_then(|(n, period)| normalize_years(n, period))
        };

        (abn, gst)
    }

    /// Extract credit score, clamped to the valid range
    pub fn extract_credit_score(&self, utterance: &str) -> Option<f64> {
        for pattern in CREDIT_SCORE_PATTERNS.iter() {
            if let Some(n) = pattern
                .captures(utterance)
                .and_then(|caps| caps.get(1))
                .and_then(|m| parse_number(m.as_str()))
            {
                return normalize_score(n);
            }
        }
        None
    }

    /// Extract desired loan amount in dollars
    ///
    /// Figures quoted per month or as a percentage are skipped. Values that
    /// are not finite or fall outside [1, 1e9] are treated as no match.
    pub fn extract_amount(&self, utterance: &str) -> Option<f64> {
        for pattern in AMOUNT_PATTERNS.iter() {
            for caps in pattern.captures_iter(utterance) {
                let (Some(whole), Some(num)) = (caps.get(0), caps.get(1)) else {
                    continue;
                };

                let after = &utterance[whole.end()..];
                if MONTHLY_MARKER.is_match(after) || PERCENT_MARKER.is_match(after) {
                    continue;
                }
                if clause_before(utterance, whole.start()).contains("month") {
                    continue;
                }

                let Some(n) = parse_number(num.as_str()) else {
                    continue;
                };
                let amount = n * AmountMultiplier::from_suffix(caps.get(2).map(|m| m.as_str())).value();

                match normalize_amount(amount) {
                    Some(value) => return Some(value),
                    None => {
                        tracing::debug!(amount = amount, "Skipping amount extraction - out of bounds");
                    },
                }
            }
        }
        None
    }

    /// Extract maximum acceptable interest rate (percent)
    pub fn extract_rate_ceiling(&self, utterance: &str) -> Option<f64> {
        RATE_CEILING_PATTERNS.iter().find_map(|pattern| {
            pattern
                .captures(utterance)
                .and_then(|caps| caps.get(1))
                .and_then(|m| parse_number(m.as_str()))
                .filter(|n| n.is_finite())
                .map(|n| n.clamp(0.0, ranges::RATE_CEILING_MAX))
        })
    }

    /// Extract monthly repayment budget in dollars
    pub fn extract_monthly_budget(&self, utterance: &str) -> Option<f64> {
        for pattern in MONTHLY_BUDGET_PATTERNS.iter() {
            if let Some(caps) = pattern.captures(utterance) {
                let Some(n) = caps.get(1).and_then(|m| parse_number(m.as_str())) else {
                    continue;
                };
                let amount = n * AmountMultiplier::from_suffix(caps.get(2).map(|m| m.as_str())).value();
                if amount.is_finite() && amount > 0.0 {
                    return Some(amount.clamp(ranges::MONTHLY_BUDGET_MIN, ranges::MONTHLY_BUDGET_MAX));
                }
            }
        }
        None
    }

    /// Extract preferred loan term in months
    ///
    /// Durations in a clause about ABN, GST or trading history are not terms.
    pub fn extract_term_months(&self, utterance: &str) -> Option<f64> {
        for pattern in TERM_PATTERNS.iter() {
            for caps in pattern.captures_iter(utterance) {
                let (Some(whole), Some(num)) = (caps.get(0), caps.get(1)) else {
                    continue;
                };
                let clause = clause_before(utterance, whole.start());
                if BUSINESS_HISTORY_CONTEXT.is_match(&clause) {
                    continue;
                }
                let Some(n) = parse_number(num.as_str()) else {
                    continue;
                };
                let months = match Period::from_unit(caps.get(2).map(|m| m.as_str())) {
                    Period::Years => n * 12.0,
                    Period::Months => n,
                };
                if months.is_finite() && months > 0.0 {
                    return Some(
                        months
                            .round()
                            .clamp(ranges::TERM_MONTHS_MIN, ranges::TERM_MONTHS_MAX),
                    );
                }
            }
        }
        None
    }
}

fn first_label(patterns: &[(Regex, &'static str)], utterance: &str) -> Option<&'static str> {
    patterns
        .iter()
        .find(|(re, _)| re.is_match(utterance))
        .map(|(_, label)| *label)
}

fn first_period(patterns: &[Regex], utterance: &str) -> Option<(f64, Period)> {
    patterns.iter().find_map(|pattern| {
        let caps = pattern.captures(utterance)?;
        let n = parse_number(caps.get(1)?.as_str())?;
        Some((n, Period::from_unit(caps.get(2).map(|m| m.as_str()))))
    })
}

/// Lowercased text between the last clause separator and `end`
fn clause_before(text: &str, end: usize) -> String {
    let head = &text[..end];
    let start = head
        .rfind(['.', ',', ';', '!', '?'])
        .map(|i| i + 1)
        .unwrap_or(0);
    head[start..].to_lowercase()
}

/// Fields asked about in the question sentences of `text`, in asking order
fn question_cues(text: &str) -> Vec<&'static str> {
    let mut found: Vec<(usize, &'static str)> = Vec::new();
    let mut offset = 0;
    for sentence in text.split_inclusive(['.', '!', '?']) {
        if sentence.trim_end().ends_with('?') {
            for (re, field) in QUESTION_CUES.iter() {
                if let Some(m) = re.find(sentence) {
                    found.push((offset + m.start(), *field));
                }
            }
        }
        offset += sentence.len();
    }
    found.sort_by_key(|(position, _)| *position);

    let mut cues = Vec::new();
    for (_, field) in found {
        if !cues.contains(&field) {
            cues.push(field);
        }
    }
    cues
}

/// A bare number read as the answer for `field`, when plausible there
fn bare_number_for(field: &str, raw: f64, unit: Option<&str>) -> Option<f64> {
    let unit = unit.map(|u| u.to_lowercase());
    let is_period = unit
        .as_deref()
        .is_some_and(|u| u.starts_with('y') || u.starts_with("month"));
    let is_amount = unit.is_some() && !is_period;

    match field {
        f if f == fields::CREDIT_SCORE => {
            if unit.is_some() || !(ranges::CREDIT_SCORE_MIN..=ranges::CREDIT_SCORE_MAX).contains(&raw) {
                return None;
            }
            normalize_score(raw)
        },
        f if f == fields::ABN_YEARS || f == fields::GST_YEARS => {
            if is_amount {
                return None;
            }
            let period = Period::from_unit(unit.as_deref());
            let years = match period {
                Period::Years => raw,
                Period::Months => raw / 12.0,
            };
            if years > ranges::YEARS_MAX {
                return None;
            }
            normalize_years(raw, period)
        },
        f if f == fields::DESIRED_LOAN_AMOUNT => {
            if is_period {
                return None;
            }
            let amount = raw * AmountMultiplier::from_suffix(unit.as_deref()).value();
            if amount < ranges::LOAN_AMOUNT_MIN {
                return None;
            }
            normalize_amount(amount)
        },
        _ => None,
    }
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.replace(',', "").parse::<f64>().ok()
}

fn normalize_years(n: f64, period: Period) -> Option<f64> {
    if !n.is_finite() || n < 0.0 {
        return None;
    }
    let years = match period {
        Period::Years => n,
        Period::Months => n / 12.0,
    };
    Some(years.floor().clamp(ranges::YEARS_MIN, ranges::YEARS_MAX))
}

fn normalize_score(n: f64) -> Option<f64> {
    if !n.is_finite() {
        return None;
    }
    Some(n.round().clamp(ranges::CREDIT_SCORE_MIN, ranges::CREDIT_SCORE_MAX))
}

fn normalize_amount(amount: f64) -> Option<f64> {
    if !amount.is_finite() || !(1.0..=ranges::ABSURD_AMOUNT).contains(&amount) {
        return None;
    }
    Some(amount.clamp(ranges::LOAN_AMOUNT_MIN, ranges::LOAN_AMOUNT_MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(map: &FieldMap, field: &str) -> Option<f64> {
        map.get(field).and_then(|v| v.as_f64())
    }

    fn text<'a>(map: &'a FieldMap, field: &str) -> Option<&'a str> {
        map.get(field).and_then(|v| v.as_str())
    }

    #[test]
    fn test_amount_extraction() {
        let extractor = FieldExtractor::new();

        assert_eq!(extractor.extract_amount("I need $50,000 for a car"), Some(50_000.0));
        assert_eq!(extractor.extract_amount("looking at 45k"), Some(45_000.0));
        assert_eq!(extractor.extract_amount("about 1.2 million"), Some(1_200_000.0));
        assert_eq!(extractor.extract_amount("I want to borrow 35000"), Some(35_000.0));
        assert_eq!(extractor.extract_amount("50 thousand dollars"), Some(50_000.0));
    }

    #[test]
    fn test_amount_skips_monthly_and_absurd() {
        let extractor = FieldExtractor::new();

        assert_eq!(extractor.extract_amount("I can pay $900 a month"), None);
        assert_eq!(extractor.extract_amount("monthly budget is $900"), None);
        assert_eq!(extractor.extract_amount("$5000000000000"), None);
        // Below the schema minimum is clamped, not dropped
        assert_eq!(extractor.extract_amount("just $500"), Some(1_000.0));
    }

    #[test]
    fn test_credit_score_clamped() {
        let extractor = FieldExtractor::new();

        assert_eq!(extractor.extract_credit_score("my credit score is 720"), Some(720.0));
        assert_eq!(extractor.extract_credit_score("score of about 1000"), Some(900.0));
        assert_eq!(extractor.extract_credit_score("650 credit score"), Some(650.0));
        assert_eq!(extractor.extract_credit_score("credit score 150"), Some(300.0));
    }

    #[test]
    fn test_negation_precedence() {
        let extractor = FieldExtractor::new();

        let fields = extractor.extract("I have no ABN and GST years");
        assert_eq!(num(&fields, "ABN_years"), Some(0.0));
        assert_eq!(num(&fields, "GST_years"), Some(0.0));

        // Negation short-circuits the numeric pattern for that field
        let (abn, gst) = extractor.extract_business_history("no ABN, but GST for 3 years");
        assert_eq!(abn, Some(0.0));
        assert_eq!(gst, Some(3.0));

        let (_, gst) = extractor.extract_business_history("ABN 4 years, not registered for GST");
        assert_eq!(gst, Some(0.0));
    }

    #[test]
    fn test_abn_gst_years() {
        let extractor = FieldExtractor::new();

        assert_eq!(
            extractor.extract_business_history("ABN for 3 years and GST for 2 years"),
            (Some(3.0), Some(2.0))
        );
        assert_eq!(
            extractor.extract_business_history("3 years ABN and 2 years GST"),
            (Some(3.0), Some(2.0))
        );
        assert_eq!(
            extractor.extract_business_history("ABN and GST 4 years"),
            (Some(4.0), Some(4.0))
        );
        assert_eq!(
            extractor.extract_business_history("had my ABN 18 months"),
            (Some(1.0), None)
        );
        assert_eq!(
            extractor.extract_business_history("ABN for 75 years"),
            (Some(50.0), None)
        );
    }

    #[test]
    fn test_enum_keywords() {
        let extractor = FieldExtractor::new();

        let fields = extractor.extract("I need a used ute for my business, I'm a sole trader");
        assert_eq!(text(&fields, "loan_type"), Some("commercial"));
        assert_eq!(text(&fields, "asset_type"), Some("motor_vehicle"));
        assert_eq!(text(&fields, "vehicle_type"), Some("light_commercial"));
        assert_eq!(text(&fields, "vehicle_condition"), Some("used"));
        assert_eq!(text(&fields, "business_structure"), Some("sole_trader"));

        let fields = extractor.extract("an excavator, brand new");
        assert_eq!(text(&fields, "asset_type"), Some("machinery"));
        assert_eq!(text(&fields, "vehicle_condition"), Some("new"));

        let fields = extractor.extract("it's a personal car, not for business");
        assert_eq!(text(&fields, "loan_type"), Some("consumer"));
        assert_eq!(text(&fields, "vehicle_type"), Some("passenger"));
    }

    #[test]
    fn test_new_application_is_not_vehicle_condition() {
        let extractor = FieldExtractor::new();
        let fields = extractor.extract("let's start a new application");
        assert!(!fields.contains_key("vehicle_condition"));
    }

    #[test]
    fn test_property_owner() {
        let extractor = FieldExtractor::new();

        assert_eq!(extractor.extract_property_owner("I own my home"), Some(true));
        assert_eq!(extractor.extract_property_owner("yes I'm a property owner"), Some(true));
        assert_eq!(extractor.extract_property_owner("I don't own property"), Some(false));
        assert_eq!(extractor.extract_property_owner("currently renting"), Some(false));
        assert_eq!(extractor.extract_property_owner("not a home owner"), Some(false));
        assert_eq!(extractor.extract_property_owner("I like cars"), None);
    }

    #[test]
    fn test_preferences() {
        let extractor = FieldExtractor::new();

        assert_eq!(extractor.extract_rate_ceiling("ideally under 8%"), Some(8.0));
        assert_eq!(extractor.extract_rate_ceiling("7.5% or less"), Some(7.5));
        assert_eq!(extractor.extract_monthly_budget("around $900 a month"), Some(900.0));
        assert_eq!(extractor.extract_monthly_budget("monthly repayments of 1,200"), Some(1_200.0));
        assert_eq!(extractor.extract_term_months("pay it off over 5 years"), Some(60.0));
        assert_eq!(extractor.extract_term_months("a 48 month term"), Some(48.0));
    }

    #[test]
    fn test_business_history_is_not_term() {
        let extractor = FieldExtractor::new();
        assert_eq!(extractor.extract_term_months("I've had an ABN for over 5 years"), None);
    }

    #[test]
    fn test_history_later_turn_overrides() {
        let extractor = FieldExtractor::new();
        let history = vec![
            Turn::user("my credit score is 650"),
            Turn::assistant("Thanks! How much would you like to borrow?"),
            Turn::user("sorry, it's actually credit score 700, and I need 40k"),
        ];

        let fields = extractor.extract_history(&history);
        assert_eq!(num(&fields, "credit_score"), Some(700.0));
        assert_eq!(num(&fields, "desired_loan_amount"), Some(40_000.0));
    }

    #[test]
    fn test_assistant_turns_are_ignored() {
        let extractor = FieldExtractor::new();
        let history = vec![
            Turn::assistant("Do you want a business loan for a truck?"),
            Turn::user("hello"),
        ];
        assert!(extractor.extract_history(&history).is_empty());
    }

    #[test]
    fn test_contextual_answers() {
        let extractor = FieldExtractor::new();

        let history = vec![
            Turn::assistant("Do you own property, such as your home?"),
            Turn::user("yes"),
            Turn::assistant("Do you know your credit score?"),
            Turn::user("about 720"),
        ];
        let fields = extractor.extract_history(&history);
        assert_eq!(fields.get("property_owner"), Some(&FieldValue::Bool(true)));
        assert_eq!(num(&fields, "credit_score"), Some(720.0));

        // Two numeric questions: the first one asked takes the answer
        let fields = extractor.extract_with_context(
            "3",
            Some("How long have you held an ABN and GST registration?"),
        );
        assert_eq!(num(&fields, "ABN_years"), Some(3.0));
        assert!(fields.get("GST_years").is_none());
    }

    #[test]
    fn test_bare_number_skips_implausible_fields() {
        let extractor = FieldExtractor::new();
        let question = "Thanks, I've noted your loan amount. How many years has your ABN been \
                        registered? Do you know your credit score?";

        let fields = extractor.extract_with_context("720", Some(question));
        assert_eq!(num(&fields, "credit_score"), Some(720.0));
        assert!(fields.get("ABN_years").is_none());

        let fields = extractor.extract_with_context("4 years", Some(question));
        assert_eq!(num(&fields, "ABN_years"), Some(4.0));
        assert!(fields.get("credit_score").is_none());

        // Statements outside a question are not cues
        let fields = extractor.extract_with_context(
            "720",
            Some("Thanks, I've noted your credit score. How many years has your ABN been registered?"),
        );
        assert!(fields.is_empty());
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let extractor = FieldExtractor::new();
        let history = vec![
            Turn::user("Commercial loan for a new truck, $120k"),
            Turn::user("no ABN and GST, credit score 610, renting"),
        ];
        assert_eq!(extractor.extract_history(&history), extractor.extract_history(&history));
    }
}
