//! Centralized constants for the loan intake agent
//!
//! Single source of truth for defaults and validation ranges. Settings
//! structs use these as serde defaults; extraction and matching use the
//! ranges directly.

/// Conversation policy defaults
pub mod conversation {
    /// Rounds before matching is forced
    pub const MAX_ROUNDS: u32 = 8;

    /// Times a required field is asked before it stops blocking
    pub const MAX_ASK_ATTEMPTS: u32 = 2;

    /// Minimum questions asked per turn while collecting
    pub const QUESTIONS_PER_TURN: usize = 2;

    /// Rounds spent in preference collection before moving on
    pub const MAX_PREFERENCE_ROUNDS: u32 = 1;

    /// Trailing turns passed to the extraction oracle
    pub const HISTORY_WINDOW: usize = 6;

    /// Recommendations kept per session
    pub const MAX_RECOMMENDATIONS: usize = 2;

    /// Recently asked questions kept per session
    pub const MAX_RECENT_QUESTIONS: usize = 5;
}

/// Matching engine defaults
pub mod matching {
    /// Maximum unmet requirements for a near-miss
    pub const NEAR_MISS_THRESHOLD: usize = 2;

    /// Loan amount used for comparison rates when the customer gave none
    pub const REFERENCE_LOAN_AMOUNT: f64 = 30_000.0;

    /// Term used for comparison rates when neither customer nor product gives one
    pub const REFERENCE_TERM_MONTHS: u32 = 60;
}

/// Validation ranges for extracted values
pub mod ranges {
    pub const YEARS_MIN: f64 = 0.0;
    pub const YEARS_MAX: f64 = 50.0;

    pub const CREDIT_SCORE_MIN: f64 = 300.0;
    pub const CREDIT_SCORE_MAX: f64 = 900.0;

    pub const LOAN_AMOUNT_MIN: f64 = 1_000.0;
    pub const LOAN_AMOUNT_MAX: f64 = 5_000_000.0;

    /// Anything above this is treated as a misparse, not clamped
    pub const ABSURD_AMOUNT: f64 = 1_000_000_000.0;

    pub const RATE_CEILING_MAX: f64 = 30.0;
    pub const MONTHLY_BUDGET_MIN: f64 = 50.0;
    pub const MONTHLY_BUDGET_MAX: f64 = 100_000.0;
    pub const TERM_MONTHS_MIN: f64 = 12.0;
    pub const TERM_MONTHS_MAX: f64 = 120.0;
}

/// Canonical field names
pub mod fields {
    pub const LOAN_TYPE: &str = "loan_type";
    pub const ASSET_TYPE: &str = "asset_type";
    pub const DESIRED_LOAN_AMOUNT: &str = "desired_loan_amount";
    pub const CREDIT_SCORE: &str = "credit_score";
    pub const PROPERTY_OWNER: &str = "property_owner";
    pub const ABN_YEARS: &str = "ABN_years";
    pub const GST_YEARS: &str = "GST_years";
    pub const VEHICLE_TYPE: &str = "vehicle_type";
    pub const VEHICLE_CONDITION: &str = "vehicle_condition";
    pub const BUSINESS_STRUCTURE: &str = "business_structure";
    pub const INTEREST_RATE_CEILING: &str = "interest_rate_ceiling";
    pub const MONTHLY_BUDGET: &str = "monthly_budget";
    pub const PREFERRED_TERM_MONTHS: &str = "preferred_term_months";

    /// `asset_type` value that pulls in the vehicle fields
    pub const VEHICLE_ASSET: &str = "motor_vehicle";
}

/// External endpoints
pub mod endpoints {
    pub const ANTHROPIC_DEFAULT: &str = "https://api.anthropic.com";
}

/// LLM call limits
pub mod llm {
    pub const TIMEOUT_SECS: u64 = 30;
    pub const TIMEOUT_MAX_SECS: u64 = 120;
    pub const MAX_TOKENS: usize = 512;
    pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
}

/// Session registry defaults
pub mod sessions {
    pub const MAX_SESSIONS: usize = 1000;
    pub const IDLE_TIMEOUT_SECS: u64 = 1800;
    pub const CLEANUP_INTERVAL_SECS: u64 = 60;
}
