//! Conversation types including stages and turns

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Conversation stage of the intake flow
///
/// Stages carry a total order. Natural progression only moves forward;
/// forcing conditions may jump to `ProductMatching` but never backwards.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    /// Opening turn, nothing collected yet
    #[default]
    Greeting = 1,
    /// Collecting the required (MVP) fields
    MvpCollection = 2,
    /// Collecting optional preferences
    PreferenceCollection = 3,
    /// Running the matching engine
    ProductMatching = 4,
    /// No full match, explaining gaps on the best near-miss
    GapAnalysis = 5,
    /// Customer is supplying information to close gaps
    Refinement = 6,
    /// A fully eligible product was recommended
    FinalRecommendation = 7,
    /// Conversation handed to a human broker
    Handoff = 8,
}

impl Stage {
    pub const ALL: [Stage; 8] = [
        Stage::Greeting,
        Stage::MvpCollection,
        Stage::PreferenceCollection,
        Stage::ProductMatching,
        Stage::GapAnalysis,
        Stage::Refinement,
        Stage::FinalRecommendation,
        Stage::Handoff,
    ];

    /// Position in the stage order (1-based)
    pub fn index(&self) -> u8 {
        *self as u8
    }

    /// Terminal stages accept further messages but never advance
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::FinalRecommendation | Stage::Handoff)
    }

    /// Whether this stage comes before matching has ever run
    pub fn is_collecting(&self) -> bool {
        *self < Stage::ProductMatching
    }

    /// Wire name used in API responses
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Greeting => "GREETING",
            Stage::MvpCollection => "MVP_COLLECTION",
            Stage::PreferenceCollection => "PREFERENCE_COLLECTION",
            Stage::ProductMatching => "PRODUCT_MATCHING",
            Stage::GapAnalysis => "GAP_ANALYSIS",
            Stage::Refinement => "REFINEMENT",
            Stage::FinalRecommendation => "FINAL_RECOMMENDATION",
            Stage::Handoff => "HANDOFF",
        }
    }

    /// Human-readable name for logs and dashboards
    pub fn display_name(&self) -> &'static str {
        match self {
            Stage::Greeting => "Greeting",
            Stage::MvpCollection => "MVP Collection",
            Stage::PreferenceCollection => "Preference Collection",
            Stage::ProductMatching => "Product Matching",
            Stage::GapAnalysis => "Gap Analysis",
            Stage::Refinement => "Refinement",
            Stage::FinalRecommendation => "Final Recommendation",
            Stage::Handoff => "Handoff",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role in a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    /// Customer message
    User,
    /// Agent message
    Assistant,
    /// System message (instructions)
    System,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnRole::User => "user",
            TurnRole::Assistant => "assistant",
            TurnRole::System => "system",
        }
    }
}

impl std::fmt::Display for TurnRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single turn in the conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    /// Role of the speaker
    pub role: TurnRole,
    /// Content of the turn
    pub content: String,
    /// When the turn occurred
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    /// Create a new turn
    pub fn new(role: TurnRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a user turn
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(TurnRole::User, content)
    }

    /// Create an assistant turn
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(TurnRole::Assistant, content)
    }

    pub fn is_user(&self) -> bool {
        self.role == TurnRole::User
    }
}
