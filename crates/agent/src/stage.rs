//! Stage-Based Dialog Management
//!
//! The conversation state machine as two pure functions:
//! - [`decide`] picks the next stage and the fields to ask from the
//!   current profile state and the customer's intent
//! - [`after_match`] resolves a matching run into the stage that follows
//!
//! Stages only move forward. The one way back to `Greeting` is a session
//! reset, which the agent performs before calling [`decide`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use loan_agent_config::AgentConfig;
use loan_agent_core::Stage;
use loan_agent_text_processing::CustomerIntent;

/// Reason for a stage transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionReason {
    /// First values arrived during the greeting
    NaturalFlow,
    /// Nothing required is still blocking
    RequiredCollected,
    /// A preference was supplied
    PreferencesProvided,
    /// Customer said they have no preferences
    PreferencesDeclined,
    /// Preferences were asked for the allowed number of rounds
    PreferenceRoundsExhausted,
    /// Customer asked to see options
    CustomerRequest,
    /// Customer asked for a person
    HumanRequested,
    /// Round budget used up before matching
    RoundBudgetExhausted,
    /// Matching found a fully eligible product
    FullMatch,
    /// Matching found only near-misses or nothing
    GapsFound,
    /// Gaps remain and the round budget is used up
    GapsUnresolved,
    /// Customer is working on the gaps
    Refining,
    /// Customer started a new application
    StartOver,
    /// Stage unchanged
    Stay,
}

/// Recorded stage change
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageTransition {
    pub from: Stage,
    pub to: Stage,
    pub reason: TransitionReason,
    pub round: u32,
    pub timestamp: DateTime<Utc>,
}

impl StageTransition {
    pub fn new(from: Stage, to: Stage, reason: TransitionReason, round: u32) -> Self {
        Self {
            from,
            to,
            reason,
            round,
            timestamp: Utc::now(),
        }
    }
}

/// Everything [`decide`] looks at
#[derive(Debug, Clone)]
pub struct StageInput<'a> {
    pub current: Stage,
    /// Missing required fields in ascending priority
    pub missing_required: &'a [String],
    /// Missing preference fields in ascending priority
    pub missing_preferences: &'a [String],
    pub ask_attempts: &'a BTreeMap<String, u32>,
    pub has_value: bool,
    pub has_preference: bool,
    /// Rounds counted against the budget (`round_count - budget_start_round`)
    pub budget_rounds_used: u32,
    pub preference_rounds: u32,
    pub intent: CustomerIntent,
}

/// Result of [`decide`]
#[derive(Debug, Clone, PartialEq)]
pub struct StageDecision {
    pub stage: Stage,
    pub fields_to_ask: Vec<String>,
    pub reason: TransitionReason,
    /// Matching has to run this turn; the final stage then comes from [`after_match`]
    pub run_matching: bool,
}

impl StageDecision {
    fn stay(stage: Stage) -> Self {
        Self {
            stage,
            fields_to_ask: Vec::new(),
            reason: TransitionReason::Stay,
            run_matching: false,
        }
    }

    fn ask(stage: Stage, fields_to_ask: Vec<String>, reason: TransitionReason) -> Self {
        Self {
            stage,
            fields_to_ask,
            reason,
            run_matching: false,
        }
    }

    fn matching(stage: Stage, reason: TransitionReason) -> Self {
        Self {
            stage,
            fields_to_ask: Vec::new(),
            reason,
            run_matching: true,
        }
    }
}

/// Pick the next stage
pub fn decide(input: &StageInput<'_>, config: &AgentConfig) -> StageDecision {
    let current = input.current;

    if input.intent == CustomerIntent::RequestHuman && !current.is_terminal() {
        return StageDecision::ask(Stage::Handoff, Vec::new(), TransitionReason::HumanRequested);
    }

    if current.is_terminal() {
        return StageDecision::stay(current);
    }

    if current < Stage::ProductMatching {
        if input.budget_rounds_used >= config.max_rounds {
            return StageDecision::matching(
                Stage::ProductMatching,
                TransitionReason::RoundBudgetExhausted,
            );
        }
        if input.intent == CustomerIntent::ShowOptions {
            return StageDecision::matching(Stage::ProductMatching, TransitionReason::CustomerRequest);
        }
    }

    let mut stage = current;
    let mut reason = TransitionReason::Stay;

    if stage == Stage::Greeting {
        if !input.has_value {
            let blocking = blocking_fields(input, config);
            return StageDecision::ask(
                Stage::Greeting,
                fields_to_ask(&blocking, input.budget_rounds_used, config),
                TransitionReason::Stay,
            );
        }
        stage = Stage::MvpCollection;
        reason = TransitionReason::NaturalFlow;
    }

    if stage == Stage::MvpCollection {
        let blocking = blocking_fields(input, config);
        if !blocking.is_empty() {
            return StageDecision::ask(
                stage,
                fields_to_ask(&blocking, input.budget_rounds_used, config),
                reason,
            );
        }
        if input.has_preference {
            return StageDecision::matching(
                Stage::ProductMatching,
                TransitionReason::RequiredCollected,
            );
        }
        return StageDecision::ask(
            Stage::PreferenceCollection,
            input.missing_preferences.to_vec(),
            TransitionReason::RequiredCollected,
        );
    }

    match stage {
        Stage::PreferenceCollection => {
            if input.has_preference {
                StageDecision::matching(Stage::ProductMatching, TransitionReason::PreferencesProvided)
            } else if input.intent == CustomerIntent::DeclinePreferences {
                StageDecision::matching(Stage::ProductMatching, TransitionReason::PreferencesDeclined)
            } else if input.preference_rounds >= config.max_preference_rounds {
                StageDecision::matching(
                    Stage::ProductMatching,
                    TransitionReason::PreferenceRoundsExhausted,
                )
            } else {
                StageDecision::ask(stage, input.missing_preferences.to_vec(), TransitionReason::Stay)
            }
        },
        Stage::ProductMatching => StageDecision::matching(stage, TransitionReason::Stay),
        Stage::GapAnalysis => StageDecision::matching(Stage::Refinement, TransitionReason::Refining),
        Stage::Refinement => {
            let reason = if input.intent == CustomerIntent::ShowOptions {
                TransitionReason::CustomerRequest
            } else {
                TransitionReason::Refining
            };
            StageDecision::matching(stage, reason)
        },
        _ => StageDecision::stay(stage),
    }
}

/// Stage after a matching run
///
/// `current` is the stage the decision moved to before matching ran.
pub fn after_match(current: Stage, full_match: bool, budget_exhausted: bool) -> (Stage, TransitionReason) {
    if full_match {
        return (Stage::FinalRecommendation, TransitionReason::FullMatch);
    }
    if budget_exhausted {
        return (Stage::Handoff, TransitionReason::GapsUnresolved);
    }
    if current >= Stage::GapAnalysis {
        (Stage::Refinement, TransitionReason::Refining)
    } else {
        (Stage::GapAnalysis, TransitionReason::GapsFound)
    }
}

/// Missing required fields still under the ask limit
fn blocking_fields(input: &StageInput<'_>, config: &AgentConfig) -> Vec<String> {
    input
        .missing_required
        .iter()
        .filter(|f| input.ask_attempts.get(*f).copied().unwrap_or(0) < config.max_ask_attempts)
        .cloned()
        .collect()
}

/// How many of the blocking fields to ask this turn
///
/// Spreads what is left over the remaining rounds, never fewer than
/// `questions_per_turn`; in the last round everything is asked.
pub fn fields_to_ask(blocking: &[String], budget_rounds_used: u32, config: &AgentConfig) -> Vec<String> {
    let remaining = config.max_rounds.saturating_sub(budget_rounds_used) as usize;
    if remaining <= 1 {
        return blocking.to_vec();
    }

    let n = blocking
        .len()
        .div_ceil(remaining)
        .max(config.questions_per_turn)
        .min(blocking.len());
    blocking[..n].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    struct Fixture {
        missing: Vec<String>,
        prefs: Vec<String>,
        attempts: BTreeMap<String, u32>,
    }

    impl Fixture {
        fn new(missing: &[&str]) -> Self {
            Self {
                missing: names(missing),
                prefs: names(&["interest_rate_ceiling", "monthly_budget", "preferred_term_months"]),
                attempts: BTreeMap::new(),
            }
        }

        fn input(&self, current: Stage) -> StageInput<'_> {
            StageInput {
                current,
                missing_required: &self.missing,
                missing_preferences: &self.prefs,
                ask_attempts: &self.attempts,
                has_value: true,
                has_preference: false,
                budget_rounds_used: 1,
                preference_rounds: 0,
                intent: CustomerIntent::None,
            }
        }
    }

    #[test]
    fn test_greeting_without_values_asks_first_questions() {
        let fixture = Fixture::new(&["loan_type", "asset_type", "credit_score"]);
        let mut input = fixture.input(Stage::Greeting);
        input.has_value = false;

        let decision = decide(&input, &AgentConfig::default());
        assert_eq!(decision.stage, Stage::Greeting);
        assert_eq!(decision.fields_to_ask, names(&["loan_type", "asset_type"]));
        assert!(!decision.run_matching);
    }

    #[test]
    fn test_greeting_moves_to_mvp() {
        let fixture = Fixture::new(&["asset_type", "credit_score"]);
        let decision = decide(&fixture.input(Stage::Greeting), &AgentConfig::default());
        assert_eq!(decision.stage, Stage::MvpCollection);
        assert_eq!(decision.reason, TransitionReason::NaturalFlow);
    }

    #[test]
    fn test_attempt_cap_drops_field_from_blocking_set() {
        let mut fixture = Fixture::new(&["credit_score"]);
        fixture.attempts.insert("credit_score".into(), 2);

        let decision = decide(&fixture.input(Stage::MvpCollection), &AgentConfig::default());
        assert_eq!(decision.stage, Stage::PreferenceCollection);
        assert_eq!(decision.fields_to_ask.len(), 3);
    }

    #[test]
    fn test_mvp_complete_with_preference_skips_preferences() {
        let fixture = Fixture::new(&[]);
        let mut input = fixture.input(Stage::MvpCollection);
        input.has_preference = true;

        let decision = decide(&input, &AgentConfig::default());
        assert_eq!(decision.stage, Stage::ProductMatching);
        assert!(decision.run_matching);
    }

    #[test]
    fn test_preference_stage_exits() {
        let fixture = Fixture::new(&[]);
        let config = AgentConfig::default();

        let input = fixture.input(Stage::PreferenceCollection);
        let decision = decide(&input, &config);
        assert_eq!(decision.stage, Stage::PreferenceCollection);
        assert_eq!(decision.fields_to_ask.len(), 3);

        let mut declined = fixture.input(Stage::PreferenceCollection);
        declined.intent = CustomerIntent::DeclinePreferences;
        assert_eq!(decide(&declined, &config).reason, TransitionReason::PreferencesDeclined);

        let mut exhausted = fixture.input(Stage::PreferenceCollection);
        exhausted.preference_rounds = 1;
        assert_eq!(
            decide(&exhausted, &config).reason,
            TransitionReason::PreferenceRoundsExhausted
        );
    }

    #[test]
    fn test_budget_forces_matching() {
        let fixture = Fixture::new(&["credit_score", "ABN_years"]);
        let mut input = fixture.input(Stage::MvpCollection);
        input.budget_rounds_used = 8;

        let decision = decide(&input, &AgentConfig::default());
        assert_eq!(decision.stage, Stage::ProductMatching);
        assert_eq!(decision.reason, TransitionReason::RoundBudgetExhausted);
        assert!(decision.run_matching);
    }

    #[test]
    fn test_show_options_and_human_request() {
        let fixture = Fixture::new(&["credit_score"]);
        let config = AgentConfig::default();

        let mut input = fixture.input(Stage::MvpCollection);
        input.intent = CustomerIntent::ShowOptions;
        assert_eq!(decide(&input, &config).reason, TransitionReason::CustomerRequest);

        input.intent = CustomerIntent::RequestHuman;
        let decision = decide(&input, &config);
        assert_eq!(decision.stage, Stage::Handoff);
        assert!(!decision.run_matching);

        let mut terminal = fixture.input(Stage::FinalRecommendation);
        terminal.intent = CustomerIntent::RequestHuman;
        assert_eq!(decide(&terminal, &config).stage, Stage::FinalRecommendation);
    }

    #[test]
    fn test_gap_analysis_moves_to_refinement() {
        let fixture = Fixture::new(&[]);
        let decision = decide(&fixture.input(Stage::GapAnalysis), &AgentConfig::default());
        assert_eq!(decision.stage, Stage::Refinement);
        assert!(decision.run_matching);
    }

    #[test]
    fn test_stage_never_regresses_without_forcing() {
        let fixture = Fixture::new(&["credit_score"]);
        let config = AgentConfig::default();
        for stage in Stage::ALL {
            let decision = decide(&fixture.input(stage), &config);
            assert!(decision.stage >= stage, "{} went to {}", stage, decision.stage);
        }
    }

    #[test]
    fn test_after_match() {
        assert_eq!(
            after_match(Stage::ProductMatching, true, true).0,
            Stage::FinalRecommendation
        );
        assert_eq!(after_match(Stage::ProductMatching, false, true).0, Stage::Handoff);
        assert_eq!(after_match(Stage::ProductMatching, false, false).0, Stage::GapAnalysis);
        assert_eq!(after_match(Stage::Refinement, false, false).0, Stage::Refinement);
    }

    #[test]
    fn test_fields_to_ask_spreads_over_remaining_rounds() {
        let config = AgentConfig::default();
        let blocking = names(&["a", "b", "c", "d", "e", "f", "g"]);

        // 7 fields over 7 rounds: the per-turn minimum applies
        assert_eq!(fields_to_ask(&blocking, 1, &config).len(), 2);
        // 7 fields over 2 rounds
        assert_eq!(fields_to_ask(&blocking, 6, &config).len(), 4);
        // last round asks everything
        assert_eq!(fields_to_ask(&blocking, 7, &config).len(), 7);
        // never more than what is blocking
        assert_eq!(fields_to_ask(&names(&["a"]), 1, &config), names(&["a"]));
    }
}
