//! Conversation Session
//!
//! Per-session state for one customer: profile, stage, history and the
//! round counters that drive the budget. Mutated only by the agent while
//! the session lock is held.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};

use loan_agent_core::{FieldMap, ProductMatch, Stage, Turn};

use crate::dst::reconciler::ExtractionCursor;
use crate::dst::CustomerProfile;
use crate::stage::{StageTransition, TransitionReason};

/// One customer's conversation
#[derive(Debug, Clone)]
pub struct ConversationSession {
    session_id: String,
    profile: CustomerProfile,
    stage: Stage,
    history: Vec<Turn>,
    /// History index where the current application began
    application_start: usize,
    extraction: ExtractionCursor,
    round_count: u32,
    budget_start_round: u32,
    preference_rounds: u32,
    last_recommendations: Vec<ProductMatch>,
    last_questions: VecDeque<String>,
    transitions: Vec<StageTransition>,
    created_at: DateTime<Utc>,
}

/// Read-only view returned by the sessions API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub stage: Stage,
    pub profile: FieldMap,
    pub asked: BTreeSet<String>,
    pub confirmed: BTreeSet<String>,
    pub round_count: u32,
    pub transitions: Vec<StageTransition>,
    pub created_at: DateTime<Utc>,
}

impl ConversationSession {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            profile: CustomerProfile::new(),
            stage: Stage::Greeting,
            history: Vec::new(),
            application_start: 0,
            extraction: ExtractionCursor::default(),
            round_count: 0,
            budget_start_round: 0,
            preference_rounds: 0,
            last_recommendations: Vec::new(),
            last_questions: VecDeque::new(),
            transitions: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn profile(&self) -> &CustomerProfile {
        &self.profile
    }

    pub(crate) fn profile_mut(&mut self) -> &mut CustomerProfile {
        &mut self.profile
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    /// Turns of the current application, with the cursor extraction keeps
    /// across them
    pub(crate) fn extraction_input(&mut self) -> (&[Turn], &mut ExtractionCursor) {
        let start = self.application_start.min(self.history.len());
        (&self.history[start..], &mut self.extraction)
    }

    pub fn round_count(&self) -> u32 {
        self.round_count
    }

    /// Rounds counted against the budget since the application began
    pub fn budget_rounds_used(&self) -> u32 {
        self.round_count.saturating_sub(self.budget_start_round)
    }

    pub fn preference_rounds(&self) -> u32 {
        self.preference_rounds
    }

    pub fn last_recommendations(&self) -> &[ProductMatch] {
        &self.last_recommendations
    }

    pub fn last_questions(&self) -> Vec<String> {
        self.last_questions.iter().cloned().collect()
    }

    pub fn transitions(&self) -> &[StageTransition] {
        &self.transitions
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Replace an empty history with client-held turns
    ///
    /// Returns false when the server already holds history for this session.
    pub fn seed_history(&mut self, turns: Vec<Turn>) -> bool {
        if !self.history.is_empty() || turns.is_empty() {
            return false;
        }
        self.history = turns;
        true
    }

    /// Append a customer turn; this is the only place a round is counted
    pub fn push_user_turn(&mut self, content: &str) -> u32 {
        self.history.push(Turn::user(content));
        self.round_count += 1;
        self.round_count
    }

    pub fn push_assistant_turn(&mut self, content: &str) {
        self.history.push(Turn::assistant(content));
    }

    /// Move to a new stage, recording the transition when it changes
    pub fn transition_to(&mut self, to: Stage, reason: TransitionReason) {
        if to == self.stage {
            return;
        }
        tracing::info!(
            session_id = %self.session_id,
            from = %self.stage,
            to = %to,
            reason = ?reason,
            round = self.round_count,
            "Stage transition"
        );
        self.transitions
            .push(StageTransition::new(self.stage, to, reason, self.round_count));
        self.stage = to;
    }

    pub fn increment_preference_rounds(&mut self) {
        self.preference_rounds += 1;
    }

    pub fn set_recommendations(&mut self, recommendations: Vec<ProductMatch>) {
        self.last_recommendations = recommendations;
    }

    /// Remember sent questions, keeping at most `capacity`
    pub fn remember_questions(&mut self, questions: &[String], capacity: usize) {
        for question in questions {
            self.last_questions.push_back(question.clone());
        }
        while self.last_questions.len() > capacity {
            self.last_questions.pop_front();
        }
    }

    /// Start a new application
    ///
    /// Must be called before the triggering message is pushed: that message
    /// becomes the first round of the fresh budget. `round_count` keeps
    /// counting and history is retained for the transcript.
    pub fn reset(&mut self) {
        tracing::info!(
            session_id = %self.session_id,
            round = self.round_count,
            "Starting a new application"
        );
        let from = self.stage;
        self.profile.reset();
        self.preference_rounds = 0;
        self.last_recommendations.clear();
        self.last_questions.clear();
        self.budget_start_round = self.round_count;
        self.application_start = self.history.len();
        self.extraction = ExtractionCursor::default();
        self.stage = Stage::Greeting;
        self.transitions.push(StageTransition::new(
            from,
            Stage::Greeting,
            TransitionReason::StartOver,
            self.round_count,
        ));
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id.clone(),
            stage: self.stage,
            profile: self.profile.values().clone(),
            asked: self.profile.asked().clone(),
            confirmed: self.profile.confirmed().clone(),
            round_count: self.round_count,
            transitions: self.transitions.clone(),
            created_at: self.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dst::ChangeSource;
    use loan_agent_config::constants::fields;

    #[test]
    fn test_round_count_per_user_turn() {
        let mut session = ConversationSession::new("s1");
        for n in 1..=3 {
            assert_eq!(session.push_user_turn("hello"), n);
            session.push_assistant_turn("hi");
        }
        assert_eq!(session.round_count(), 3);
        assert_eq!(session.history().len(), 6);
    }

    #[test]
    fn test_seed_history_only_when_empty() {
        let mut session = ConversationSession::new("s1");
        assert!(session.seed_history(vec![Turn::user("hi"), Turn::assistant("hello")]));
        assert!(!session.seed_history(vec![Turn::user("again")]));
        assert_eq!(session.history().len(), 2);
        assert_eq!(session.round_count(), 0);
    }

    #[test]
    fn test_transitions_recorded_on_change_only() {
        let mut session = ConversationSession::new("s1");
        session.push_user_turn("hi");
        session.transition_to(Stage::Greeting, TransitionReason::Stay);
        session.transition_to(Stage::MvpCollection, TransitionReason::NaturalFlow);

        assert_eq!(session.transitions().len(), 1);
        assert_eq!(session.transitions()[0].round, 1);
        assert_eq!(session.stage(), Stage::MvpCollection);
    }

    #[test]
    fn test_question_window_is_bounded() {
        let mut session = ConversationSession::new("s1");
        let questions: Vec<String> = (0..7).map(|i| format!("q{}", i)).collect();
        session.remember_questions(&questions, 5);
        assert_eq!(session.last_questions(), questions[2..].to_vec());
    }

    #[test]
    fn test_reset_keeps_round_count() {
        let mut session = ConversationSession::new("s1");
        session.push_user_turn("commercial loan, credit score 700");
        session.profile_mut().merge(
            [(fields::CREDIT_SCORE.to_string(), 700.0.into())].into(),
            1,
            ChangeSource::Extraction,
        );
        session.transition_to(Stage::MvpCollection, TransitionReason::NaturalFlow);
        session.push_assistant_turn("How long have you held your ABN?");

        session.reset();
        session.push_user_turn("start over please");

        assert_eq!(session.round_count(), 2);
        assert_eq!(session.budget_rounds_used(), 1);
        assert_eq!(session.stage(), Stage::Greeting);
        assert!(!session.profile().has_any_value());
        let (turns, cursor) = session.extraction_input();
        assert_eq!(turns.len(), 1);
        assert_eq!(cursor.next_turn(), 0);
        assert_eq!(
            session.transitions().last().map(|t| t.reason),
            Some(TransitionReason::StartOver)
        );
    }

    #[test]
    fn test_snapshot() {
        let mut session = ConversationSession::new("s1");
        session.push_user_turn("hi");
        let snapshot = session.snapshot();
        assert_eq!(snapshot.session_id, "s1");
        assert_eq!(snapshot.round_count, 1);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["stage"], "GREETING");
    }
}
