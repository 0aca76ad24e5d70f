//! Core turn processing for IntakeAgent

use loan_agent_catalog::Preferences;
use loan_agent_config::CoerceMode;
use loan_agent_core::{FieldMap, Stage};
use loan_agent_text_processing::CustomerIntent;

use super::{IntakeAgent, RejectedOverride, TurnOutcome, TurnRequest};
use crate::conversation::ConversationSession;
use crate::dst::{ChangeSource, CustomerProfile};
use crate::stage::{after_match, decide, StageInput, TransitionReason};
use crate::AgentError;

impl IntakeAgent {
    /// Process one customer message against a locked session
    ///
    /// Only an empty message is an error. Oracle failures, rejected
    /// overrides and empty match results all produce a normal reply.
    pub async fn process_turn(
        &self,
        session: &mut ConversationSession,
        request: TurnRequest,
    ) -> Result<TurnOutcome, AgentError> {
        let message = request.message.trim();
        if message.is_empty() {
            return Err(AgentError::InvalidInput("message must not be empty".into()));
        }

        if let Some(history) = request.history {
            if session.seed_history(history) {
                tracing::debug!(
                    session_id = %session.session_id(),
                    turns = session.history().len(),
                    "Seeded session from client history"
                );
            }
        }

        let intent = self.intents.detect(message);
        if intent == CustomerIntent::StartOver {
            session.reset();
        }

        let round = session.push_user_turn(message);

        // Extraction first, then overrides so they win on conflicts
        let reconciled = {
            let (history, cursor) = session.extraction_input();
            self.reconciler.reconcile(history, cursor).await
        };
        let (overrides, rejected_overrides) = self.validate_overrides(request.manual_field_overrides);

        let mut captured = changed_fields(session.profile(), &reconciled.fields);
        for field in changed_fields(session.profile(), &overrides) {
            if !captured.contains(&field) {
                captured.push(field);
            }
        }

        let profile = session.profile_mut();
        profile.merge(reconciled.fields, round, ChangeSource::Extraction);
        profile.merge(overrides, round, ChangeSource::Override);

        let decision = {
            let profile = session.profile();
            let missing_required = profile.missing_required(&self.schema);
            let missing_preferences = profile.missing_preferences(&self.schema);
            let input = StageInput {
                current: session.stage(),
                missing_required: &missing_required,
                missing_preferences: &missing_preferences,
                ask_attempts: profile.attempts(),
                has_value: profile.has_any_value(),
                has_preference: profile.has_preference(&self.schema),
                budget_rounds_used: session.budget_rounds_used(),
                preference_rounds: session.preference_rounds(),
                intent,
            };
            decide(&input, &self.config)
        };

        let previous = session.stage();
        session.transition_to(decision.stage, decision.reason);

        let mut next_questions = Vec::new();
        let mut match_status = None;

        let reply = if decision.run_matching {
            let values = session.profile().values();
            let preferences = Preferences::from_profile(values);
            let result = self
                .matching
                .match_with_oracle(
                    values,
                    preferences.as_ref(),
                    self.product_oracle.as_deref(),
                    self.oracle_timeout,
                )
                .await;

            let budget_exhausted = session.budget_rounds_used() >= self.config.max_rounds;
            let (stage, reason) = after_match(session.stage(), result.is_full_match(), budget_exhausted);
            session.transition_to(stage, reason);
            session.set_recommendations(
                result
                    .matches
                    .iter()
                    .take(self.config.max_recommendations)
                    .cloned()
                    .collect(),
            );

            tracing::info!(
                session_id = %session.session_id(),
                status = %result.status,
                candidates = result.matches.len(),
                stage = %stage,
                "Matching complete"
            );
            match_status = Some(result.status);
            self.render_match(stage, &result)
        } else if decision.reason == TransitionReason::HumanRequested {
            self.render_handoff()
        } else if decision.stage.is_terminal() {
            self.render_follow_up(decision.stage, session.last_recommendations())
        } else {
            if decision.stage == Stage::PreferenceCollection {
                session.increment_preference_rounds();
            }
            let recent = session.last_questions();
            next_questions = self.question_texts(&decision.fields_to_ask, &recent);
            for field in &decision.fields_to_ask {
                session.profile_mut().mark_asked(field);
            }
            session.remember_questions(&next_questions, self.config.max_recent_questions);
            self.render_questions(decision.stage, &captured, &next_questions)
        };

        session.push_assistant_turn(&reply);

        tracing::info!(
            session_id = %session.session_id(),
            round = round,
            from = %previous,
            stage = %session.stage(),
            intent = intent.as_str(),
            captured = captured.len(),
            asked = next_questions.len(),
            oracle = ?reconciled.oracle,
            "Turn processed"
        );

        Ok(TurnOutcome {
            reply,
            stage: session.stage(),
            profile: session.profile().values().clone(),
            recommendations: session.last_recommendations().to_vec(),
            next_questions,
            round_count: session.round_count(),
            rejected_overrides,
            match_status,
            oracle: reconciled.oracle,
            intent,
        })
    }

    /// Coerce manual overrides strictly, one field at a time
    fn validate_overrides(
        &self,
        overrides: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> (FieldMap, Vec<RejectedOverride>) {
        let mut accepted = FieldMap::new();
        let mut rejected = Vec::new();

        for (field, raw) in overrides.unwrap_or_default() {
            let result = if raw.is_null() {
                Err("null values cannot be applied".to_string())
            } else {
                self.schema
                    .coerce(&field, &raw, CoerceMode::Strict)
                    .map_err(|e| e.to_string())
            };

            match result {
                Ok(value) => {
                    accepted.insert(field, value);
                },
                Err(reason) => {
                    tracing::warn!(field = %field, reason = %reason, "Rejected field override");
                    rejected.push(RejectedOverride { field, reason });
                },
            }
        }

        (accepted, rejected)
    }
}

/// Fields in `deltas` whose value differs from the profile
fn changed_fields(profile: &CustomerProfile, deltas: &FieldMap) -> Vec<String> {
    deltas
        .iter()
        .filter(|(name, value)| profile.get(name) != Some(*value))
        .map(|(name, _)| name.clone())
        .collect()
}
