//! Reply rendering for IntakeAgent
//!
//! Replies are templated from the stage outcome. Question wording comes
//! from the field schema; everything else is fixed text.

use super::IntakeAgent;
use loan_agent_catalog::{MatchResult, MatchStatus};
use loan_agent_core::{ProductMatch, Stage};

const GREETING: &str = "Hi, I can help you find a suitable loan.";
const NO_MATCH: &str = "I couldn't find a product that fits your situation closely enough right now.";
const CATALOG_UNAVAILABLE: &str =
    "I'm unable to check our lender products at the moment, so a broker will follow up with you.";
const HANDOFF: &str = "I'll pass you to one of our brokers, who will be in touch shortly.";

impl IntakeAgent {
    /// Question texts for `fields`, avoiding anything asked recently
    pub(super) fn question_texts(&self, fields: &[String], recent: &[String]) -> Vec<String> {
        fields
            .iter()
            .filter_map(|name| self.schema.get(name))
            .map(|def| def.question_text(recent).to_string())
            .filter(|q| !q.is_empty())
            .collect()
    }

    /// Reply for a collecting turn
    pub(super) fn render_questions(
        &self,
        stage: Stage,
        captured: &[String],
        questions: &[String],
    ) -> String {
        let mut parts = Vec::new();

        if stage == Stage::Greeting && captured.is_empty() {
            parts.push(GREETING.to_string());
        } else if !captured.is_empty() {
            parts.push(format!("Thanks, I've noted your {}.", join_labels(captured)));
        }

        if stage == Stage::PreferenceCollection {
            parts.push("Do you have any preferences for the loan? If not, just say no preference.".into());
        }

        if questions.is_empty() {
            parts.push("Is there anything else you can tell me about the loan?".into());
        } else {
            parts.extend(questions.iter().cloned());
        }

        parts.join(" ")
    }

    /// Reply after a matching run
    pub(super) fn render_match(&self, stage: Stage, result: &MatchResult) -> String {
        if result.status == MatchStatus::Error {
            return CATALOG_UNAVAILABLE.to_string();
        }

        match (stage, result.best()) {
            (Stage::FinalRecommendation, Some(best)) => recommendation(best),
            (Stage::Handoff, Some(best)) => {
                format!("{} {}", gap_summary(best), HANDOFF)
            },
            (Stage::Handoff, None) => format!("{} {}", NO_MATCH, HANDOFF),
            (_, Some(best)) => format!(
                "{} If any of that has changed, or you can tell me more, I'll check again.",
                gap_summary(best)
            ),
            (_, None) => format!(
                "{} If any of your details have changed, let me know and I'll check again.",
                NO_MATCH
            ),
        }
    }

    pub(super) fn render_handoff(&self) -> String {
        HANDOFF.to_string()
    }

    /// Reply once the conversation has reached a terminal stage
    pub(super) fn render_follow_up(&self, stage: Stage, recommendations: &[ProductMatch]) -> String {
        match (stage, recommendations.first()) {
            (Stage::FinalRecommendation, Some(best)) => format!(
                "Your recommended option is still {} from {} at {:.2}%. Say \"start over\" to begin a new application, or ask to speak to a broker.",
                best.product, best.lender, best.interest_rate
            ),
            _ => "A broker will be in touch shortly. Say \"start over\" if you'd like to begin a new application.".to_string(),
        }
    }
}

fn recommendation(best: &ProductMatch) -> String {
    let mut reply = format!(
        "Good news: you qualify for {} from {} at {:.2}% p.a. (comparison rate {:.2}%).",
        best.product, best.lender, best.interest_rate, best.comparison_rate
    );
    if let Some(payment) = best.monthly_payment {
        reply.push_str(&format!(" Estimated repayments are ${:.2} per month.", payment));
    }
    if let Some(reason) = &best.reason {
        reply.push(' ');
        reply.push_str(reason);
    }
    reply
}

fn gap_summary(best: &ProductMatch) -> String {
    format!(
        "The closest option is {} from {} at {:.2}% p.a., but it would {}.",
        best.product,
        best.lender,
        best.interest_rate,
        best.gaps.join("; ")
    )
}

fn join_labels(fields: &[String]) -> String {
    let labels: Vec<String> = fields.iter().map(|f| label(f)).collect();
    match labels.as_slice() {
        [] => String::new(),
        [only] => only.clone(),
        [rest @ .., last] => format!("{} and {}", rest.join(", "), last),
    }
}

fn label(field: &str) -> String {
    match field {
        "ABN_years" => "ABN history".to_string(),
        "GST_years" => "GST history".to_string(),
        "desired_loan_amount" => "loan amount".to_string(),
        other => other.replace('_', " "),
    }
}
