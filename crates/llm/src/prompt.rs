//! Prompt Building
//!
//! Constructs the prompts for the extraction and product-matching oracles.
//! Conversation windows are rendered as a transcript inside a single user
//! message, so a window that opens on an agent turn is still a valid
//! request.

use serde::{Deserialize, Serialize};
use std::fmt;

use loan_agent_config::{FieldDefinition, FieldSchema, FieldType};
use loan_agent_core::{FieldMap, Product, Turn, TurnRole};

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// Chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Prompt builder for the oracles
#[derive(Debug, Default)]
pub struct PromptBuilder {
    messages: Vec<Message>,
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// System prompt for field extraction, listing every schema field
    pub fn extraction_system(mut self, schema: &FieldSchema) -> Self {
        let fields = schema
            .iter()
            .map(describe_field)
            .collect::<Vec<_>>()
            .join("\n");

        let system = format!(
            r#"You extract business loan application details from a conversation between a broker's assistant and a customer.

## Fields
{fields}

## Rules
- Only use what the customer actually said. Never guess.
- When the customer corrects themselves, use the latest statement.
- A short answer such as "yes" or "3" answers the assistant's question right before it.
- Use null for anything not stated.
- Respond with a single JSON object whose keys are the field names above. No other text."#
        );

        self.messages.push(Message::system(system));
        self
    }

    /// System prompt for choosing one product among eligible candidates
    pub fn product_system(mut self) -> Self {
        self.messages.push(Message::system(
            r#"You help a finance broker pick the single best loan product for a customer.
Every candidate already meets the customer's eligibility requirements. Prefer lower total cost, then fit with the customer's stated preferences.
Respond with a single JSON object: {"product": "<product name>", "lender": "<lender>", "reason": "<one sentence>"}. No other text."#,
        ));
        self
    }

    /// Add a conversation window as a transcript
    pub fn with_transcript(mut self, window: &[Turn]) -> Self {
        let transcript = window
            .iter()
            .filter(|t| t.role != TurnRole::System)
            .map(|t| {
                let speaker = match t.role {
                    TurnRole::User => "Customer",
                    _ => "Assistant",
                };
                format!("{}: {}", speaker, t.content.trim())
            })
            .collect::<Vec<_>>()
            .join("\n");

        self.messages
            .push(Message::user(format!("## Conversation\n{}", transcript)));
        self
    }

    /// Add the customer profile and candidate list
    pub fn with_candidates(mut self, profile: &FieldMap, candidates: &[Product]) -> Self {
        let profile_lines = if profile.is_empty() {
            "- (nothing provided)".to_string()
        } else {
            profile
                .iter()
                .map(|(name, value)| format!("- {}: {}", name, value))
                .collect::<Vec<_>>()
                .join("\n")
        };
        let candidate_lines = candidates
            .iter()
            .enumerate()
            .map(|(i, p)| format!("{}. {}", i + 1, p.summary()))
            .collect::<Vec<_>>()
            .join("\n");

        self.messages.push(Message::user(format!(
            "## Customer\n{}\n\n## Candidates\n{}",
            profile_lines, candidate_lines
        )));
        self
    }

    /// Build final message list
    pub fn build(self) -> Vec<Message> {
        self.messages
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }
}

fn describe_field(field: &FieldDefinition) -> String {
    let mut line = format!("- {} ({}", field.name, field.field_type.name());

    match field.field_type {
        FieldType::Enum if !field.options.is_empty() => {
            line.push_str(&format!(", one of: {}", field.options.join(", ")));
        },
        FieldType::Number => {
            if let Some(v) = &field.validation {
                if let (Some(min), Some(max)) = (v.min, v.max) {
                    line.push_str(&format!(", {} to {}", min, max));
                }
            }
        },
        _ => {},
    }
    line.push(')');

    if !field.description.is_empty() {
        line.push_str(": ");
        line.push_str(&field.description);
    }
    line
}
