//! Intent Detection
//!
//! Detects explicit customer requests that steer the conversation
//! independently of field collection: asking to see options, declining
//! preferences, asking for a human, or starting over.
//!
//! # Example
//!
//! ```
//! use loan_agent_text_processing::intent::{CustomerIntent, IntentDetector};
//!
//! let detector = IntentDetector::new();
//! assert_eq!(detector.detect("just show me the options"), CustomerIntent::ShowOptions);
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Explicit customer intent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CustomerIntent {
    ShowOptions,
    DeclinePreferences,
    RequestHuman,
    StartOver,
    #[default]
    None,
}

impl CustomerIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            CustomerIntent::ShowOptions => "show_options",
            CustomerIntent::DeclinePreferences => "decline_preferences",
            CustomerIntent::RequestHuman => "request_human",
            CustomerIntent::StartOver => "start_over",
            CustomerIntent::None => "none",
        }
    }
}

impl std::fmt::Display for CustomerIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Detected intent with the phrase that triggered it
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedIntent {
    pub intent: CustomerIntent,
    pub matched: Option<String>,
}

// Order matters: a request for a human outranks everything, and starting
// over outranks showing options ("start over and show me options")
static INTENT_PATTERNS: Lazy<Vec<(Regex, CustomerIntent)>> = Lazy::new(|| vec![
    (Regex::new(r"(?i)\b(?:speak|talk|chat)\s+(?:to|with)\s+(?:a\s+|an\s+|someone\s+|somebody\s+)?(?:real\s+)?(?:human|person|broker|agent|someone|somebody)\b|\breal\s+person\b|\bcall\s+me\s+back\b|\b(?:give\s+me|request|book|arrange)\s+a\s+(?:phone\s+)?call\b|\bcall\s+me\s*(?:now|please|instead|asap)?\s*[.!?]?\s*$|\bhuman\s+(?:please|agent)\b").unwrap(), CustomerIntent::RequestHuman),
    (Regex::new(r"(?i)\bstart\s+(?:over|again|afresh|from\s+scratch)\b|\bnew\s+application\b|\b(?:a\s+)?different\s+loan\b|\bbegin\s+again\b").unwrap(), CustomerIntent::StartOver),
    (Regex::new(r"(?i)\bshow\s+me\s+(?:the\s+|my\s+|some\s+|your\s+)?(?:options|products|loans|rates|deals|what\s+you(?:\s+have|'ve\s+got|\s+offer))\b|\bjust\s+show\s+me\s*[.!]*\s*$|\blowest\s+rate\b|\brecommend(?:ation)?\s+(?:now|me\s+something|a\s+loan)\b|\bwhat\s+are\s+my\s+options\b|\bwhat\s+(?:can|do)\s+you\s+(?:offer|have)\b|\bbest\s+(?:deal|option|rate)\b").unwrap(), CustomerIntent::ShowOptions),
    (Regex::new(r"(?i)\bno\s+(?:particular\s+)?preferences?\b|\bdon'?t\s+(?:really\s+)?mind\b|\bdoesn'?t\s+matter\b|\bskip\b|\bnot\s+fussed\b|\bno\s+preference\b|\bwhatever\s+is\s+(?:best|cheapest)\b").unwrap(), CustomerIntent::DeclinePreferences),
]);

/// Rule-based intent detector
#[derive(Debug, Clone, Default)]
pub struct IntentDetector;

impl IntentDetector {
    pub fn new() -> Self {
        Self
    }

    /// Detect the customer's intent; [`CustomerIntent::None`] when nothing matches
    pub fn detect(&self, text: &str) -> CustomerIntent {
        self.detect_with_match(text).intent
    }

    /// Detect intent and return the matched phrase for logging
    pub fn detect_with_match(&self, text: &str) -> DetectedIntent {
        for (pattern, intent) in INTENT_PATTERNS.iter() {
            if let Some(m) = pattern.find(text) {
                tracing::debug!(intent = %intent, phrase = %m.as_str(), "Detected intent");
                return DetectedIntent {
                    intent: *intent,
                    matched: Some(m.as_str().to_string()),
                };
            }
        }

        DetectedIntent {
            intent: CustomerIntent::None,
            matched: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_show_options() {
        let detector = IntentDetector::new();
        for text in [
            "show me options",
            "What are my options?",
            "I just want the lowest rate",
            "recommend now please",
            "just show me",
            "just show me what you have",
            "can you show me your rates",
        ] {
            assert_eq!(detector.detect(text), CustomerIntent::ShowOptions, "{}", text);
        }
    }

    #[test]
    fn test_show_me_needs_an_object() {
        let detector = IntentDetector::new();
        for text in ["can you show me how this works", "show me where to sign"] {
            assert_ne!(detector.detect(text), CustomerIntent::ShowOptions, "{}", text);
        }
    }

    #[test]
    fn test_decline_preferences() {
        let detector = IntentDetector::new();
        for text in ["no preference", "I don't mind", "doesn't matter", "skip"] {
            assert_eq!(detector.detect(text), CustomerIntent::DeclinePreferences, "{}", text);
        }
    }

    #[test]
    fn test_request_human() {
        let detector = IntentDetector::new();
        for text in [
            "can I speak to a human",
            "I want to talk to a real person",
            "just call me",
            "please call me back this afternoon",
            "let me speak with a broker",
        ] {
            assert_eq!(detector.detect(text), CustomerIntent::RequestHuman, "{}", text);
        }
    }

    #[test]
    fn test_introductions_are_not_callbacks() {
        let detector = IntentDetector::new();
        assert_eq!(detector.detect("you can call me Sam"), CustomerIntent::None);
        assert_eq!(detector.detect("friends call me Jo, I need a car loan"), CustomerIntent::None);
    }

    #[test]
    fn test_start_over() {
        let detector = IntentDetector::new();
        for text in ["let's start over", "I want a new application", "start again", "actually a different loan"] {
            assert_eq!(detector.detect(text), CustomerIntent::StartOver, "{}", text);
        }
    }

    #[test]
    fn test_precedence_and_none() {
        let detector = IntentDetector::new();
        assert_eq!(
            detector.detect("start over and show me options"),
            CustomerIntent::StartOver
        );
        assert_eq!(
            detector.detect("show me options or I'll speak to a human"),
            CustomerIntent::RequestHuman
        );
        assert_eq!(detector.detect("my credit score is 700"), CustomerIntent::None);

        let detected = detector.detect_with_match("Skip that one");
        assert_eq!(detected.matched.as_deref(), Some("Skip"));
    }
}
