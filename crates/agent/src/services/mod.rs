//! Implementations of the external service traits.
//!
//! - [`heuristic`]: offline, deterministic rules
//! - [`llm`]: prompts over any [`Provider`](pathwise_core::Provider)

pub mod heuristic;
pub mod llm;

use serde_json::Value;

pub use heuristic::{CountReflector, KeywordClassifier, LexicalVerifier, RuleBasedPlanner, TemplateFormatter};
pub use llm::LlmServices;

/// The first complete JSON value in `text`, starting at any `[` or `{`.
///
/// Models wrap JSON in prose or code fences, so each candidate start is
/// tried in turn until one parses.
pub fn extract_json(text: &str) -> Option<Value> {
    first_json(text, &['[', '{'])
}

/// The first JSON array in `text`.
pub fn extract_json_array(text: &str) -> Option<Vec<Value>> {
    match first_json(text, &['['])? {
        Value::Array(items) => Some(items),
        _ => None,
    }
}

/// The first JSON object in `text`.
pub fn extract_json_object(text: &str) -> Option<serde_json::Map<String, Value>> {
    match first_json(text, &['{'])? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

fn first_json(text: &str, openers: &[char]) -> Option<Value> {
    text.char_indices()
        .filter(|(_, c)| openers.contains(c))
        .find_map(|(i, _)| {
            let mut stream = serde_json::Deserializer::from_str(&text[i..]).into_iter::<Value>();
            stream.next().and_then(Result::ok)
        })
}
