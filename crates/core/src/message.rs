//! Conversation message types.
//!
//! The caller owns the session; the engine only ever sees a borrowed slice
//! of prior turns (`&[Message]`) plus the current query.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The assistant
    Assistant,
    /// System instructions (prompts sent to the provider)
    System,
}

/// A single message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Who sent this message
    pub role: Role,

    /// The text content
    pub content: String,

    /// Timestamp
    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }
}

/// The last `window` turns of `history`, oldest first.
pub fn recent_turns(history: &[Message], window: usize) -> &[Message] {
    let start = history.len().saturating_sub(window);
    &history[start..]
}

/// The most recent assistant turn within the last `window` turns.
pub fn last_assistant_turn(history: &[Message], window: usize) -> Option<&Message> {
    recent_turns(history, window)
        .iter()
        .rev()
        .find(|m| m.role == Role::Assistant)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_user_message() {
        let msg = Message::user("Show me nursing programs");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Show me nursing programs");
    }

    #[test]
    fn message_serialization_roundtrip() {
        let msg = Message::assistant("Are you interested in nursing programs?");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"assistant\""));
        let deserialized: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.role, Role::Assistant);
    }

    #[test]
    fn recent_turns_respects_window() {
        let history = vec![
            Message::user("one"),
            Message::assistant("two"),
            Message::user("three"),
        ];
        assert_eq!(recent_turns(&history, 2).len(), 2);
        assert_eq!(recent_turns(&history, 2)[0].content, "two");
        assert_eq!(recent_turns(&history, 10).len(), 3);
    }

    #[test]
    fn last_assistant_turn_outside_window_is_ignored() {
        let history = vec![
            Message::assistant("old offer"),
            Message::user("a"),
            Message::user("b"),
        ];
        assert!(last_assistant_turn(&history, 2).is_none());
        assert_eq!(
            last_assistant_turn(&history, 3).map(|m| m.content.as_str()),
            Some("old offer")
        );
    }
}
