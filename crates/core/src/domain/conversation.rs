use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConversationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self { role: Role::User, text: text.into(), timestamp: Utc::now() }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self { role: Role::Assistant, text: text.into(), timestamp: Utc::now() }
    }
}

/// Wire form of a turn as carried inside a capability request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub role: Role,
    pub content: String,
}

impl From<&ConversationTurn> for HistoryMessage {
    fn from(turn: &ConversationTurn) -> Self {
        Self { role: turn.role, content: turn.text.clone() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationContext {
    pub conversation_id: ConversationId,
    pub turns: Vec<ConversationTurn>,
    pub preferences: BTreeMap<String, String>,
}

impl ConversationContext {
    pub fn new(conversation_id: ConversationId) -> Self {
        Self { conversation_id, turns: Vec::new(), preferences: BTreeMap::new() }
    }

    /// Appends a turn and drops the oldest turns beyond `max_turns`.
    pub fn push_bounded(&mut self, turn: ConversationTurn, max_turns: usize) {
        self.turns.push(turn);
        if self.turns.len() > max_turns {
            let overflow = self.turns.len() - max_turns;
            self.turns.drain(..overflow);
        }
    }

    pub fn history(&self) -> Vec<HistoryMessage> {
        self.turns.iter().map(HistoryMessage::from).collect()
    }

    pub fn preference(&self, key: &str) -> Option<&str> {
        self.preferences.get(key).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::{ConversationContext, ConversationId, ConversationTurn, Role};

    #[test]
    fn push_bounded_keeps_most_recent_turns() {
        let mut context = ConversationContext::new(ConversationId::from("c-1"));
        for index in 0..4 {
            context.push_bounded(ConversationTurn::user(format!("turn {index}")), 3);
        }

        let texts: Vec<_> = context.turns.iter().map(|turn| turn.text.as_str()).collect();
        assert_eq!(texts, vec!["turn 1", "turn 2", "turn 3"]);
    }

    #[test]
    fn history_preserves_roles() {
        let mut context = ConversationContext::new(ConversationId::from("c-2"));
        context.push_bounded(ConversationTurn::user("hi"), 10);
        context.push_bounded(ConversationTurn::assistant("hello"), 10);

        let history = context.history();
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[1].role, Role::Assistant);
        assert_eq!(history[1].content, "hello");
    }
}
