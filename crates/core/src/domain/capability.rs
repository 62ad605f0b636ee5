use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::conversation::HistoryMessage;
use crate::errors::ErrorKind;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityTag {
    Mail,
    Music,
    Messaging,
    Contacts,
    Generic,
}

impl CapabilityTag {
    pub const ALL: [CapabilityTag; 5] =
        [Self::Mail, Self::Music, Self::Messaging, Self::Contacts, Self::Generic];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mail => "mail",
            Self::Music => "music",
            Self::Messaging => "messaging",
            Self::Contacts => "contacts",
            Self::Generic => "generic",
        }
    }
}

impl std::fmt::Display for CapabilityTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown capability `{0}` (expected mail|music|messaging|contacts|generic)")]
pub struct UnknownCapability(pub String);

impl std::str::FromStr for CapabilityTag {
    type Err = UnknownCapability;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mail" | "email" => Ok(Self::Mail),
            "music" => Ok(Self::Music),
            "messaging" | "message" => Ok(Self::Messaging),
            "contacts" | "contact" => Ok(Self::Contacts),
            "generic" | "chat" => Ok(Self::Generic),
            other => Err(UnknownCapability(other.to_string())),
        }
    }
}

/// Request handed to a worker. `original_text` and `conversation_history`
/// are always present; the structured fields are optional hints the worker
/// prefers over anything it extracts from the text.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    pub original_text: String,
    #[serde(default)]
    pub conversation_history: Vec<HistoryMessage>,
    pub sender_id: String,
    #[serde(default)]
    pub preferences: BTreeMap<String, String>,
}

impl CapabilityRequest {
    pub fn new(original_text: impl Into<String>, sender_id: impl Into<String>) -> Self {
        Self {
            to: None,
            subject: None,
            body: None,
            original_text: original_text.into(),
            conversation_history: Vec::new(),
            sender_id: sender_id.into(),
            preferences: BTreeMap::new(),
        }
    }

    pub fn with_history(mut self, history: Vec<HistoryMessage>) -> Self {
        self.conversation_history = history;
        self
    }

    pub fn with_preferences(mut self, preferences: BTreeMap<String, String>) -> Self {
        self.preferences = preferences;
        self
    }

    pub fn has_history(&self) -> bool {
        !self.conversation_history.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ResponseOutcome {
    Completed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result_id: Option<String>,
        summary: String,
    },
    NeedsClarification {
        error_kind: ErrorKind,
        reasoning: String,
        #[serde(default)]
        suggestions: Vec<String>,
    },
    Failed {
        error_kind: ErrorKind,
        error_message: String,
    },
}

/// Worker reply. The outcome variant is the discriminant, so a response is
/// always exactly one of completed, needs-clarification, or failed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityResponse {
    #[serde(flatten)]
    pub outcome: ResponseOutcome,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub remember: BTreeMap<String, String>,
}

impl CapabilityResponse {
    pub fn completed(summary: impl Into<String>) -> Self {
        Self::from_outcome(ResponseOutcome::Completed { result_id: None, summary: summary.into() })
    }

    pub fn clarify(
        error_kind: ErrorKind,
        reasoning: impl Into<String>,
        suggestions: Vec<String>,
    ) -> Self {
        Self::from_outcome(ResponseOutcome::NeedsClarification {
            error_kind,
            reasoning: reasoning.into(),
            suggestions,
        })
    }

    pub fn failed(error_kind: ErrorKind, error_message: impl Into<String>) -> Self {
        Self::from_outcome(ResponseOutcome::Failed {
            error_kind,
            error_message: error_message.into(),
        })
    }

    fn from_outcome(outcome: ResponseOutcome) -> Self {
        Self { outcome, remember: BTreeMap::new() }
    }

    pub fn with_result_id(mut self, id: impl Into<String>) -> Self {
        if let ResponseOutcome::Completed { result_id, .. } = &mut self.outcome {
            *result_id = Some(id.into());
        }
        self
    }

    pub fn remember(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.remember.insert(key.into(), value.into());
        self
    }

    pub fn success(&self) -> bool {
        matches!(self.outcome, ResponseOutcome::Completed { .. })
    }

    pub fn needs_clarification(&self) -> bool {
        matches!(self.outcome, ResponseOutcome::NeedsClarification { .. })
    }

    pub fn result_id(&self) -> Option<&str> {
        match &self.outcome {
            ResponseOutcome::Completed { result_id, .. } => result_id.as_deref(),
            _ => None,
        }
    }

    pub fn summary(&self) -> Option<&str> {
        match &self.outcome {
            ResponseOutcome::Completed { summary, .. } => Some(summary),
            _ => None,
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match &self.outcome {
            ResponseOutcome::Completed { .. } => None,
            ResponseOutcome::NeedsClarification { error_kind, .. }
            | ResponseOutcome::Failed { error_kind, .. } => Some(*error_kind),
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.outcome {
            ResponseOutcome::Failed { error_message, .. } => Some(error_message),
            _ => None,
        }
    }

    pub fn reasoning(&self) -> Option<&str> {
        match &self.outcome {
            ResponseOutcome::NeedsClarification { reasoning, .. } => Some(reasoning),
            _ => None,
        }
    }

    pub fn suggestions(&self) -> &[String] {
        match &self.outcome {
            ResponseOutcome::NeedsClarification { suggestions, .. } => suggestions,
            _ => &[],
        }
    }
}
