use serde::{Deserialize, Serialize};

use crate::domain::capability::CapabilityTag;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingSource {
    Ai,
    Fallback,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub tag: CapabilityTag,
    pub confidence: f32,
    pub reason: String,
    pub source: RoutingSource,
}

impl RoutingDecision {
    pub fn ai(tag: CapabilityTag, confidence: f32, reason: impl Into<String>) -> Self {
        Self { tag, confidence, reason: reason.into(), source: RoutingSource::Ai }
    }

    pub fn fallback(tag: CapabilityTag, confidence: f32, reason: impl Into<String>) -> Self {
        Self { tag, confidence, reason: reason.into(), source: RoutingSource::Fallback }
    }

    /// Catch-all decision used when no keyword matched.
    pub fn unmatched() -> Self {
        Self::fallback(CapabilityTag::Generic, 0.0, "fallback routing: no keyword matches found")
    }

    pub fn is_unmatched_fallback(&self) -> bool {
        self.source == RoutingSource::Fallback
            && self.tag == CapabilityTag::Generic
            && self.confidence == 0.0
    }
}
