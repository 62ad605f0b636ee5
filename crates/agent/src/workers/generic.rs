use std::sync::Arc;

use async_trait::async_trait;
use switchboard_core::domain::capability::{CapabilityRequest, CapabilityResponse, CapabilityTag};
use switchboard_core::errors::ErrorKind;
use tracing::debug;

use super::WorkerDeps;
use crate::catalog::CapabilityCatalog;
use crate::conversation::is_status_follow_up;
use crate::llm::LlmClient;
use crate::worker::Worker;

/// Conversational fallback. Answers through the language model with the
/// history snapshot, or with a capabilities overview when no model is
/// reachable.
pub struct GenericWorker {
    llm: Arc<dyn LlmClient>,
    catalog: Arc<CapabilityCatalog>,
}

impl GenericWorker {
    pub fn new(deps: &WorkerDeps) -> Self {
        Self { llm: deps.llm.clone(), catalog: deps.catalog.clone() }
    }

    fn prompt(&self, request: &CapabilityRequest) -> String {
        let mut prompt = String::from(
            "You are a concise workplace assistant. Answer the user's latest message in one or two sentences.\n",
        );
        prompt.push_str(&format!("You can also help with: {}.\n", capability_names(&self.catalog)));
        if !request.conversation_history.is_empty() {
            prompt.push_str("\nConversation so far:\n");
            for message in &request.conversation_history {
                prompt.push_str(&format!("{}: {}\n", message.role.as_str(), message.content));
            }
        }
        prompt.push_str(&format!("\nuser: {}\nassistant:", request.original_text));
        prompt
    }
}

#[async_trait]
impl Worker for GenericWorker {
    fn capability(&self) -> CapabilityTag {
        CapabilityTag::Generic
    }

    async fn handle(&mut self, request: CapabilityRequest) -> CapabilityResponse {
        if is_status_follow_up(&request.original_text) && !request.has_history() {
            return CapabilityResponse::clarify(
                ErrorKind::MissingField,
                "I don't have any earlier messages in this conversation, so I can't tell what you're asking about.",
                vec![
                    "Tell me what you sent and to whom".to_string(),
                    "Start the request again, e.g. 'email Ben saying ...'".to_string(),
                ],
            );
        }

        match self.llm.complete(&self.prompt(&request)).await {
            Ok(answer) if !answer.trim().is_empty() => CapabilityResponse::completed(answer.trim()),
            Ok(_) => CapabilityResponse::completed(help_text(&self.catalog)),
            Err(error) => {
                debug!(
                    event_name = "worker.generic.llm_unavailable",
                    error = %error,
                    "answering with capability overview"
                );
                CapabilityResponse::completed(help_text(&self.catalog))
            }
        }
    }
}

fn capability_names(catalog: &CapabilityCatalog) -> String {
    catalog
        .profiles()
        .iter()
        .filter(|profile| profile.tag != CapabilityTag::Generic)
        .map(|profile| profile.tag.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn help_text(catalog: &CapabilityCatalog) -> String {
    let mut text = String::from("Here's what I can help with:");
    for profile in catalog.profiles().iter().filter(|profile| profile.tag != CapabilityTag::Generic) {
        let example = profile.examples.first().copied().unwrap_or_default();
        text.push_str(&format!("\n- {}: {} (e.g. \"{example}\")", profile.tag, profile.description));
    }
    text
}
