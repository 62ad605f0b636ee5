use std::sync::Arc;

use async_trait::async_trait;
use switchboard_core::domain::capability::{CapabilityRequest, CapabilityResponse, CapabilityTag};
use switchboard_core::errors::ErrorKind;
use switchboard_core::resolver::{EntityResolver, ResolutionFilters};
use tracing::info;

use super::{
    describe_items, describe_missing, execute_action, pending_field, remember_pending,
    resolve_person, StatusScan, WorkerDeps,
};
use crate::conversation::{
    clean_fragment, find_phrase, is_status_follow_up, split_command, strip_leading_phrases,
};
use crate::directory::DirectoryProvider;
use crate::guardrails::ActionGuard;
use crate::tools::{ActionExecutor, ResolvedAction};
use crate::worker::Worker;

const SEND_VERBS: [&str; 8] =
    ["send a message to", "send a dm to", "message", "dm", "tell", "ping", "text", "send"];

const RECIPIENT_DELIMITERS: [&str; 8] =
    ["a message saying", "a message that", "a message", "a dm", "saying", "that", ":", "about"];

const ANSWER_LEADS: [&str; 4] = ["saying", "that", ":", "tell them"];

/// "what did <name> say" style questions, as opener and closer.
const HISTORY_QUESTIONS: [(&str, &str); 2] = [("what did", "say"), ("what has", "said")];
const HISTORY_LEADS: [&str; 5] = [
    "message history with",
    "chat history with",
    "dm history with",
    "messages from",
    "messages with",
];
const HISTORY_LIMIT: usize = 10;

const SENT: StatusScan = StatusScan {
    done_prefixes: &["Message sent"],
    noun: "message",
    nothing_done: "I don't see a message sent earlier in this conversation.",
    retry_example: "tell Ben: ...",
};

const RECIPIENT: &str = "recipient";
const TEXT: &str = "text";
const HISTORY: &str = "history";

pub struct MessagingWorker {
    directory: Arc<dyn DirectoryProvider>,
    executor: Arc<dyn ActionExecutor>,
    guard: ActionGuard,
    resolver: EntityResolver,
}

impl MessagingWorker {
    pub fn new(deps: &WorkerDeps) -> Self {
        Self {
            directory: deps.directory.clone(),
            executor: deps.executors.executor(CapabilityTag::Messaging),
            guard: ActionGuard::new(CapabilityTag::Messaging, deps.auth.clone(), deps.quota),
            resolver: EntityResolver::new(),
        }
    }

    /// Reads recent direct messages with one person. Reads need a connected
    /// account but leave the send quota alone.
    async fn recent_messages(
        &self,
        request: &CapabilityRequest,
        counterpart: String,
    ) -> CapabilityResponse {
        let entity = match resolve_person(
            self.directory.as_ref(),
            &self.resolver,
            &counterpart,
            &ResolutionFilters::default(),
        )
        .await
        {
            Ok(entity) => entity,
            Err(response) => {
                return remember_pending(
                    response,
                    CapabilityTag::Messaging,
                    &[(HISTORY, Some(counterpart.as_str()))],
                );
            }
        };

        if let Some(denied) = self.guard.check_connected().await.into_response() {
            return denied;
        }

        let name = entity.preferred_name().to_string();
        let action = ResolvedAction::FetchMessages {
            counterpart_id: entity.id.to_string(),
            counterpart_name: name.clone(),
            limit: HISTORY_LIMIT,
        };
        let receipt = match execute_action(self.executor.as_ref(), &action).await {
            Ok(receipt) => receipt,
            Err(response) => return response,
        };

        info!(
            event_name = "worker.messaging.history_fetched",
            sender_id = %request.sender_id,
            counterpart_id = %entity.id,
            messages = receipt.items.len(),
            "direct message history fetched"
        );
        let summary = describe_items(
            &format!("Recent messages with {name}"),
            &receipt.items,
            &format!("No recent messages with {name}."),
        );
        remember_pending(
            CapabilityResponse::completed(summary),
            CapabilityTag::Messaging,
            &[(HISTORY, None)],
        )
    }

    async fn compose(&mut self, request: &CapabilityRequest) -> CapabilityResponse {
        let (recipient, text) = message_parts(request);

        let mut missing = Vec::new();
        if recipient.is_none() {
            missing.push("who to message");
        }
        if text.is_none() {
            missing.push("what to say");
        }
        let (Some(recipient), Some(text)) = (recipient.clone(), text.clone()) else {
            let response = CapabilityResponse::clarify(
                ErrorKind::MissingField,
                format!("To send this message I still need {}.", describe_missing(&missing)),
                vec!["Try 'tell Ben: standup moved to 10'".to_string()],
            );
            return remember_pending(
                response,
                CapabilityTag::Messaging,
                &[(RECIPIENT, recipient.as_deref()), (TEXT, text.as_deref()), (HISTORY, None)],
            );
        };

        let entity = match resolve_person(
            self.directory.as_ref(),
            &self.resolver,
            &recipient,
            &ResolutionFilters::default(),
        )
        .await
        {
            Ok(entity) => entity,
            Err(response) => {
                return remember_pending(
                    response,
                    CapabilityTag::Messaging,
                    &[(RECIPIENT, None), (TEXT, Some(text.as_str())), (HISTORY, None)],
                );
            }
        };

        if let Some(denied) = self.guard.evaluate(&request.sender_id).await.into_response() {
            return denied;
        }

        let name = entity.preferred_name().to_string();
        let action = ResolvedAction::SendMessage {
            recipient_id: entity.id.to_string(),
            recipient_name: name.clone(),
            text,
        };
        let receipt = match execute_action(self.executor.as_ref(), &action).await {
            Ok(receipt) => receipt,
            Err(response) => return response,
        };

        info!(
            event_name = "worker.messaging.sent",
            sender_id = %request.sender_id,
            recipient_id = %entity.id,
            receipt_id = %receipt.id,
            "direct message sent"
        );
        let response = CapabilityResponse::completed(format!("Message sent to {name} (@{}).", entity.username))
            .with_result_id(receipt.id);
        remember_pending(
            response,
            CapabilityTag::Messaging,
            &[(RECIPIENT, None), (TEXT, None), (HISTORY, None)],
        )
    }
}

#[async_trait]
impl Worker for MessagingWorker {
    fn capability(&self) -> CapabilityTag {
        CapabilityTag::Messaging
    }

    async fn handle(&mut self, request: CapabilityRequest) -> CapabilityResponse {
        if is_status_follow_up(&request.original_text) {
            return SENT.answer(&request.conversation_history);
        }
        if let Some(counterpart) = history_request(&request) {
            return self.recent_messages(&request, counterpart).await;
        }
        self.compose(&request).await
    }
}

/// Who a history question is about. A bare answer to an earlier history
/// clarification names the person directly.
fn history_request(request: &CapabilityRequest) -> Option<String> {
    let text = request.original_text.as_str();
    if let Some(counterpart) = history_counterpart(text) {
        return Some(counterpart);
    }
    if split_command(text, &SEND_VERBS, &RECIPIENT_DELIMITERS).is_some() {
        return None;
    }
    pending_field(request, CapabilityTag::Messaging, HISTORY).and_then(|_| clean_fragment(text))
}

fn history_counterpart(text: &str) -> Option<String> {
    let lower = text.to_ascii_lowercase();
    for (opener, closer) in HISTORY_QUESTIONS {
        let Some(start) = find_phrase(&lower, opener) else {
            continue;
        };
        let rest = start + opener.len();
        if let Some(end) = find_phrase(&lower[rest..], closer) {
            return clean_fragment(&text[rest..rest + end]);
        }
    }

    HISTORY_LEADS
        .iter()
        .filter_map(|lead| find_phrase(&lower, lead).map(|at| (at, lead.len())))
        .min_by_key(|(at, _)| *at)
        .and_then(|(at, len)| clean_fragment(&text[at + len..]))
}

fn message_parts(request: &CapabilityRequest) -> (Option<String>, Option<String>) {
    let (mut recipient, mut text) = match split_command(
        &request.original_text,
        &SEND_VERBS,
        &RECIPIENT_DELIMITERS,
    ) {
        Some(parts) => (parts.target, parts.remainder),
        None => {
            let recipient = pending_field(request, CapabilityTag::Messaging, RECIPIENT);
            let text = pending_field(request, CapabilityTag::Messaging, TEXT);
            let has_pending = recipient.is_some() || text.is_some();
            let answer = request.original_text.as_str();
            match (recipient, text) {
                (None, text) if has_pending => (clean_fragment(answer), text),
                (Some(recipient), None) => {
                    (Some(recipient), clean_fragment(strip_leading_phrases(answer, &ANSWER_LEADS)))
                }
                other => other,
            }
        }
    };

    if let Some(to) = request.to.as_deref().and_then(clean_fragment) {
        recipient = Some(to);
    }
    if let Some(body) = request.body.as_deref().and_then(clean_fragment) {
        text = Some(body);
    }
    (recipient, text)
}
