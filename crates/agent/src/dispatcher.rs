use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use switchboard_core::context::ContextStore;
use switchboard_core::domain::capability::{CapabilityRequest, CapabilityResponse, CapabilityTag};
use switchboard_core::domain::conversation::{ConversationId, ConversationTurn};
use switchboard_core::domain::routing::RoutingDecision;
use switchboard_core::errors::ErrorKind;
use tracing::{info, warn};

use crate::auth::{AuthStatus, AuthStatusProvider};
use crate::conversation::is_status_follow_up;
use crate::render::{render_auth_required, render_response};
use crate::router::IntentRouter;
use crate::worker::WorkerHandle;
use crate::workers::pending_key;

pub const LAST_CAPABILITY: &str = "last_capability";
const PING_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DispatchReply {
    pub conversation_id: ConversationId,
    pub rendered: String,
    pub decision: RoutingDecision,
    pub response: CapabilityResponse,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentHealth {
    pub agent: String,
    pub alive: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handled: Option<u64>,
}

/// Front-line agent: routes each message, calls the chosen worker and owns
/// the conversation context.
pub struct Dispatcher {
    router: IntentRouter,
    workers: HashMap<CapabilityTag, WorkerHandle>,
    auth: Arc<dyn AuthStatusProvider>,
    context: ContextStore,
    worker_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        router: IntentRouter,
        workers: HashMap<CapabilityTag, WorkerHandle>,
        auth: Arc<dyn AuthStatusProvider>,
        context: ContextStore,
        worker_timeout: Duration,
    ) -> Self {
        Self { router, workers, auth, context, worker_timeout }
    }

    pub fn context(&self) -> &ContextStore {
        &self.context
    }

    /// Registered capabilities in routing priority order.
    pub fn registered(&self) -> Vec<CapabilityTag> {
        self.router
            .catalog()
            .tags()
            .into_iter()
            .filter(|tag| self.workers.contains_key(tag))
            .collect()
    }

    /// Handles one message where the conversation id also identifies the
    /// sender.
    pub async fn handle(&mut self, text: &str, conversation_id: &ConversationId) -> DispatchReply {
        let sender_id = conversation_id.as_str().to_string();
        self.handle_from(text, conversation_id, &sender_id).await
    }

    pub async fn handle_from(
        &mut self,
        text: &str,
        conversation_id: &ConversationId,
        sender_id: &str,
    ) -> DispatchReply {
        let snapshot = self.context.snapshot(conversation_id);
        let available = self.registered();

        let mut auth = BTreeMap::new();
        for tag in &available {
            auth.insert(*tag, self.auth.status(*tag).await);
        }

        let mut decision = self.router.route(text, &available, &auth).await;
        if decision.is_unmatched_fallback() {
            let sticky = sticky_capability(snapshot.preference(LAST_CAPABILITY), &available)
                .filter(|previous| {
                    is_status_follow_up(text) || has_pending_draft(&snapshot.preferences, *previous)
                });
            if let Some(previous) = sticky {
                decision = RoutingDecision::fallback(
                    previous,
                    decision.confidence,
                    format!("follow-up to previous {previous} exchange"),
                );
            }
        }
        if !self.workers.contains_key(&decision.tag) {
            warn!(
                event_name = "dispatch.route.unregistered",
                error_kind = %ErrorKind::RoutingFailure,
                tag = %decision.tag,
                "no worker registered for routed capability; using generic"
            );
            decision = RoutingDecision::fallback(
                CapabilityTag::Generic,
                decision.confidence,
                format!("{} is unavailable; routed to generic", decision.tag),
            );
        }

        info!(
            event_name = "dispatch.route.decided",
            conversation_id = %conversation_id,
            tag = %decision.tag,
            confidence = decision.confidence,
            source = ?decision.source,
            reason = %decision.reason,
            "routing decided"
        );

        let tag = decision.tag;
        let status = auth.get(&tag).cloned().unwrap_or_else(AuthStatus::authenticated);
        let (response, rendered, invoked) = if !status.authenticated {
            info!(
                event_name = "dispatch.auth.required",
                tag = %tag,
                missing_scopes = ?status.missing_scopes,
                "capability not connected; worker not called"
            );
            let rendered = render_auth_required(tag, &status.missing_scopes);
            (CapabilityResponse::failed(ErrorKind::AuthRequired, rendered.clone()), rendered, false)
        } else if let Some(worker) = self.workers.get(&tag) {
            let request = CapabilityRequest::new(text, sender_id)
                .with_history(snapshot.history())
                .with_preferences(snapshot.preferences.clone());
            let response = worker.call(request, self.worker_timeout).await;
            let rendered = render_response(tag, &response);
            (response, rendered, true)
        } else {
            let response = CapabilityResponse::failed(
                ErrorKind::RoutingFailure,
                ErrorKind::RoutingFailure.user_message(),
            );
            let rendered = render_response(tag, &response);
            (response, rendered, false)
        };

        info!(
            event_name = "dispatch.reply.rendered",
            conversation_id = %conversation_id,
            tag = %tag,
            success = response.success(),
            needs_clarification = response.needs_clarification(),
            error_kind = ?response.error_kind(),
            "reply rendered"
        );

        self.record(conversation_id, text, &rendered, &response, tag, invoked);

        DispatchReply { conversation_id: conversation_id.clone(), rendered, decision, response }
    }

    /// Appends the final exchange and applies the worker's remembered
    /// values. An empty remembered value clears that key.
    fn record(
        &mut self,
        conversation_id: &ConversationId,
        text: &str,
        rendered: &str,
        response: &CapabilityResponse,
        tag: CapabilityTag,
        invoked: bool,
    ) {
        self.context.append(conversation_id, ConversationTurn::user(text));
        self.context.append(conversation_id, ConversationTurn::assistant(rendered));

        for (key, value) in &response.remember {
            if value.is_empty() {
                self.context.remove_preference(conversation_id, key);
            } else {
                self.context.set_preference(conversation_id, key.clone(), value.clone());
            }
        }
        if invoked && tag != CapabilityTag::Generic {
            self.context.set_preference(conversation_id, LAST_CAPABILITY, tag.as_str());
        }
    }

    pub async fn health(&self) -> Vec<AgentHealth> {
        let mut report = vec![AgentHealth { agent: "dispatcher".to_string(), alive: true, handled: None }];
        for tag in self.registered() {
            let Some(worker) = self.workers.get(&tag) else {
                continue;
            };
            let health = worker.ping(PING_TIMEOUT).await;
            report.push(AgentHealth {
                agent: tag.to_string(),
                alive: health.is_some(),
                handled: health.map(|health| health.handled),
            });
        }
        report
    }
}

fn sticky_capability(previous: Option<&str>, available: &[CapabilityTag]) -> Option<CapabilityTag> {
    let tag = previous?.parse::<CapabilityTag>().ok()?;
    (tag != CapabilityTag::Generic && available.contains(&tag)).then_some(tag)
}

/// Whether `tag` left a draft waiting on an answer in this conversation.
fn has_pending_draft(preferences: &BTreeMap<String, String>, tag: CapabilityTag) -> bool {
    let prefix = pending_key(tag, "");
    preferences.iter().any(|(key, value)| key.starts_with(&prefix) && !value.is_empty())
}
