use std::sync::Arc;

use switchboard_core::domain::capability::{CapabilityResponse, CapabilityTag};
use switchboard_core::errors::ErrorKind;
use switchboard_core::quota::{describe_duration, QuotaGuard, QuotaPolicy};
use tracing::warn;

use crate::auth::AuthStatusProvider;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardrailDecision {
    Allow,
    Deny {
        reason_code: &'static str,
        error_kind: ErrorKind,
        user_message: String,
        fallback_path: &'static str,
    },
}

impl GuardrailDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    /// Failed worker response for a denial, `None` when allowed.
    pub fn into_response(self) -> Option<CapabilityResponse> {
        match self {
            Self::Allow => None,
            Self::Deny { error_kind, user_message, .. } => {
                Some(CapabilityResponse::failed(error_kind, user_message))
            }
        }
    }
}

/// Checks a worker runs immediately before an external side effect:
/// credentials first, then the sender's action quota. A denied check never
/// consumes quota.
pub struct ActionGuard {
    capability: CapabilityTag,
    auth: Arc<dyn AuthStatusProvider>,
    quota: QuotaGuard,
}

impl ActionGuard {
    pub fn new(
        capability: CapabilityTag,
        auth: Arc<dyn AuthStatusProvider>,
        policy: QuotaPolicy,
    ) -> Self {
        Self { capability, auth, quota: QuotaGuard::new(policy) }
    }

    pub fn capability(&self) -> CapabilityTag {
        self.capability
    }

    pub fn remaining(&mut self, sender_id: &str) -> u32 {
        self.quota.remaining(sender_id)
    }

    /// Credentials only. Read-only lookups use this and never touch quota.
    pub async fn check_connected(&self) -> GuardrailDecision {
        let status = self.auth.status(self.capability).await;
        if status.authenticated {
            return GuardrailDecision::Allow;
        }
        let decision = GuardrailDecision::Deny {
            reason_code: "auth_required",
            error_kind: ErrorKind::AuthRequired,
            user_message: format!(
                "{} is not connected. Connect it and try again.",
                service_name(self.capability)
            ),
            fallback_path: "connect_service",
        };
        self.log_denial(&decision, &format!("missing scopes: {}", status.missing_scopes.join(", ")));
        decision
    }

    pub async fn evaluate(&mut self, sender_id: &str) -> GuardrailDecision {
        let connected = self.check_connected().await;
        if !connected.is_allowed() {
            return connected;
        }

        if self.quota.check_and_consume(sender_id) {
            return GuardrailDecision::Allow;
        }

        let policy = self.quota.policy();
        let retry = self
            .quota
            .retry_after(sender_id)
            .map(describe_duration)
            .unwrap_or_else(|| policy.describe_window());
        let decision = GuardrailDecision::Deny {
            reason_code: "quota_exceeded",
            error_kind: ErrorKind::QuotaExceeded,
            user_message: format!(
                "You've reached the limit of {} {} actions per {}. Try again in {}.",
                policy.max_actions,
                self.capability,
                policy.describe_window(),
                retry
            ),
            fallback_path: "wait_for_quota",
        };
        self.log_denial(
            &decision,
            &format!("sender {sender_id} used {} actions per {}", policy.max_actions, policy.describe_window()),
        );
        decision
    }

    fn log_denial(&self, decision: &GuardrailDecision, detail: &str) {
        if let GuardrailDecision::Deny { reason_code, error_kind, fallback_path, .. } = decision {
            warn!(
                event_name = "worker.guard.denied",
                capability = %self.capability,
                reason_code = *reason_code,
                error_kind = %error_kind,
                fallback_path = *fallback_path,
                detail,
                "action refused before the external call"
            );
        }
    }
}

pub fn service_name(capability: CapabilityTag) -> &'static str {
    match capability {
        CapabilityTag::Mail => "Email",
        CapabilityTag::Music => "Music",
        CapabilityTag::Messaging => "Messaging",
        CapabilityTag::Contacts => "The directory",
        CapabilityTag::Generic => "Chat",
    }
}
