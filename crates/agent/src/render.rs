use switchboard_core::domain::capability::{CapabilityResponse, CapabilityTag, ResponseOutcome};
use switchboard_core::errors::ErrorKind;

use crate::guardrails::service_name;

/// Turns a worker response into the text shown to the user.
pub fn render_response(capability: CapabilityTag, response: &CapabilityResponse) -> String {
    match &response.outcome {
        ResponseOutcome::Completed { result_id: Some(id), summary } => {
            format!("{summary} (id: {id})")
        }
        ResponseOutcome::Completed { result_id: None, summary } => summary.clone(),
        ResponseOutcome::NeedsClarification { reasoning, suggestions, .. } => {
            let mut rendered = reasoning.clone();
            for suggestion in suggestions {
                rendered.push_str(&format!("\n- {suggestion}"));
            }
            rendered
        }
        ResponseOutcome::Failed { error_kind, error_message } => {
            render_failure(capability, *error_kind, error_message)
        }
    }
}

fn render_failure(capability: CapabilityTag, kind: ErrorKind, message: &str) -> String {
    let message = message.trim();
    let detail = if message.is_empty() { kind.user_message() } else { message };
    match kind {
        ErrorKind::ExternalActionFailed => {
            format!("Sorry, the {capability} service couldn't complete that: {detail}")
        }
        ErrorKind::Timeout | ErrorKind::WorkerUnavailable if message.is_empty() => {
            format!("{detail} You can retry in a moment.")
        }
        _ => detail.to_string(),
    }
}

pub fn render_auth_required(capability: CapabilityTag, missing_scopes: &[String]) -> String {
    let mut rendered = format!(
        "{} is not connected yet. Connect your {capability} account to continue.",
        service_name(capability)
    );
    if !missing_scopes.is_empty() {
        rendered.push_str(&format!(" Missing permissions: {}.", missing_scopes.join(", ")));
    }
    rendered
}

#[cfg(test)]
mod tests {
    use switchboard_core::domain::capability::{CapabilityResponse, CapabilityTag};
    use switchboard_core::errors::ErrorKind;

    use super::{render_auth_required, render_response};

    #[test]
    fn completed_response_includes_result_id() {
        let response = CapabilityResponse::completed("Email sent to ben@example.com.").with_result_id("r-9");
        assert_eq!(
            render_response(CapabilityTag::Mail, &response),
            "Email sent to ben@example.com. (id: r-9)"
        );
    }

    #[test]
    fn clarification_lists_suggestions() {
        let response = CapabilityResponse::clarify(
            ErrorKind::AmbiguousEntity,
            "Which one did you mean?",
            vec!["@bsmith".to_string(), "@btaylor".to_string()],
        );
        assert_eq!(
            render_response(CapabilityTag::Messaging, &response),
            "Which one did you mean?\n- @bsmith\n- @btaylor"
        );
    }

    #[test]
    fn failures_render_per_kind() {
        let external = CapabilityResponse::failed(ErrorKind::ExternalActionFailed, "relay refused");
        assert_eq!(
            render_response(CapabilityTag::Mail, &external),
            "Sorry, the mail service couldn't complete that: relay refused"
        );

        let timeout = CapabilityResponse::failed(ErrorKind::Timeout, "");
        assert!(render_response(CapabilityTag::Music, &timeout).contains("retry"));
    }

    #[test]
    fn auth_prompt_names_capability_and_scopes() {
        let rendered = render_auth_required(CapabilityTag::Music, &["playlist-modify-private".to_string()]);
        assert_eq!(
            rendered,
            "Music is not connected yet. Connect your music account to continue. Missing permissions: playlist-modify-private."
        );
    }
}
