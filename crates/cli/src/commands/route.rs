use std::collections::BTreeMap;

use serde::Serialize;
use switchboard_agent::auth::AuthStatusProvider;
use switchboard_agent::router::IntentRouter;
use switchboard_agent::runtime::{RuntimeComponents, RuntimeSettings};
use switchboard_core::domain::routing::RoutingDecision;

use crate::commands::{async_runtime, load_config, CommandResult, EXIT_AGENT};

#[derive(Debug, Serialize)]
pub struct RouteReport {
    pub text: String,
    pub decision: RoutingDecision,
}

pub fn run(text: &str) -> CommandResult {
    let config = match load_config("route") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let components = match RuntimeComponents::from_config(&config) {
        Ok(components) => components,
        Err(error) => {
            return CommandResult::failure("route", "llm_client", error.to_string(), EXIT_AGENT)
        }
    };
    let runtime = match async_runtime("route") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let settings = RuntimeSettings::from_config(&config);
    let report = runtime.block_on(decide(&components, &settings, text));
    CommandResult::json("route", &report)
}

/// Routes `text` against every catalog capability without invoking a worker.
pub async fn decide(
    components: &RuntimeComponents,
    settings: &RuntimeSettings,
    text: &str,
) -> RouteReport {
    let available = components.catalog.tags();
    let mut auth = BTreeMap::new();
    for tag in &available {
        auth.insert(*tag, components.auth.status(*tag).await);
    }

    let router =
        IntentRouter::new(components.llm.clone(), components.catalog.clone(), settings.router);
    let decision = router.route(text, &available, &auth).await;
    RouteReport { text: text.to_string(), decision }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use switchboard_agent::auth::StaticAuthStatus;
    use switchboard_agent::catalog::CapabilityCatalog;
    use switchboard_agent::directory::StaticDirectory;
    use switchboard_agent::llm::UnavailableLlm;
    use switchboard_agent::runtime::{RuntimeComponents, RuntimeSettings};
    use switchboard_agent::tools::ExecutorRegistry;
    use switchboard_core::domain::capability::CapabilityTag;
    use switchboard_core::domain::routing::RoutingSource;

    use super::decide;

    fn components() -> RuntimeComponents {
        let catalog = Arc::new(CapabilityCatalog::standard());
        RuntimeComponents {
            llm: Arc::new(UnavailableLlm),
            directory: Arc::new(StaticDirectory::default()),
            auth: Arc::new(StaticAuthStatus::new(CapabilityTag::ALL, &catalog)),
            executors: ExecutorRegistry::default(),
            catalog,
        }
    }

    #[tokio::test]
    async fn contact_questions_take_the_keyword_path_without_a_classifier() {
        let report =
            decide(&components(), &RuntimeSettings::default(), "find Philip's email address").await;

        assert_eq!(report.decision.tag, CapabilityTag::Contacts);
        assert_eq!(report.decision.source, RoutingSource::Fallback);
        assert!(report.decision.reason.starts_with("fallback routing: matched"));
    }

    #[tokio::test]
    async fn small_talk_routes_to_generic() {
        let report = decide(&components(), &RuntimeSettings::default(), "good morning").await;

        assert_eq!(report.decision.tag, CapabilityTag::Generic);
        assert_eq!(report.decision.confidence, 0.0);
    }
}
