use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use switchboard_core::domain::capability::CapabilityTag;
use switchboard_core::domain::routing::RoutingDecision;
use thiserror::Error;
use tracing::{debug, info};

use crate::auth::AuthStatus;
use crate::catalog::CapabilityCatalog;
use crate::conversation::{keyword_hits, tokenize};
use crate::llm::LlmClient;

pub const DEFAULT_CONFIDENCE_FLOOR: f32 = 0.4;
const FALLBACK_CONFIDENCE_CAP: f32 = 0.8;
const FALLBACK_CONFIDENCE_PER_HIT: f32 = 0.3;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RouterSettings {
    pub confidence_floor: f32,
    pub classify_timeout: Duration,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self { confidence_floor: DEFAULT_CONFIDENCE_FLOOR, classify_timeout: Duration::from_secs(10) }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ClassificationError {
    #[error("classifier call failed: {0}")]
    Call(String),
    #[error("classifier did not answer within {0:?}")]
    TimedOut(Duration),
    #[error("classifier answer contained no JSON object")]
    NoJson,
    #[error("classifier answer was not valid JSON: {0}")]
    InvalidJson(String),
    #[error("classifier chose unavailable capability `{0}`")]
    UnknownTag(String),
    #[error("classifier confidence {0} is outside 0..=1")]
    ConfidenceOutOfRange(f32),
    #[error("classifier confidence {confidence} is below floor {floor}")]
    BelowFloor { confidence: f32, floor: f32 },
}

#[derive(Debug, Deserialize)]
struct RawClassification {
    tag: Option<String>,
    confidence: f32,
    reason: String,
}

/// Picks the capability for a piece of text: one classifier call, then the
/// deterministic keyword scan whenever that call cannot be trusted.
#[derive(Clone)]
pub struct IntentRouter {
    llm: Arc<dyn LlmClient>,
    catalog: Arc<CapabilityCatalog>,
    settings: RouterSettings,
}

impl IntentRouter {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        catalog: Arc<CapabilityCatalog>,
        settings: RouterSettings,
    ) -> Self {
        Self { llm, catalog, settings }
    }

    pub fn catalog(&self) -> &CapabilityCatalog {
        &self.catalog
    }

    /// Never fails: classifier problems are logged and answered by the
    /// keyword fallback.
    pub async fn route(
        &self,
        text: &str,
        available: &[CapabilityTag],
        auth: &BTreeMap<CapabilityTag, AuthStatus>,
    ) -> RoutingDecision {
        let catalog = self.catalog.restricted_to(available);

        match self.classify(text, &catalog, auth).await {
            Ok(decision) => {
                info!(
                    event_name = "router.ai.decided",
                    tag = %decision.tag,
                    confidence = decision.confidence,
                    "classifier routed request"
                );
                decision
            }
            Err(error) => {
                let decision = keyword_route(&catalog, text);
                debug!(
                    event_name = "router.fallback.used",
                    error = %error,
                    tag = %decision.tag,
                    confidence = decision.confidence,
                    "classifier unavailable or untrusted; used keyword routing"
                );
                decision
            }
        }
    }

    async fn classify(
        &self,
        text: &str,
        catalog: &CapabilityCatalog,
        auth: &BTreeMap<CapabilityTag, AuthStatus>,
    ) -> Result<RoutingDecision, ClassificationError> {
        let prompt = classification_prompt(text, catalog, auth);
        let raw = tokio::time::timeout(self.settings.classify_timeout, self.llm.complete(&prompt))
            .await
            .map_err(|_| ClassificationError::TimedOut(self.settings.classify_timeout))?
            .map_err(|error| ClassificationError::Call(error.to_string()))?;

        let decision = parse_classification(&raw, catalog)?;
        if decision.confidence < self.settings.confidence_floor {
            return Err(ClassificationError::BelowFloor {
                confidence: decision.confidence,
                floor: self.settings.confidence_floor,
            });
        }
        Ok(decision)
    }
}

pub fn classification_prompt(
    text: &str,
    catalog: &CapabilityCatalog,
    auth: &BTreeMap<CapabilityTag, AuthStatus>,
) -> String {
    let capabilities = catalog
        .profiles()
        .iter()
        .map(|profile| {
            let state = match auth.get(&profile.tag) {
                Some(status) if !status.authenticated => "not connected",
                _ => "connected",
            };
            format!(
                "- {}: {} [{}] (examples: {})",
                profile.tag,
                profile.description,
                state,
                profile.examples.join("; ")
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Classify the user request into exactly one capability.\n\n\
         User request: \"{text}\"\n\n\
         Capabilities:\n{capabilities}\n\n\
         Respond with only a JSON object with these fields:\n\
         - \"tag\": the capability name, or null for general conversation\n\
         - \"confidence\": number between 0.0 and 1.0\n\
         - \"reason\": one short sentence\n\
         Choose a capability even if it is not connected."
    )
}

/// Parses the classifier's answer. The outermost `{...}` is taken, so
/// answers wrapped in prose or code fences still parse.
pub fn parse_classification(
    raw: &str,
    catalog: &CapabilityCatalog,
) -> Result<RoutingDecision, ClassificationError> {
    let start = raw.find('{').ok_or(ClassificationError::NoJson)?;
    let end = raw.rfind('}').filter(|end| *end > start).ok_or(ClassificationError::NoJson)?;
    let parsed: RawClassification = serde_json::from_str(&raw[start..=end])
        .map_err(|error| ClassificationError::InvalidJson(error.to_string()))?;

    if !(0.0..=1.0).contains(&parsed.confidence) {
        return Err(ClassificationError::ConfidenceOutOfRange(parsed.confidence));
    }

    let tag = match parsed.tag.as_deref().map(str::trim) {
        None | Some("") | Some("null") => CapabilityTag::Generic,
        Some(name) => name
            .parse::<CapabilityTag>()
            .map_err(|_| ClassificationError::UnknownTag(name.to_string()))?,
    };
    if tag != CapabilityTag::Generic && catalog.profile(tag).is_none() {
        return Err(ClassificationError::UnknownTag(tag.to_string()));
    }

    Ok(RoutingDecision::ai(tag, parsed.confidence, parsed.reason))
}

/// Deterministic scan in catalog priority order: first the specific
/// phrases, then plain keywords. Within a pass the first capability with
/// any hit wins.
pub fn keyword_route(catalog: &CapabilityCatalog, text: &str) -> RoutingDecision {
    let tokens = tokenize(text);
    for phrase_pass in [true, false] {
        let kind = if phrase_pass { "phrases" } else { "keywords" };
        for profile in catalog.profiles() {
            let terms = if phrase_pass { profile.phrases } else { profile.keywords };
            let hits = keyword_hits(&tokens, terms);
            if hits > 0 {
                let confidence =
                    (hits as f32 * FALLBACK_CONFIDENCE_PER_HIT).min(FALLBACK_CONFIDENCE_CAP);
                return RoutingDecision::fallback(
                    profile.tag,
                    confidence,
                    format!("fallback routing: matched {hits} {kind} for {}", profile.tag),
                );
            }
        }
    }
    RoutingDecision::unmatched()
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, VecDeque};
    use std::sync::Arc;
    use std::time::Duration;

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use switchboard_core::domain::capability::CapabilityTag;
    use switchboard_core::domain::routing::RoutingSource;
    use tokio::sync::Mutex;

    use super::{
        classification_prompt, keyword_route, parse_classification, ClassificationError,
        IntentRouter, RouterSettings,
    };
    use crate::auth::AuthStatus;
    use crate::catalog::CapabilityCatalog;
    use crate::llm::{LlmClient, UnavailableLlm};

    struct ScriptedLlm {
        answers: Mutex<VecDeque<Result<String>>>,
        delay: Duration,
    }

    impl ScriptedLlm {
        fn answering(answers: Vec<Result<String>>) -> Self {
            Self { answers: Mutex::new(answers.into()), delay: Duration::ZERO }
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.answers.lock().await.pop_front().unwrap_or_else(|| Err(anyhow!("no answer")))
        }
    }

    fn router(llm: Arc<dyn LlmClient>) -> IntentRouter {
        IntentRouter::new(llm, Arc::new(CapabilityCatalog::standard()), RouterSettings::default())
    }

    fn all_tags() -> Vec<CapabilityTag> {
        CapabilityCatalog::standard().tags()
    }

    #[tokio::test]
    async fn lookup_phrasing_falls_back_to_contacts_before_mail() {
        let decision = router(Arc::new(UnavailableLlm))
            .route("find Philip's email address", &all_tags(), &BTreeMap::new())
            .await;

        assert_eq!(decision.tag, CapabilityTag::Contacts);
        assert_eq!(decision.source, RoutingSource::Fallback);
    }

    #[tokio::test]
    async fn music_request_falls_back_to_music() {
        let decision = router(Arc::new(UnavailableLlm))
            .route("Play some music", &all_tags(), &BTreeMap::new())
            .await;

        assert_eq!(decision.tag, CapabilityTag::Music);
        assert_eq!(decision.source, RoutingSource::Fallback);
        assert!((decision.confidence - 0.6).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn unmatched_text_routes_to_generic_with_zero_confidence() {
        let decision = router(Arc::new(UnavailableLlm))
            .route("did it send?", &all_tags(), &BTreeMap::new())
            .await;

        assert!(decision.is_unmatched_fallback());
        assert_eq!(decision.reason, "fallback routing: no keyword matches found");
    }

    #[tokio::test]
    async fn trusted_classifier_answer_is_used() {
        let llm = ScriptedLlm::answering(vec![Ok(
            "Sure! ```json\n{\"tag\": \"mail\", \"confidence\": 0.92, \"reason\": \"compose email\"}\n```"
                .to_string(),
        )]);
        let decision = router(Arc::new(llm))
            .route("write to ben about friday", &all_tags(), &BTreeMap::new())
            .await;

        assert_eq!(decision.tag, CapabilityTag::Mail);
        assert_eq!(decision.source, RoutingSource::Ai);
        assert_eq!(decision.reason, "compose email");
    }

    #[tokio::test]
    async fn low_confidence_answer_falls_back() {
        let llm = ScriptedLlm::answering(vec![Ok(
            r#"{"tag": "generic", "confidence": 0.2, "reason": "unsure"}"#.to_string(),
        )]);
        let decision =
            router(Arc::new(llm)).route("skip this song", &all_tags(), &BTreeMap::new()).await;

        assert_eq!(decision.tag, CapabilityTag::Music);
        assert_eq!(decision.source, RoutingSource::Fallback);
    }

    #[tokio::test]
    async fn slow_classifier_is_abandoned() {
        let llm = ScriptedLlm {
            answers: Mutex::new(
                vec![Ok(r#"{"tag":"mail","confidence":0.9,"reason":"x"}"#.to_string())].into(),
            ),
            delay: Duration::from_millis(200),
        };
        let router = IntentRouter::new(
            Arc::new(llm),
            Arc::new(CapabilityCatalog::standard()),
            RouterSettings { classify_timeout: Duration::from_millis(20), ..RouterSettings::default() },
        );

        let decision = router.route("play some jazz", &all_tags(), &BTreeMap::new()).await;
        assert_eq!(decision.tag, CapabilityTag::Music);
        assert_eq!(decision.source, RoutingSource::Fallback);
    }

    #[test]
    fn malformed_answers_are_rejected() {
        let catalog = CapabilityCatalog::standard();

        assert_eq!(parse_classification("no idea", &catalog), Err(ClassificationError::NoJson));
        assert!(matches!(
            parse_classification("{\"tag\": \"mail\"}", &catalog),
            Err(ClassificationError::InvalidJson(_))
        ));
        assert_eq!(
            parse_classification(r#"{"tag":"calendar","confidence":0.9,"reason":"x"}"#, &catalog),
            Err(ClassificationError::UnknownTag("calendar".to_string()))
        );
        assert_eq!(
            parse_classification(r#"{"tag":"mail","confidence":1.7,"reason":"x"}"#, &catalog),
            Err(ClassificationError::ConfidenceOutOfRange(1.7))
        );
    }

    #[test]
    fn null_tag_means_generic_and_unavailable_tags_are_rejected() {
        let catalog = CapabilityCatalog::standard();
        let decision =
            parse_classification(r#"{"tag":null,"confidence":0.7,"reason":"chit-chat"}"#, &catalog)
                .expect("decision");
        assert_eq!(decision.tag, CapabilityTag::Generic);

        let restricted = catalog.restricted_to(&[CapabilityTag::Mail, CapabilityTag::Generic]);
        assert_eq!(
            parse_classification(r#"{"tag":"music","confidence":0.9,"reason":"x"}"#, &restricted),
            Err(ClassificationError::UnknownTag("music".to_string()))
        );
    }

    #[test]
    fn specific_phrases_settle_the_route_before_keywords() {
        let catalog = CapabilityCatalog::standard();

        let decision = keyword_route(&catalog, "find songs by Adele");
        assert_eq!(decision.tag, CapabilityTag::Music);
        assert!(decision.reason.contains("phrases"), "{}", decision.reason);

        assert_eq!(keyword_route(&catalog, "What did Ben say?").tag, CapabilityTag::Messaging);
        assert_eq!(keyword_route(&catalog, "show my playlists").tag, CapabilityTag::Music);
        assert_eq!(keyword_route(&catalog, "find Philip's email address").tag, CapabilityTag::Contacts);
        assert_eq!(keyword_route(&catalog, "find Ben").tag, CapabilityTag::Contacts);
    }

    #[test]
    fn fallback_only_considers_available_capabilities() {
        let catalog = CapabilityCatalog::standard()
            .restricted_to(&[CapabilityTag::Mail, CapabilityTag::Generic]);
        let decision = keyword_route(&catalog, "find Philip's email address");
        assert_eq!(decision.tag, CapabilityTag::Mail);
    }

    #[test]
    fn prompt_lists_capabilities_with_auth_state() {
        let catalog = CapabilityCatalog::standard();
        let mut auth = BTreeMap::new();
        auth.insert(CapabilityTag::Music, AuthStatus::missing(vec!["playlist".to_string()]));

        let prompt = classification_prompt("play jazz", &catalog, &auth);
        assert!(prompt.contains("User request: \"play jazz\""));
        assert!(prompt.contains("- music: Control music playback"));
        assert!(prompt.contains("[not connected]"));
        assert!(prompt.contains("- mail: Compose and send email on the user's behalf [connected]"));
    }
}
