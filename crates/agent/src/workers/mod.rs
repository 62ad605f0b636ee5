//! Capability workers. Each one owns its collaborators and its quota guard
//! and runs on its own task behind a [`WorkerHandle`].

pub mod contacts;
pub mod generic;
pub mod mail;
pub mod messaging;
pub mod music;

use std::collections::HashMap;
use std::sync::Arc;

use switchboard_core::disambiguation::clarify;
use switchboard_core::domain::capability::{CapabilityRequest, CapabilityResponse, CapabilityTag};
use switchboard_core::domain::conversation::HistoryMessage;
use switchboard_core::domain::directory::DirectoryEntity;
use switchboard_core::errors::{ApplicationError, ErrorKind};
use switchboard_core::quota::QuotaPolicy;
use switchboard_core::resolver::{EntityResolver, ResolutionFilters, ResolutionStatus};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::auth::AuthStatusProvider;
use crate::catalog::CapabilityCatalog;
use crate::conversation::latest_assistant_turn;
use crate::directory::DirectoryProvider;
use crate::llm::LlmClient;
use crate::tools::{ActionExecutor, ActionReceipt, ExecutorRegistry, ResolvedAction};
use crate::worker::{spawn_worker, WorkerHandle};

pub use contacts::ContactsWorker;
pub use generic::GenericWorker;
pub use mail::MailWorker;
pub use messaging::MessagingWorker;
pub use music::MusicWorker;

/// Collaborators shared by the standard worker set.
#[derive(Clone)]
pub struct WorkerDeps {
    pub directory: Arc<dyn DirectoryProvider>,
    pub auth: Arc<dyn AuthStatusProvider>,
    pub executors: ExecutorRegistry,
    pub llm: Arc<dyn LlmClient>,
    pub catalog: Arc<CapabilityCatalog>,
    pub quota: QuotaPolicy,
}

/// Spawns one worker per catalog capability.
pub fn spawn_standard_workers(
    deps: &WorkerDeps,
    capacity: usize,
) -> (HashMap<CapabilityTag, WorkerHandle>, Vec<JoinHandle<()>>) {
    let mut handles = HashMap::new();
    let mut tasks = Vec::new();

    for tag in deps.catalog.tags() {
        let (handle, task) = match tag {
            CapabilityTag::Mail => spawn_worker(MailWorker::new(deps), capacity),
            CapabilityTag::Messaging => spawn_worker(MessagingWorker::new(deps), capacity),
            CapabilityTag::Contacts => spawn_worker(ContactsWorker::new(deps), capacity),
            CapabilityTag::Music => spawn_worker(MusicWorker::new(deps), capacity),
            CapabilityTag::Generic => spawn_worker(GenericWorker::new(deps), capacity),
        };
        handles.insert(tag, handle);
        tasks.push(task);
    }

    (handles, tasks)
}

/// Resolves a person against a fresh directory listing. Anything other than
/// a single match comes back as the response the worker should return.
pub(crate) async fn resolve_person(
    directory: &dyn DirectoryProvider,
    resolver: &EntityResolver,
    query: &str,
    filters: &ResolutionFilters,
) -> Result<DirectoryEntity, CapabilityResponse> {
    let entities = directory.list_entities().await.map_err(|error| {
        error!(event_name = "worker.directory.failed", error = %error, "directory listing failed");
        ApplicationError::Directory(format!("{error:#}")).into_response()
    })?;

    let resolution = resolver.resolve(query, &entities, filters);
    debug!(
        event_name = "worker.resolve.completed",
        query,
        status = ?resolution.status,
        total = resolution.total(),
        "resolved entity reference"
    );

    if let Some(found) = resolution.single() {
        return Ok(found.entity.clone());
    }

    let kind = match resolution.status {
        ResolutionStatus::Multiple => ErrorKind::AmbiguousEntity,
        _ => ErrorKind::EntityNotFound,
    };
    let response = match clarify(&resolution) {
        Some(clarification) => {
            CapabilityResponse::clarify(kind, clarification.reasoning, clarification.suggestions)
        }
        None => CapabilityResponse::clarify(kind, format!("I couldn't resolve '{query}'."), vec![]),
    };
    Err(response)
}

pub(crate) async fn execute_action(
    executor: &dyn ActionExecutor,
    action: &ResolvedAction,
) -> Result<ActionReceipt, CapabilityResponse> {
    executor.execute(action).await.map_err(|error| {
        error!(
            event_name = "worker.action.failed",
            capability = %action.capability(),
            action = action.name(),
            error = %error,
            "external action failed"
        );
        ApplicationError::Integration(format!("{} failed: {error:#}", action.name())).into_response()
    })
}

/// How a worker answers "did it send?" from the history snapshot.
pub(crate) struct StatusScan {
    /// Assistant turns starting with one of these record a completed action.
    pub done_prefixes: &'static [&'static str],
    pub noun: &'static str,
    pub nothing_done: &'static str,
    pub retry_example: &'static str,
}

impl StatusScan {
    /// Echoes the newest completed action. A conversation without history
    /// gets a clarification saying why there is nothing to check.
    pub(crate) fn answer(&self, history: &[HistoryMessage]) -> CapabilityResponse {
        if history.is_empty() {
            return CapabilityResponse::clarify(
                ErrorKind::MissingField,
                format!(
                    "I don't have any earlier messages in this conversation, so I can't tell which {} you mean.",
                    self.noun
                ),
                vec![
                    format!("Tell me who the {} was for", self.noun),
                    format!("Send it again, e.g. '{}'", self.retry_example),
                ],
            );
        }
        match latest_assistant_turn(history, self.done_prefixes) {
            Some(turn) => CapabilityResponse::completed(format!("Yes. {}", turn.content)),
            None => CapabilityResponse::completed(self.nothing_done),
        }
    }
}

/// Renders listed results as "heading:\n- item" lines, or `empty` when
/// there are none.
pub(crate) fn describe_items(heading: &str, items: &[String], empty: &str) -> String {
    if items.is_empty() {
        return empty.to_string();
    }
    let mut text = format!("{heading}:");
    for item in items {
        text.push_str(&format!("\n- {item}"));
    }
    text
}

pub(crate) fn pending_key(capability: CapabilityTag, field: &str) -> String {
    format!("{capability}.pending_{field}")
}

/// Draft field stored by an earlier clarification in this conversation.
pub(crate) fn pending_field(
    request: &CapabilityRequest,
    capability: CapabilityTag,
    field: &str,
) -> Option<String> {
    request
        .preferences
        .get(&pending_key(capability, field))
        .filter(|value| !value.trim().is_empty())
        .cloned()
}

/// Records draft fields on the response; `None` clears a field.
pub(crate) fn remember_pending(
    mut response: CapabilityResponse,
    capability: CapabilityTag,
    fields: &[(&str, Option<&str>)],
) -> CapabilityResponse {
    for (field, value) in fields {
        response = response.remember(pending_key(capability, field), value.unwrap_or_default());
    }
    response
}

/// Joins field names for a prompt: "the recipient and the message body".
pub(crate) fn describe_missing(fields: &[&str]) -> String {
    match fields {
        [] => String::new(),
        [only] => only.to_string(),
        [first, second] => format!("{first} and {second}"),
        [rest @ .., last] => format!("{}, and {last}", rest.join(", ")),
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use switchboard_core::domain::capability::CapabilityTag;
    use switchboard_core::domain::directory::DirectoryEntity;
    use switchboard_core::quota::QuotaPolicy;

    use super::WorkerDeps;
    use crate::auth::StaticAuthStatus;
    use crate::catalog::CapabilityCatalog;
    use crate::directory::StaticDirectory;
    use crate::llm::UnavailableLlm;
    use crate::tools::{
        ActionExecutor, ActionReceipt, DryRunExecutor, ExecutorRegistry, ResolvedAction,
    };

    /// Rejects every action with `cause` and counts the attempts.
    pub struct FailingExecutor {
        pub cause: &'static str,
        pub calls: AtomicUsize,
    }

    impl FailingExecutor {
        pub fn new(cause: &'static str) -> Self {
            Self { cause, calls: AtomicUsize::new(0) }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ActionExecutor for FailingExecutor {
        async fn execute(&self, _action: &ResolvedAction) -> Result<ActionReceipt> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(anyhow!(self.cause))
        }
    }

    /// Answers every action with the same listed items.
    pub struct ListingExecutor {
        pub items: Vec<String>,
        pub journal: Mutex<Vec<ResolvedAction>>,
    }

    impl ListingExecutor {
        pub fn new(items: &[&str]) -> Self {
            Self {
                items: items.iter().map(|item| item.to_string()).collect(),
                journal: Mutex::new(Vec::new()),
            }
        }

        pub fn executed(&self) -> Vec<ResolvedAction> {
            self.journal.lock().map(|journal| journal.clone()).unwrap_or_default()
        }
    }

    #[async_trait]
    impl ActionExecutor for ListingExecutor {
        async fn execute(&self, action: &ResolvedAction) -> Result<ActionReceipt> {
            if let Ok(mut journal) = self.journal.lock() {
                journal.push(action.clone());
            }
            Ok(ActionReceipt::new("r-list").with_items(self.items.clone()))
        }
    }

    /// Deps whose actions all go to `executor`.
    pub fn deps_with(executor: Arc<dyn ActionExecutor>) -> WorkerDeps {
        let catalog = Arc::new(CapabilityCatalog::standard());
        WorkerDeps {
            directory: Arc::new(StaticDirectory::new(team())),
            auth: Arc::new(StaticAuthStatus::new(CapabilityTag::ALL, &catalog)),
            executors: ExecutorRegistry::new(executor),
            llm: Arc::new(UnavailableLlm),
            catalog,
            quota: QuotaPolicy::default(),
        }
    }

    pub fn team() -> Vec<DirectoryEntity> {
        vec![
            DirectoryEntity::new("U001", "bsmith", "Ben Smith", "Ben Smith")
                .with_email("ben.smith@example.com")
                .with_phone("+1 555 0101"),
            DirectoryEntity::new("U002", "btaylor", "Ben Taylor", "Benjamin Taylor")
                .with_email("ben.taylor@example.com"),
            DirectoryEntity::new("U003", "ajohnson", "Alice Johnson", "Alice Johnson")
                .with_email("alice@example.com")
                .with_phone("+1 555 0103"),
            DirectoryEntity::new("U004", "pchen", "Philip", "Philip Chen")
                .with_email("philip@example.com"),
        ]
    }

    /// Deps with every capability connected and a dry-run executor the test
    /// can inspect.
    pub fn deps(executor: Arc<DryRunExecutor>) -> WorkerDeps {
        deps_with(executor)
    }
}

#[cfg(test)]
mod tests {
    use switchboard_core::domain::conversation::{HistoryMessage, Role};
    use switchboard_core::errors::ErrorKind;

    use super::{describe_items, describe_missing, StatusScan};

    const SCAN: StatusScan = StatusScan {
        done_prefixes: &["Message sent"],
        noun: "message",
        nothing_done: "I don't see a message sent earlier in this conversation.",
        retry_example: "tell Ben: ...",
    };

    #[test]
    fn status_scan_echoes_newest_completed_action() {
        let history = vec![
            HistoryMessage { role: Role::Assistant, content: "Message sent to Ben Smith (@bsmith).".to_string() },
            HistoryMessage { role: Role::User, content: "thanks".to_string() },
        ];
        assert_eq!(SCAN.answer(&history).summary(), Some("Yes. Message sent to Ben Smith (@bsmith)."));

        let unrelated = vec![HistoryMessage { role: Role::Assistant, content: "Now playing jazz.".to_string() }];
        assert_eq!(SCAN.answer(&unrelated).summary(), Some(SCAN.nothing_done));

        let empty = SCAN.answer(&[]);
        assert_eq!(empty.error_kind(), Some(ErrorKind::MissingField));
        assert!(empty.reasoning().is_some_and(|reason| reason.contains("which message you mean")));
    }

    #[test]
    fn listed_items_render_one_per_line() {
        let items = vec!["Hello".to_string(), "Someone Like You".to_string()];
        assert_eq!(describe_items("Tracks", &items, "none"), "Tracks:\n- Hello\n- Someone Like You");
        assert_eq!(describe_items("Tracks", &[], "none"), "none");
    }

    #[test]
    fn missing_fields_read_naturally() {
        assert_eq!(describe_missing(&["the recipient"]), "the recipient");
        assert_eq!(
            describe_missing(&["the recipient", "the message body"]),
            "the recipient and the message body"
        );
        assert_eq!(describe_missing(&["a", "b", "c"]), "a, b, and c");
    }
}
