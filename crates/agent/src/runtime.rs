//! Process-level wiring: spawns the workers and the dispatcher loop and
//! hands out a cloneable handle for callers (HTTP, CLI).

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use switchboard_core::config::AppConfig;
use switchboard_core::context::ContextStore;
use switchboard_core::domain::conversation::ConversationId;
use switchboard_core::quota::QuotaPolicy;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use crate::auth::{AuthStatusProvider, StaticAuthStatus};
use crate::catalog::CapabilityCatalog;
use crate::directory::{DirectoryProvider, JsonFileDirectory, StaticDirectory};
use crate::dispatcher::{AgentHealth, DispatchReply, Dispatcher};
use crate::llm::{client_from_config, LlmClient};
use crate::router::{IntentRouter, RouterSettings};
use crate::tools::ExecutorRegistry;
use crate::worker::DEFAULT_MAILBOX_CAPACITY;
use crate::workers::{spawn_standard_workers, WorkerDeps};

#[derive(Clone, Debug, PartialEq)]
pub struct RuntimeSettings {
    pub router: RouterSettings,
    pub worker_timeout: Duration,
    pub max_turns: usize,
    pub max_conversations: usize,
    pub quota: QuotaPolicy,
    pub mailbox_capacity: usize,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            router: RouterSettings::default(),
            worker_timeout: Duration::from_secs(30),
            max_turns: switchboard_core::context::DEFAULT_MAX_TURNS,
            max_conversations: switchboard_core::context::DEFAULT_MAX_CONVERSATIONS,
            quota: QuotaPolicy::default(),
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
        }
    }
}

impl RuntimeSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            router: RouterSettings {
                confidence_floor: config.routing.confidence_floor,
                classify_timeout: Duration::from_secs(config.llm.timeout_secs),
            },
            worker_timeout: config.routing.worker_timeout(),
            max_turns: config.context.max_turns,
            max_conversations: config.context.max_conversations,
            quota: config.quota.policy(),
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
        }
    }
}

/// External collaborators the runtime is built from.
#[derive(Clone)]
pub struct RuntimeComponents {
    pub llm: Arc<dyn LlmClient>,
    pub directory: Arc<dyn DirectoryProvider>,
    pub auth: Arc<dyn AuthStatusProvider>,
    pub executors: ExecutorRegistry,
    pub catalog: Arc<CapabilityCatalog>,
}

impl RuntimeComponents {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let catalog = Arc::new(CapabilityCatalog::standard());
        let directory: Arc<dyn DirectoryProvider> = match &config.directory.path {
            Some(path) => Arc::new(JsonFileDirectory::new(path)),
            None => {
                warn!(
                    event_name = "runtime.directory.empty",
                    "no directory file configured; name lookups will find nobody"
                );
                Arc::new(StaticDirectory::default())
            }
        };
        let auth = StaticAuthStatus::new(config.auth.authenticated.iter().copied(), &catalog);

        Ok(Self {
            llm: client_from_config(&config.llm)?,
            directory,
            auth: Arc::new(auth),
            executors: ExecutorRegistry::default(),
            catalog,
        })
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("agent runtime has stopped")]
    Stopped,
    #[error("message text is empty")]
    EmptyMessage,
}

enum RuntimeCommand {
    Handle {
        text: String,
        conversation_id: ConversationId,
        sender_id: String,
        reply: oneshot::Sender<DispatchReply>,
    },
    Health(oneshot::Sender<Vec<AgentHealth>>),
}

/// Cloneable handle to the dispatcher loop. The loop and every worker stop
/// once the last handle is dropped.
#[derive(Clone, Debug)]
pub struct AgentRuntime {
    commands: mpsc::Sender<RuntimeCommand>,
}

impl AgentRuntime {
    /// Spawns the worker set and the dispatcher loop. Must be called inside
    /// a tokio runtime.
    pub fn start(settings: RuntimeSettings, components: RuntimeComponents) -> Self {
        let simulated = components.executors.simulated(&components.catalog.tags());
        if !simulated.is_empty() {
            warn!(
                event_name = "runtime.executor.dry_run",
                capabilities = ?simulated,
                "no executor registered; actions are logged but never reach a real service"
            );
        }
        let deps = WorkerDeps {
            directory: components.directory,
            auth: components.auth.clone(),
            executors: components.executors,
            llm: components.llm.clone(),
            catalog: components.catalog.clone(),
            quota: settings.quota,
        };
        let (workers, _tasks) = spawn_standard_workers(&deps, settings.mailbox_capacity);
        let router = IntentRouter::new(components.llm, components.catalog, settings.router);
        let dispatcher = Dispatcher::new(
            router,
            workers,
            components.auth,
            ContextStore::with_limits(settings.max_turns, settings.max_conversations),
            settings.worker_timeout,
        );

        let (commands, receiver) = mpsc::channel(settings.mailbox_capacity.max(1));
        tokio::spawn(run_dispatcher(dispatcher, receiver));
        info!(
            event_name = "runtime.started",
            worker_timeout_ms = settings.worker_timeout.as_millis() as u64,
            max_turns = settings.max_turns,
            "agent runtime started"
        );
        Self { commands }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Ok(Self::start(RuntimeSettings::from_config(config), RuntimeComponents::from_config(config)?))
    }

    /// Handles one message. A missing conversation id starts a new
    /// conversation; a missing sender id uses the conversation id.
    pub async fn handle_message(
        &self,
        text: &str,
        conversation_id: Option<ConversationId>,
        sender_id: Option<String>,
    ) -> Result<DispatchReply, RuntimeError> {
        if text.trim().is_empty() {
            return Err(RuntimeError::EmptyMessage);
        }
        let conversation_id = conversation_id.unwrap_or_else(ConversationId::generate);
        let sender_id = sender_id.unwrap_or_else(|| conversation_id.as_str().to_string());

        let (reply, response) = oneshot::channel();
        self.commands
            .send(RuntimeCommand::Handle { text: text.to_string(), conversation_id, sender_id, reply })
            .await
            .map_err(|_| RuntimeError::Stopped)?;
        response.await.map_err(|_| RuntimeError::Stopped)
    }

    pub async fn health(&self) -> Result<Vec<AgentHealth>, RuntimeError> {
        let (reply, response) = oneshot::channel();
        self.commands.send(RuntimeCommand::Health(reply)).await.map_err(|_| RuntimeError::Stopped)?;
        response.await.map_err(|_| RuntimeError::Stopped)
    }
}

async fn run_dispatcher(mut dispatcher: Dispatcher, mut receiver: mpsc::Receiver<RuntimeCommand>) {
    while let Some(command) = receiver.recv().await {
        match command {
            RuntimeCommand::Handle { text, conversation_id, sender_id, reply } => {
                let outcome = dispatcher.handle_from(&text, &conversation_id, &sender_id).await;
                if reply.send(outcome).is_err() {
                    warn!(
                        event_name = "dispatch.reply.dropped",
                        conversation_id = %conversation_id,
                        "caller went away before the reply was ready"
                    );
                }
            }
            RuntimeCommand::Health(reply) => {
                let _ = reply.send(dispatcher.health().await);
            }
        }
    }
    info!(event_name = "runtime.stopped", "dispatcher mailbox closed");
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use switchboard_core::config::AppConfig;
    use switchboard_core::domain::capability::CapabilityTag;
    use switchboard_core::domain::conversation::ConversationId;
    use switchboard_core::domain::directory::DirectoryEntity;

    use super::{AgentRuntime, RuntimeComponents, RuntimeError, RuntimeSettings};
    use crate::auth::StaticAuthStatus;
    use crate::catalog::CapabilityCatalog;
    use crate::directory::StaticDirectory;
    use crate::llm::UnavailableLlm;
    use crate::tools::{DryRunExecutor, ExecutorRegistry};

    fn runtime(executor: Arc<DryRunExecutor>) -> AgentRuntime {
        let catalog = Arc::new(CapabilityCatalog::standard());
        let components = RuntimeComponents {
            llm: Arc::new(UnavailableLlm),
            directory: Arc::new(StaticDirectory::new(vec![DirectoryEntity::new(
                "U1", "bsmith", "Ben Smith", "Ben Smith",
            )
            .with_email("ben@example.com")])),
            auth: Arc::new(StaticAuthStatus::new(CapabilityTag::ALL, &catalog)),
            executors: ExecutorRegistry::new(executor),
            catalog,
        };
        AgentRuntime::start(RuntimeSettings::default(), components)
    }

    #[tokio::test]
    async fn conversation_continues_across_messages() {
        let executor = Arc::new(DryRunExecutor::default());
        let runtime = runtime(executor.clone());

        let first = runtime
            .handle_message("email ben saying the build is green", None, Some("U7".to_string()))
            .await
            .expect("reply");
        assert!(first.response.success(), "{:?}", first.response);

        let second = runtime
            .handle_message("did it send?", Some(first.conversation_id.clone()), None)
            .await
            .expect("reply");
        assert_eq!(second.decision.tag, CapabilityTag::Mail);
        assert!(second.rendered.starts_with("Yes. Email sent to ben@example.com."));
        assert_eq!(executor.executed().len(), 1);
    }

    #[tokio::test]
    async fn empty_messages_are_rejected() {
        let runtime = runtime(Arc::new(DryRunExecutor::default()));
        let result = runtime.handle_message("   ", Some(ConversationId::from("c")), None).await;
        assert_eq!(result.err(), Some(RuntimeError::EmptyMessage));
    }

    #[test]
    fn configured_components_simulate_every_action() {
        let components = RuntimeComponents::from_config(&AppConfig::default()).expect("components");

        let simulated = components.executors.simulated(&components.catalog.tags());
        assert_eq!(simulated, components.catalog.tags());
    }

    #[tokio::test]
    async fn health_lists_dispatcher_and_workers() {
        let runtime = runtime(Arc::new(DryRunExecutor::default()));
        let report = runtime.health().await.expect("health");
        assert_eq!(report.len(), 6);
        assert!(report.iter().all(|agent| agent.alive));
    }
}
