use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use switchboard_core::domain::capability::CapabilityTag;
use tracing::info;

/// A fully resolved external action. Workers only build one of these once
/// every required field is known.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ResolvedAction {
    SendMail { to: String, subject: String, body: String },
    SendMessage { recipient_id: String, recipient_name: String, text: String },
    FetchMessages { counterpart_id: String, counterpart_name: String, limit: usize },
    PlayMusic { query: Option<String> },
    PauseMusic,
    SkipTrack,
    SearchMusic { query: String, limit: usize },
    ListPlaylists,
    CreatePlaylist { name: String, seed_query: Option<String> },
}

impl ResolvedAction {
    pub fn capability(&self) -> CapabilityTag {
        match self {
            Self::SendMail { .. } => CapabilityTag::Mail,
            Self::SendMessage { .. } | Self::FetchMessages { .. } => CapabilityTag::Messaging,
            Self::PlayMusic { .. }
            | Self::PauseMusic
            | Self::SkipTrack
            | Self::SearchMusic { .. }
            | Self::ListPlaylists
            | Self::CreatePlaylist { .. } => CapabilityTag::Music,
        }
    }

    /// Lookups that change nothing on the remote side.
    pub fn is_read_only(&self) -> bool {
        matches!(self, Self::FetchMessages { .. } | Self::SearchMusic { .. } | Self::ListPlaylists)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::SendMail { .. } => "send_mail",
            Self::SendMessage { .. } => "send_message",
            Self::FetchMessages { .. } => "fetch_messages",
            Self::PlayMusic { .. } => "play_music",
            Self::PauseMusic => "pause_music",
            Self::SkipTrack => "skip_track",
            Self::SearchMusic { .. } => "search_music",
            Self::ListPlaylists => "list_playlists",
            Self::CreatePlaylist { .. } => "create_playlist",
        }
    }
}

/// What the service reported back. `items` holds one line per listed
/// result (tracks, playlists, messages) and stays empty for plain commands.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionReceipt {
    pub id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<String>,
}

impl ActionReceipt {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), items: Vec::new() }
    }

    pub fn with_items(mut self, items: Vec<String>) -> Self {
        self.items = items;
        self
    }
}

#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(&self, action: &ResolvedAction) -> Result<ActionReceipt>;
}

/// Logs each action and issues a random receipt id without contacting any
/// service. Executed actions are kept so callers can inspect them.
#[derive(Debug, Default)]
pub struct DryRunExecutor {
    journal: Mutex<Vec<ResolvedAction>>,
}

impl DryRunExecutor {
    pub fn executed(&self) -> Vec<ResolvedAction> {
        self.journal.lock().map(|journal| journal.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ActionExecutor for DryRunExecutor {
    async fn execute(&self, action: &ResolvedAction) -> Result<ActionReceipt> {
        let id = uuid::Uuid::new_v4().to_string();
        info!(
            event_name = "worker.action.dry_run",
            capability = %action.capability(),
            action = action.name(),
            receipt_id = %id,
            "dry-run executor accepted action"
        );
        if let Ok(mut journal) = self.journal.lock() {
            journal.push(action.clone());
        }
        Ok(ActionReceipt::new(id))
    }
}

/// Executors per capability with a shared fallback for anything unregistered.
#[derive(Clone)]
pub struct ExecutorRegistry {
    executors: HashMap<CapabilityTag, Arc<dyn ActionExecutor>>,
    fallback: Arc<dyn ActionExecutor>,
    simulated_fallback: bool,
}

impl Default for ExecutorRegistry {
    fn default() -> Self {
        Self::dry_run()
    }
}

impl ExecutorRegistry {
    pub fn new(fallback: Arc<dyn ActionExecutor>) -> Self {
        Self { executors: HashMap::new(), fallback, simulated_fallback: false }
    }

    /// Every capability falls back to a fresh [`DryRunExecutor`].
    pub fn dry_run() -> Self {
        Self { simulated_fallback: true, ..Self::new(Arc::new(DryRunExecutor::default())) }
    }

    /// Capabilities whose actions reach the dry-run fallback.
    pub fn simulated(&self, catalog: &[CapabilityTag]) -> Vec<CapabilityTag> {
        if !self.simulated_fallback {
            return Vec::new();
        }
        catalog.iter().copied().filter(|tag| !self.executors.contains_key(tag)).collect()
    }

    pub fn register(&mut self, capability: CapabilityTag, executor: Arc<dyn ActionExecutor>) {
        self.executors.insert(capability, executor);
    }

    pub fn executor(&self, capability: CapabilityTag) -> Arc<dyn ActionExecutor> {
        self.executors.get(&capability).cloned().unwrap_or_else(|| self.fallback.clone())
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}
