use std::sync::Arc;

use async_trait::async_trait;
use switchboard_core::domain::capability::{CapabilityRequest, CapabilityResponse, CapabilityTag};
use switchboard_core::errors::ErrorKind;
use tracing::info;

use super::{describe_items, execute_action, StatusScan, WorkerDeps};
use crate::conversation::{
    clean_fragment, find_phrase, is_status_follow_up, matches_keyword, strip_leading_phrases,
    tokenize,
};
use crate::guardrails::ActionGuard;
use crate::tools::{ActionExecutor, ResolvedAction};
use crate::worker::Worker;

const GENERIC_QUERIES: [&str; 6] = ["music", "some music", "something", "anything", "a song", "some songs"];
const PLAYLIST_NAMERS: [&str; 3] = ["called", "named", "titled"];
const SERVICE_SUFFIXES: [&str; 2] = ["on spotify", "for me"];
const SEARCH_VERBS: [&str; 4] = ["find", "search", "look for", "look up"];
const SEARCH_LEADS: [&str; 18] = [
    "can you",
    "could you",
    "please",
    "find me",
    "find",
    "search spotify for",
    "search for",
    "search",
    "look for",
    "look up",
    "some",
    "songs",
    "song",
    "tracks",
    "track",
    "music",
    "by",
    "from",
];
const SEARCH_LIMIT: usize = 5;

const PLAYBACK: StatusScan = StatusScan {
    done_prefixes: &["Now playing", "Playback paused", "Skipped", "Created playlist"],
    noun: "music request",
    nothing_done: "I haven't changed anything in your music in this conversation.",
    retry_example: "play some jazz",
};

#[derive(Clone, Debug, PartialEq, Eq)]
enum MusicCommand {
    Play(Option<String>),
    Pause,
    Skip,
    Search(Option<String>),
    ListPlaylists,
    CreatePlaylist { name: Option<String>, seed: Option<String> },
}

impl MusicCommand {
    fn parse(text: &str) -> Option<Self> {
        let tokens = tokenize(text);
        let has = |word: &str| matches_keyword(&tokens, word);

        if has("playlist") && (has("create") || has("make") || has("new") || has("start")) {
            let (name, seed) = playlist_request(text);
            return Some(Self::CreatePlaylist { name, seed });
        }
        if has("playlists") {
            return Some(Self::ListPlaylists);
        }
        if !has("play") && SEARCH_VERBS.iter().any(|verb| has(verb)) {
            return Some(Self::Search(search_query(text)));
        }
        if has("pause") || has("stop") {
            return Some(Self::Pause);
        }
        if has("skip") || has("next") {
            return Some(Self::Skip);
        }
        if has("play") {
            return Some(Self::Play(play_query(text)));
        }
        None
    }

    /// The external action, or the question to ask when a field is missing.
    fn into_action(self) -> Result<ResolvedAction, CapabilityResponse> {
        match self {
            Self::Play(query) => Ok(ResolvedAction::PlayMusic { query }),
            Self::Pause => Ok(ResolvedAction::PauseMusic),
            Self::Skip => Ok(ResolvedAction::SkipTrack),
            Self::Search(Some(query)) => Ok(ResolvedAction::SearchMusic { query, limit: SEARCH_LIMIT }),
            Self::Search(None) => Err(CapabilityResponse::clarify(
                ErrorKind::MissingField,
                "What should I search for?",
                vec!["find songs by Adele".to_string()],
            )),
            Self::ListPlaylists => Ok(ResolvedAction::ListPlaylists),
            Self::CreatePlaylist { name: Some(name), seed } => {
                Ok(ResolvedAction::CreatePlaylist { name, seed_query: seed })
            }
            Self::CreatePlaylist { name: None, .. } => Err(CapabilityResponse::clarify(
                ErrorKind::MissingField,
                "What should the new playlist be called?",
                vec!["create a playlist called Focus".to_string()],
            )),
        }
    }
}

fn playlist_name(text: &str) -> Option<String> {
    let lower = text.to_ascii_lowercase();
    PLAYLIST_NAMERS
        .iter()
        .filter_map(|namer| find_phrase(&lower, namer).map(|at| at + namer.len()))
        .min()
        .and_then(|start| clean_fragment(&text[start..]))
}

/// "called Focus with songs by Adele" names the playlist and seeds it.
fn playlist_request(text: &str) -> (Option<String>, Option<String>) {
    let Some(named) = playlist_name(text) else {
        return (None, None);
    };
    match find_phrase(&named.to_ascii_lowercase(), "with") {
        Some(at) => (clean_fragment(&named[..at]), search_terms(&named[at + "with".len()..])),
        None => (Some(named), None),
    }
}

fn search_query(text: &str) -> Option<String> {
    let lower = text.to_ascii_lowercase();
    let start = SEARCH_VERBS.iter().filter_map(|verb| find_phrase(&lower, verb)).min()?;
    search_terms(&text[start..])
}

fn search_terms(fragment: &str) -> Option<String> {
    let mut query = strip_leading_phrases(fragment, &SEARCH_LEADS).to_string();
    strip_service_suffix(&mut query);
    clean_fragment(&query)
}

fn strip_service_suffix(query: &mut String) {
    for suffix in SERVICE_SUFFIXES {
        let lowered = query.to_ascii_lowercase();
        if let Some(at) = find_phrase(&lowered, suffix) {
            if at + suffix.len() == lowered.trim_end_matches(['.', '!', '?']).len() {
                query.truncate(at);
            }
        }
    }
}

fn play_query(text: &str) -> Option<String> {
    let lower = text.to_ascii_lowercase();
    let start = find_phrase(&lower, "play")? + "play".len();
    let mut query = text[start..].trim().to_string();
    strip_service_suffix(&mut query);

    let query = clean_fragment(&query)?;
    if GENERIC_QUERIES.contains(&query.to_ascii_lowercase().as_str()) {
        return None;
    }
    Some(query.strip_prefix("some ").map(str::to_string).unwrap_or(query))
}

fn describe_outcome(action: &ResolvedAction, items: &[String]) -> String {
    match action {
        ResolvedAction::PlayMusic { query: Some(query) } => format!("Now playing {query}."),
        ResolvedAction::PlayMusic { query: None } => "Now playing music.".to_string(),
        ResolvedAction::PauseMusic => "Playback paused.".to_string(),
        ResolvedAction::SkipTrack => "Skipped to the next track.".to_string(),
        ResolvedAction::SearchMusic { query, .. } => describe_items(
            &format!("Tracks matching '{query}'"),
            items,
            &format!("I couldn't find any tracks matching '{query}'."),
        ),
        ResolvedAction::ListPlaylists => {
            describe_items("Your playlists", items, "You don't have any playlists yet.")
        }
        ResolvedAction::CreatePlaylist { name, seed_query: None } => {
            format!("Created playlist '{name}'.")
        }
        ResolvedAction::CreatePlaylist { name, seed_query: Some(seed) } if items.is_empty() => {
            format!("Created playlist '{name}'. No tracks matched '{seed}' yet.")
        }
        ResolvedAction::CreatePlaylist { name, seed_query: Some(seed) } => {
            format!("Created playlist '{name}' with {} tracks matching '{seed}'.", items.len())
        }
        other => format!("Finished {}.", other.name()),
    }
}

pub struct MusicWorker {
    executor: Arc<dyn ActionExecutor>,
    guard: ActionGuard,
}

impl MusicWorker {
    pub fn new(deps: &WorkerDeps) -> Self {
        Self {
            executor: deps.executors.executor(CapabilityTag::Music),
            guard: ActionGuard::new(CapabilityTag::Music, deps.auth.clone(), deps.quota),
        }
    }
}

#[async_trait]
impl Worker for MusicWorker {
    fn capability(&self) -> CapabilityTag {
        CapabilityTag::Music
    }

    async fn handle(&mut self, request: CapabilityRequest) -> CapabilityResponse {
        if is_status_follow_up(&request.original_text) {
            return PLAYBACK.answer(&request.conversation_history);
        }
        let Some(command) = MusicCommand::parse(&request.original_text) else {
            return CapabilityResponse::clarify(
                ErrorKind::MissingField,
                "I can play, pause or skip, search the catalog, list your playlists or create one. Which would you like?",
                vec![
                    "play some jazz".to_string(),
                    "find songs by Adele".to_string(),
                    "show my playlists".to_string(),
                    "create a playlist called Focus".to_string(),
                ],
            );
        };
        let action = match command.into_action() {
            Ok(action) => action,
            Err(question) => return question,
        };

        // Searches and listings need the account but leave the quota alone.
        let decision = if action.is_read_only() {
            self.guard.check_connected().await
        } else {
            self.guard.evaluate(&request.sender_id).await
        };
        if let Some(denied) = decision.into_response() {
            return denied;
        }
        let receipt = match execute_action(self.executor.as_ref(), &action).await {
            Ok(receipt) => receipt,
            Err(response) => return response,
        };

        info!(
            event_name = "worker.music.executed",
            action = action.name(),
            read_only = action.is_read_only(),
            items = receipt.items.len(),
            receipt_id = %receipt.id,
            "music action executed"
        );
        let response = CapabilityResponse::completed(describe_outcome(&action, &receipt.items));
        if action.is_read_only() {
            response
        } else {
            response.with_result_id(receipt.id)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use switchboard_core::domain::capability::{CapabilityRequest, CapabilityTag};
    use switchboard_core::domain::conversation::{HistoryMessage, Role};
    use switchboard_core::errors::ErrorKind;

    use super::{MusicCommand, MusicWorker};
    use crate::auth::StaticAuthStatus;
    use crate::catalog::CapabilityCatalog;
    use crate::tools::{DryRunExecutor, ResolvedAction};
    use crate::worker::Worker;
    use crate::workers::fixtures::{self, ListingExecutor};

    #[test]
    fn parses_playback_commands() {
        assert_eq!(MusicCommand::parse("Play some music"), Some(MusicCommand::Play(None)));
        assert_eq!(
            MusicCommand::parse("play some jazz on spotify"),
            Some(MusicCommand::Play(Some("jazz".to_string())))
        );
        assert_eq!(MusicCommand::parse("skip this song"), Some(MusicCommand::Skip));
        assert_eq!(MusicCommand::parse("pause"), Some(MusicCommand::Pause));
        assert_eq!(
            MusicCommand::parse("create a playlist called Deep Focus"),
            Some(MusicCommand::CreatePlaylist { name: Some("Deep Focus".to_string()), seed: None })
        );
        assert_eq!(
            MusicCommand::parse("make a new playlist"),
            Some(MusicCommand::CreatePlaylist { name: None, seed: None })
        );
        assert_eq!(MusicCommand::parse("how loud is it"), None);
    }

    #[test]
    fn parses_catalog_and_library_commands() {
        assert_eq!(
            MusicCommand::parse("find songs by Adele"),
            Some(MusicCommand::Search(Some("Adele".to_string())))
        );
        assert_eq!(
            MusicCommand::parse("search spotify for Bohemian Rhapsody"),
            Some(MusicCommand::Search(Some("Bohemian Rhapsody".to_string())))
        );
        assert_eq!(MusicCommand::parse("search for songs"), Some(MusicCommand::Search(None)));
        assert_eq!(MusicCommand::parse("show my playlists"), Some(MusicCommand::ListPlaylists));
        assert_eq!(
            MusicCommand::parse("create a playlist called Focus with songs by Adele"),
            Some(MusicCommand::CreatePlaylist {
                name: Some("Focus".to_string()),
                seed: Some("Adele".to_string()),
            })
        );
        assert_eq!(
            MusicCommand::parse("play songs by Adele"),
            Some(MusicCommand::Play(Some("songs by Adele".to_string())))
        );
    }

    #[tokio::test]
    async fn search_lists_tracks_without_spending_quota() {
        let executor = Arc::new(ListingExecutor::new(&["Hello - Adele", "Skyfall - Adele"]));
        let mut worker = MusicWorker::new(&fixtures::deps_with(executor.clone()));

        let response = worker.handle(CapabilityRequest::new("find songs by Adele", "U1")).await;

        assert_eq!(
            response.summary(),
            Some("Tracks matching 'Adele':\n- Hello - Adele\n- Skyfall - Adele")
        );
        assert_eq!(response.result_id(), None);
        assert_eq!(
            executor.executed(),
            vec![ResolvedAction::SearchMusic { query: "Adele".to_string(), limit: 5 }]
        );
        assert_eq!(worker.guard.remaining("U1"), 10);
    }

    #[tokio::test]
    async fn status_question_echoes_the_last_playback_change() {
        let executor = Arc::new(DryRunExecutor::default());
        let mut worker = MusicWorker::new(&fixtures::deps(executor.clone()));
        let history = vec![HistoryMessage {
            role: Role::Assistant,
            content: "Now playing jazz. (id: r-3)".to_string(),
        }];

        let response =
            worker.handle(CapabilityRequest::new("did it work?", "U1").with_history(history)).await;

        assert_eq!(response.summary(), Some("Yes. Now playing jazz. (id: r-3)"));
        assert!(executor.executed().is_empty());
    }

    #[tokio::test]
    async fn empty_library_is_reported_plainly() {
        let executor = Arc::new(DryRunExecutor::default());
        let mut worker = MusicWorker::new(&fixtures::deps(executor.clone()));

        let response = worker.handle(CapabilityRequest::new("show my playlists", "U1")).await;

        assert_eq!(response.summary(), Some("You don't have any playlists yet."));
        assert_eq!(executor.executed(), vec![ResolvedAction::ListPlaylists]);
    }

    #[tokio::test]
    async fn seeded_playlist_reports_added_tracks_and_spends_quota() {
        let executor = Arc::new(ListingExecutor::new(&["Hello - Adele", "Skyfall - Adele"]));
        let mut worker = MusicWorker::new(&fixtures::deps_with(executor.clone()));

        let response = worker
            .handle(CapabilityRequest::new("create a playlist called Focus with songs by Adele", "U1"))
            .await;

        assert_eq!(
            response.summary(),
            Some("Created playlist 'Focus' with 2 tracks matching 'Adele'.")
        );
        assert_eq!(response.result_id(), Some("r-list"));
        assert_eq!(
            executor.executed(),
            vec![ResolvedAction::CreatePlaylist {
                name: "Focus".to_string(),
                seed_query: Some("Adele".to_string()),
            }]
        );
        assert_eq!(worker.guard.remaining("U1"), 9);
    }

    #[tokio::test]
    async fn play_request_reaches_the_executor() {
        let executor = Arc::new(DryRunExecutor::default());
        let mut worker = MusicWorker::new(&fixtures::deps(executor.clone()));

        let response = worker.handle(CapabilityRequest::new("Play some music", "U1")).await;
        assert_eq!(response.summary(), Some("Now playing music."));
        assert_eq!(executor.executed(), vec![ResolvedAction::PlayMusic { query: None }]);
    }

    #[tokio::test]
    async fn playlist_without_name_clarifies_without_side_effects() {
        let executor = Arc::new(DryRunExecutor::default());
        let mut worker = MusicWorker::new(&fixtures::deps(executor.clone()));

        let response = worker.handle(CapabilityRequest::new("create a playlist", "U1")).await;
        assert_eq!(response.error_kind(), Some(ErrorKind::MissingField));
        assert!(executor.executed().is_empty());
    }

    #[tokio::test]
    async fn disconnected_account_is_refused_at_action_time() {
        let executor = Arc::new(DryRunExecutor::default());
        let mut deps = fixtures::deps(executor.clone());
        deps.auth =
            Arc::new(StaticAuthStatus::new([CapabilityTag::Mail], &CapabilityCatalog::standard()));
        let mut worker = MusicWorker::new(&deps);

        let response = worker.handle(CapabilityRequest::new("skip", "U1")).await;
        assert_eq!(response.error_kind(), Some(ErrorKind::AuthRequired));
        assert!(executor.executed().is_empty());
    }
}
