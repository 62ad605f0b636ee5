use std::collections::HashMap;

use crate::domain::conversation::{ConversationContext, ConversationId, ConversationTurn};

pub const DEFAULT_MAX_TURNS: usize = 10;
pub const DEFAULT_MAX_CONVERSATIONS: usize = 1_000;

#[derive(Clone, Debug)]
struct Slot {
    context: ConversationContext,
    touched: u64,
}

/// Per-conversation turn log and preference map.
///
/// Owned by the dispatcher loop. Workers only ever receive the owned copy
/// returned by [`ContextStore::snapshot`]. Holds at most `max_conversations`
/// conversations; starting one more forgets the least recently written.
#[derive(Clone, Debug)]
pub struct ContextStore {
    conversations: HashMap<ConversationId, Slot>,
    max_turns: usize,
    max_conversations: usize,
    clock: u64,
}

impl Default for ContextStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TURNS)
    }
}

impl ContextStore {
    pub fn new(max_turns: usize) -> Self {
        Self::with_limits(max_turns, DEFAULT_MAX_CONVERSATIONS)
    }

    pub fn with_limits(max_turns: usize, max_conversations: usize) -> Self {
        Self {
            conversations: HashMap::new(),
            max_turns: max_turns.max(1),
            max_conversations: max_conversations.max(1),
            clock: 0,
        }
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    pub fn max_conversations(&self) -> usize {
        self.max_conversations
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    pub fn append(&mut self, conversation_id: &ConversationId, turn: ConversationTurn) {
        let max_turns = self.max_turns;
        self.entry(conversation_id).push_bounded(turn, max_turns);
    }

    pub fn get(&self, conversation_id: &ConversationId) -> Option<&ConversationContext> {
        self.conversations.get(conversation_id).map(|slot| &slot.context)
    }

    /// Owned copy of the conversation, empty if it has never been seen.
    pub fn snapshot(&self, conversation_id: &ConversationId) -> ConversationContext {
        self.get(conversation_id)
            .cloned()
            .unwrap_or_else(|| ConversationContext::new(conversation_id.clone()))
    }

    pub fn set_preference(
        &mut self,
        conversation_id: &ConversationId,
        key: impl Into<String>,
        value: impl Into<String>,
    ) {
        self.entry(conversation_id).preferences.insert(key.into(), value.into());
    }

    pub fn remove_preference(&mut self, conversation_id: &ConversationId, key: &str) {
        if let Some(slot) = self.conversations.get_mut(conversation_id) {
            slot.context.preferences.remove(key);
        }
    }

    pub fn conversation_ids(&self) -> Vec<ConversationId> {
        let mut ids: Vec<_> = self.conversations.keys().cloned().collect();
        ids.sort();
        ids
    }

    fn entry(&mut self, conversation_id: &ConversationId) -> &mut ConversationContext {
        self.clock += 1;
        let touched = self.clock;

        if !self.conversations.contains_key(conversation_id)
            && self.conversations.len() >= self.max_conversations
        {
            self.evict_idlest();
        }

        let slot = self.conversations.entry(conversation_id.clone()).or_insert_with(|| Slot {
            context: ConversationContext::new(conversation_id.clone()),
            touched,
        });
        slot.touched = touched;
        &mut slot.context
    }

    fn evict_idlest(&mut self) {
        let idlest = self
            .conversations
            .iter()
            .min_by_key(|(_, slot)| slot.touched)
            .map(|(id, _)| id.clone());
        if let Some(id) = idlest {
            self.conversations.remove(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ContextStore;
    use crate::domain::conversation::{ConversationId, ConversationTurn};

    #[test]
    fn bounded_history_keeps_latest_turns_in_order() {
        let mut store = ContextStore::new(10);
        let id = ConversationId::from("c-1");
        for index in 0..15 {
            store.append(&id, ConversationTurn::user(format!("turn {index}")));
        }

        let snapshot = store.snapshot(&id);
        let texts: Vec<_> = snapshot.turns.iter().map(|turn| turn.text.clone()).collect();
        let expected: Vec<_> = (5..15).map(|index| format!("turn {index}")).collect();
        assert_eq!(texts, expected);
    }

    #[test]
    fn snapshot_is_detached_from_live_context() {
        let mut store = ContextStore::default();
        let id = ConversationId::from("c-2");
        store.append(&id, ConversationTurn::user("email ben"));

        let mut snapshot = store.snapshot(&id);
        snapshot.turns.clear();
        snapshot.preferences.insert("last_capability".into(), "mail".into());

        let live = store.get(&id).expect("conversation exists");
        assert_eq!(live.turns.len(), 1);
        assert!(live.preferences.is_empty());
    }

    #[test]
    fn unknown_conversation_yields_empty_snapshot() {
        let store = ContextStore::default();
        let snapshot = store.snapshot(&ConversationId::from("missing"));

        assert!(snapshot.turns.is_empty());
        assert_eq!(snapshot.conversation_id.as_str(), "missing");
        assert!(store.conversation_ids().is_empty());
    }

    #[test]
    fn preferences_are_scoped_per_conversation() {
        let mut store = ContextStore::default();
        let first = ConversationId::from("a");
        let second = ConversationId::from("b");

        store.set_preference(&first, "last_capability", "mail");
        store.set_preference(&first, "last_capability", "music");
        store.append(&second, ConversationTurn::user("hello"));

        assert_eq!(store.snapshot(&first).preference("last_capability"), Some("music"));
        assert_eq!(store.snapshot(&second).preference("last_capability"), None);
        assert_eq!(store.conversation_ids(), vec![first, second]);
    }

    #[test]
    fn least_recently_written_conversation_is_forgotten_at_capacity() {
        let mut store = ContextStore::with_limits(10, 2);
        let first = ConversationId::from("first");
        let second = ConversationId::from("second");
        let third = ConversationId::from("third");

        store.append(&first, ConversationTurn::user("hello"));
        store.append(&second, ConversationTurn::user("hi"));
        store.set_preference(&first, "last_capability", "mail");
        store.append(&third, ConversationTurn::user("hey"));

        assert_eq!(store.len(), 2);
        assert_eq!(store.conversation_ids(), vec![first.clone(), third]);
        assert_eq!(store.snapshot(&first).preference("last_capability"), Some("mail"));
        assert!(store.snapshot(&second).turns.is_empty());
    }

    #[test]
    fn removed_preferences_disappear_from_snapshots() {
        let mut store = ContextStore::default();
        let id = ConversationId::from("c-3");
        store.set_preference(&id, "mail.pending_to", "ben@example.com");
        store.remove_preference(&id, "mail.pending_to");
        store.remove_preference(&ConversationId::from("never-seen"), "anything");

        assert_eq!(store.snapshot(&id).preference("mail.pending_to"), None);
        assert_eq!(store.conversation_ids(), vec![id]);
    }
}
