use switchboard_core::domain::capability::CapabilityTag;

/// Static description of one capability: what the classifier is told about
/// it and which phrases and keywords the fallback scan looks for.
///
/// `phrases` are multi-word patterns specific enough to settle the route on
/// their own; they are scanned across every profile before any `keywords`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CapabilityProfile {
    pub tag: CapabilityTag,
    pub description: &'static str,
    pub examples: &'static [&'static str],
    pub phrases: &'static [&'static str],
    pub keywords: &'static [&'static str],
    pub required_scopes: &'static [&'static str],
}

/// Immutable, priority-ordered capability table built once at startup.
///
/// Order matters for the keyword fallback: contacts is checked before mail
/// so "find Philip's email address" is a lookup, not a draft.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CapabilityCatalog {
    profiles: Vec<CapabilityProfile>,
}

const CONTACTS: CapabilityProfile = CapabilityProfile {
    tag: CapabilityTag::Contacts,
    description: "Look up people in the workspace directory and report their contact details",
    examples: &["find Philip's email address", "what is Ben's phone number", "who is @ajohnson"],
    phrases: &["email address", "phone number", "contact info", "contact details"],
    keywords: &[
        "contact",
        "contacts",
        "contact info",
        "email address",
        "phone number",
        "address book",
        "look up",
        "lookup",
        "find",
        "who is",
        "whose",
    ],
    required_scopes: &["directory.read"],
};

const MAIL: CapabilityProfile = CapabilityProfile {
    tag: CapabilityTag::Mail,
    description: "Compose and send email on the user's behalf",
    examples: &[
        "email Ben about the launch saying we ship Friday",
        "send an email to alice@example.com",
        "did my email send?",
    ],
    phrases: &["send an email", "write an email"],
    keywords: &["email", "e-mail", "mail", "gmail", "inbox", "send an email", "subject"],
    required_scopes: &["gmail.send", "gmail.readonly"],
};

const MESSAGING: CapabilityProfile = CapabilityProfile {
    tag: CapabilityTag::Messaging,
    description: "Send direct messages to teammates in the chat workspace",
    examples: &[
        "tell Ben: standup moved to 10",
        "send Alice a message saying thanks",
        "what did Ben say?",
    ],
    phrases: &[
        "what did * say",
        "what has * said",
        "messages from",
        "messages with",
        "dm history",
        "chat history",
    ],
    keywords: &["message", "messages", "dm", "slack", "tell", "ping", "text", "chat with", "channel"],
    required_scopes: &["chat:write", "users:read", "im:write"],
};

const MUSIC: CapabilityProfile = CapabilityProfile {
    tag: CapabilityTag::Music,
    description: "Control music playback, search the catalog and manage playlists",
    examples: &[
        "play some music",
        "find songs by Adele",
        "show my playlists",
        "create a playlist called Focus with songs by Adele",
    ],
    phrases: &[
        "songs by",
        "music by",
        "tracks by",
        "albums by",
        "find songs",
        "find music",
        "my playlists",
        "search spotify",
    ],
    keywords: &[
        "play", "music", "song", "songs", "playlist", "playlists", "spotify", "pause", "skip",
        "track", "tracks", "album", "artist",
    ],
    required_scopes: &["user-modify-playback-state", "playlist-modify-private"],
};

const GENERIC: CapabilityProfile = CapabilityProfile {
    tag: CapabilityTag::Generic,
    description: "General conversation and anything no other capability covers",
    examples: &["hello", "what can you do?", "good morning"],
    phrases: &[],
    keywords: &[],
    required_scopes: &[],
};

impl Default for CapabilityCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

impl CapabilityCatalog {
    pub fn standard() -> Self {
        Self { profiles: vec![CONTACTS, MAIL, MESSAGING, MUSIC, GENERIC] }
    }

    /// Profiles in fallback priority order, generic last.
    pub fn profiles(&self) -> &[CapabilityProfile] {
        &self.profiles
    }

    pub fn profile(&self, tag: CapabilityTag) -> Option<&CapabilityProfile> {
        self.profiles.iter().find(|profile| profile.tag == tag)
    }

    pub fn tags(&self) -> Vec<CapabilityTag> {
        self.profiles.iter().map(|profile| profile.tag).collect()
    }

    /// Keeps only the listed capabilities, preserving priority order.
    pub fn restricted_to(&self, tags: &[CapabilityTag]) -> Self {
        let profiles =
            self.profiles.iter().filter(|profile| tags.contains(&profile.tag)).cloned().collect();
        Self { profiles }
    }
}

#[cfg(test)]
mod tests {
    use switchboard_core::domain::capability::CapabilityTag;

    use super::CapabilityCatalog;

    #[test]
    fn fallback_priority_order_is_fixed() {
        assert_eq!(
            CapabilityCatalog::standard().tags(),
            vec![
                CapabilityTag::Contacts,
                CapabilityTag::Mail,
                CapabilityTag::Messaging,
                CapabilityTag::Music,
                CapabilityTag::Generic,
            ]
        );
    }

    #[test]
    fn restriction_preserves_order() {
        let catalog = CapabilityCatalog::standard()
            .restricted_to(&[CapabilityTag::Music, CapabilityTag::Contacts]);
        assert_eq!(catalog.tags(), vec![CapabilityTag::Contacts, CapabilityTag::Music]);
        assert!(catalog.profile(CapabilityTag::Mail).is_none());
    }
}
