use std::sync::Arc;

use async_trait::async_trait;
use switchboard_core::domain::capability::{CapabilityRequest, CapabilityResponse, CapabilityTag};
use switchboard_core::domain::directory::DirectoryEntity;
use switchboard_core::errors::ErrorKind;
use switchboard_core::resolver::{EntityResolver, ResolutionFilters};

use super::{resolve_person, StatusScan, WorkerDeps};
use crate::conversation::{
    clean_fragment, find_phrase, is_status_follow_up, strip_leading_phrases, tokenize,
};
use crate::directory::DirectoryProvider;
use crate::worker::Worker;

const LEADS: [&str; 14] = [
    "can you",
    "could you",
    "please",
    "find",
    "look up",
    "lookup",
    "search for",
    "get",
    "show me",
    "what is",
    "what's",
    "who is",
    "tell me",
    "give me",
];

const FIELD_PHRASES: [&str; 12] = [
    "email address of",
    "email address for",
    "email for",
    "email of",
    "phone number of",
    "phone number for",
    "phone for",
    "number for",
    "contact info for",
    "contact info of",
    "contact details for",
    "details for",
];

const FIELD_WORDS: [&str; 6] = ["email", "e-mail", "phone", "number", "contact", "address"];
const ARTICLES: [&str; 2] = ["the", "a"];

/// A lookup often precedes an email or a message in the same conversation.
const DELIVERY: StatusScan = StatusScan {
    done_prefixes: &["Email sent", "Message sent"],
    noun: "message",
    nothing_done: "I only looked up contact details here. Nothing was sent.",
    retry_example: "email Ben saying ...",
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ContactField {
    Email,
    Phone,
    All,
}

impl ContactField {
    fn requested(text: &str) -> Self {
        let tokens = tokenize(text);
        let has = |words: &[&str]| tokens.iter().any(|token| words.contains(&token.as_str()));
        match (has(&["email", "e-mail", "mail"]), has(&["phone", "number", "mobile", "cell"])) {
            (true, false) => Self::Email,
            (false, true) => Self::Phone,
            _ => Self::All,
        }
    }
}

/// Read-only directory lookups. Never consumes quota.
pub struct ContactsWorker {
    directory: Arc<dyn DirectoryProvider>,
    resolver: EntityResolver,
}

impl ContactsWorker {
    pub fn new(deps: &WorkerDeps) -> Self {
        Self { directory: deps.directory.clone(), resolver: EntityResolver::new() }
    }
}

#[async_trait]
impl Worker for ContactsWorker {
    fn capability(&self) -> CapabilityTag {
        CapabilityTag::Contacts
    }

    async fn handle(&mut self, request: CapabilityRequest) -> CapabilityResponse {
        if is_status_follow_up(&request.original_text) {
            return DELIVERY.answer(&request.conversation_history);
        }

        let field = ContactField::requested(&request.original_text);
        let name = request
            .to
            .as_deref()
            .and_then(clean_fragment)
            .or_else(|| lookup_name(&request.original_text));

        let Some(name) = name else {
            return CapabilityResponse::clarify(
                ErrorKind::MissingField,
                "Who should I look up?",
                vec!["Try 'find Ben's email address'".to_string()],
            );
        };

        let entity = match resolve_person(
            self.directory.as_ref(),
            &self.resolver,
            &name,
            &ResolutionFilters::default(),
        )
        .await
        {
            Ok(entity) => entity,
            Err(response) => return response,
        };

        CapabilityResponse::completed(describe_contact(&entity, field)).with_result_id(entity.id.to_string())
    }
}

fn describe_contact(entity: &DirectoryEntity, field: ContactField) -> String {
    let label = entity.label();
    let email = entity.email.as_deref().filter(|value| !value.trim().is_empty());
    let phone = entity.phone.as_deref().filter(|value| !value.trim().is_empty());

    match field {
        ContactField::Email => match email {
            Some(email) => format!("{label}: email {email}"),
            None => format!("{label} has no email address on file."),
        },
        ContactField::Phone => match phone {
            Some(phone) => format!("{label}: phone {phone}"),
            None => format!("{label} has no phone number on file."),
        },
        ContactField::All => {
            let details: Vec<String> = [("email", email), ("phone", phone)]
                .into_iter()
                .filter_map(|(kind, value)| value.map(|value| format!("{kind} {value}")))
                .collect();
            if details.is_empty() {
                format!("{label} has no contact details on file.")
            } else {
                format!("{label}: {}", details.join(", "))
            }
        }
    }
}

/// Pulls the person out of "find X's email", "phone number for X",
/// "who is X" and similar phrasings.
fn lookup_name(text: &str) -> Option<String> {
    let stripped = strip_leading_phrases(text, &LEADS);
    let lower = stripped.to_ascii_lowercase();

    let after_phrase = FIELD_PHRASES
        .iter()
        .filter_map(|phrase| find_phrase(&lower, phrase).map(|at| at + phrase.len()))
        .min();
    if let Some(start) = after_phrase {
        return clean_name(&stripped[start..]);
    }

    let possessive = ["'s", "’s"].iter().filter_map(|mark| lower.find(mark)).min();
    if let Some(end) = possessive {
        return clean_name(&stripped[..end]);
    }

    let field_word = FIELD_WORDS.iter().filter_map(|word| find_phrase(&lower, word)).min();
    match field_word {
        Some(end) => clean_name(&stripped[..end]),
        None => clean_name(stripped),
    }
}

fn clean_name(fragment: &str) -> Option<String> {
    let fragment = strip_leading_phrases(fragment, &ARTICLES);
    clean_fragment(fragment)
}
