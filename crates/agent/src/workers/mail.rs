use std::sync::Arc;

use async_trait::async_trait;
use switchboard_core::domain::capability::{CapabilityRequest, CapabilityResponse, CapabilityTag};
use switchboard_core::domain::conversation::HistoryMessage;
use switchboard_core::errors::ErrorKind;
use switchboard_core::resolver::{EntityResolver, ResolutionFilters};
use tracing::info;

use super::{
    describe_missing, execute_action, pending_field, remember_pending, resolve_person, StatusScan,
    WorkerDeps,
};
use crate::conversation::{
    clean_fragment, extract_email_address, find_phrase, is_pronoun, is_status_follow_up,
    latest_email_in_history, split_command, strip_leading_phrases,
};
use crate::directory::DirectoryProvider;
use crate::guardrails::ActionGuard;
use crate::tools::{ActionExecutor, ResolvedAction};
use crate::worker::Worker;

const SEND_VERBS: [&str; 10] = [
    "send an email to",
    "send a mail to",
    "send email to",
    "write an email to",
    "compose an email to",
    "email",
    "e-mail",
    "mail",
    "write to",
    "send",
];

const RECIPIENT_DELIMITERS: [&str; 11] = [
    "an email",
    "an e-mail",
    "a mail",
    "about",
    "with subject",
    "saying",
    "that says",
    "that",
    ":",
    "and say",
    "telling them",
];

const BODY_MARKERS: [&str; 6] = ["saying", "that says", ":", "and say", "telling them", "with body"];
const SUBJECT_MARKERS: [&str; 4] = ["about", "with subject", "subject", "regarding"];
const ENVELOPE_WORDS: [&str; 3] = ["an email", "an e-mail", "a mail"];
const ANSWER_LEADS: [&str; 5] = ["saying", "that says", "that", ":", "tell them"];

const SENT_PREFIX: &str = "Email sent";
const DELIVERY: StatusScan = StatusScan {
    done_prefixes: &[SENT_PREFIX],
    noun: "email",
    nothing_done: "I don't see an email sent earlier in this conversation.",
    retry_example: "email Ben saying ...",
};
const DEFAULT_SUBJECT: &str = "(no subject)";
const RECIPIENT: &str = "to";
const SUBJECT: &str = "subject";
const BODY: &str = "body";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct MailDraft {
    recipient: Option<String>,
    subject: Option<String>,
    body: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Recipient {
    Address(String),
    Pronoun(String),
    Name(String),
}

impl Recipient {
    fn classify(raw: &str) -> Self {
        let trimmed = raw.trim();
        match extract_email_address(trimmed) {
            Some(address) => Self::Address(address),
            _ if is_pronoun(trimmed) => Self::Pronoun(trimmed.to_string()),
            _ => Self::Name(trimmed.to_string()),
        }
    }
}

pub struct MailWorker {
    directory: Arc<dyn DirectoryProvider>,
    executor: Arc<dyn ActionExecutor>,
    guard: ActionGuard,
    resolver: EntityResolver,
}

impl MailWorker {
    pub fn new(deps: &WorkerDeps) -> Self {
        Self {
            directory: deps.directory.clone(),
            executor: deps.executors.executor(CapabilityTag::Mail),
            guard: ActionGuard::new(CapabilityTag::Mail, deps.auth.clone(), deps.quota),
            resolver: EntityResolver::new(),
        }
    }

    async fn compose(&mut self, request: &CapabilityRequest) -> CapabilityResponse {
        let draft = draft_from_request(request);

        let mut missing = Vec::new();
        if draft.recipient.is_none() {
            missing.push("the recipient");
        }
        if draft.body.is_none() {
            missing.push("the message body");
        }
        if !missing.is_empty() {
            let reasoning = format!("To send this email I still need {}.", describe_missing(&missing));
            let mut suggestions = Vec::new();
            if draft.recipient.is_none() {
                suggestions.push("Who should receive it? A name or an email address works.".to_string());
            }
            if draft.body.is_none() {
                suggestions.push("What should the email say?".to_string());
            }
            let response = CapabilityResponse::clarify(ErrorKind::MissingField, reasoning, suggestions);
            return remember_draft(response, &draft, draft.recipient.as_deref());
        }

        let (Some(recipient), Some(body)) = (draft.recipient.clone(), draft.body.clone()) else {
            return CapabilityResponse::failed(ErrorKind::MissingField, "email draft is incomplete");
        };

        let address = match self.resolve_recipient(&recipient, &request.conversation_history).await {
            Ok(address) => address,
            Err(response) => return remember_draft(response, &draft, None),
        };

        if let Some(denied) = self.guard.evaluate(&request.sender_id).await.into_response() {
            return denied;
        }

        let subject = draft.subject.clone().unwrap_or_else(|| DEFAULT_SUBJECT.to_string());
        let action = ResolvedAction::SendMail { to: address.clone(), subject: subject.clone(), body };
        let receipt = match execute_action(self.executor.as_ref(), &action).await {
            Ok(receipt) => receipt,
            Err(response) => return response,
        };

        info!(
            event_name = "worker.mail.sent",
            sender_id = %request.sender_id,
            receipt_id = %receipt.id,
            "email sent"
        );
        let summary = if subject == DEFAULT_SUBJECT {
            format!("{SENT_PREFIX} to {address}.")
        } else {
            format!("{SENT_PREFIX} to {address} with subject '{subject}'.")
        };
        let response = CapabilityResponse::completed(summary)
            .with_result_id(receipt.id)
            .remember("mail.last_recipient", address);
        remember_pending(response, CapabilityTag::Mail, &[(RECIPIENT, None), (SUBJECT, None), (BODY, None)])
    }

    async fn resolve_recipient(
        &self,
        recipient: &str,
        history: &[HistoryMessage],
    ) -> Result<String, CapabilityResponse> {
        match Recipient::classify(recipient) {
            Recipient::Address(address) => Ok(address),
            Recipient::Pronoun(pronoun) => latest_email_in_history(history).ok_or_else(|| {
                CapabilityResponse::clarify(
                    ErrorKind::MissingField,
                    format!(
                        "I don't know who '{pronoun}' refers to. There is no earlier email address in this conversation."
                    ),
                    vec![
                        "Use their name, e.g. 'email Ben Smith ...'".to_string(),
                        "Use their email address".to_string(),
                    ],
                )
            }),
            Recipient::Name(name) => {
                let entity = resolve_person(
                    self.directory.as_ref(),
                    &self.resolver,
                    &name,
                    &ResolutionFilters::email_required(),
                )
                .await?;
                entity.email.clone().ok_or_else(|| {
                    CapabilityResponse::clarify(
                        ErrorKind::EntityNotFound,
                        format!("{} has no email address on file.", entity.label()),
                        vec!["Use their email address".to_string()],
                    )
                })
            }
        }
    }
}

#[async_trait]
impl Worker for MailWorker {
    fn capability(&self) -> CapabilityTag {
        CapabilityTag::Mail
    }

    async fn handle(&mut self, request: CapabilityRequest) -> CapabilityResponse {
        if is_status_follow_up(&request.original_text) {
            return DELIVERY.answer(&request.conversation_history);
        }
        self.compose(&request).await
    }
}

/// Builds the draft for this turn. Structured request fields win over
/// anything parsed from the text. A turn that is not itself a mail command
/// is read as the answer to the previous clarification.
fn draft_from_request(request: &CapabilityRequest) -> MailDraft {
    let mut draft = match parse_mail_command(&request.original_text) {
        Some(parsed) => parsed,
        None => answer_pending(request),
    };

    if let Some(to) = request.to.as_deref().and_then(clean_fragment) {
        draft.recipient = Some(to);
    }
    if let Some(subject) = request.subject.as_deref().and_then(clean_fragment) {
        draft.subject = Some(subject);
    }
    if let Some(body) = request.body.as_deref().and_then(clean_fragment) {
        draft.body = Some(body);
    }
    draft
}

fn answer_pending(request: &CapabilityRequest) -> MailDraft {
    let mut draft = MailDraft {
        recipient: pending_field(request, CapabilityTag::Mail, RECIPIENT),
        subject: pending_field(request, CapabilityTag::Mail, SUBJECT),
        body: pending_field(request, CapabilityTag::Mail, BODY),
    };
    let has_pending = draft != MailDraft::default();
    let text = request.original_text.as_str();

    if draft.recipient.is_none() {
        if let Some(address) = extract_email_address(text) {
            draft.recipient = Some(address);
        } else if has_pending {
            draft.recipient = clean_fragment(strip_leading_phrases(text, &["to", "send it to"]));
        }
    } else if draft.body.is_none() {
        draft.body = clean_fragment(strip_leading_phrases(text, &ANSWER_LEADS));
    }
    draft
}

fn parse_mail_command(text: &str) -> Option<MailDraft> {
    let parts = split_command(text, &SEND_VERBS, &RECIPIENT_DELIMITERS)?;
    let tail = match (parts.delimiter, parts.remainder.as_deref()) {
        (Some(delimiter), Some(remainder)) => format!("{delimiter} {remainder}"),
        (Some(delimiter), None) => delimiter.to_string(),
        (None, Some(remainder)) => format!(": {remainder}"),
        (None, None) => String::new(),
    };
    let (subject, body) = parse_tail(&tail);
    Some(MailDraft { recipient: parts.target, subject, body })
}

/// Splits "about <subject> saying <body>" style tails.
fn parse_tail(tail: &str) -> (Option<String>, Option<String>) {
    let tail = strip_leading_phrases(tail, &ENVELOPE_WORDS);
    let lower = tail.to_ascii_lowercase();

    let body_split = BODY_MARKERS
        .iter()
        .filter_map(|marker| find_phrase(&lower, marker).map(|at| (at, marker.len())))
        .min_by(|left, right| left.0.cmp(&right.0).then(right.1.cmp(&left.1)))
        .or_else(|| (find_phrase(&lower, "that") == Some(0)).then_some((0, "that".len())));

    let (head, body) = match body_split {
        Some((at, len)) => (&tail[..at], clean_fragment(&tail[at + len..])),
        None => (tail, None),
    };

    let head_lower = head.to_ascii_lowercase();
    let subject = SUBJECT_MARKERS
        .iter()
        .filter(|marker| find_phrase(&head_lower, marker) == Some(0))
        .max_by_key(|marker| marker.len())
        .and_then(|marker| clean_fragment(&head[marker.len()..]));

    (subject, body)
}

fn remember_draft(
    response: CapabilityResponse,
    draft: &MailDraft,
    recipient: Option<&str>,
) -> CapabilityResponse {
    remember_pending(
        response,
        CapabilityTag::Mail,
        &[
            (RECIPIENT, recipient),
            (SUBJECT, draft.subject.as_deref()),
            (BODY, draft.body.as_deref()),
        ],
    )
}
