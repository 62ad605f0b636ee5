//! Text helpers shared by the router and the workers: tokenizing, keyword
//! matching, command splitting and scanning history snapshots.

use switchboard_core::domain::conversation::{HistoryMessage, Role};

const STATUS_PHRASES: [&str; 12] = [
    "did it send",
    "did it go through",
    "did it go out",
    "did that send",
    "did that go through",
    "did that work",
    "did it work",
    "did you send",
    "was it sent",
    "has it been sent",
    "is it sent",
    "did it get delivered",
];

const STATUS_OPENERS: [&str; 4] = ["did", "was", "has", "is"];
const STATUS_VERBS: [&str; 5] = ["send", "sent", "deliver", "delivered", "through"];
const PRONOUNS: [&str; 6] = ["him", "her", "them", "he", "she", "they"];
const MAX_WILDCARD_WORDS: usize = 3;

pub fn normalize_text(text: &str) -> String {
    text.trim().to_ascii_lowercase()
}

/// Lowercased word tokens; hyphenated words stay whole so `e-mail` is one
/// token, everything else that is not alphanumeric separates tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut sanitized = String::with_capacity(text.len());
    for character in text.chars() {
        if character.is_alphanumeric() || character == '-' {
            sanitized.extend(character.to_lowercase());
        } else {
            sanitized.push(' ');
        }
    }
    sanitized.split_whitespace().map(|token| token.to_string()).collect()
}

/// Word-aware keyword test: a single-word keyword must equal a token, a
/// phrase must appear as consecutive tokens. A `*` in a phrase stands for
/// one to three words.
pub fn matches_keyword(tokens: &[String], keyword: &str) -> bool {
    if keyword.contains('*') {
        let pattern: Vec<String> = keyword
            .split_whitespace()
            .flat_map(|part| if part == "*" { vec![part.to_string()] } else { tokenize(part) })
            .collect();
        return !pattern.is_empty()
            && (0..tokens.len()).any(|start| pattern_matches_at(&tokens[start..], &pattern));
    }

    let phrase = tokenize(keyword);
    match phrase.len() {
        0 => false,
        1 => tokens.iter().any(|token| *token == phrase[0]),
        width => tokens.windows(width).any(|window| window == phrase.as_slice()),
    }
}

fn pattern_matches_at(tokens: &[String], pattern: &[String]) -> bool {
    match pattern.split_first() {
        None => true,
        Some((part, rest)) if part == "*" => (1..=MAX_WILDCARD_WORDS.min(tokens.len()))
            .any(|skip| pattern_matches_at(&tokens[skip..], rest)),
        Some((part, rest)) => {
            tokens.first().is_some_and(|token| token == part) && pattern_matches_at(&tokens[1..], rest)
        }
    }
}

pub fn keyword_hits(tokens: &[String], keywords: &[&str]) -> usize {
    keywords.iter().filter(|keyword| matches_keyword(tokens, keyword)).count()
}

pub fn is_status_follow_up(text: &str) -> bool {
    let normalized = normalize_text(text);
    if STATUS_PHRASES.iter().any(|phrase| normalized.contains(phrase)) {
        return true;
    }
    let tokens = tokenize(&normalized);
    tokens.first().is_some_and(|first| STATUS_OPENERS.contains(&first.as_str()))
        && tokens.iter().any(|token| STATUS_VERBS.contains(&token.as_str()))
}

pub fn is_pronoun(word: &str) -> bool {
    PRONOUNS.contains(&normalize_text(word).as_str())
}

pub fn extract_email_addresses(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|token| {
            token.trim_matches(|ch: char| {
                matches!(ch, '<' | '>' | '(' | ')' | '[' | ']' | ',' | ';' | ':' | '"' | '\'')
                    || ch == '.'
                    || ch == '!'
                    || ch == '?'
            })
        })
        .filter(|candidate| looks_like_email(candidate))
        .map(str::to_string)
        .collect()
}

pub fn extract_email_address(text: &str) -> Option<String> {
    extract_email_addresses(text).into_iter().next()
}

fn looks_like_email(candidate: &str) -> bool {
    let Some((local, domain)) = candidate.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

/// Most recently mentioned email address in the snapshot, newest turn first.
pub fn latest_email_in_history(history: &[HistoryMessage]) -> Option<String> {
    history
        .iter()
        .rev()
        .find_map(|message| extract_email_addresses(&message.content).into_iter().last())
}

/// Newest assistant turn whose text starts with any of `prefixes`.
pub fn latest_assistant_turn<'a>(
    history: &'a [HistoryMessage],
    prefixes: &[&str],
) -> Option<&'a HistoryMessage> {
    history
        .iter()
        .rev()
        .filter(|message| message.role == Role::Assistant)
        .find(|message| prefixes.iter().any(|prefix| message.content.starts_with(prefix)))
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandParts {
    pub target: Option<String>,
    pub delimiter: Option<&'static str>,
    pub remainder: Option<String>,
}

/// Splits `<verb> <target> <delimiter> <remainder>` commands such as
/// "tell Ben: lunch is here" or "email Ben about the launch".
///
/// The earliest verb wins, longest on ties; likewise for delimiters. With no
/// delimiter the whole rest is the target, unless it starts with a handle or
/// address, in which case that token is the target and the rest follows.
pub fn split_command(
    text: &str,
    verbs: &[&'static str],
    delimiters: &[&'static str],
) -> Option<CommandParts> {
    let lower = text.to_ascii_lowercase();
    let (verb_at, verb) = earliest_phrase(&lower, verbs)?;
    let rest_start = verb_at + verb.len();
    let rest = &text[rest_start..];
    let rest_lower = &lower[rest_start..];

    let (target, delimiter, remainder) = match earliest_phrase(rest_lower, delimiters) {
        Some((at, delimiter)) => {
            (&rest[..at], Some(delimiter), Some(&rest[at + delimiter.len()..]))
        }
        None => {
            let trimmed = rest.trim_start();
            let first = trimmed.split_whitespace().next().unwrap_or_default();
            if first.starts_with('@') || looks_like_email(first.trim_end_matches([',', ':'])) {
                (first, None, Some(&trimmed[first.len()..]))
            } else {
                (rest, None, None)
            }
        }
    };

    Some(CommandParts {
        target: clean_fragment(target),
        delimiter,
        remainder: remainder.and_then(clean_fragment),
    })
}

/// Removes any of `leads` from the start of `text`, repeatedly.
pub fn strip_leading_phrases<'a>(text: &'a str, leads: &[&str]) -> &'a str {
    let mut current = text.trim_start();
    loop {
        let lower = current.to_ascii_lowercase();
        let Some(lead) = leads
            .iter()
            .filter(|lead| find_phrase(&lower, lead) == Some(0))
            .max_by_key(|lead| lead.len())
        else {
            return current;
        };
        current = current[lead.len()..].trim_start();
    }
}

/// Trims whitespace, trailing punctuation and wrapping quotes. Empty input
/// becomes `None`.
pub fn clean_fragment(fragment: &str) -> Option<String> {
    let cleaned = fragment
        .trim()
        .trim_end_matches(['.', '?', '!', ','])
        .trim()
        .trim_matches(|ch| ch == '"' || ch == '\'' || ch == '“' || ch == '”')
        .trim();
    (!cleaned.is_empty()).then(|| cleaned.to_string())
}

fn earliest_phrase(haystack: &str, phrases: &[&'static str]) -> Option<(usize, &'static str)> {
    phrases
        .iter()
        .filter_map(|phrase| find_phrase(haystack, phrase).map(|at| (at, *phrase)))
        .min_by(|left, right| left.0.cmp(&right.0).then(right.1.len().cmp(&left.1.len())))
}

/// Byte offset of the first occurrence of `phrase` that sits on word
/// boundaries. Edges that are punctuation need no boundary.
pub fn find_phrase(haystack: &str, phrase: &str) -> Option<usize> {
    if phrase.is_empty() {
        return None;
    }
    let starts_alnum = phrase.chars().next().is_some_and(char::is_alphanumeric);
    let ends_alnum = phrase.chars().last().is_some_and(char::is_alphanumeric);

    haystack.match_indices(phrase).map(|(at, _)| at).find(|at| {
        let before_ok = !starts_alnum
            || haystack[..*at].chars().next_back().map_or(true, |ch| !ch.is_alphanumeric());
        let after_ok = !ends_alnum
            || haystack[at + phrase.len()..].chars().next().map_or(true, |ch| !ch.is_alphanumeric());
        before_ok && after_ok
    })
}
