//! User-facing text for ambiguous and unmatched entity lookups.

use serde::Serialize;

use crate::resolver::{Resolution, ResolutionStatus};

pub const NOT_FOUND_TIPS: [&str; 3] = [
    "Try their full name",
    "Check the spelling",
    "Use their @username or user ID",
];

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Clarification {
    pub reasoning: String,
    pub suggestions: Vec<String>,
}

/// Builds the clarification text for a resolution that did not settle on one
/// entity. Returns `None` for a single match.
pub fn clarify(resolution: &Resolution) -> Option<Clarification> {
    match resolution.status {
        ResolutionStatus::Single => None,
        ResolutionStatus::Multiple => Some(ambiguous(resolution)),
        ResolutionStatus::None => Some(not_found(&resolution.query)),
    }
}

fn ambiguous(resolution: &Resolution) -> Clarification {
    let total = resolution.total();
    let shown = resolution.shown();
    let mut reasoning = format!("I found {total} users matching '{}'.", resolution.query.trim());
    if resolution.is_truncated() {
        reasoning.push_str(&format!(
            " Showing the first {}, ...and {} more.",
            shown.len(),
            total - shown.len()
        ));
    }
    reasoning.push_str(" Which one did you mean?");

    // Shown candidates first, then the tips.
    let mut suggestions: Vec<String> =
        shown.iter().map(|candidate| candidate.entity.label()).collect();
    if let Some(first) = shown.first() {
        let entity = &first.entity;
        let full_name =
            if entity.real_name.trim().is_empty() { entity.preferred_name() } else { &entity.real_name };
        suggestions.push(format!("Use the full name, e.g. '{}'", full_name.trim()));
        suggestions.push(format!("Use the display name, e.g. '{}'", entity.preferred_name()));
        suggestions.push(format!(
            "Use the username or ID, e.g. '@{}' or '{}'",
            entity.username, entity.id
        ));
    }

    Clarification { reasoning, suggestions }
}

fn not_found(query: &str) -> Clarification {
    let query = query.trim();
    let reasoning = if query.is_empty() {
        "I need a name to look up.".to_string()
    } else {
        format!("I couldn't find a user named '{query}'.")
    };
    Clarification { reasoning, suggestions: NOT_FOUND_TIPS.iter().map(|tip| tip.to_string()).collect() }
}

#[cfg(test)]
mod tests {
    use super::{clarify, NOT_FOUND_TIPS};
    use crate::domain::directory::DirectoryEntity;
    use crate::resolver::{EntityResolver, ResolutionFilters};

    fn team() -> Vec<DirectoryEntity> {
        vec![
            DirectoryEntity::new("U001", "bsmith", "Ben Smith", "Ben Smith")
                .with_email("ben.smith@example.com"),
            DirectoryEntity::new("U002", "btaylor", "Ben Taylor", "Benjamin Taylor")
                .with_email("ben.taylor@example.com"),
            DirectoryEntity::new("U003", "ajohnson", "Alice Johnson", "Alice Johnson")
                .with_email("alice@example.com"),
        ]
    }

    #[test]
    fn ambiguous_lookup_lists_labels_and_disambiguation_examples() {
        let resolution =
            EntityResolver::new().resolve("Ben", &team(), &ResolutionFilters::email_required());
        let clarification = clarify(&resolution).expect("clarification");

        assert!(clarification.reasoning.starts_with("I found 2 users matching 'Ben'"));
        assert!(clarification.reasoning.ends_with("Which one did you mean?"));
        assert_eq!(clarification.suggestions.len(), 5);
        assert_eq!(clarification.suggestions[0], "Ben Smith @bsmith");
        assert_eq!(clarification.suggestions[1], "Ben Taylor (Benjamin Taylor) @btaylor");
        assert!(clarification.suggestions[2].contains("full name"));
        assert!(clarification.suggestions[3].contains("display name"));
        assert!(clarification.suggestions[4].contains("@bsmith"));
    }

    #[test]
    fn truncated_list_mentions_the_remainder() {
        let directory: Vec<_> = (0..7)
            .map(|i| DirectoryEntity::new(format!("U{i}"), format!("kim{i}"), format!("Kim {i}"), ""))
            .collect();
        let resolution =
            EntityResolver::new().resolve("kim", &directory, &ResolutionFilters::default());
        let clarification = clarify(&resolution).expect("clarification");

        assert!(clarification.reasoning.starts_with("I found 7 users"));
        assert!(clarification.reasoning.contains("...and 2 more"));
        assert!(clarification.suggestions.contains(&"Kim 4 @kim4".to_string()));
        assert!(!clarification.suggestions.contains(&"Kim 5 @kim5".to_string()));
        let candidates: Vec<_> =
            clarification.suggestions.iter().filter(|tip| tip.starts_with("Kim ")).collect();
        assert_eq!(candidates.len(), 5);
    }

    #[test]
    fn not_found_carries_generic_tips() {
        let resolution =
            EntityResolver::new().resolve("Zed", &team(), &ResolutionFilters::default());
        let clarification = clarify(&resolution).expect("clarification");

        assert_eq!(clarification.reasoning, "I couldn't find a user named 'Zed'.");
        assert_eq!(clarification.suggestions, NOT_FOUND_TIPS.map(String::from).to_vec());
    }

    #[test]
    fn single_match_needs_no_clarification() {
        let resolution =
            EntityResolver::new().resolve("Alice", &team(), &ResolutionFilters::default());
        assert!(clarify(&resolution).is_none());
    }
}
