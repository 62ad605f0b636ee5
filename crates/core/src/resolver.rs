//! Directory entity resolution.
//!
//! Matches a free-text name fragment against a directory snapshot in strict
//! tier order. Exact tiers (id, username, display name, real name) are
//! checked one at a time and the first tier with any hit decides the result.
//! Only when no exact tier hits are the partial tiers scanned, and their hits
//! are accumulated together.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::domain::directory::{DirectoryEntity, EntityId};

/// Maximum number of candidates presented in a disambiguation prompt.
pub const DISAMBIGUATION_LIMIT: usize = 5;

/// Declaration order is priority order; every exact tier sorts before every
/// partial tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchTier {
    ExactId,
    ExactUsername,
    ExactDisplayName,
    ExactRealName,
    PartialFirstName,
    PartialDisplay,
    PartialRealName,
}

impl MatchTier {
    pub fn is_exact(&self) -> bool {
        matches!(
            self,
            Self::ExactId | Self::ExactUsername | Self::ExactDisplayName | Self::ExactRealName
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMatch {
    pub entity: DirectoryEntity,
    pub tier: MatchTier,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolutionStatus {
    Single,
    Multiple,
    None,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionFilters {
    #[serde(default)]
    pub require_email: bool,
    #[serde(default)]
    pub require_phone: bool,
}

impl ResolutionFilters {
    pub fn email_required() -> Self {
        Self { require_email: true, ..Self::default() }
    }

    fn admits(&self, entity: &DirectoryEntity) -> bool {
        let has = |value: &Option<String>| value.as_deref().is_some_and(|v| !v.trim().is_empty());
        (!self.require_email || has(&entity.email)) && (!self.require_phone || has(&entity.phone))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub query: String,
    pub status: ResolutionStatus,
    /// Every match, highest tier first, then directory order.
    pub matches: Vec<EntityMatch>,
}

impl Resolution {
    fn none(query: &str) -> Self {
        Self { query: query.to_string(), status: ResolutionStatus::None, matches: Vec::new() }
    }

    fn from_matches(query: &str, matches: Vec<EntityMatch>) -> Self {
        let status = match matches.len() {
            0 => ResolutionStatus::None,
            1 => ResolutionStatus::Single,
            _ => ResolutionStatus::Multiple,
        };
        Self { query: query.to_string(), status, matches }
    }

    /// True count of matching entities, independent of display truncation.
    pub fn total(&self) -> usize {
        self.matches.len()
    }

    /// Candidates to present, capped at [`DISAMBIGUATION_LIMIT`].
    pub fn shown(&self) -> &[EntityMatch] {
        let end = self.matches.len().min(DISAMBIGUATION_LIMIT);
        &self.matches[..end]
    }

    pub fn is_truncated(&self) -> bool {
        self.matches.len() > DISAMBIGUATION_LIMIT
    }

    pub fn single(&self) -> Option<&EntityMatch> {
        match self.status {
            ResolutionStatus::Single => self.matches.first(),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct EntityResolver;

impl EntityResolver {
    pub fn new() -> Self {
        Self
    }

    pub fn resolve(
        &self,
        query: &str,
        directory: &[DirectoryEntity],
        filters: &ResolutionFilters,
    ) -> Resolution {
        let needle = normalize_query(query);
        if needle.is_empty() {
            return Resolution::none(query);
        }

        let candidates: Vec<&DirectoryEntity> =
            directory.iter().filter(|entity| filters.admits(entity)).collect();

        for tier in [
            MatchTier::ExactId,
            MatchTier::ExactUsername,
            MatchTier::ExactDisplayName,
            MatchTier::ExactRealName,
        ] {
            let hits = candidates
                .iter()
                .filter(|entity| exact_field(entity, tier).is_some_and(|field| field == needle))
                .map(|entity| EntityMatch { entity: (*entity).clone(), tier })
                .collect::<Vec<_>>();
            if !hits.is_empty() {
                return Resolution::from_matches(query, hits);
            }
        }

        let mut seen: HashSet<&EntityId> = HashSet::new();
        let mut partial = Vec::new();
        for tier in
            [MatchTier::PartialFirstName, MatchTier::PartialDisplay, MatchTier::PartialRealName]
        {
            for entity in &candidates {
                if seen.contains(&entity.id) || !partial_hit(entity, tier, &needle) {
                    continue;
                }
                seen.insert(&entity.id);
                partial.push(EntityMatch { entity: (*entity).clone(), tier });
            }
        }

        Resolution::from_matches(query, partial)
    }
}

fn normalize_query(query: &str) -> String {
    query.trim().trim_start_matches('@').trim().to_lowercase()
}

fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

fn exact_field(entity: &DirectoryEntity, tier: MatchTier) -> Option<String> {
    let raw = match tier {
        MatchTier::ExactId => entity.id.as_str(),
        MatchTier::ExactUsername => entity.username.as_str(),
        MatchTier::ExactDisplayName => entity.display_name.as_str(),
        MatchTier::ExactRealName => entity.real_name.as_str(),
        _ => return None,
    };
    let normalized = normalize(raw);
    (!normalized.is_empty()).then_some(normalized)
}

fn first_token(value: &str) -> Option<String> {
    value.split_whitespace().next().map(str::to_lowercase)
}

fn partial_hit(entity: &DirectoryEntity, tier: MatchTier, needle: &str) -> bool {
    match tier {
        MatchTier::PartialFirstName => [&entity.display_name, &entity.real_name]
            .into_iter()
            .filter_map(|name| first_token(name))
            .any(|token| token == needle),
        MatchTier::PartialDisplay => normalize(&entity.display_name).contains(needle),
        MatchTier::PartialRealName => normalize(&entity.real_name).contains(needle),
        _ => false,
    }
}
