use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use switchboard_core::domain::capability::CapabilityTag;

use crate::catalog::CapabilityCatalog;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthStatus {
    pub authenticated: bool,
    #[serde(default)]
    pub missing_scopes: Vec<String>,
}

impl AuthStatus {
    pub fn authenticated() -> Self {
        Self { authenticated: true, missing_scopes: Vec::new() }
    }

    pub fn missing(scopes: Vec<String>) -> Self {
        Self { authenticated: false, missing_scopes: scopes }
    }
}

/// Credential state per capability. Token acquisition and storage live
/// behind this trait; implementations report failures as unauthenticated.
#[async_trait]
pub trait AuthStatusProvider: Send + Sync {
    async fn status(&self, capability: CapabilityTag) -> AuthStatus;
}

/// Fixed set of connected capabilities, as listed under `[auth]` in config.
/// Generic chat needs no credentials and is always connected.
#[derive(Clone, Debug, Default)]
pub struct StaticAuthStatus {
    authenticated: BTreeSet<CapabilityTag>,
    required_scopes: BTreeMap<CapabilityTag, Vec<String>>,
}

impl StaticAuthStatus {
    pub fn new(
        authenticated: impl IntoIterator<Item = CapabilityTag>,
        catalog: &CapabilityCatalog,
    ) -> Self {
        let required_scopes = catalog
            .profiles()
            .iter()
            .map(|profile| {
                let scopes = profile.required_scopes.iter().map(|scope| scope.to_string()).collect();
                (profile.tag, scopes)
            })
            .collect();
        Self { authenticated: authenticated.into_iter().collect(), required_scopes }
    }
}

#[async_trait]
impl AuthStatusProvider for StaticAuthStatus {
    async fn status(&self, capability: CapabilityTag) -> AuthStatus {
        if capability == CapabilityTag::Generic || self.authenticated.contains(&capability) {
            return AuthStatus::authenticated();
        }
        AuthStatus::missing(self.required_scopes.get(&capability).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use switchboard_core::domain::capability::CapabilityTag;

    use super::{AuthStatus, AuthStatusProvider, StaticAuthStatus};
    use crate::catalog::CapabilityCatalog;

    #[tokio::test]
    async fn unlisted_capability_reports_catalog_scopes() {
        let catalog = CapabilityCatalog::standard();
        let auth = StaticAuthStatus::new([CapabilityTag::Mail], &catalog);

        assert_eq!(auth.status(CapabilityTag::Mail).await, AuthStatus::authenticated());

        let music = auth.status(CapabilityTag::Music).await;
        assert!(!music.authenticated);
        assert!(music.missing_scopes.iter().any(|scope| scope.contains("playlist")));
    }

    #[tokio::test]
    async fn generic_chat_is_always_connected() {
        let auth = StaticAuthStatus::new([], &CapabilityCatalog::standard());
        assert!(auth.status(CapabilityTag::Generic).await.authenticated);
    }
}
