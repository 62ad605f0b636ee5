use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub String);

impl EntityId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A person in the workspace directory snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntity {
    pub id: EntityId,
    pub username: String,
    pub display_name: String,
    pub real_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl DirectoryEntity {
    pub fn new(
        id: impl Into<String>,
        username: impl Into<String>,
        display_name: impl Into<String>,
        real_name: impl Into<String>,
    ) -> Self {
        Self {
            id: EntityId(id.into()),
            username: username.into(),
            display_name: display_name.into(),
            real_name: real_name.into(),
            email: None,
            phone: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    /// Best human-facing name: display name, then real name, then username.
    pub fn preferred_name(&self) -> &str {
        [&self.display_name, &self.real_name, &self.username]
            .into_iter()
            .find(|name| !name.trim().is_empty())
            .map(String::as_str)
            .unwrap_or(self.id.as_str())
    }

    /// `Display (Real Name) @username`, collapsing the real name when it
    /// repeats the display name.
    pub fn label(&self) -> String {
        let display = self.preferred_name();
        let real = self.real_name.trim();
        if !real.is_empty() && !real.eq_ignore_ascii_case(display) {
            format!("{display} ({real}) @{}", self.username)
        } else {
            format!("{display} @{}", self.username)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::DirectoryEntity;

    #[test]
    fn label_includes_real_name_only_when_distinct() {
        let same = DirectoryEntity::new("U1", "asmith", "Alice Smith", "Alice Smith");
        assert_eq!(same.label(), "Alice Smith @asmith");

        let distinct = DirectoryEntity::new("U2", "bsmith", "Benny", "Ben Smith");
        assert_eq!(distinct.label(), "Benny (Ben Smith) @bsmith");
    }

    #[test]
    fn preferred_name_skips_blank_fields() {
        let entity = DirectoryEntity::new("U3", "ctaylor", "  ", "Chris Taylor");
        assert_eq!(entity.preferred_name(), "Chris Taylor");
    }
}
