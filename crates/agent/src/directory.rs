use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use switchboard_core::domain::directory::DirectoryEntity;

/// Source of the people a worker can resolve names against. Callers fetch a
/// fresh list per resolution and never cache it.
#[async_trait]
pub trait DirectoryProvider: Send + Sync {
    async fn list_entities(&self) -> Result<Vec<DirectoryEntity>>;
}

#[derive(Clone, Debug, Default)]
pub struct StaticDirectory {
    entities: Vec<DirectoryEntity>,
}

impl StaticDirectory {
    pub fn new(entities: Vec<DirectoryEntity>) -> Self {
        Self { entities }
    }
}

#[async_trait]
impl DirectoryProvider for StaticDirectory {
    async fn list_entities(&self) -> Result<Vec<DirectoryEntity>> {
        Ok(self.entities.clone())
    }
}

/// Reads a JSON array of entities from disk on every call, so edits to the
/// file are picked up without a restart.
#[derive(Clone, Debug)]
pub struct JsonFileDirectory {
    path: PathBuf,
}

impl JsonFileDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl DirectoryProvider for JsonFileDirectory {
    async fn list_entities(&self) -> Result<Vec<DirectoryEntity>> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("could not read directory file `{}`", self.path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("could not parse directory file `{}`", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::{DirectoryProvider, JsonFileDirectory};

    #[tokio::test]
    async fn json_directory_reads_entities_and_optional_fields() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("directory.json");
        fs::write(
            &path,
            r#"[
  {"id": "U001", "username": "bsmith", "display_name": "Ben Smith", "real_name": "Ben Smith",
   "email": "ben@example.com"},
  {"id": "U002", "username": "ajohnson", "display_name": "Alice", "real_name": "Alice Johnson"}
]"#,
        )
        .expect("write directory");

        let entities = JsonFileDirectory::new(&path).list_entities().await.expect("entities");

        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0].email.as_deref(), Some("ben@example.com"));
        assert_eq!(entities[1].email, None);
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let dir = TempDir::new().expect("tempdir");
        let result = JsonFileDirectory::new(dir.path().join("absent.json")).list_entities().await;

        let error = result.expect_err("missing file should fail");
        assert!(error.to_string().contains("absent.json"));
    }
}
