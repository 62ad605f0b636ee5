use anyhow::Result;
use serde::Serialize;
use switchboard_agent::directory::DirectoryProvider;
use switchboard_agent::runtime::RuntimeComponents;
use switchboard_core::disambiguation::{clarify, Clarification};
use switchboard_core::resolver::{EntityResolver, Resolution, ResolutionFilters};

use crate::commands::{async_runtime, load_config, CommandResult, EXIT_AGENT, EXIT_DIRECTORY};

#[derive(Debug, Serialize)]
pub struct ResolveReport {
    pub directory_size: usize,
    pub resolution: Resolution,
    pub clarification: Option<Clarification>,
}

pub fn run(query: &str, require_email: bool) -> CommandResult {
    let config = match load_config("resolve") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let components = match RuntimeComponents::from_config(&config) {
        Ok(components) => components,
        Err(error) => {
            return CommandResult::failure("resolve", "llm_client", error.to_string(), EXIT_AGENT)
        }
    };
    let runtime = match async_runtime("resolve") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let filters = if require_email {
        ResolutionFilters::email_required()
    } else {
        ResolutionFilters::default()
    };
    match runtime.block_on(lookup(components.directory.as_ref(), query, &filters)) {
        Ok(report) => CommandResult::json("resolve", &report),
        Err(error) => CommandResult::failure(
            "resolve",
            "directory",
            format!("failed to load directory: {error:#}"),
            EXIT_DIRECTORY,
        ),
    }
}

pub async fn lookup(
    directory: &dyn DirectoryProvider,
    query: &str,
    filters: &ResolutionFilters,
) -> Result<ResolveReport> {
    let entities = directory.list_entities().await?;
    let resolution = EntityResolver::new().resolve(query, &entities, filters);
    let clarification = clarify(&resolution);
    Ok(ResolveReport { directory_size: entities.len(), resolution, clarification })
}

#[cfg(test)]
mod tests {
    use switchboard_agent::directory::StaticDirectory;
    use switchboard_core::domain::directory::DirectoryEntity;
    use switchboard_core::resolver::{MatchTier, ResolutionFilters, ResolutionStatus};

    use super::lookup;

    fn directory() -> StaticDirectory {
        StaticDirectory::new(vec![
            DirectoryEntity::new("U001", "bsmith", "Ben Smith", "Ben Smith")
                .with_email("ben.smith@example.com"),
            DirectoryEntity::new("U002", "btaylor", "Ben Taylor", "Benjamin Taylor"),
        ])
    }

    #[tokio::test]
    async fn shared_first_name_needs_clarification() {
        let report =
            lookup(&directory(), "ben", &ResolutionFilters::default()).await.expect("lookup");

        assert_eq!(report.directory_size, 2);
        assert_eq!(report.resolution.status, ResolutionStatus::Multiple);
        let clarification = report.clarification.expect("clarification");
        assert!(clarification.reasoning.starts_with("I found 2 users matching 'ben'."));
    }

    #[tokio::test]
    async fn email_filter_narrows_to_one_entry() {
        let report =
            lookup(&directory(), "ben", &ResolutionFilters::email_required()).await.expect("lookup");

        let single = report.resolution.single().expect("single match");
        assert_eq!(single.entity.username, "bsmith");
        assert_eq!(single.tier, MatchTier::PartialFirstName);
        assert!(report.clarification.is_none());
    }

    #[tokio::test]
    async fn username_lookup_is_exact() {
        let report =
            lookup(&directory(), "@btaylor", &ResolutionFilters::default()).await.expect("lookup");

        assert_eq!(report.resolution.single().map(|found| found.tier), Some(MatchTier::ExactUsername));
    }
}
