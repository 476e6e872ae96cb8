//! Single-kind migration jobs.

use std::path::Path;
use std::sync::Arc;

use ferry_pipeline::{
    ExecutorConfig, JobReport, MembershipProcessor, OrganizationProcessor, RecordKind,
    TranslationTable, UserProcessor, run_job,
};
use ferry_workos::{Directory, MemoryDirectory, WorkosClient};
use miette::Result;
use tracing::info;

/// Pick the destination: the live API, or an in-memory directory for dry runs.
pub fn directory(api_url: &str, secret_key: Option<&str>, dry_run: bool) -> Result<Arc<dyn Directory>> {
    if dry_run {
        info!("dry run: writing to an in-memory directory");
        return Ok(Arc::new(MemoryDirectory::new()));
    }

    let secret_key = secret_key
        .filter(|k| !k.is_empty())
        .ok_or_else(|| miette::miette!("WORKOS_SECRET_KEY is required unless --dry-run is set"))?;
    let client = WorkosClient::new(api_url, secret_key)
        .map_err(|e| miette::miette!("failed to create WorkOS client: {}", e))?;
    info!(api_url = client.api_url(), "using WorkOS API");
    Ok(Arc::new(client))
}

pub async fn migrate_users(
    directory: Arc<dyn Directory>,
    config: ExecutorConfig,
    input: &Path,
    output: &Path,
) -> Result<JobReport> {
    run_job(UserProcessor::new(directory), config, input, output)
        .await
        .map_err(|e| miette::miette!("{}", e))
}

pub async fn migrate_organizations(
    directory: Arc<dyn Directory>,
    config: ExecutorConfig,
    input: &Path,
    output: &Path,
) -> Result<JobReport> {
    run_job(OrganizationProcessor::new(directory), config, input, output)
        .await
        .map_err(|e| miette::miette!("{}", e))
}

/// Migrate memberships, resolving users and organizations through the
/// artifacts their jobs wrote.
pub async fn migrate_memberships(
    directory: Arc<dyn Directory>,
    config: ExecutorConfig,
    input: &Path,
    users_artifact: &Path,
    organizations_artifact: &Path,
    output: &Path,
) -> Result<JobReport> {
    let users = TranslationTable::load(RecordKind::User, users_artifact)
        .await
        .map_err(|e| miette::miette!("{}", e))?;
    let organizations = TranslationTable::load(RecordKind::Organization, organizations_artifact)
        .await
        .map_err(|e| miette::miette!("{}", e))?;

    let processor = MembershipProcessor::new(directory, Arc::new(users), Arc::new(organizations));
    run_job(processor, config, input, output)
        .await
        .map_err(|e| miette::miette!("{}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_live_directory_needs_a_key() {
        assert!(directory("https://api.workos.com", None, false).is_err());
        assert!(directory("https://api.workos.com", Some(""), false).is_err());
        assert!(directory("https://api.workos.com", Some("sk_test"), false).is_ok());
        assert!(directory("https://api.workos.com", None, true).is_ok());
    }

    #[tokio::test]
    async fn test_missing_artifact_stops_membership_job() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("memberships.ndjson");
        std::fs::write(&input, "").unwrap();

        let result = migrate_memberships(
            Arc::new(MemoryDirectory::new()),
            ExecutorConfig::default(),
            &input,
            &dir.path().join("users.json"),
            &dir.path().join("organizations.json"),
            &dir.path().join("memberships.json"),
        )
        .await;

        assert!(result.is_err());
        assert!(!dir.path().join("memberships.json").exists());
    }
}
