use std::sync::Arc;

use async_trait::async_trait;
use ferry_workos::{CreateOrganization, Directory};
use tracing::debug;

use super::{RecordProcessor, check_tag};
use crate::{ExportedOrganization, RecordKind, TaskOutcome, TranslationEntry};

/// Migrates organizations, keyed by their source id as the external id.
pub struct OrganizationProcessor {
    directory: Arc<dyn Directory>,
}

impl OrganizationProcessor {
    pub fn new(directory: Arc<dyn Directory>) -> Self {
        Self { directory }
    }
}

#[async_trait]
impl RecordProcessor for OrganizationProcessor {
    type Record = ExportedOrganization;

    const KIND: RecordKind = RecordKind::Organization;

    fn record_id(record: &ExportedOrganization) -> &str {
        &record.id
    }

    async fn process(&self, record: &ExportedOrganization) -> TaskOutcome<TranslationEntry> {
        if let Err(skip) = check_tag(Self::KIND, record.object.as_deref()) {
            return skip;
        }

        let Some(name) = record.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) else {
            return TaskOutcome::skipped("organization has no name");
        };

        let existing = attempt!(
            self.directory
                .find_organization_by_external_id(&record.id)
                .await
        );
        if let Some(org) = existing {
            debug!(source_id = %record.id, destination_id = %org.id, "organization already migrated");
            return TaskOutcome::Success(TranslationEntry::new(&record.id, org.id));
        }

        let request = CreateOrganization {
            name: name.to_string(),
            external_id: Some(record.id.clone()),
        };
        match self.directory.create_organization(&request).await {
            Ok(org) => TaskOutcome::Success(TranslationEntry::new(&record.id, org.id)),
            Err(err) if err.is_conflict() => {
                // Created between our lookup and our create.
                match attempt!(
                    self.directory
                        .find_organization_by_external_id(&record.id)
                        .await
                ) {
                    Some(org) => TaskOutcome::Success(TranslationEntry::new(&record.id, org.id)),
                    None => TaskOutcome::skipped(format!(
                        "destination rejected organization as a duplicate: {}",
                        err
                    )),
                }
            }
            Err(err) => err.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_workos::MemoryDirectory;
    use pretty_assertions::assert_eq;

    fn org(id: &str, name: Option<&str>) -> ExportedOrganization {
        ExportedOrganization {
            object: Some("organization".to_string()),
            id: id.to_string(),
            name: name.map(str::to_string),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_then_rerun_is_idempotent() {
        let directory = Arc::new(MemoryDirectory::new());
        let processor = OrganizationProcessor::new(directory.clone());
        let record = org("org_a", Some("Acme"));

        let first = processor.process(&record).await;
        let second = processor.process(&record).await;

        let (TaskOutcome::Success(first), TaskOutcome::Success(second)) = (first, second) else {
            panic!("expected both runs to succeed");
        };
        assert_eq!(first, second);

        let orgs = directory.organizations().await;
        assert_eq!(orgs.len(), 1);
        assert_eq!(orgs[0].name, "Acme");
        assert_eq!(orgs[0].external_id.as_deref(), Some("org_a"));
    }

    #[tokio::test]
    async fn test_resolves_organization_from_earlier_run() {
        let directory = Arc::new(MemoryDirectory::new());
        let seeded = directory.seed_organization("Acme", Some("org_a")).await;
        let processor = OrganizationProcessor::new(directory.clone());

        match processor.process(&org("org_a", Some("Acme"))).await {
            TaskOutcome::Success(entry) => assert_eq!(entry.destination_id, seeded.id),
            other => panic!("expected success, got {other:?}"),
        }
        assert_eq!(directory.organizations().await.len(), 1);
    }

    #[tokio::test]
    async fn test_skips_nameless_organizations() {
        let directory = Arc::new(MemoryDirectory::new());
        let processor = OrganizationProcessor::new(directory.clone());

        for record in [org("org_a", None), org("org_b", Some("   "))] {
            let outcome = processor.process(&record).await;
            assert!(matches!(outcome, TaskOutcome::SkippedExpected(_)));
        }
        assert_eq!(directory.calls(), 0);
    }

    #[tokio::test]
    async fn test_rate_limited_lookup() {
        let directory = Arc::new(MemoryDirectory::new());
        directory.inject_rate_limits(1, None).await;
        let processor = OrganizationProcessor::new(directory.clone());

        let outcome = processor.process(&org("org_a", Some("Acme"))).await;
        assert!(matches!(outcome, TaskOutcome::RateLimited { retry_after: None }));
    }
}
