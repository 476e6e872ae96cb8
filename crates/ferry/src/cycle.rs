//! Full migration cycle: export a snapshot, then run every job in order.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ferry_clerk::{ClerkClient, SnapshotPaths, export_snapshot};
use ferry_pipeline::{ExecutorConfig, JobReport};
use ferry_workos::Directory;
use miette::Result;
use tracing::info;

use crate::jobs;

/// Where a cycle keeps its snapshot and translation artifacts.
#[derive(Debug, Clone)]
pub struct CycleLayout {
    root: PathBuf,
}

impl CycleLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn snapshot_paths(&self) -> SnapshotPaths {
        SnapshotPaths {
            users: self.snapshot("users"),
            organizations: self.snapshot("organizations"),
            memberships: Some(self.snapshot("memberships")),
        }
    }

    pub fn snapshot(&self, kind: &str) -> PathBuf {
        self.root.join("snapshot").join(format!("{kind}.ndjson"))
    }

    pub fn artifact(&self, kind: &str) -> PathBuf {
        self.root.join("translations").join(format!("{kind}.json"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Reports of the three jobs, in the order they ran.
#[derive(Debug)]
pub struct CycleReport {
    pub users: JobReport,
    pub organizations: JobReport,
    pub memberships: JobReport,
}

/// Run a cycle. With no source client the existing snapshot is reused.
pub async fn run(
    source: Option<&ClerkClient>,
    directory: Arc<dyn Directory>,
    config: ExecutorConfig,
    layout: &CycleLayout,
) -> Result<CycleReport> {
    if let Some(client) = source {
        let counts = export_snapshot(client, &layout.snapshot_paths())
            .await
            .map_err(|e| miette::miette!("snapshot export failed: {}", e))?;
        info!(
            users = counts.users,
            organizations = counts.organizations,
            memberships = counts.memberships,
            "snapshot exported"
        );
    } else {
        info!(root = %layout.root().display(), "reusing existing snapshot");
    }

    let users = jobs::migrate_users(
        Arc::clone(&directory),
        config,
        &layout.snapshot("users"),
        &layout.artifact("users"),
    )
    .await?;

    let organizations = jobs::migrate_organizations(
        Arc::clone(&directory),
        config,
        &layout.snapshot("organizations"),
        &layout.artifact("organizations"),
    )
    .await?;

    let memberships = jobs::migrate_memberships(
        directory,
        config,
        &layout.snapshot("memberships"),
        &layout.artifact("users"),
        &layout.artifact("organizations"),
        &layout.artifact("memberships"),
    )
    .await?;

    Ok(CycleReport {
        users,
        organizations,
        memberships,
    })
}
