//! Writing a source snapshot as newline-delimited JSON.

use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::{ClerkClient, ClerkError};

/// Where each kind of record is written.
#[derive(Debug, Clone)]
pub struct SnapshotPaths {
    pub users: PathBuf,
    pub organizations: PathBuf,
    /// Memberships are only exported when set.
    pub memberships: Option<PathBuf>,
}

/// Number of records written per kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapshotCounts {
    pub users: usize,
    pub organizations: usize,
    pub memberships: usize,
}

/// Export users, organizations and (optionally) memberships to NDJSON files.
#[tracing::instrument(skip(client))]
pub async fn export_snapshot(
    client: &ClerkClient,
    paths: &SnapshotPaths,
) -> Result<SnapshotCounts, ClerkError> {
    let users = client.list_users().await?;
    write_ndjson(&paths.users, &users).await?;
    info!(count = users.len(), path = %paths.users.display(), "exported users");

    let organizations = client.list_organizations().await?;
    write_ndjson(&paths.organizations, &organizations).await?;
    info!(
        count = organizations.len(),
        path = %paths.organizations.display(),
        "exported organizations"
    );

    let mut membership_count = 0;
    if let Some(memberships_path) = &paths.memberships {
        let mut memberships = Vec::new();
        for org in &organizations {
            let Some(org_id) = org.get("id").and_then(|v| v.as_str()) else {
                continue;
            };
            memberships.extend(client.list_organization_memberships(org_id).await?);
        }
        write_ndjson(memberships_path, &memberships).await?;
        info!(
            count = memberships.len(),
            path = %memberships_path.display(),
            "exported organization memberships"
        );
        membership_count = memberships.len();
    }

    Ok(SnapshotCounts {
        users: users.len(),
        organizations: organizations.len(),
        memberships: membership_count,
    })
}

/// Write one JSON document per line.
pub async fn write_ndjson(path: &Path, records: &[serde_json::Value]) -> Result<(), ClerkError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }

    let file = tokio::fs::File::create(path).await?;
    let mut writer = tokio::io::BufWriter::new(file);
    for record in records {
        let line = serde_json::to_string(record)?;
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
    }
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_write_ndjson_one_record_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/users.ndjson");

        write_ndjson(
            &path,
            &[
                serde_json::json!({ "id": "user_1" }),
                serde_json::json!({ "id": "user_2" }),
            ],
        )
        .await
        .unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "{\"id\":\"user_1\"}\n{\"id\":\"user_2\"}\n");
    }

    #[tokio::test]
    async fn test_export_snapshot_with_memberships() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/users"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "object": "user", "id": "user_1" }
            ])))
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/organizations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [
                    { "object": "organization", "id": "org_1", "name": "Acme" },
                    { "object": "organization", "id": "org_2", "name": "Globex" }
                ],
                "total_count": 2
            })))
            .mount(&mock_server)
            .await;

        for org in ["org_1", "org_2"] {
            Mock::given(method("GET"))
                .and(path(format!("/organizations/{org}/memberships")))
                .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "data": [ { "object": "organization_membership", "id": format!("mem_{org}") } ],
                    "total_count": 1
                })))
                .mount(&mock_server)
                .await;
        }

        let dir = tempfile::tempdir().unwrap();
        let paths = SnapshotPaths {
            users: dir.path().join("users.ndjson"),
            organizations: dir.path().join("organizations.ndjson"),
            memberships: Some(dir.path().join("memberships.ndjson")),
        };

        let client = ClerkClient::new(mock_server.uri(), "sk_clerk").unwrap();
        let counts = export_snapshot(&client, &paths).await.unwrap();

        assert_eq!(
            counts,
            SnapshotCounts {
                users: 1,
                organizations: 2,
                memberships: 2,
            }
        );
        let memberships = std::fs::read_to_string(paths.memberships.unwrap()).unwrap();
        assert_eq!(memberships.lines().count(), 2);
    }
}
