use std::sync::Arc;

use async_trait::async_trait;
use ferry_workos::{CreateOrganizationMembership, Directory};
use tracing::{debug, warn};

use super::{RecordProcessor, check_tag};
use crate::{ExportedMembership, RecordKind, TaskOutcome, TranslationEntry, TranslationTable};

/// Destination role for source roles with no mapping.
pub const DEFAULT_ROLE: &str = "member";

/// Source role to destination role slug.
const ROLE_MAP: &[(&str, &str)] = &[
    ("org:admin", "admin"),
    ("org:member", "member"),
    ("org:guest", "guest"),
    ("basic_member", "member"),
    ("admin", "admin"),
    ("member", "member"),
    ("guest", "guest"),
];

/// Translate a source role, falling back to [`DEFAULT_ROLE`].
pub fn map_role(role: Option<&str>) -> &'static str {
    let Some(role) = role else {
        return DEFAULT_ROLE;
    };

    match ROLE_MAP.iter().find(|(source, _)| *source == role) {
        Some((_, destination)) => *destination,
        None => {
            warn!(role, fallback = DEFAULT_ROLE, "unmapped role");
            DEFAULT_ROLE
        }
    }
}

/// Migrates organization memberships.
///
/// Both the user and the organization must have been migrated by earlier
/// jobs; their translation tables resolve the destination ids.
pub struct MembershipProcessor {
    directory: Arc<dyn Directory>,
    users: Arc<TranslationTable>,
    organizations: Arc<TranslationTable>,
}

impl MembershipProcessor {
    pub fn new(
        directory: Arc<dyn Directory>,
        users: Arc<TranslationTable>,
        organizations: Arc<TranslationTable>,
    ) -> Self {
        Self {
            directory,
            users,
            organizations,
        }
    }
}

#[async_trait]
impl RecordProcessor for MembershipProcessor {
    type Record = ExportedMembership;

    const KIND: RecordKind = RecordKind::OrganizationMembership;

    fn record_id(record: &ExportedMembership) -> &str {
        &record.id
    }

    async fn process(&self, record: &ExportedMembership) -> TaskOutcome<TranslationEntry> {
        if let Err(skip) = check_tag(Self::KIND, record.object.as_deref()) {
            return skip;
        }

        let Some(user) = &record.public_user_data else {
            return TaskOutcome::skipped("membership has no user");
        };
        let Some(organization) = &record.organization else {
            return TaskOutcome::skipped("membership has no organization");
        };

        let Some(user_id) = self.users.lookup(&user.user_id) else {
            return TaskOutcome::skipped(format!("user {} was not migrated", user.user_id));
        };
        let Some(organization_id) = self.organizations.lookup(&organization.id) else {
            return TaskOutcome::skipped(format!(
                "organization {} was not migrated",
                organization.id
            ));
        };

        let request = CreateOrganizationMembership {
            user_id: user_id.to_string(),
            organization_id: organization_id.to_string(),
            role_slug: map_role(record.role.as_deref()).to_string(),
        };

        match self.directory.create_organization_membership(&request).await {
            Ok(membership) => {
                debug!(
                    source_id = %record.id,
                    destination_id = %membership.id,
                    role = %request.role_slug,
                    "created membership"
                );
                TaskOutcome::Success(TranslationEntry::new(&record.id, membership.id))
            }
            Err(err) if err.is_conflict() => {
                let existing = attempt!(
                    self.directory
                        .find_organization_memberships(user_id, organization_id)
                        .await
                );
                match existing.as_slice() {
                    [membership] => {
                        debug!(
                            source_id = %record.id,
                            destination_id = %membership.id,
                            "membership already exists"
                        );
                        TaskOutcome::Success(TranslationEntry::new(&record.id, &membership.id))
                    }
                    _ => TaskOutcome::skipped(format!(
                        "user {} is already a member of {}",
                        user.user_id, organization.id
                    )),
                }
            }
            Err(err) => err.into(),
        }
    }
}
