//! In-process directory with the destination's conflict semantics.
//!
//! Backs `--dry-run` and the pipeline tests. Rate-limit responses can be
//! injected to exercise the executor's backoff path.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::{
    CreateOrganization, CreateOrganizationMembership, CreateUser, Directory, DirectoryError,
    Organization, OrganizationMembership, RoleRef, UpdateUser, User,
};

#[derive(Default)]
struct MemoryState {
    users: Vec<User>,
    organizations: Vec<Organization>,
    memberships: Vec<OrganizationMembership>,
    next_id: u64,
}

impl MemoryState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}_{:08}", prefix, self.next_id)
    }
}

/// A [`Directory`] that keeps everything in memory.
#[derive(Default)]
pub struct MemoryDirectory {
    state: Mutex<MemoryState>,
    rate_limits: Mutex<VecDeque<Option<u64>>>,
    latency: Option<Duration>,
    calls: AtomicUsize,
}

impl MemoryDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency` before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make the next `count` calls fail with a rate-limit error.
    pub async fn inject_rate_limits(&self, count: usize, retry_after_secs: Option<u64>) {
        let mut queue = self.rate_limits.lock().await;
        queue.extend(std::iter::repeat_n(retry_after_secs, count));
    }

    /// Total number of calls answered, including rate-limited ones.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Snapshot of all users.
    pub async fn users(&self) -> Vec<User> {
        self.state.lock().await.users.clone()
    }

    /// Snapshot of all organizations.
    pub async fn organizations(&self) -> Vec<Organization> {
        self.state.lock().await.organizations.clone()
    }

    /// Snapshot of all memberships.
    pub async fn memberships(&self) -> Vec<OrganizationMembership> {
        self.state.lock().await.memberships.clone()
    }

    /// Insert a pre-existing user, as if created by an earlier run.
    pub async fn seed_user(&self, email: &str, external_id: Option<&str>) -> User {
        let mut state = self.state.lock().await;
        let user = User {
            id: state.next_id("user"),
            email: email.to_string(),
            first_name: None,
            last_name: None,
            email_verified: true,
            external_id: external_id.map(str::to_string),
            created_at: None,
            updated_at: None,
        };
        state.users.push(user.clone());
        user
    }

    /// Insert a pre-existing organization.
    pub async fn seed_organization(&self, name: &str, external_id: Option<&str>) -> Organization {
        let mut state = self.state.lock().await;
        let org = Organization {
            id: state.next_id("org"),
            name: name.to_string(),
            external_id: external_id.map(str::to_string),
            created_at: None,
            updated_at: None,
        };
        state.organizations.push(org.clone());
        org
    }

    async fn begin_call(&self, endpoint: &str) -> Result<(), DirectoryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(retry_after_secs) = self.rate_limits.lock().await.pop_front() {
            debug!(endpoint, "injected rate limit");
            return Err(DirectoryError::RateLimited {
                endpoint: Some(endpoint.to_string()),
                retry_after_secs,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Directory for MemoryDirectory {
    async fn create_user(&self, request: &CreateUser) -> Result<User, DirectoryError> {
        self.begin_call("user_management/users").await?;
        let mut state = self.state.lock().await;
        if state
            .users
            .iter()
            .any(|u| u.email.eq_ignore_ascii_case(&request.email))
        {
            return Err(DirectoryError::Conflict {
                code: Some("email_not_available".to_string()),
                message: format!("email {} is not available", request.email),
            });
        }
        let user = User {
            id: state.next_id("user"),
            email: request.email.clone(),
            first_name: request.first_name.clone(),
            last_name: request.last_name.clone(),
            email_verified: request.email_verified.unwrap_or(false),
            external_id: request.external_id.clone(),
            created_at: None,
            updated_at: None,
        };
        state.users.push(user.clone());
        Ok(user)
    }

    async fn find_users_by_email(&self, email: &str) -> Result<Vec<User>, DirectoryError> {
        self.begin_call("user_management/users").await?;
        let state = self.state.lock().await;
        Ok(state
            .users
            .iter()
            .filter(|u| u.email.eq_ignore_ascii_case(email))
            .cloned()
            .collect())
    }

    async fn update_user(
        &self,
        user_id: &str,
        request: &UpdateUser,
    ) -> Result<User, DirectoryError> {
        self.begin_call("user_management/users/{id}").await?;
        let mut state = self.state.lock().await;
        let user = state
            .users
            .iter_mut()
            .find(|u| u.id == user_id)
            .ok_or_else(|| DirectoryError::NotFound(format!("user {}", user_id)))?;
        if let Some(external_id) = &request.external_id {
            user.external_id = Some(external_id.clone());
        }
        if let Some(first_name) = &request.first_name {
            user.first_name = Some(first_name.clone());
        }
        if let Some(last_name) = &request.last_name {
            user.last_name = Some(last_name.clone());
        }
        Ok(user.clone())
    }

    async fn create_organization(
        &self,
        request: &CreateOrganization,
    ) -> Result<Organization, DirectoryError> {
        self.begin_call("organizations").await?;
        let mut state = self.state.lock().await;
        if let Some(external_id) = &request.external_id
            && state
                .organizations
                .iter()
                .any(|o| o.external_id.as_ref() == Some(external_id))
        {
            return Err(DirectoryError::Conflict {
                code: Some("external_id_conflict".to_string()),
                message: format!("external id {} is already in use", external_id),
            });
        }
        let org = Organization {
            id: state.next_id("org"),
            name: request.name.clone(),
            external_id: request.external_id.clone(),
            created_at: None,
            updated_at: None,
        };
        state.organizations.push(org.clone());
        Ok(org)
    }

    async fn find_organization_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<Organization>, DirectoryError> {
        self.begin_call("organizations/external_id/{id}").await?;
        let state = self.state.lock().await;
        Ok(state
            .organizations
            .iter()
            .find(|o| o.external_id.as_deref() == Some(external_id))
            .cloned())
    }

    async fn create_organization_membership(
        &self,
        request: &CreateOrganizationMembership,
    ) -> Result<OrganizationMembership, DirectoryError> {
        self.begin_call("user_management/organization_memberships")
            .await?;
        let mut state = self.state.lock().await;
        if !state.users.iter().any(|u| u.id == request.user_id) {
            return Err(DirectoryError::NotFound(format!(
                "user {}",
                request.user_id
            )));
        }
        if !state
            .organizations
            .iter()
            .any(|o| o.id == request.organization_id)
        {
            return Err(DirectoryError::NotFound(format!(
                "organization {}",
                request.organization_id
            )));
        }
        if state.memberships.iter().any(|m| {
            m.user_id == request.user_id && m.organization_id == request.organization_id
        }) {
            return Err(DirectoryError::Conflict {
                code: Some("organization_membership_already_exists".to_string()),
                message: format!(
                    "user {} is already a member of {}",
                    request.user_id, request.organization_id
                ),
            });
        }
        let membership = OrganizationMembership {
            id: state.next_id("om"),
            user_id: request.user_id.clone(),
            organization_id: request.organization_id.clone(),
            role: Some(RoleRef {
                slug: request.role_slug.clone(),
            }),
            status: Some("active".to_string()),
        };
        state.memberships.push(membership.clone());
        Ok(membership)
    }

    async fn find_organization_memberships(
        &self,
        user_id: &str,
        organization_id: &str,
    ) -> Result<Vec<OrganizationMembership>, DirectoryError> {
        self.begin_call("user_management/organization_memberships")
            .await?;
        let state = self.state.lock().await;
        Ok(state
            .memberships
            .iter()
            .filter(|m| m.user_id == user_id && m.organization_id == organization_id)
            .cloned()
            .collect())
    }
}
