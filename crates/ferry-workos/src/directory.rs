//! The destination-directory seam the record processors depend on.

use async_trait::async_trait;

use crate::{
    CreateOrganization, CreateOrganizationMembership, CreateUser, DirectoryError, Organization,
    OrganizationMembership, UpdateUser, User,
};

/// Operations a migration needs from the destination identity platform.
///
/// Every call may fail with [`DirectoryError::RateLimited`]; creation calls
/// fail with [`DirectoryError::Conflict`] when the entity already exists.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Create a user.
    async fn create_user(&self, request: &CreateUser) -> Result<User, DirectoryError>;

    /// List users whose email matches exactly.
    async fn find_users_by_email(&self, email: &str) -> Result<Vec<User>, DirectoryError>;

    /// Update an existing user (used to attach the correlation key).
    async fn update_user(&self, user_id: &str, request: &UpdateUser)
    -> Result<User, DirectoryError>;

    /// Create an organization.
    async fn create_organization(
        &self,
        request: &CreateOrganization,
    ) -> Result<Organization, DirectoryError>;

    /// Fetch an organization by its correlation key, `None` if absent.
    async fn find_organization_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<Organization>, DirectoryError>;

    /// Add a user to an organization.
    async fn create_organization_membership(
        &self,
        request: &CreateOrganizationMembership,
    ) -> Result<OrganizationMembership, DirectoryError>;

    /// List a user's memberships in one organization.
    async fn find_organization_memberships(
        &self,
        user_id: &str,
        organization_id: &str,
    ) -> Result<Vec<OrganizationMembership>, DirectoryError>;
}
