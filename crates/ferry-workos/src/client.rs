//! WorkOS HTTP client implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    CreateOrganization, CreateOrganizationMembership, CreateUser, Directory, DirectoryError,
    ListResponse, Organization, OrganizationMembership, UpdateUser, User,
};

/// Production API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.workos.com";

/// Error codes the API uses for "this already exists".
const CONFLICT_CODES: &[&str] = &[
    "email_not_available",
    "user_already_exists",
    "external_id_conflict",
    "duplicate_external_id",
    "organization_membership_already_exists",
    "organization_already_exists",
];

/// Client for the WorkOS User Management API.
pub struct WorkosClient {
    http: Client,
    api_url: String,
    secret_key: String,
}

impl WorkosClient {
    /// Create a new client for the given API URL and secret key.
    pub fn new(
        api_url: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Result<Self, DirectoryError> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            secret_key: secret_key.into(),
        })
    }

    /// Get the API URL.
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_url, path)
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T, DirectoryError> {
        let response = self
            .http
            .post(self.url(endpoint))
            .bearer_auth(&self.secret_key)
            .json(body)
            .send()
            .await?;
        self.handle_response(endpoint, response).await
    }

    async fn put<B: Serialize, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T, DirectoryError> {
        let response = self
            .http
            .put(self.url(endpoint))
            .bearer_auth(&self.secret_key)
            .json(body)
            .send()
            .await?;
        self.handle_response(endpoint, response).await
    }

    async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, &str)],
    ) -> Result<T, DirectoryError> {
        let response = self
            .http
            .get(self.url(endpoint))
            .bearer_auth(&self.secret_key)
            .query(query)
            .send()
            .await?;
        self.handle_response(endpoint, response).await
    }

    /// Map a response to the body or a classified error.
    async fn handle_response<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        response: reqwest::Response,
    ) -> Result<T, DirectoryError> {
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse().ok());
            return Err(DirectoryError::RateLimited {
                endpoint: Some(endpoint.to_string()),
                retry_after_secs,
            });
        }

        if !status.is_success() {
            let text = response.text().await.map_err(|e| {
                DirectoryError::InvalidResponse(format!(
                    "{} failed ({}): failed to read response: {}",
                    endpoint, status, e
                ))
            })?;
            return Err(classify_error(status, &text));
        }

        let body = response.json().await?;
        Ok(body)
    }
}

/// Error body shapes returned by the API.
#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
    code: Option<String>,
    message: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

fn classify_error(status: StatusCode, text: &str) -> DirectoryError {
    let body: ApiErrorBody = serde_json::from_str(text).unwrap_or_default();
    let code = body.code.or(body.error);
    let message = body
        .message
        .or(body.error_description)
        .unwrap_or_else(|| text.to_string());

    let conflict_code = code
        .as_deref()
        .is_some_and(|c| CONFLICT_CODES.contains(&c));

    if status == StatusCode::CONFLICT || conflict_code {
        return DirectoryError::Conflict { code, message };
    }

    if status == StatusCode::NOT_FOUND {
        return DirectoryError::NotFound(message);
    }

    DirectoryError::Api {
        status: status.as_u16(),
        code,
        message,
    }
}

#[async_trait]
impl Directory for WorkosClient {
    async fn create_user(&self, request: &CreateUser) -> Result<User, DirectoryError> {
        debug!(external_id = ?request.external_id, "creating user");
        self.post("user_management/users", request).await
    }

    async fn find_users_by_email(&self, email: &str) -> Result<Vec<User>, DirectoryError> {
        let response: ListResponse<User> = self
            .get("user_management/users", &[("email", email)])
            .await?;
        Ok(response.data)
    }

    async fn update_user(
        &self,
        user_id: &str,
        request: &UpdateUser,
    ) -> Result<User, DirectoryError> {
        debug!(user_id, external_id = ?request.external_id, "updating user");
        self.put(&format!("user_management/users/{}", user_id), request)
            .await
    }

    async fn create_organization(
        &self,
        request: &CreateOrganization,
    ) -> Result<Organization, DirectoryError> {
        debug!(name = %request.name, external_id = ?request.external_id, "creating organization");
        self.post("organizations", request).await
    }

    async fn find_organization_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<Organization>, DirectoryError> {
        let endpoint = format!("organizations/external_id/{}", external_id);
        match self.get(&endpoint, &[]).await {
            Ok(org) => Ok(Some(org)),
            Err(DirectoryError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn create_organization_membership(
        &self,
        request: &CreateOrganizationMembership,
    ) -> Result<OrganizationMembership, DirectoryError> {
        debug!(
            user_id = %request.user_id,
            organization_id = %request.organization_id,
            role = %request.role_slug,
            "creating organization membership"
        );
        self.post("user_management/organization_memberships", request)
            .await
    }

    async fn find_organization_memberships(
        &self,
        user_id: &str,
        organization_id: &str,
    ) -> Result<Vec<OrganizationMembership>, DirectoryError> {
        let response: ListResponse<OrganizationMembership> = self
            .get(
                "user_management/organization_memberships",
                &[("user_id", user_id), ("organization_id", organization_id)],
            )
            .await?;
        Ok(response.data)
    }
}
