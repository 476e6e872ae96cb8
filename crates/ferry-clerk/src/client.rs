//! Clerk HTTP client implementation.

use std::time::Duration;

use backoff::ExponentialBackoff;
use backoff::backoff::Backoff;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::ClerkError;

/// Production API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.clerk.com/v1";

/// Records requested per page (the API maximum).
pub const PAGE_SIZE: usize = 500;

/// List endpoints answer either with a bare array or a `data` envelope.
#[derive(Deserialize)]
#[serde(untagged)]
enum Page {
    List(Vec<serde_json::Value>),
    Envelope { data: Vec<serde_json::Value> },
}

impl Page {
    fn into_records(self) -> Vec<serde_json::Value> {
        match self {
            Page::List(records) => records,
            Page::Envelope { data } => data,
        }
    }
}

/// Client for the Clerk backend API.
pub struct ClerkClient {
    http: Client,
    api_url: String,
    secret_key: String,
    initial_retry_interval: Duration,
}

impl ClerkClient {
    /// Create a new client for the given API URL and secret key.
    pub fn new(
        api_url: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Result<Self, ClerkError> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            http,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            secret_key: secret_key.into(),
            initial_retry_interval: Duration::from_millis(500),
        })
    }

    /// Override the first retry delay for transient failures.
    pub fn with_initial_retry_interval(mut self, interval: Duration) -> Self {
        self.initial_retry_interval = interval;
        self
    }

    /// List all users.
    pub async fn list_users(&self) -> Result<Vec<serde_json::Value>, ClerkError> {
        self.list_all("users").await
    }

    /// List all organizations.
    pub async fn list_organizations(&self) -> Result<Vec<serde_json::Value>, ClerkError> {
        self.list_all("organizations").await
    }

    /// List all memberships of one organization.
    pub async fn list_organization_memberships(
        &self,
        organization_id: &str,
    ) -> Result<Vec<serde_json::Value>, ClerkError> {
        self.list_all(&format!("organizations/{}/memberships", organization_id))
            .await
    }

    /// List every record of an endpoint (handles pagination).
    async fn list_all(&self, endpoint: &str) -> Result<Vec<serde_json::Value>, ClerkError> {
        let mut all_records = Vec::new();
        let mut offset = 0;

        loop {
            let page = self.get_page_with_retry(endpoint, offset).await?;
            let count = page.len();
            all_records.extend(page);

            if count < PAGE_SIZE {
                break;
            }
            offset += count;
        }

        debug!(endpoint, count = all_records.len(), "listed records");
        Ok(all_records)
    }

    async fn get_page_with_retry(
        &self,
        endpoint: &str,
        offset: usize,
    ) -> Result<Vec<serde_json::Value>, ClerkError> {
        let mut backoff = ExponentialBackoff {
            initial_interval: self.initial_retry_interval,
            max_interval: Duration::from_secs(30),
            max_elapsed_time: Some(Duration::from_secs(300)),
            ..Default::default()
        };

        loop {
            match self.get_page(endpoint, offset).await {
                Ok(records) => return Ok(records),
                Err(e) if e.is_transient() => {
                    let Some(mut wait) = backoff.next_backoff() else {
                        return Err(e);
                    };
                    if let ClerkError::RateLimited {
                        retry_after_secs: Some(secs),
                        ..
                    } = &e
                    {
                        wait = wait.max(Duration::from_secs(*secs));
                    }
                    warn!(
                        endpoint,
                        offset,
                        wait = ?wait,
                        error = %e,
                        "transient error listing records, retrying"
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn get_page(
        &self,
        endpoint: &str,
        offset: usize,
    ) -> Result<Vec<serde_json::Value>, ClerkError> {
        let url = format!("{}/{}", self.api_url, endpoint);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.secret_key)
            .query(&[
                ("limit", PAGE_SIZE.to_string()),
                ("offset", offset.to_string()),
            ])
            .send()
            .await?;

        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse().ok());
            return Err(ClerkError::RateLimited {
                endpoint: endpoint.to_string(),
                retry_after_secs,
            });
        }

        if !status.is_success() {
            let message = response.text().await.map_err(|e| {
                ClerkError::InvalidResponse(format!(
                    "{} failed ({}): failed to read response: {}",
                    endpoint, status, e
                ))
            })?;
            return Err(ClerkError::Api {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                message,
            });
        }

        let page: Page = response.json().await?;
        Ok(page.into_records())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn users(range: std::ops::Range<usize>) -> serde_json::Value {
        serde_json::Value::Array(
            range
                .map(|i| serde_json::json!({ "object": "user", "id": format!("user_{i}") }))
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_list_users_follows_pages() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/users"))
            .and(header("Authorization", "Bearer sk_clerk"))
            .and(query_param("offset", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(users(0..PAGE_SIZE)))
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/users"))
            .and(query_param("offset", PAGE_SIZE.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_json(users(PAGE_SIZE..PAGE_SIZE + 3)))
            .mount(&mock_server)
            .await;

        let client = ClerkClient::new(mock_server.uri(), "sk_clerk").unwrap();
        let all = client.list_users().await.unwrap();

        assert_eq!(all.len(), PAGE_SIZE + 3);
        assert_eq!(all[PAGE_SIZE]["id"], "user_500");
    }

    #[tokio::test]
    async fn test_list_organizations_unwraps_envelope() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/organizations"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [
                    { "object": "organization", "id": "org_1", "name": "Acme" }
                ],
                "total_count": 1
            })))
            .mount(&mock_server)
            .await;

        let client = ClerkClient::new(mock_server.uri(), "sk_clerk").unwrap();
        let orgs = client.list_organizations().await.unwrap();

        assert_eq!(orgs.len(), 1);
        assert_eq!(orgs[0]["name"], "Acme");
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/organizations/org_1/memberships"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/organizations/org_1/memberships"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [ { "object": "organization_membership", "id": "orgmem_1" } ],
                "total_count": 1
            })))
            .with_priority(2)
            .mount(&mock_server)
            .await;

        let client = ClerkClient::new(mock_server.uri(), "sk_clerk")
            .unwrap()
            .with_initial_retry_interval(Duration::from_millis(1));
        let memberships = client.list_organization_memberships("org_1").await.unwrap();

        assert_eq!(memberships.len(), 1);
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/users"))
            .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = ClerkClient::new(mock_server.uri(), "sk_bad").unwrap();
        let err = client.list_users().await.unwrap_err();

        assert!(matches!(err, ClerkError::Api { status: 401, .. }));
    }
}
