//! Identity service client for resolving audit actors to display names

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::join_ids;
use crate::config::ServiceEndpoint;
use crate::error::{AppError, AppResult};

/// Display data for a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    pub full_name: Option<String>,
    pub role: Option<String>,
}

/// Batch user lookup
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    /// Profiles for the given ids; unknown ids are simply absent
    async fn users_by_ids(&self, ids: &[i64]) -> AppResult<HashMap<i64, UserProfile>>;
}

/// Identity API client
#[derive(Clone)]
pub struct IdentityClient {
    client: Client,
    base_url: String,
}

impl IdentityClient {
    pub fn new(endpoint: &ServiceEndpoint) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(endpoint.timeout_secs.max(1)))
            .build()
            .map_err(|e| AppError::Configuration(format!("Identity client: {}", e)))?;

        Ok(Self {
            client,
            base_url: endpoint.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl IdentityDirectory for IdentityClient {
    async fn users_by_ids(&self, ids: &[i64]) -> AppResult<HashMap<i64, UserProfile>> {
        if ids.is_empty() || self.base_url.is_empty() {
            return Ok(HashMap::new());
        }

        let url = format!("{}/api/v1/users?ids={}", self.base_url, join_ids(ids));

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AppError::ExternalService(format!("Identity request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalService(format!(
                "Identity API error: {} - {}",
                status, body
            )));
        }

        let users: Vec<UserProfile> = response.json().await.map_err(|e| {
            AppError::ExternalService(format!("Failed to parse identity response: {}", e))
        })?;

        Ok(users.into_iter().map(|u| (u.id, u)).collect())
    }
}
