//! Master data client for supplier and customer display details

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use shared::CounterpartyRole;

use super::join_ids;
use crate::config::ServiceEndpoint;
use crate::error::{AppError, AppResult};

/// Supplier or customer as known to master data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyProfile {
    pub id: i64,
    pub name: Option<String>,
    pub code: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

/// Batch counterparty lookup
#[async_trait]
pub trait PartyDirectory: Send + Sync {
    async fn parties_by_ids(
        &self,
        role: CounterpartyRole,
        ids: &[i64],
    ) -> AppResult<HashMap<i64, PartyProfile>>;
}

/// Master data API client
#[derive(Clone)]
pub struct MasterDataClient {
    client: Client,
    base_url: String,
}

impl MasterDataClient {
    pub fn new(endpoint: &ServiceEndpoint) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(endpoint.timeout_secs.max(1)))
            .build()
            .map_err(|e| AppError::Configuration(format!("Master data client: {}", e)))?;

        Ok(Self {
            client,
            base_url: endpoint.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn collection(role: CounterpartyRole) -> &'static str {
        match role {
            CounterpartyRole::Supplier => "suppliers",
            CounterpartyRole::Customer => "customers",
        }
    }
}

#[async_trait]
impl PartyDirectory for MasterDataClient {
    async fn parties_by_ids(
        &self,
        role: CounterpartyRole,
        ids: &[i64],
    ) -> AppResult<HashMap<i64, PartyProfile>> {
        if ids.is_empty() || self.base_url.is_empty() {
            return Ok(HashMap::new());
        }

        let url = format!(
            "{}/api/v1/{}?ids={}",
            self.base_url,
            Self::collection(role),
            join_ids(ids)
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AppError::ExternalService(format!("Master data request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalService(format!(
                "Master data API error ({}): {} - {}",
                role.as_str(),
                status,
                body
            )));
        }

        let parties: Vec<PartyProfile> = response.json().await.map_err(|e| {
            AppError::ExternalService(format!("Failed to parse {} response: {}", role.as_str(), e))
        })?;

        Ok(parties.into_iter().map(|p| (p.id, p)).collect())
    }
}
