//! Container registry API implementation
//!
//! An account owns at most one registry, so every path is a singleton.

use serde::{Deserialize, Serialize};

use super::common::ApiQueryParams;
use super::{ApiError, Client};

pub const REGISTRY_SERVER: &str = "registry.abrha.net";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Registry {
    pub name: String,
    #[serde(default)]
    pub storage_usage_bytes: u64,
    #[serde(default)]
    pub storage_usage_bytes_updated_at: Option<String>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub region: String,
}

impl Registry {
    pub fn endpoint(&self) -> String {
        format!("{}/{}", REGISTRY_SERVER, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SubscriptionTier {
    pub slug: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Subscription {
    pub tier: SubscriptionTier,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

/// Request body for POST /v2/registry
#[derive(Debug, Serialize)]
pub struct RegistryCreateRequest {
    pub name: String,
    pub subscription_tier_slug: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

#[derive(Debug, Serialize)]
struct SubscriptionUpdateRequest<'a> {
    tier_slug: &'a str,
}

#[derive(Debug, Deserialize)]
struct RegistryRoot {
    registry: Registry,
}

#[derive(Debug, Deserialize)]
struct SubscriptionRoot {
    subscription: Subscription,
}

pub struct RegistryApi<'a> {
    client: &'a Client,
}

impl<'a> RegistryApi<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// GET /v2/registry
    pub async fn get(&self) -> Result<Registry, ApiError> {
        let root: RegistryRoot = self.client.get("/v2/registry").await?;
        Ok(root.registry)
    }

    /// POST /v2/registry
    pub async fn create(&self, request: &RegistryCreateRequest) -> Result<Registry, ApiError> {
        let root: RegistryRoot = self.client.post("/v2/registry", request).await?;
        Ok(root.registry)
    }

    /// DELETE /v2/registry
    pub async fn delete(&self) -> Result<(), ApiError> {
        self.client.delete::<()>("/v2/registry").await
    }

    /// GET /v2/registry/subscription
    pub async fn subscription(&self) -> Result<Subscription, ApiError> {
        let root: SubscriptionRoot = self.client.get("/v2/registry/subscription").await?;
        Ok(root.subscription)
    }

    /// POST /v2/registry/subscription
    pub async fn update_subscription(&self, tier_slug: &str) -> Result<Subscription, ApiError> {
        let root: SubscriptionRoot = self
            .client
            .post(
                "/v2/registry/subscription",
                &SubscriptionUpdateRequest { tier_slug },
            )
            .await?;
        Ok(root.subscription)
    }

    /// GET /v2/registry/docker-credentials
    ///
    /// Returns the Docker `config.json` document as issued by the API.
    pub async fn docker_credentials(
        &self,
        read_write: bool,
        expiry_seconds: Option<i64>,
    ) -> Result<String, ApiError> {
        let params = ApiQueryParams::new()
            .add("read_write", read_write)
            .add_optional("expiry_seconds", expiry_seconds.filter(|s| *s > 0));
        let document: serde_json::Value = self
            .client
            .get_with_params("/v2/registry/docker-credentials", &params)
            .await?;
        serde_json::to_string(&document)
            .map_err(|e| ApiError::ParseError(format!("Failed to encode credentials: {}", e)))
    }
}
