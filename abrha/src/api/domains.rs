//! DNS domain API implementation

use serde::{Deserialize, Serialize};

use super::common::{collect_all, Links, ListOptions, Meta, Page};
use super::{ApiError, Client};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Domain {
    pub name: String,
    #[serde(default)]
    pub ttl: i64,
    #[serde(default)]
    pub zone_file: String,
}

impl Domain {
    pub fn urn(&self) -> String {
        format!("abrha:domain:{}", self.name)
    }
}

/// Request body for POST /v2/domains
#[derive(Debug, Serialize)]
pub struct DomainCreateRequest {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DomainRoot {
    domain: Domain,
}

#[derive(Debug, Deserialize)]
struct DomainsRoot {
    domains: Vec<Domain>,
    #[serde(default)]
    links: Links,
    #[serde(default)]
    meta: Meta,
}

pub struct DomainsApi<'a> {
    client: &'a Client,
}

impl<'a> DomainsApi<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// GET /v2/domains
    pub async fn list(&self, options: &ListOptions) -> Result<Page<Domain>, ApiError> {
        let root: DomainsRoot = self
            .client
            .get_with_params("/v2/domains", &options.to_query_params())
            .await?;
        Ok(Page {
            items: root.domains,
            links: root.links,
            meta: root.meta,
        })
    }

    pub async fn list_all(&self) -> Result<Vec<Domain>, ApiError> {
        collect_all(|options| async move { self.list(&options).await }).await
    }

    /// GET /v2/domains/{name}
    pub async fn get(&self, name: &str) -> Result<Domain, ApiError> {
        let root: DomainRoot = self
            .client
            .get(&format!("/v2/domains/{}", urlencoding::encode(name)))
            .await?;
        Ok(root.domain)
    }

    /// POST /v2/domains
    pub async fn create(&self, request: &DomainCreateRequest) -> Result<Domain, ApiError> {
        let root: DomainRoot = self.client.post("/v2/domains", request).await?;
        Ok(root.domain)
    }

    /// DELETE /v2/domains/{name}
    pub async fn delete(&self, name: &str) -> Result<(), ApiError> {
        self.client
            .delete::<()>(&format!("/v2/domains/{}", urlencoding::encode(name)))
            .await
    }
}
