//! VPC peering API implementation

use serde::{Deserialize, Serialize};

use super::common::{collect_all, Links, ListOptions, Meta, Page};
use super::{ApiError, Client};

pub const STATUS_PROVISIONING: &str = "PROVISIONING";
pub const STATUS_UPDATING: &str = "UPDATING";
pub const STATUS_ACTIVE: &str = "ACTIVE";
pub const STATUS_DELETING: &str = "DELETING";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VpcPeering {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub vpc_ids: Vec<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub struct VpcPeeringCreateRequest {
    pub name: String,
    pub vpc_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct VpcPeeringUpdateRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct PeeringRoot {
    vpc_peering: VpcPeering,
}

#[derive(Debug, Deserialize)]
struct PeeringsRoot {
    vpc_peerings: Vec<VpcPeering>,
    #[serde(default)]
    links: Links,
    #[serde(default)]
    meta: Meta,
}

pub struct VpcPeeringsApi<'a> {
    client: &'a Client,
}

impl<'a> VpcPeeringsApi<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// GET /v2/vpc_peerings
    pub async fn list(&self, options: &ListOptions) -> Result<Page<VpcPeering>, ApiError> {
        let root: PeeringsRoot = self
            .client
            .get_with_params("/v2/vpc_peerings", &options.to_query_params())
            .await?;
        Ok(Page {
            items: root.vpc_peerings,
            links: root.links,
            meta: root.meta,
        })
    }

    pub async fn list_all(&self) -> Result<Vec<VpcPeering>, ApiError> {
        collect_all(|options| async move { self.list(&options).await }).await
    }

    /// GET /v2/vpc_peerings/{id}
    pub async fn get(&self, id: &str) -> Result<VpcPeering, ApiError> {
        let root: PeeringRoot = self
            .client
            .get(&format!("/v2/vpc_peerings/{}", id))
            .await?;
        Ok(root.vpc_peering)
    }

    /// POST /v2/vpc_peerings
    pub async fn create(&self, request: &VpcPeeringCreateRequest) -> Result<VpcPeering, ApiError> {
        let root: PeeringRoot = self.client.post("/v2/vpc_peerings", request).await?;
        Ok(root.vpc_peering)
    }

    /// PATCH /v2/vpc_peerings/{id}
    pub async fn update(
        &self,
        id: &str,
        request: &VpcPeeringUpdateRequest,
    ) -> Result<VpcPeering, ApiError> {
        let root: PeeringRoot = self
            .client
            .patch(&format!("/v2/vpc_peerings/{}", id), request)
            .await?;
        Ok(root.vpc_peering)
    }

    /// DELETE /v2/vpc_peerings/{id}; the peering lingers in DELETING for a while
    pub async fn delete(&self, id: &str) -> Result<(), ApiError> {
        self.client
            .delete::<serde_json::Value>(&format!("/v2/vpc_peerings/{}", id))
            .await
            .map(|_| ())
    }
}
