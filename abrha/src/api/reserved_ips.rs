//! Reserved and floating IP API
//!
//! Floating IPs are the older name of reserved IPs; both collections share
//! one shape and differ only in paths and JSON keys.

use serde::{Deserialize, Serialize};

use super::actions::{Action, ActionRoot};
use super::common::Region;
use super::{ApiError, Client};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpFlavor {
    Reserved,
    Floating,
}

impl IpFlavor {
    fn collection(self) -> &'static str {
        match self {
            IpFlavor::Reserved => "reserved_ips",
            IpFlavor::Floating => "floating_ips",
        }
    }

    /// Human readable name used in messages
    pub fn label(self) -> &'static str {
        match self {
            IpFlavor::Reserved => "reserved IP",
            IpFlavor::Floating => "floating IP",
        }
    }

    pub fn urn(self, ip: &str) -> String {
        match self {
            IpFlavor::Reserved => format!("abrha:reservedip:{}", ip),
            IpFlavor::Floating => format!("abrha:floatingip:{}", ip),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VmRef {
    pub id: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReservedIp {
    pub ip: String,
    #[serde(default)]
    pub region: Option<Region>,
    #[serde(default)]
    pub vm: Option<VmRef>,
    #[serde(default)]
    pub locked: bool,
}

impl ReservedIp {
    pub fn region_slug(&self) -> Option<&str> {
        self.region.as_ref().map(|r| r.slug.as_str())
    }

    pub fn vm_id(&self) -> Option<i64> {
        self.vm.as_ref().map(|vm| vm.id)
    }
}

/// Exactly one of `region` and `vm_id` is set
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReservedIpCreateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vm_id: Option<i64>,
}

#[derive(Debug, Serialize)]
struct IpActionRequest {
    #[serde(rename = "type")]
    action_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    vm_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct IpRoot {
    #[serde(alias = "floating_ip")]
    reserved_ip: ReservedIp,
}

pub struct ReservedIpsApi<'a> {
    client: &'a Client,
    flavor: IpFlavor,
}

impl<'a> ReservedIpsApi<'a> {
    pub fn new(client: &'a Client, flavor: IpFlavor) -> Self {
        Self { client, flavor }
    }

    pub fn flavor(&self) -> IpFlavor {
        self.flavor
    }

    fn path(&self, ip: &str) -> String {
        format!("/v2/{}/{}", self.flavor.collection(), ip)
    }

    /// GET /v2/{reserved_ips|floating_ips}/{ip}
    pub async fn get(&self, ip: &str) -> Result<ReservedIp, ApiError> {
        let root: IpRoot = self.client.get(&self.path(ip)).await?;
        Ok(root.reserved_ip)
    }

    /// POST /v2/{reserved_ips|floating_ips}
    pub async fn create(&self, request: &ReservedIpCreateRequest) -> Result<ReservedIp, ApiError> {
        let root: IpRoot = self
            .client
            .post(&format!("/v2/{}", self.flavor.collection()), request)
            .await?;
        Ok(root.reserved_ip)
    }

    /// DELETE /v2/{reserved_ips|floating_ips}/{ip}
    pub async fn delete(&self, ip: &str) -> Result<(), ApiError> {
        self.client.delete::<()>(&self.path(ip)).await
    }

    /// POST /v2/{reserved_ips|floating_ips}/{ip}/actions with type "assign"
    pub async fn assign(&self, ip: &str, vm_id: i64) -> Result<Action, ApiError> {
        self.action(
            ip,
            IpActionRequest {
                action_type: "assign",
                vm_id: Some(vm_id),
            },
        )
        .await
    }

    /// POST /v2/{reserved_ips|floating_ips}/{ip}/actions with type "unassign"
    pub async fn unassign(&self, ip: &str) -> Result<Action, ApiError> {
        self.action(
            ip,
            IpActionRequest {
                action_type: "unassign",
                vm_id: None,
            },
        )
        .await
    }

    async fn action(&self, ip: &str, request: IpActionRequest) -> Result<Action, ApiError> {
        let root: ActionRoot = self
            .client
            .post(&format!("{}/actions", self.path(ip)), &request)
            .await?;
        Ok(root.action)
    }
}
