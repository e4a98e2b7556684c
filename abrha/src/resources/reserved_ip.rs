//! Reserved IP resource, and its legacy floating IP twin

use async_trait::async_trait;
use std::marker::PhantomData;
use tfplug::context::Context;
use tfplug::import::{import_failed, imported};
use tfplug::plan_modifier::{RequiresReplace, UseStateForUnknown};
use tfplug::resource::{
    ConfigureResourceRequest, ConfigureResourceResponse, CreateResourceRequest,
    CreateResourceResponse, DeleteResourceRequest, DeleteResourceResponse,
    ImportResourceStateRequest, ImportResourceStateResponse, ReadResourceRequest,
    ReadResourceResponse, Resource, ResourceMetadataRequest, ResourceMetadataResponse,
    ResourceSchemaRequest, ResourceSchemaResponse, ResourceWithConfigure,
    ResourceWithImportState, UpdateResourceRequest, UpdateResourceResponse,
    ValidateResourceConfigRequest, ValidateResourceConfigResponse,
};
use tfplug::schema::{AttributeBuilder, AttributeType, SchemaBuilder};
use tfplug::types::{AttributePath, Diagnostic, Dynamic, DynamicValue};
use tfplug::validator::{IsIpAddress, IsWholeNumber, NumberBetween};

use super::{not_configured, provider_data_from, required_string, state_of};
use crate::api::reserved_ips::{IpFlavor, ReservedIp, ReservedIpCreateRequest};
use crate::AbrhaProviderData;

/// Selects the API collection and Terraform type names of an IP resource
pub trait IpKind: Send + Sync + 'static {
    const FLAVOR: IpFlavor;
    const TYPE_NAME: &'static str;
    const ASSIGNMENT_TYPE_NAME: &'static str;
}

pub struct Reserved;

impl IpKind for Reserved {
    const FLAVOR: IpFlavor = IpFlavor::Reserved;
    const TYPE_NAME: &'static str = "abrha_reserved_ip";
    const ASSIGNMENT_TYPE_NAME: &'static str = "abrha_reserved_ip_assignment";
}

pub struct Floating;

impl IpKind for Floating {
    const FLAVOR: IpFlavor = IpFlavor::Floating;
    const TYPE_NAME: &'static str = "abrha_floating_ip";
    const ASSIGNMENT_TYPE_NAME: &'static str = "abrha_floating_ip_assignment";
}

/// Assigns `ip` to `vm_id` and waits for the action to complete
pub(crate) async fn assign_ip(
    ctx: &Context,
    provider_data: &AbrhaProviderData,
    flavor: IpFlavor,
    ip: &str,
    vm_id: i64,
) -> Result<(), Diagnostic> {
    let summary = format!("Error assigning {}", flavor.label());
    tracing::info!("Assigning {} {} to VM {}", flavor.label(), ip, vm_id);
    let action = provider_data
        .client
        .reserved_ips_of(flavor)
        .assign(ip, vm_id)
        .await
        .map_err(|e| Diagnostic::error(&summary, format!("{} to VM {}: {}", ip, vm_id, e)))?;

    let what = format!("{} ({}) to assign", flavor.label(), ip);
    provider_data
        .poller
        .wait_for_action(ctx, &provider_data.client, action.id, &what)
        .await
        .map_err(|e| Diagnostic::error(summary, e.to_string()))
}

/// Unassigns `ip` and waits for the action. An IP that is already
/// unassigned answers 422, which counts as done.
pub(crate) async fn unassign_ip(
    ctx: &Context,
    provider_data: &AbrhaProviderData,
    flavor: IpFlavor,
    ip: &str,
) -> Result<(), Diagnostic> {
    let summary = format!("Error unassigning {}", flavor.label());
    tracing::info!("Unassigning {} {}", flavor.label(), ip);
    let action = match provider_data
        .client
        .reserved_ips_of(flavor)
        .unassign(ip)
        .await
    {
        Ok(action) => action,
        Err(e) if e.status() == Some(422) => {
            tracing::warn!("{} {} is not assigned, skipping unassign: {}", flavor.label(), ip, e);
            return Ok(());
        }
        Err(e) if e.is_not_found() => return Ok(()),
        Err(e) => return Err(Diagnostic::error(summary, format!("{}: {}", ip, e))),
    };

    let what = format!("{} ({}) to unassign", flavor.label(), ip);
    provider_data
        .poller
        .wait_for_action(ctx, &provider_data.client, action.id, &what)
        .await
        .map_err(|e| Diagnostic::error(summary, e.to_string()))
}

#[derive(Debug, Clone, PartialEq)]
pub struct IpModel {
    pub region: Option<String>,
    pub vm_id: Option<i64>,
}

impl IpModel {
    pub fn from_config(config: &DynamicValue) -> Result<Self, Diagnostic> {
        let model = Self {
            region: config.opt_string(&AttributePath::new("region")),
            vm_id: config.opt_i64(&AttributePath::new("vm_id")),
        };
        match (&model.region, model.vm_id) {
            (None, None) => Err(Diagnostic::error(
                "Invalid configuration",
                "One of `region` or `vm_id` must be set",
            )
            .with_attribute(AttributePath::new("region"))),
            _ => Ok(model),
        }
    }

    pub fn into_state(ip: &ReservedIp, flavor: IpFlavor) -> DynamicValue {
        state_of([
            ("id", Dynamic::from(ip.ip.clone())),
            ("ip_address", Dynamic::from(ip.ip.clone())),
            ("region", Dynamic::from(ip.region_slug().map(str::to_string))),
            ("vm_id", Dynamic::from(ip.vm_id())),
            ("urn", Dynamic::from(flavor.urn(&ip.ip))),
        ])
    }
}

pub struct IpResource<K: IpKind> {
    provider_data: Option<AbrhaProviderData>,
    kind: PhantomData<K>,
}

pub type ReservedIpResource = IpResource<Reserved>;
pub type FloatingIpResource = IpResource<Floating>;

impl<K: IpKind> IpResource<K> {
    pub fn new() -> Self {
        Self {
            provider_data: None,
            kind: PhantomData,
        }
    }

    async fn refresh(provider_data: &AbrhaProviderData, ip: &str) -> Result<DynamicValue, Diagnostic> {
        provider_data
            .client
            .reserved_ips_of(K::FLAVOR)
            .get(ip)
            .await
            .map(|found| IpModel::into_state(&found, K::FLAVOR))
            .map_err(|e| {
                Diagnostic::error(
                    format!("Error retrieving {}", K::FLAVOR.label()),
                    format!("{}: {}", ip, e),
                )
            })
    }
}

impl<K: IpKind> Default for IpResource<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<K: IpKind> Resource for IpResource<K> {
    fn type_name(&self) -> &str {
        K::TYPE_NAME
    }

    async fn metadata(
        &self,
        _ctx: Context,
        _request: ResourceMetadataRequest,
    ) -> ResourceMetadataResponse {
        ResourceMetadataResponse {
            type_name: self.type_name().to_string(),
        }
    }

    async fn schema(
        &self,
        _ctx: Context,
        _request: ResourceSchemaRequest,
    ) -> ResourceSchemaResponse {
        let label = K::FLAVOR.label();
        let schema = SchemaBuilder::new()
            .version(0)
            .description(&format!("Manages a {}", label))
            .attribute(
                AttributeBuilder::new("id", AttributeType::String)
                    .computed()
                    .plan_modifier(UseStateForUnknown)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("region", AttributeType::String)
                    .description("The region of the IP; required unless vm_id is set")
                    .optional()
                    .computed()
                    .plan_modifier(UseStateForUnknown)
                    .plan_modifier(RequiresReplace)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("vm_id", AttributeType::Number)
                    .description("The VM the IP is assigned to")
                    .optional()
                    .computed()
                    .validator(NumberBetween::new(1.0, i64::MAX as f64))
                    .validator(IsWholeNumber)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("ip_address", AttributeType::String)
                    .description("The IP address")
                    .optional()
                    .computed()
                    .validator(IsIpAddress)
                    .plan_modifier(UseStateForUnknown)
                    .plan_modifier(RequiresReplace)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("urn", AttributeType::String)
                    .description("The uniform resource name of the IP")
                    .computed()
                    .plan_modifier(UseStateForUnknown)
                    .build(),
            )
            .build();

        ResourceSchemaResponse {
            schema,
            diagnostics: vec![],
        }
    }

    async fn validate(
        &self,
        _ctx: Context,
        request: ValidateResourceConfigRequest,
    ) -> ValidateResourceConfigResponse {
        let is_set = |name: &str| {
            request
                .config
                .get(&AttributePath::new(name))
                .map(|v| !v.is_null())
                .unwrap_or(false)
        };
        let mut diagnostics = vec![];
        match (is_set("region"), is_set("vm_id")) {
            (false, false) => diagnostics.push(
                Diagnostic::error(
                    "Invalid configuration",
                    "One of `region` or `vm_id` must be set",
                )
                .with_attribute(AttributePath::new("region")),
            ),
            (true, true) => diagnostics.push(
                Diagnostic::error(
                    "Conflicting configuration arguments",
                    "Only one of `region` or `vm_id` may be set; the region follows the VM",
                )
                .with_attribute(AttributePath::new("vm_id")),
            ),
            _ => {}
        }
        ValidateResourceConfigResponse { diagnostics }
    }

    async fn create(&self, ctx: Context, request: CreateResourceRequest) -> CreateResourceResponse {
        let Some(provider_data) = &self.provider_data else {
            return CreateResourceResponse {
                new_state: request.planned_state,
                diagnostics: vec![not_configured()],
            };
        };
        let model = match IpModel::from_config(&request.config) {
            Ok(model) => model,
            Err(diag) => {
                return CreateResourceResponse {
                    new_state: request.planned_state,
                    diagnostics: vec![diag],
                }
            }
        };
        let label = K::FLAVOR.label();

        tracing::info!("Creating {} (region: {:?}, vm: {:?})", label, model.region, model.vm_id);
        let api = provider_data.client.reserved_ips_of(K::FLAVOR);
        let create_request = ReservedIpCreateRequest {
            region: model.region.clone(),
            vm_id: model.vm_id,
        };
        let created = match api.create(&create_request).await {
            Ok(created) => created,
            Err(e) => {
                return CreateResourceResponse {
                    new_state: request.planned_state,
                    diagnostics: vec![Diagnostic::error(format!("Error creating {}", label), e.to_string())],
                }
            }
        };
        tracing::info!("Created {} {}", label, created.ip);

        if let Some(vm_id) = model.vm_id {
            let what = format!("{} ({}) to assign", label, created.ip);
            let ip = created.ip.clone();
            let waited = provider_data
                .poller
                .wait(&ctx, &what, &["unassigned"], &["assigned"], || {
                    let api = provider_data.client.reserved_ips_of(K::FLAVOR);
                    let ip = ip.clone();
                    async move {
                        match api.get(&ip).await {
                            Ok(found) if found.vm_id() == Some(vm_id) => Ok(Some("assigned".to_string())),
                            Ok(_) => Ok(Some("unassigned".to_string())),
                            Err(e) if e.is_not_found() => Ok(None),
                            Err(e) => Err(e),
                        }
                    }
                })
                .await;
            if let Err(e) = waited {
                return CreateResourceResponse {
                    new_state: IpModel::into_state(&created, K::FLAVOR),
                    diagnostics: vec![Diagnostic::error(format!("Error assigning {}", label), e.to_string())],
                };
            }
        }

        match Self::refresh(provider_data, &created.ip).await {
            Ok(new_state) => CreateResourceResponse {
                new_state,
                diagnostics: vec![],
            },
            Err(diag) => CreateResourceResponse {
                new_state: IpModel::into_state(&created, K::FLAVOR),
                diagnostics: vec![diag],
            },
        }
    }

    async fn read(&self, _ctx: Context, request: ReadResourceRequest) -> ReadResourceResponse {
        let Some(provider_data) = &self.provider_data else {
            return ReadResourceResponse {
                new_state: Some(request.current_state),
                diagnostics: vec![not_configured()],
            };
        };
        let ip = match required_string(&request.current_state, "ip_address") {
            Ok(ip) => ip,
            Err(diag) => {
                return ReadResourceResponse {
                    new_state: Some(request.current_state),
                    diagnostics: vec![diag],
                }
            }
        };

        match provider_data.client.reserved_ips_of(K::FLAVOR).get(&ip).await {
            Ok(found) => ReadResourceResponse {
                new_state: Some(IpModel::into_state(&found, K::FLAVOR)),
                diagnostics: vec![],
            },
            Err(e) if e.is_not_found() => {
                tracing::warn!("{} {} not found, removing from state", K::FLAVOR.label(), ip);
                ReadResourceResponse {
                    new_state: None,
                    diagnostics: vec![],
                }
            }
            Err(e) => ReadResourceResponse {
                new_state: Some(request.current_state),
                diagnostics: vec![Diagnostic::error(
                    format!("Error retrieving {}", K::FLAVOR.label()),
                    format!("{}: {}", ip, e),
                )],
            },
        }
    }

    async fn update(&self, ctx: Context, request: UpdateResourceRequest) -> UpdateResourceResponse {
        let Some(provider_data) = &self.provider_data else {
            return UpdateResourceResponse {
                new_state: request.planned_state,
                diagnostics: vec![not_configured()],
            };
        };
        let ip = match required_string(&request.prior_state, "ip_address") {
            Ok(ip) => ip,
            Err(diag) => {
                return UpdateResourceResponse {
                    new_state: request.prior_state,
                    diagnostics: vec![diag],
                }
            }
        };
        let path = AttributePath::new("vm_id");
        let prior_vm = request.prior_state.opt_i64(&path);
        let planned_vm = request.planned_state.opt_i64(&path);

        if prior_vm != planned_vm {
            if prior_vm.is_some() {
                if let Err(diag) = unassign_ip(&ctx, provider_data, K::FLAVOR, &ip).await {
                    return UpdateResourceResponse {
                        new_state: request.prior_state,
                        diagnostics: vec![diag],
                    };
                }
            }
            if let Some(vm_id) = planned_vm {
                if let Err(diag) = assign_ip(&ctx, provider_data, K::FLAVOR, &ip, vm_id).await {
                    return UpdateResourceResponse {
                        new_state: request.prior_state,
                        diagnostics: vec![diag],
                    };
                }
            }
        }

        match Self::refresh(provider_data, &ip).await {
            Ok(new_state) => UpdateResourceResponse {
                new_state,
                diagnostics: vec![],
            },
            Err(diag) => UpdateResourceResponse {
                new_state: request.prior_state,
                diagnostics: vec![diag],
            },
        }
    }

    async fn delete(&self, ctx: Context, request: DeleteResourceRequest) -> DeleteResourceResponse {
        let Some(provider_data) = &self.provider_data else {
            return DeleteResourceResponse {
                diagnostics: vec![not_configured()],
            };
        };
        let ip = match required_string(&request.prior_state, "ip_address") {
            Ok(ip) => ip,
            Err(diag) => {
                return DeleteResourceResponse {
                    diagnostics: vec![diag],
                }
            }
        };
        let label = K::FLAVOR.label();

        if request.prior_state.opt_i64(&AttributePath::new("vm_id")).is_some() {
            if let Err(diag) = unassign_ip(&ctx, provider_data, K::FLAVOR, &ip).await {
                return DeleteResourceResponse {
                    diagnostics: vec![diag],
                };
            }
        }

        tracing::info!("Deleting {} {}", label, ip);
        match provider_data.client.reserved_ips_of(K::FLAVOR).delete(&ip).await {
            Ok(()) => DeleteResourceResponse {
                diagnostics: vec![],
            },
            Err(e) if e.is_not_found() => DeleteResourceResponse {
                diagnostics: vec![],
            },
            Err(e) => DeleteResourceResponse {
                diagnostics: vec![Diagnostic::error(
                    format!("Error deleting {}", label),
                    format!("{}: {}", ip, e),
                )],
            },
        }
    }

    fn importer(&self) -> Option<&dyn ResourceWithImportState> {
        Some(self)
    }
}

#[async_trait]
impl<K: IpKind> ResourceWithConfigure for IpResource<K> {
    async fn configure(
        &mut self,
        _ctx: Context,
        request: ConfigureResourceRequest,
    ) -> ConfigureResourceResponse {
        match provider_data_from(request.provider_data) {
            Ok(data) => {
                self.provider_data = data;
                ConfigureResourceResponse {
                    diagnostics: vec![],
                }
            }
            Err(diag) => ConfigureResourceResponse {
                diagnostics: vec![diag],
            },
        }
    }
}

#[async_trait]
impl<K: IpKind> ResourceWithImportState for IpResource<K> {
    async fn import_state(
        &self,
        _ctx: Context,
        request: ImportResourceStateRequest,
    ) -> ImportResourceStateResponse {
        if request.id.parse::<std::net::IpAddr>().is_err() {
            return import_failed(Diagnostic::error(
                "Invalid import ID",
                format!("Expected an IP address, got \"{}\"", request.id),
            ));
        }
        imported(
            &request.type_name,
            state_of([
                ("id", Dynamic::from(request.id.clone())),
                ("ip_address", Dynamic::from(request.id.clone())),
            ]),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{configure_resource, provider_data, value};
    use mockito::{Matcher, Server, ServerGuard};

    const UNASSIGNED: &str = r#"{"reserved_ip":{"ip":"192.0.2.1","region":{"slug":"fra1","name":"Frankfurt 1"},"vm":null,"locked":false}}"#;
    const ASSIGNED: &str = r#"{"reserved_ip":{"ip":"192.0.2.1","region":{"slug":"fra1","name":"Frankfurt 1"},"vm":{"id":12345},"locked":false}}"#;

    async fn reserved(server: &ServerGuard) -> ReservedIpResource {
        let (data, _) = provider_data(&server.url());
        let mut resource = ReservedIpResource::new();
        configure_resource(&mut resource, &data).await;
        resource
    }

    async fn validate(config: DynamicValue) -> Vec<Diagnostic> {
        ReservedIpResource::new()
            .validate(
                Context::new(),
                ValidateResourceConfigRequest {
                    type_name: "abrha_reserved_ip".into(),
                    config,
                },
            )
            .await
            .diagnostics
    }

    #[tokio::test]
    async fn exactly_one_of_region_and_vm() {
        assert_eq!(validate(value(&[])).await.len(), 1);
        assert_eq!(
            validate(value(&[
                ("region", Dynamic::from("fra1")),
                ("vm_id", Dynamic::from(12345i64)),
            ]))
            .await
            .len(),
            1
        );
        assert!(validate(value(&[("region", Dynamic::from("fra1"))])).await.is_empty());
        assert!(validate(value(&[("vm_id", Dynamic::from(12345i64))])).await.is_empty());
    }

    #[tokio::test]
    async fn create_with_vm_waits_for_assignment() {
        let mut server = Server::new_async().await;
        let create = server
            .mock("POST", "/v2/reserved_ips")
            .match_body(Matcher::Json(serde_json::json!({"vm_id": 12345})))
            .with_status(202)
            .with_body(UNASSIGNED)
            .create_async()
            .await;
        let get = server
            .mock("GET", "/v2/reserved_ips/192.0.2.1")
            .with_body(ASSIGNED)
            .expect_at_least(1)
            .create_async()
            .await;

        let resource = reserved(&server).await;
        let config = value(&[("vm_id", Dynamic::from(12345i64))]);
        let response = resource
            .create(
                Context::new(),
                CreateResourceRequest {
                    type_name: "abrha_reserved_ip".into(),
                    planned_state: config.clone(),
                    config,
                },
            )
            .await;

        create.assert_async().await;
        get.assert_async().await;
        assert!(response.diagnostics.is_empty(), "{:?}", response.diagnostics);
        let state = response.new_state;
        assert_eq!(state.get_string(&AttributePath::new("region")).unwrap(), "fra1");
        assert_eq!(state.get_number(&AttributePath::new("vm_id")).unwrap(), 12345.0);
        assert_eq!(
            state.get_string(&AttributePath::new("urn")).unwrap(),
            "abrha:reservedip:192.0.2.1"
        );
    }

    #[tokio::test]
    async fn delete_skips_unassign_answered_with_422() {
        let mut server = Server::new_async().await;
        let unassign = server
            .mock("POST", "/v2/reserved_ips/192.0.2.1/actions")
            .match_body(Matcher::Json(serde_json::json!({"type": "unassign"})))
            .with_status(422)
            .with_body(r#"{"id":"unprocessable_entity","message":"The reserved IP is not assigned."}"#)
            .create_async()
            .await;
        let delete = server
            .mock("DELETE", "/v2/reserved_ips/192.0.2.1")
            .with_status(204)
            .create_async()
            .await;

        let resource = reserved(&server).await;
        let response = resource
            .delete(
                Context::new(),
                DeleteResourceRequest {
                    type_name: "abrha_reserved_ip".into(),
                    prior_state: value(&[
                        ("ip_address", Dynamic::from("192.0.2.1")),
                        ("vm_id", Dynamic::from(12345i64)),
                    ]),
                },
            )
            .await;

        unassign.assert_async().await;
        delete.assert_async().await;
        assert!(response.diagnostics.is_empty(), "{:?}", response.diagnostics);
    }

    #[tokio::test]
    async fn delete_reports_other_unassign_failures() {
        let mut server = Server::new_async().await;
        let _unassign = server
            .mock("POST", "/v2/reserved_ips/192.0.2.1/actions")
            .with_status(403)
            .with_body(r#"{"id":"forbidden","message":"You do not have access."}"#)
            .create_async()
            .await;

        let resource = reserved(&server).await;
        let response = resource
            .delete(
                Context::new(),
                DeleteResourceRequest {
                    type_name: "abrha_reserved_ip".into(),
                    prior_state: value(&[
                        ("ip_address", Dynamic::from("192.0.2.1")),
                        ("vm_id", Dynamic::from(12345i64)),
                    ]),
                },
            )
            .await;
        assert_eq!(response.diagnostics.len(), 1);
        assert_eq!(response.diagnostics[0].summary, "Error unassigning reserved IP");
    }

    #[tokio::test]
    async fn floating_flavor_uses_its_own_paths() {
        let mut server = Server::new_async().await;
        let _get = server
            .mock("GET", "/v2/floating_ips/192.0.2.1")
            .with_body(r#"{"floating_ip":{"ip":"192.0.2.1","region":{"slug":"ams3","name":"Amsterdam 3"},"locked":false}}"#)
            .create_async()
            .await;

        let (data, _) = provider_data(&server.url());
        let mut resource = FloatingIpResource::new();
        configure_resource(&mut resource, &data).await;
        assert_eq!(resource.type_name(), "abrha_floating_ip");

        let response = resource
            .read(
                Context::new(),
                ReadResourceRequest {
                    type_name: "abrha_floating_ip".into(),
                    current_state: value(&[("ip_address", Dynamic::from("192.0.2.1"))]),
                },
            )
            .await;
        let state = response.new_state.unwrap();
        assert_eq!(
            state.get_string(&AttributePath::new("urn")).unwrap(),
            "abrha:floatingip:192.0.2.1"
        );
        assert!(state.get(&AttributePath::new("vm_id")).unwrap().is_null());
    }

    #[tokio::test]
    async fn import_requires_an_ip() {
        let resource = ReservedIpResource::new();
        let response = resource
            .import_state(
                Context::new(),
                ImportResourceStateRequest {
                    type_name: "abrha_reserved_ip".into(),
                    id: "not-an-ip".into(),
                },
            )
            .await;
        assert!(response.imported_resources.is_empty());
    }
}
