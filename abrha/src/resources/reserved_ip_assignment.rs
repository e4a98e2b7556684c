//! Assignment of a reserved (or floating) IP to a VM

use async_trait::async_trait;
use std::marker::PhantomData;
use tfplug::context::Context;
use tfplug::import::{import_failed, imported, split_import_id};
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
use tfplug::types::{Diagnostic, Dynamic, DynamicValue};
use tfplug::validator::{IsIpAddress, IsWholeNumber, NumberBetween};

use super::reserved_ip::{assign_ip, unassign_ip, Floating, IpKind, Reserved};
use super::{not_configured, provider_data_from, required_i64, required_string, state_of};
use crate::AbrhaProviderData;

#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentModel {
    pub ip_address: String,
    pub vm_id: i64,
}

impl AssignmentModel {
    pub fn from_config(config: &DynamicValue) -> Result<Self, Diagnostic> {
        Ok(Self {
            ip_address: required_string(config, "ip_address")?,
            vm_id: required_i64(config, "vm_id")?,
        })
    }

    pub fn id(&self) -> String {
        format!("{}-{}", self.ip_address, self.vm_id)
    }

    pub fn into_state(&self) -> DynamicValue {
        state_of([
            ("id", Dynamic::from(self.id())),
            ("ip_address", Dynamic::from(self.ip_address.clone())),
            ("vm_id", Dynamic::from(self.vm_id)),
        ])
    }
}

pub struct IpAssignmentResource<K: IpKind> {
    provider_data: Option<AbrhaProviderData>,
    kind: PhantomData<K>,
}

pub type ReservedIpAssignmentResource = IpAssignmentResource<Reserved>;
pub type FloatingIpAssignmentResource = IpAssignmentResource<Floating>;

impl<K: IpKind> IpAssignmentResource<K> {
    pub fn new() -> Self {
        Self {
            provider_data: None,
            kind: PhantomData,
        }
    }
}

impl<K: IpKind> Default for IpAssignmentResource<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<K: IpKind> Resource for IpAssignmentResource<K> {
    fn type_name(&self) -> &str {
        K::ASSIGNMENT_TYPE_NAME
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
        let schema = SchemaBuilder::new()
            .version(0)
            .description(&format!("Assigns a {} to a VM", K::FLAVOR.label()))
            .attribute(
                AttributeBuilder::new("id", AttributeType::String)
                    .computed()
                    .plan_modifier(UseStateForUnknown)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("ip_address", AttributeType::String)
                    .required()
                    .validator(IsIpAddress)
                    .plan_modifier(RequiresReplace)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("vm_id", AttributeType::Number)
                    .required()
                    .validator(NumberBetween::new(1.0, i64::MAX as f64))
                    .validator(IsWholeNumber)
                    .plan_modifier(RequiresReplace)
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
        _request: ValidateResourceConfigRequest,
    ) -> ValidateResourceConfigResponse {
        ValidateResourceConfigResponse {
            diagnostics: vec![],
        }
    }

    async fn create(&self, ctx: Context, request: CreateResourceRequest) -> CreateResourceResponse {
        let Some(provider_data) = &self.provider_data else {
            return CreateResourceResponse {
                new_state: request.planned_state,
                diagnostics: vec![not_configured()],
            };
        };
        let assigned = match AssignmentModel::from_config(&request.config) {
            Ok(model) => assign_ip(&ctx, provider_data, K::FLAVOR, &model.ip_address, model.vm_id)
                .await
                .map(|()| model),
            Err(diag) => Err(diag),
        };
        match assigned {
            Ok(model) => CreateResourceResponse {
                new_state: model.into_state(),
                diagnostics: vec![],
            },
            Err(diag) => CreateResourceResponse {
                new_state: request.planned_state,
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
        let model = match AssignmentModel::from_config(&request.current_state) {
            Ok(model) => model,
            Err(diag) => {
                return ReadResourceResponse {
                    new_state: Some(request.current_state),
                    diagnostics: vec![diag],
                }
            }
        };

        match provider_data
            .client
            .reserved_ips_of(K::FLAVOR)
            .get(&model.ip_address)
            .await
        {
            Ok(found) if found.vm_id() == Some(model.vm_id) => ReadResourceResponse {
                new_state: Some(model.into_state()),
                diagnostics: vec![],
            },
            Ok(_) => {
                tracing::warn!(
                    "{} {} is no longer assigned to VM {}, removing from state",
                    K::FLAVOR.label(),
                    model.ip_address,
                    model.vm_id
                );
                ReadResourceResponse {
                    new_state: None,
                    diagnostics: vec![],
                }
            }
            Err(e) if e.is_not_found() => ReadResourceResponse {
                new_state: None,
                diagnostics: vec![],
            },
            Err(e) => ReadResourceResponse {
                new_state: Some(request.current_state),
                diagnostics: vec![Diagnostic::error(
                    format!("Error retrieving {}", K::FLAVOR.label()),
                    format!("{}: {}", model.ip_address, e),
                )],
            },
        }
    }

    async fn update(&self, _ctx: Context, request: UpdateResourceRequest) -> UpdateResourceResponse {
        // both arguments force replacement
        UpdateResourceResponse {
            new_state: request.planned_state,
            diagnostics: vec![],
        }
    }

    async fn delete(&self, ctx: Context, request: DeleteResourceRequest) -> DeleteResourceResponse {
        let Some(provider_data) = &self.provider_data else {
            return DeleteResourceResponse {
                diagnostics: vec![not_configured()],
            };
        };
        let result = match required_string(&request.prior_state, "ip_address") {
            Ok(ip) => unassign_ip(&ctx, provider_data, K::FLAVOR, &ip).await,
            Err(diag) => Err(diag),
        };
        DeleteResourceResponse {
            diagnostics: result.err().into_iter().collect(),
        }
    }

    fn importer(&self) -> Option<&dyn ResourceWithImportState> {
        Some(self)
    }
}

#[async_trait]
impl<K: IpKind> ResourceWithConfigure for IpAssignmentResource<K> {
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

/// Splits `<ip_address>,<vm_id>`
pub fn parse_assignment_id(id: &str) -> Result<AssignmentModel, Diagnostic> {
    let parts = split_import_id(id, 2, "<ip_address>,<vm_id>")?;
    let vm_id = parts[1].parse::<i64>().map_err(|_| {
        Diagnostic::error(
            "Invalid import ID",
            format!("VM ID must be an integer, got \"{}\"", parts[1]),
        )
    })?;
    Ok(AssignmentModel {
        ip_address: parts[0].clone(),
        vm_id,
    })
}

#[async_trait]
impl<K: IpKind> ResourceWithImportState for IpAssignmentResource<K> {
    async fn import_state(
        &self,
        _ctx: Context,
        request: ImportResourceStateRequest,
    ) -> ImportResourceStateResponse {
        match parse_assignment_id(&request.id) {
            Ok(model) => imported(&request.type_name, model.into_state()),
            Err(diag) => import_failed(diag),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{configure_resource, provider_data, value};
    use mockito::{Matcher, Server};
    use tfplug::types::AttributePath;

    #[test]
    fn assignment_id_parsing() {
        let model = parse_assignment_id("192.0.2.1,12345").unwrap();
        assert_eq!(model.ip_address, "192.0.2.1");
        assert_eq!(model.vm_id, 12345);

        let err = parse_assignment_id("192.0.2.1").unwrap_err();
        assert_eq!(
            err.detail,
            "Unexpected format of ID (192.0.2.1), expected <ip_address>,<vm_id>"
        );
        assert!(parse_assignment_id("192.0.2.1,vm").is_err());
    }

    #[tokio::test]
    async fn create_assigns_and_waits_for_action() {
        let mut server = Server::new_async().await;
        let assign = server
            .mock("POST", "/v2/reserved_ips/192.0.2.1/actions")
            .match_body(Matcher::Json(serde_json::json!({"type": "assign", "vm_id": 12345})))
            .with_status(201)
            .with_body(r#"{"action":{"id":77,"status":"in-progress","type":"assign_ip"}}"#)
            .create_async()
            .await;
        let action = server
            .mock("GET", "/v2/actions/77")
            .with_body(r#"{"action":{"id":77,"status":"completed","type":"assign_ip"}}"#)
            .create_async()
            .await;

        let (data, _) = provider_data(&server.url());
        let mut resource = ReservedIpAssignmentResource::new();
        configure_resource(&mut resource, &data).await;

        let config = value(&[
            ("ip_address", Dynamic::from("192.0.2.1")),
            ("vm_id", Dynamic::from(12345i64)),
        ]);
        let response = resource
            .create(
                Context::new(),
                CreateResourceRequest {
                    type_name: "abrha_reserved_ip_assignment".into(),
                    planned_state: config.clone(),
                    config,
                },
            )
            .await;

        assign.assert_async().await;
        action.assert_async().await;
        assert!(response.diagnostics.is_empty(), "{:?}", response.diagnostics);
        assert_eq!(
            response.new_state.get_string(&AttributePath::new("id")).unwrap(),
            "192.0.2.1-12345"
        );
    }

    #[tokio::test]
    async fn errored_action_is_reported_with_ip() {
        let mut server = Server::new_async().await;
        let _assign = server
            .mock("POST", "/v2/floating_ips/192.0.2.1/actions")
            .with_status(201)
            .with_body(r#"{"action":{"id":78,"status":"in-progress"}}"#)
            .create_async()
            .await;
        let _action = server
            .mock("GET", "/v2/actions/78")
            .with_body(r#"{"action":{"id":78,"status":"errored"}}"#)
            .create_async()
            .await;

        let (data, _) = provider_data(&server.url());
        let mut resource = FloatingIpAssignmentResource::new();
        configure_resource(&mut resource, &data).await;

        let config = value(&[
            ("ip_address", Dynamic::from("192.0.2.1")),
            ("vm_id", Dynamic::from(12345i64)),
        ]);
        let response = resource
            .create(
                Context::new(),
                CreateResourceRequest {
                    type_name: "abrha_floating_ip_assignment".into(),
                    planned_state: config.clone(),
                    config,
                },
            )
            .await;

        assert_eq!(response.diagnostics.len(), 1);
        assert!(response.diagnostics[0]
            .detail
            .starts_with("Error waiting for floating IP (192.0.2.1) to assign"));
    }

    #[tokio::test]
    async fn read_drops_assignment_moved_elsewhere() {
        let mut server = Server::new_async().await;
        let _get = server
            .mock("GET", "/v2/reserved_ips/192.0.2.1")
            .with_body(r#"{"reserved_ip":{"ip":"192.0.2.1","vm":{"id":999}}}"#)
            .create_async()
            .await;

        let (data, _) = provider_data(&server.url());
        let mut resource = ReservedIpAssignmentResource::new();
        configure_resource(&mut resource, &data).await;

        let response = resource
            .read(
                Context::new(),
                ReadResourceRequest {
                    type_name: "abrha_reserved_ip_assignment".into(),
                    current_state: value(&[
                        ("ip_address", Dynamic::from("192.0.2.1")),
                        ("vm_id", Dynamic::from(12345i64)),
                    ]),
                },
            )
            .await;
        assert!(response.new_state.is_none());
    }
}
