//! VPC peering resource
//!
//! Peerings are provisioned asynchronously; every change waits for the
//! peering to become ACTIVE again, and deletion waits until it is gone.

use async_trait::async_trait;
use tfplug::context::Context;
use tfplug::import::import_state_passthrough_id;
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
use tfplug::validator::{ListLengthBetween, StringLengthBetween};

use super::{not_configured, provider_data_from, required_string, state_of};
use crate::api::vpc_peerings::{
    VpcPeering, VpcPeeringCreateRequest, VpcPeeringUpdateRequest, STATUS_ACTIVE,
    STATUS_DELETING, STATUS_PROVISIONING, STATUS_UPDATING,
};
use crate::poll::PollError;
use crate::AbrhaProviderData;

#[derive(Debug, Clone, PartialEq)]
pub struct PeeringModel {
    pub name: String,
    pub vpc_ids: Vec<String>,
}

impl PeeringModel {
    pub fn from_config(config: &DynamicValue) -> Result<Self, Diagnostic> {
        let vpc_ids = config
            .opt_string_list(&AttributePath::new("vpc_ids"))
            .unwrap_or_default();
        if vpc_ids.len() != 2 {
            return Err(Diagnostic::error(
                "Invalid configuration",
                format!("A VPC peering joins exactly two VPCs, got {}", vpc_ids.len()),
            )
            .with_attribute(AttributePath::new("vpc_ids")));
        }
        Ok(Self {
            name: required_string(config, "name")?,
            vpc_ids,
        })
    }

    pub fn into_state(peering: &VpcPeering) -> DynamicValue {
        state_of([
            ("id", Dynamic::from(peering.id.clone())),
            ("name", Dynamic::from(peering.name.clone())),
            ("vpc_ids", Dynamic::string_list(peering.vpc_ids.iter())),
            ("status", Dynamic::from(peering.status.clone())),
            ("created_at", Dynamic::from(peering.created_at.clone())),
        ])
    }
}

#[derive(Default)]
pub struct VpcPeeringResource {
    provider_data: Option<AbrhaProviderData>,
}

impl VpcPeeringResource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for `id` to become ACTIVE and returns the settled peering
    async fn wait_active(
        ctx: &Context,
        provider_data: &AbrhaProviderData,
        id: &str,
        action: &str,
    ) -> Result<VpcPeering, Diagnostic> {
        let client = &provider_data.client;
        let what = format!("VPC peering ({}) to {}", id, action);
        provider_data
            .poller
            .wait(
                ctx,
                &what,
                &[STATUS_PROVISIONING, STATUS_UPDATING],
                &[STATUS_ACTIVE],
                || async move {
                    match client.vpc_peerings().get(id).await {
                        Ok(peering) => Ok(Some(peering.status)),
                        Err(e) if e.is_not_found() => Ok(None),
                        Err(e) => Err(e),
                    }
                },
            )
            .await
            .map_err(|e| poll_failed(action, e))?;

        client.vpc_peerings().get(id).await.map_err(|e| {
            Diagnostic::error("Error retrieving VPC peering", format!("{}: {}", id, e))
        })
    }
}

fn poll_failed(action: &str, e: PollError) -> Diagnostic {
    Diagnostic::error(format!("Error waiting for VPC peering to {}", action), e.to_string())
}

#[async_trait]
impl Resource for VpcPeeringResource {
    fn type_name(&self) -> &str {
        "abrha_vpc_peering"
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
            .description("Peers two VPCs")
            .attribute(
                AttributeBuilder::new("id", AttributeType::String)
                    .computed()
                    .plan_modifier(UseStateForUnknown)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("name", AttributeType::String)
                    .description("The name of the VPC peering")
                    .required()
                    .validator(StringLengthBetween::new(1, 255))
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("vpc_ids", AttributeType::set_of(AttributeType::String))
                    .description("The IDs of the two VPCs to peer")
                    .required()
                    .validator(ListLengthBetween::new(2, 2))
                    .plan_modifier(RequiresReplace)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("status", AttributeType::String)
                    .description("The status of the VPC peering")
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("created_at", AttributeType::String)
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
        let mut diagnostics = vec![];
        if let Some(ids) = request.config.opt_string_list(&AttributePath::new("vpc_ids")) {
            if ids.len() == 2 && ids[0] == ids[1] {
                diagnostics.push(
                    Diagnostic::error(
                        "Invalid configuration",
                        "A VPC cannot be peered with itself",
                    )
                    .with_attribute(AttributePath::new("vpc_ids")),
                );
            }
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
        let model = match PeeringModel::from_config(&request.config) {
            Ok(model) => model,
            Err(diag) => {
                return CreateResourceResponse {
                    new_state: request.planned_state,
                    diagnostics: vec![diag],
                }
            }
        };

        tracing::info!("Creating VPC peering {} between {:?}", model.name, model.vpc_ids);
        let create_request = VpcPeeringCreateRequest {
            name: model.name.clone(),
            vpc_ids: model.vpc_ids.clone(),
        };
        let created = match provider_data.client.vpc_peerings().create(&create_request).await {
            Ok(created) => created,
            Err(e) => {
                return CreateResourceResponse {
                    new_state: request.planned_state,
                    diagnostics: vec![Diagnostic::error(
                        "Error creating VPC peering",
                        format!("{}: {}", model.name, e),
                    )],
                }
            }
        };

        match Self::wait_active(&ctx, provider_data, &created.id, "become active").await {
            Ok(peering) => CreateResourceResponse {
                new_state: PeeringModel::into_state(&peering),
                diagnostics: vec![],
            },
            // keep the id so the next apply can pick the peering up again
            Err(diag) => CreateResourceResponse {
                new_state: PeeringModel::into_state(&created),
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
        let id = match required_string(&request.current_state, "id") {
            Ok(id) => id,
            Err(diag) => {
                return ReadResourceResponse {
                    new_state: Some(request.current_state),
                    diagnostics: vec![diag],
                }
            }
        };

        match provider_data.client.vpc_peerings().get(&id).await {
            Ok(peering) => ReadResourceResponse {
                new_state: Some(PeeringModel::into_state(&peering)),
                diagnostics: vec![],
            },
            Err(e) if e.is_not_found() => {
                tracing::warn!("VPC peering {} not found, removing from state", id);
                ReadResourceResponse {
                    new_state: None,
                    diagnostics: vec![],
                }
            }
            Err(e) => ReadResourceResponse {
                new_state: Some(request.current_state),
                diagnostics: vec![Diagnostic::error(
                    "Error retrieving VPC peering",
                    format!("{}: {}", id, e),
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
        let parsed = required_string(&request.prior_state, "id")
            .and_then(|id| required_string(&request.config, "name").map(|name| (id, name)));
        let (id, name) = match parsed {
            Ok(parsed) => parsed,
            Err(diag) => {
                return UpdateResourceResponse {
                    new_state: request.prior_state,
                    diagnostics: vec![diag],
                }
            }
        };

        tracing::info!("Renaming VPC peering {} to {}", id, name);
        if let Err(e) = provider_data
            .client
            .vpc_peerings()
            .update(&id, &VpcPeeringUpdateRequest { name })
            .await
        {
            return UpdateResourceResponse {
                new_state: request.prior_state,
                diagnostics: vec![Diagnostic::error(
                    "Error updating VPC peering",
                    format!("{}: {}", id, e),
                )],
            };
        }

        match Self::wait_active(&ctx, provider_data, &id, "update").await {
            Ok(peering) => UpdateResourceResponse {
                new_state: PeeringModel::into_state(&peering),
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
        let id = match required_string(&request.prior_state, "id") {
            Ok(id) => id,
            Err(diag) => {
                return DeleteResourceResponse {
                    diagnostics: vec![diag],
                }
            }
        };

        tracing::info!("Deleting VPC peering {}", id);
        let client = &provider_data.client;
        match client.vpc_peerings().delete(&id).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                return DeleteResourceResponse {
                    diagnostics: vec![],
                }
            }
            Err(e) => {
                return DeleteResourceResponse {
                    diagnostics: vec![Diagnostic::error(
                        "Error deleting VPC peering",
                        format!("{}: {}", id, e),
                    )],
                }
            }
        }

        let what = format!("VPC peering ({}) to be deleted", id);
        let id = id.as_str();
        let gone = provider_data
            .poller
            .wait_until_gone(&ctx, &what, &[STATUS_DELETING, STATUS_ACTIVE], || async move {
                match client.vpc_peerings().get(id).await {
                    Ok(peering) => Ok(Some(peering.status)),
                    Err(e) if e.is_not_found() => Ok(None),
                    Err(e) => Err(e),
                }
            })
            .await;

        DeleteResourceResponse {
            diagnostics: gone.err().map(|e| poll_failed("be deleted", e)).into_iter().collect(),
        }
    }

    fn importer(&self) -> Option<&dyn ResourceWithImportState> {
        Some(self)
    }
}

#[async_trait]
impl ResourceWithConfigure for VpcPeeringResource {
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
impl ResourceWithImportState for VpcPeeringResource {
    async fn import_state(
        &self,
        _ctx: Context,
        request: ImportResourceStateRequest,
    ) -> ImportResourceStateResponse {
        let mut response = ImportResourceStateResponse {
            imported_resources: vec![],
            diagnostics: vec![],
        };
        import_state_passthrough_id(AttributePath::new("id"), &request, &mut response);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{configure_resource, provider_data, value};
    use mockito::{Matcher, Server};

    fn peering(status: &str) -> String {
        format!(
            r#"{{"vpc_peering":{{"id":"p-1","name":"link","vpc_ids":["vpc-a","vpc-b"],"status":"{}","created_at":"2024-05-01T00:00:00Z"}}}}"#,
            status
        )
    }

    #[tokio::test]
    async fn create_waits_until_active() {
        let mut server = Server::new_async().await;
        let _create = server
            .mock("POST", "/v2/vpc_peerings")
            .match_body(Matcher::Json(serde_json::json!({
                "name": "link",
                "vpc_ids": ["vpc-a", "vpc-b"]
            })))
            .with_status(202)
            .with_body(peering(STATUS_PROVISIONING))
            .create_async()
            .await;
        let _get = server
            .mock("GET", "/v2/vpc_peerings/p-1")
            .with_body(peering(STATUS_ACTIVE))
            .create_async()
            .await;

        let (data, _) = provider_data(&server.url());
        let mut resource = VpcPeeringResource::new();
        configure_resource(&mut resource, &data).await;

        let config = value(&[
            ("name", Dynamic::from("link")),
            ("vpc_ids", Dynamic::string_list(["vpc-a", "vpc-b"])),
        ]);
        let response = resource
            .create(
                Context::new(),
                CreateResourceRequest {
                    type_name: "abrha_vpc_peering".into(),
                    planned_state: config.clone(),
                    config,
                },
            )
            .await;

        assert!(response.diagnostics.is_empty(), "{:?}", response.diagnostics);
        assert_eq!(
            response.new_state.get_string(&AttributePath::new("status")).unwrap(),
            STATUS_ACTIVE
        );
    }

    #[tokio::test]
    async fn stuck_provisioning_times_out_with_id_in_state() {
        let mut server = Server::new_async().await;
        let _create = server
            .mock("POST", "/v2/vpc_peerings")
            .with_status(202)
            .with_body(peering(STATUS_PROVISIONING))
            .create_async()
            .await;
        let _get = server
            .mock("GET", "/v2/vpc_peerings/p-1")
            .with_body(peering(STATUS_PROVISIONING))
            .create_async()
            .await;

        let (data, _) = provider_data(&server.url());
        let mut resource = VpcPeeringResource::new();
        configure_resource(&mut resource, &data).await;

        let config = value(&[
            ("name", Dynamic::from("link")),
            ("vpc_ids", Dynamic::string_list(["vpc-a", "vpc-b"])),
        ]);
        let response = resource
            .create(
                Context::new(),
                CreateResourceRequest {
                    type_name: "abrha_vpc_peering".into(),
                    planned_state: config.clone(),
                    config,
                },
            )
            .await;

        assert_eq!(response.diagnostics.len(), 1);
        assert!(response.diagnostics[0].detail.contains("timeout"));
        assert_eq!(
            response.new_state.get_string(&AttributePath::new("id")).unwrap(),
            "p-1"
        );
    }

    #[tokio::test]
    async fn delete_waits_for_disappearance() {
        let mut server = Server::new_async().await;
        let delete = server
            .mock("DELETE", "/v2/vpc_peerings/p-1")
            .with_status(202)
            .create_async()
            .await;
        let _get = server
            .mock("GET", "/v2/vpc_peerings/p-1")
            .with_status(404)
            .with_body(r#"{"id":"not_found","message":"not found"}"#)
            .create_async()
            .await;

        let (data, _) = provider_data(&server.url());
        let mut resource = VpcPeeringResource::new();
        configure_resource(&mut resource, &data).await;

        let response = resource
            .delete(
                Context::new(),
                DeleteResourceRequest {
                    type_name: "abrha_vpc_peering".into(),
                    prior_state: value(&[("id", Dynamic::from("p-1"))]),
                },
            )
            .await;

        delete.assert_async().await;
        assert!(response.diagnostics.is_empty(), "{:?}", response.diagnostics);
    }

    #[tokio::test]
    async fn self_peering_is_rejected() {
        let response = VpcPeeringResource::new()
            .validate(
                Context::new(),
                ValidateResourceConfigRequest {
                    type_name: "abrha_vpc_peering".into(),
                    config: value(&[
                        ("name", Dynamic::from("loop")),
                        ("vpc_ids", Dynamic::string_list(["vpc-a", "vpc-a"])),
                    ]),
                },
            )
            .await;
        assert_eq!(response.diagnostics.len(), 1);
    }
}
