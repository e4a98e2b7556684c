//! DNS domain resource

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
use tfplug::validator::IsIpAddress;

use super::{carried, not_configured, provider_data_from, required_string, state_of};
use crate::api::domains::{Domain, DomainCreateRequest};
use crate::AbrhaProviderData;

#[derive(Default)]
pub struct DomainResource {
    provider_data: Option<AbrhaProviderData>,
}

impl DomainResource {
    pub fn new() -> Self {
        Self::default()
    }
}

/// `ip_address` is only sent at creation; the API never reports it back
pub(crate) fn domain_state(domain: &Domain, ip_address: Dynamic) -> DynamicValue {
    state_of([
        ("id", Dynamic::from(domain.name.clone())),
        ("name", Dynamic::from(domain.name.clone())),
        ("ip_address", ip_address),
        ("ttl", Dynamic::from(domain.ttl)),
        ("urn", Dynamic::from(domain.urn())),
    ])
}

#[async_trait]
impl Resource for DomainResource {
    fn type_name(&self) -> &str {
        "abrha_domain"
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
            .description("Manages a DNS domain")
            .attribute(
                AttributeBuilder::new("id", AttributeType::String)
                    .description("The domain name")
                    .computed()
                    .plan_modifier(UseStateForUnknown)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("name", AttributeType::String)
                    .description("The name of the domain")
                    .required()
                    .plan_modifier(RequiresReplace)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("ip_address", AttributeType::String)
                    .description("IP address for an initial A record at the apex")
                    .optional()
                    .validator(IsIpAddress)
                    .plan_modifier(RequiresReplace)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("ttl", AttributeType::Number)
                    .description("TTL of the zone's SOA record")
                    .computed()
                    .plan_modifier(UseStateForUnknown)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("urn", AttributeType::String)
                    .description("The uniform resource name of the domain")
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

        if let Some(name) = request.config.opt_string(&AttributePath::new("name")) {
            if name.ends_with('.') {
                diagnostics.push(
                    Diagnostic::error(
                        "Invalid domain name",
                        format!("\"{}\" must not end with a dot", name),
                    )
                    .with_attribute(AttributePath::new("name")),
                );
            }
        }

        ValidateResourceConfigResponse { diagnostics }
    }

    async fn create(&self, _ctx: Context, request: CreateResourceRequest) -> CreateResourceResponse {
        let Some(provider_data) = &self.provider_data else {
            return CreateResourceResponse {
                new_state: request.planned_state,
                diagnostics: vec![not_configured()],
            };
        };

        let name = match required_string(&request.config, "name") {
            Ok(name) => name,
            Err(diag) => {
                return CreateResourceResponse {
                    new_state: request.planned_state,
                    diagnostics: vec![diag],
                }
            }
        };
        let ip_address = request.config.opt_string(&AttributePath::new("ip_address"));

        tracing::info!("Creating domain {}", name);
        let create_request = DomainCreateRequest {
            name: name.clone(),
            ip_address: ip_address.clone(),
        };
        match provider_data.client.domains().create(&create_request).await {
            Ok(domain) => CreateResourceResponse {
                new_state: domain_state(&domain, Dynamic::from(ip_address)),
                diagnostics: vec![],
            },
            Err(e) => CreateResourceResponse {
                new_state: request.planned_state,
                diagnostics: vec![Diagnostic::error(
                    "Error creating domain",
                    format!("{}: {}", name, e),
                )],
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

        let name = match required_string(&request.current_state, "name") {
            Ok(name) => name,
            Err(_) => {
                return ReadResourceResponse {
                    new_state: None,
                    diagnostics: vec![],
                }
            }
        };

        match provider_data.client.domains().get(&name).await {
            Ok(domain) => ReadResourceResponse {
                new_state: Some(domain_state(
                    &domain,
                    carried(&request.current_state, "ip_address"),
                )),
                diagnostics: vec![],
            },
            Err(e) if e.is_not_found() => {
                tracing::warn!("Domain {} not found, removing from state", name);
                ReadResourceResponse {
                    new_state: None,
                    diagnostics: vec![],
                }
            }
            Err(e) => ReadResourceResponse {
                new_state: Some(request.current_state),
                diagnostics: vec![Diagnostic::error(
                    "Error retrieving domain",
                    format!("{}: {}", name, e),
                )],
            },
        }
    }

    async fn update(&self, _ctx: Context, request: UpdateResourceRequest) -> UpdateResourceResponse {
        // every configurable attribute forces replacement
        UpdateResourceResponse {
            new_state: request.planned_state,
            diagnostics: vec![],
        }
    }

    async fn delete(&self, _ctx: Context, request: DeleteResourceRequest) -> DeleteResourceResponse {
        let Some(provider_data) = &self.provider_data else {
            return DeleteResourceResponse {
                diagnostics: vec![not_configured()],
            };
        };
        let Ok(name) = required_string(&request.prior_state, "name") else {
            return DeleteResourceResponse {
                diagnostics: vec![],
            };
        };

        tracing::info!("Deleting domain {}", name);
        match provider_data.client.domains().delete(&name).await {
            Ok(()) => DeleteResourceResponse {
                diagnostics: vec![],
            },
            Err(e) if e.is_not_found() => DeleteResourceResponse {
                diagnostics: vec![],
            },
            Err(e) => DeleteResourceResponse {
                diagnostics: vec![Diagnostic::error(
                    "Error deleting domain",
                    format!("{}: {}", name, e),
                )],
            },
        }
    }

    fn importer(&self) -> Option<&dyn ResourceWithImportState> {
        Some(self)
    }
}

#[async_trait]
impl ResourceWithConfigure for DomainResource {
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
impl ResourceWithImportState for DomainResource {
    async fn import_state(
        &self,
        _ctx: Context,
        request: ImportResourceStateRequest,
    ) -> ImportResourceStateResponse {
        let mut response = ImportResourceStateResponse {
            imported_resources: vec![],
            diagnostics: vec![],
        };
        import_state_passthrough_id(AttributePath::new("name"), &request, &mut response);
        for imported in &mut response.imported_resources {
            if let Err(e) = imported
                .state
                .set_string(&AttributePath::new("id"), request.id.clone())
            {
                response
                    .diagnostics
                    .push(Diagnostic::error("Failed to set import ID", e.to_string()));
            }
        }
        response
    }
}
