//! Container registry resource
//!
//! An account has at most one registry. The subscription tier is changed in
//! place; renaming or moving the registry replaces it.

use async_trait::async_trait;
use tfplug::context::Context;
use tfplug::import::{imported, import_failed};
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
use tfplug::validator::{StringMatches, StringOneOf};

use super::{not_configured, provider_data_from, required_string, state_of};
use crate::api::registry::{Registry, RegistryCreateRequest, REGISTRY_SERVER};
use crate::api::ApiError;
use crate::AbrhaProviderData;

pub const SUBSCRIPTION_TIERS: [&str; 3] = ["starter", "basic", "professional"];

#[derive(Debug, Clone, PartialEq)]
pub struct RegistryModel {
    pub name: String,
    pub subscription_tier_slug: String,
    pub region: Option<String>,
}

impl RegistryModel {
    pub fn from_config(config: &DynamicValue) -> Result<Self, Diagnostic> {
        Ok(Self {
            name: required_string(config, "name")?,
            subscription_tier_slug: required_string(config, "subscription_tier_slug")?,
            region: config.opt_string(&AttributePath::new("region")),
        })
    }

    pub fn into_state(registry: &Registry, tier: &str) -> DynamicValue {
        state_of([
            ("id", Dynamic::from(registry.name.clone())),
            ("name", Dynamic::from(registry.name.clone())),
            ("subscription_tier_slug", Dynamic::from(tier)),
            ("region", Dynamic::from(registry.region.clone())),
            ("endpoint", Dynamic::from(registry.endpoint())),
            ("server_url", Dynamic::from(REGISTRY_SERVER)),
            (
                "storage_usage_bytes",
                Dynamic::Number(registry.storage_usage_bytes as f64),
            ),
            ("created_at", Dynamic::from(registry.created_at.clone())),
        ])
    }
}

#[derive(Default)]
pub struct ContainerRegistryResource {
    provider_data: Option<AbrhaProviderData>,
}

impl ContainerRegistryResource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry plus its current tier; `None` when there is no registry
    /// named `name`
    pub(crate) async fn fetch(
        provider_data: &AbrhaProviderData,
        name: &str,
    ) -> Result<Option<(Registry, String)>, ApiError> {
        let api = provider_data.client.registry();
        let registry = match api.get().await {
            Ok(registry) if registry.name == name => registry,
            Ok(registry) => {
                tracing::warn!(
                    "Container registry is now named {}, not {}",
                    registry.name,
                    name
                );
                return Ok(None);
            }
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };
        let subscription = api.subscription().await?;
        Ok(Some((registry, subscription.tier.slug)))
    }
}

fn operation_failed(action: &str, name: &str, e: impl std::fmt::Display) -> Diagnostic {
    Diagnostic::error(
        format!("Error {} container registry", action),
        format!("{}: {}", name, e),
    )
}

#[async_trait]
impl Resource for ContainerRegistryResource {
    fn type_name(&self) -> &str {
        "abrha_container_registry"
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
        let name_pattern = regex::Regex::new(r"^[a-z0-9-]{1,63}$").ok();
        let mut name = AttributeBuilder::new("name", AttributeType::String)
            .description("The name of the container registry")
            .required()
            .plan_modifier(RequiresReplace);
        if let Some(pattern) = name_pattern {
            name = name.validator(StringMatches::new(
                pattern,
                "lowercase letters, digits and dashes, at most 63 characters",
            ));
        }

        let schema = SchemaBuilder::new()
            .version(0)
            .description("Manages the account's container registry")
            .attribute(
                AttributeBuilder::new("id", AttributeType::String)
                    .computed()
                    .plan_modifier(UseStateForUnknown)
                    .build(),
            )
            .attribute(name.build())
            .attribute(
                AttributeBuilder::new("subscription_tier_slug", AttributeType::String)
                    .description("The subscription tier of the registry")
                    .required()
                    .validator(StringOneOf::new(SUBSCRIPTION_TIERS))
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("region", AttributeType::String)
                    .description("The region the registry is stored in")
                    .optional()
                    .computed()
                    .plan_modifier(UseStateForUnknown)
                    .plan_modifier(RequiresReplace)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("endpoint", AttributeType::String)
                    .description("The URL endpoint of the registry")
                    .computed()
                    .plan_modifier(UseStateForUnknown)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("server_url", AttributeType::String)
                    .description("The domain of the registry server")
                    .computed()
                    .plan_modifier(UseStateForUnknown)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("storage_usage_bytes", AttributeType::Number)
                    .description("Storage used by the registry, in bytes")
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("created_at", AttributeType::String)
                    .description("When the registry was created")
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
        _request: ValidateResourceConfigRequest,
    ) -> ValidateResourceConfigResponse {
        ValidateResourceConfigResponse {
            diagnostics: vec![],
        }
    }

    async fn create(&self, _ctx: Context, request: CreateResourceRequest) -> CreateResourceResponse {
        let Some(provider_data) = &self.provider_data else {
            return CreateResourceResponse {
                new_state: request.planned_state,
                diagnostics: vec![not_configured()],
            };
        };
        let model = match RegistryModel::from_config(&request.config) {
            Ok(model) => model,
            Err(diag) => {
                return CreateResourceResponse {
                    new_state: request.planned_state,
                    diagnostics: vec![diag],
                }
            }
        };

        tracing::info!(
            "Creating container registry {} ({})",
            model.name,
            model.subscription_tier_slug
        );
        let create_request = RegistryCreateRequest {
            name: model.name.clone(),
            subscription_tier_slug: model.subscription_tier_slug.clone(),
            region: model.region.clone(),
        };
        match provider_data.client.registry().create(&create_request).await {
            Ok(registry) => CreateResourceResponse {
                new_state: RegistryModel::into_state(&registry, &model.subscription_tier_slug),
                diagnostics: vec![],
            },
            Err(e) => CreateResourceResponse {
                new_state: request.planned_state,
                diagnostics: vec![operation_failed("creating", &model.name, e)],
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
            Err(diag) => {
                return ReadResourceResponse {
                    new_state: Some(request.current_state),
                    diagnostics: vec![diag],
                }
            }
        };

        match Self::fetch(provider_data, &name).await {
            Ok(Some((registry, tier))) => ReadResourceResponse {
                new_state: Some(RegistryModel::into_state(&registry, &tier)),
                diagnostics: vec![],
            },
            Ok(None) => {
                tracing::warn!("Container registry {} not found, removing from state", name);
                ReadResourceResponse {
                    new_state: None,
                    diagnostics: vec![],
                }
            }
            Err(e) => ReadResourceResponse {
                new_state: Some(request.current_state),
                diagnostics: vec![operation_failed("retrieving", &name, e)],
            },
        }
    }

    async fn update(&self, _ctx: Context, request: UpdateResourceRequest) -> UpdateResourceResponse {
        let Some(provider_data) = &self.provider_data else {
            return UpdateResourceResponse {
                new_state: request.planned_state,
                diagnostics: vec![not_configured()],
            };
        };
        let model = match RegistryModel::from_config(&request.config) {
            Ok(model) => model,
            Err(diag) => {
                return UpdateResourceResponse {
                    new_state: request.planned_state,
                    diagnostics: vec![diag],
                }
            }
        };

        let prior_tier = request
            .prior_state
            .opt_string(&AttributePath::new("subscription_tier_slug"));
        if prior_tier.as_deref() != Some(model.subscription_tier_slug.as_str()) {
            tracing::info!(
                "Changing container registry {} subscription to {}",
                model.name,
                model.subscription_tier_slug
            );
            if let Err(e) = provider_data
                .client
                .registry()
                .update_subscription(&model.subscription_tier_slug)
                .await
            {
                return UpdateResourceResponse {
                    new_state: request.prior_state,
                    diagnostics: vec![operation_failed("updating", &model.name, e)],
                };
            }
        }

        match Self::fetch(provider_data, &model.name).await {
            Ok(Some((registry, tier))) => UpdateResourceResponse {
                new_state: RegistryModel::into_state(&registry, &tier),
                diagnostics: vec![],
            },
            Ok(None) => UpdateResourceResponse {
                new_state: request.prior_state,
                diagnostics: vec![operation_failed(
                    "updating",
                    &model.name,
                    "registry disappeared during update",
                )],
            },
            Err(e) => UpdateResourceResponse {
                new_state: request.prior_state,
                diagnostics: vec![operation_failed("retrieving", &model.name, e)],
            },
        }
    }

    async fn delete(&self, _ctx: Context, request: DeleteResourceRequest) -> DeleteResourceResponse {
        let Some(provider_data) = &self.provider_data else {
            return DeleteResourceResponse {
                diagnostics: vec![not_configured()],
            };
        };
        let name = required_string(&request.prior_state, "name").unwrap_or_default();

        tracing::info!("Deleting container registry {}", name);
        match provider_data.client.registry().delete().await {
            Ok(()) => DeleteResourceResponse {
                diagnostics: vec![],
            },
            Err(e) if e.is_not_found() => DeleteResourceResponse {
                diagnostics: vec![],
            },
            Err(e) => DeleteResourceResponse {
                diagnostics: vec![operation_failed("deleting", &name, e)],
            },
        }
    }

    fn importer(&self) -> Option<&dyn ResourceWithImportState> {
        Some(self)
    }
}

#[async_trait]
impl ResourceWithConfigure for ContainerRegistryResource {
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
impl ResourceWithImportState for ContainerRegistryResource {
    async fn import_state(
        &self,
        _ctx: Context,
        request: ImportResourceStateRequest,
    ) -> ImportResourceStateResponse {
        if request.id.is_empty() {
            return import_failed(Diagnostic::error(
                "Invalid import ID",
                "Expected the name of the container registry",
            ));
        }
        imported(
            &request.type_name,
            state_of([
                ("id", Dynamic::from(request.id.clone())),
                ("name", Dynamic::from(request.id.clone())),
            ]),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{configure_resource, provider_data, value};
    use mockito::{Matcher, Server, ServerGuard};

    const REGISTRY: &str = r#"{"registry":{"name":"acme","storage_usage_bytes":1024,"created_at":"2024-03-01T10:00:00Z","region":"fra1"}}"#;

    fn subscription(tier: &str) -> String {
        format!(
            r#"{{"subscription":{{"tier":{{"slug":"{}","name":"{}"}},"created_at":"2024-03-01T10:00:00Z","updated_at":"2024-03-01T10:00:00Z"}}}}"#,
            tier, tier
        )
    }

    async fn resource(server: &ServerGuard) -> ContainerRegistryResource {
        let (data, _) = provider_data(&server.url());
        let mut resource = ContainerRegistryResource::new();
        configure_resource(&mut resource, &data).await;
        resource
    }

    #[tokio::test]
    async fn create_populates_endpoints() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/v2/registry")
            .match_body(Matcher::Json(serde_json::json!({
                "name": "acme",
                "subscription_tier_slug": "basic"
            })))
            .with_status(201)
            .with_body(REGISTRY)
            .create_async()
            .await;

        let resource = resource(&server).await;
        let config = value(&[
            ("name", Dynamic::from("acme")),
            ("subscription_tier_slug", Dynamic::from("basic")),
        ]);
        let response = resource
            .create(
                Context::new(),
                CreateResourceRequest {
                    type_name: "abrha_container_registry".into(),
                    planned_state: config.clone(),
                    config,
                },
            )
            .await;

        mock.assert_async().await;
        let state = response.new_state;
        assert_eq!(
            state.get_string(&AttributePath::new("endpoint")).unwrap(),
            "registry.abrha.net/acme"
        );
        assert_eq!(state.get_string(&AttributePath::new("region")).unwrap(), "fra1");
        assert_eq!(
            state.get_number(&AttributePath::new("storage_usage_bytes")).unwrap(),
            1024.0
        );
    }

    #[tokio::test]
    async fn tier_change_updates_subscription_in_place() {
        let mut server = Server::new_async().await;
        let update = server
            .mock("POST", "/v2/registry/subscription")
            .match_body(Matcher::Json(serde_json::json!({"tier_slug": "professional"})))
            .with_body(subscription("professional"))
            .create_async()
            .await;
        let _get = server
            .mock("GET", "/v2/registry")
            .with_body(REGISTRY)
            .create_async()
            .await;
        let _sub = server
            .mock("GET", "/v2/registry/subscription")
            .with_body(subscription("professional"))
            .create_async()
            .await;

        let resource = resource(&server).await;
        let prior = value(&[
            ("name", Dynamic::from("acme")),
            ("subscription_tier_slug", Dynamic::from("basic")),
        ]);
        let config = value(&[
            ("name", Dynamic::from("acme")),
            ("subscription_tier_slug", Dynamic::from("professional")),
        ]);
        let response = resource
            .update(
                Context::new(),
                UpdateResourceRequest {
                    type_name: "abrha_container_registry".into(),
                    prior_state: prior,
                    planned_state: config.clone(),
                    config,
                },
            )
            .await;

        update.assert_async().await;
        assert!(response.diagnostics.is_empty(), "{:?}", response.diagnostics);
        assert_eq!(
            response
                .new_state
                .get_string(&AttributePath::new("subscription_tier_slug"))
                .unwrap(),
            "professional"
        );
    }

    #[tokio::test]
    async fn read_of_renamed_registry_clears_state() {
        let mut server = Server::new_async().await;
        let _get = server
            .mock("GET", "/v2/registry")
            .with_body(REGISTRY)
            .create_async()
            .await;

        let resource = resource(&server).await;
        let response = resource
            .read(
                Context::new(),
                ReadResourceRequest {
                    type_name: "abrha_container_registry".into(),
                    current_state: value(&[("name", Dynamic::from("other"))]),
                },
            )
            .await;
        assert!(response.new_state.is_none());
    }
}
