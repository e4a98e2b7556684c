//! Docker credentials for the container registry
//!
//! Credentials are issued by the API and never read back, so the resource
//! lives in state only. A read after the expiration time issues fresh ones.

use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use tfplug::context::Context;
use tfplug::plan_modifier::{RequiresReplace, UseStateForUnknown};
use tfplug::resource::{
    ConfigureResourceRequest, ConfigureResourceResponse, CreateResourceRequest,
    CreateResourceResponse, DeleteResourceRequest, DeleteResourceResponse, ReadResourceRequest,
    ReadResourceResponse, Resource, ResourceMetadataRequest, ResourceMetadataResponse,
    ResourceSchemaRequest, ResourceSchemaResponse, ResourceWithConfigure,
    UpdateResourceRequest, UpdateResourceResponse, ValidateResourceConfigRequest,
    ValidateResourceConfigResponse,
};
use tfplug::schema::{AttributeBuilder, AttributeType, SchemaBuilder};
use tfplug::types::{AttributePath, Diagnostic, Dynamic, DynamicValue};
use tfplug::validator::{IsWholeNumber, NumberBetween};

use super::{not_configured, provider_data_from, required_string, state_of};
use crate::AbrhaProviderData;

/// 100 years
pub const MAX_EXPIRY_SECONDS: i64 = 3_153_600_000;

#[derive(Debug, Clone, PartialEq)]
pub struct CredentialsModel {
    pub registry_name: String,
    pub write: bool,
    /// 0 issues credentials that never expire
    pub expiry_seconds: i64,
}

impl CredentialsModel {
    pub fn from_config(config: &DynamicValue) -> Result<Self, Diagnostic> {
        Ok(Self {
            registry_name: required_string(config, "registry_name")?,
            write: config.opt_bool(&AttributePath::new("write")).unwrap_or(false),
            expiry_seconds: config
                .opt_i64(&AttributePath::new("expiry_seconds"))
                .unwrap_or(0),
        })
    }

    fn expiration(&self, issued_at: DateTime<Utc>) -> String {
        if self.expiry_seconds > 0 {
            (issued_at + Duration::seconds(self.expiry_seconds))
                .to_rfc3339_opts(SecondsFormat::Secs, true)
        } else {
            String::new()
        }
    }

    pub fn into_state(&self, credentials: String, issued_at: DateTime<Utc>) -> DynamicValue {
        state_of([
            ("id", Dynamic::from(self.registry_name.clone())),
            ("registry_name", Dynamic::from(self.registry_name.clone())),
            ("write", Dynamic::from(self.write)),
            ("expiry_seconds", Dynamic::from(self.expiry_seconds)),
            ("docker_credentials", Dynamic::from(credentials)),
            ("credential_expiration_time", Dynamic::from(self.expiration(issued_at))),
        ])
    }
}

/// Whether credentials expiring at `expiration` need re-issuing at `now`.
/// Empty or unparsable times never expire.
pub fn is_expired(expiration: &str, now: DateTime<Utc>) -> bool {
    DateTime::parse_from_rfc3339(expiration)
        .map(|at| at.with_timezone(&Utc) <= now)
        .unwrap_or(false)
}

#[derive(Default)]
pub struct RegistryCredentialsResource {
    provider_data: Option<AbrhaProviderData>,
}

impl RegistryCredentialsResource {
    pub fn new() -> Self {
        Self::default()
    }

    async fn issue(
        provider_data: &AbrhaProviderData,
        model: &CredentialsModel,
    ) -> Result<DynamicValue, Diagnostic> {
        tracing::info!(
            "Issuing {} docker credentials for {}",
            if model.write { "read-write" } else { "read-only" },
            model.registry_name
        );
        let credentials = provider_data
            .client
            .registry()
            .docker_credentials(model.write, Some(model.expiry_seconds))
            .await
            .map_err(|e| {
                Diagnostic::error(
                    "Error retrieving docker credentials",
                    format!("{}: {}", model.registry_name, e),
                )
            })?;
        Ok(model.into_state(credentials, Utc::now()))
    }
}

#[async_trait]
impl Resource for RegistryCredentialsResource {
    fn type_name(&self) -> &str {
        "abrha_container_registry_docker_credentials"
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
            .description("Docker credentials for the container registry")
            .attribute(
                AttributeBuilder::new("id", AttributeType::String)
                    .computed()
                    .plan_modifier(UseStateForUnknown)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("registry_name", AttributeType::String)
                    .description("The name of the container registry")
                    .required()
                    .plan_modifier(RequiresReplace)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("write", AttributeType::Bool)
                    .description("Whether the credentials allow pushing images")
                    .optional()
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("expiry_seconds", AttributeType::Number)
                    .description("Lifetime of the credentials in seconds; 0 never expires")
                    .optional()
                    .computed()
                    .validator(NumberBetween::new(0.0, MAX_EXPIRY_SECONDS as f64))
                    .validator(IsWholeNumber)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("docker_credentials", AttributeType::String)
                    .description("Docker config.json content for the registry")
                    .computed()
                    .sensitive()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("credential_expiration_time", AttributeType::String)
                    .description("When the credentials expire (RFC 3339)")
                    .computed()
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
        let issued = match CredentialsModel::from_config(&request.config) {
            Ok(model) => Self::issue(provider_data, &model).await,
            Err(diag) => Err(diag),
        };
        match issued {
            Ok(new_state) => CreateResourceResponse {
                new_state,
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
        let expiration = request
            .current_state
            .opt_string(&AttributePath::new("credential_expiration_time"))
            .unwrap_or_default();
        if !is_expired(&expiration, Utc::now()) {
            return ReadResourceResponse {
                new_state: Some(request.current_state),
                diagnostics: vec![],
            };
        }

        tracing::info!("Docker credentials expired at {}, re-issuing", expiration);
        let issued = match CredentialsModel::from_config(&request.current_state) {
            Ok(model) => Self::issue(provider_data, &model).await,
            Err(diag) => Err(diag),
        };
        match issued {
            Ok(new_state) => ReadResourceResponse {
                new_state: Some(new_state),
                diagnostics: vec![],
            },
            Err(diag) => ReadResourceResponse {
                new_state: Some(request.current_state),
                diagnostics: vec![diag],
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
        let issued = match CredentialsModel::from_config(&request.config) {
            Ok(model) => Self::issue(provider_data, &model).await,
            Err(diag) => Err(diag),
        };
        match issued {
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

    async fn delete(&self, _ctx: Context, _request: DeleteResourceRequest) -> DeleteResourceResponse {
        // nothing to revoke remotely
        DeleteResourceResponse {
            diagnostics: vec![],
        }
    }
}

#[async_trait]
impl ResourceWithConfigure for RegistryCredentialsResource {
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
