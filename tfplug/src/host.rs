//! In-process plugin host
//!
//! Drives a [`Provider`] the way Terraform core does over the plugin
//! protocol: provider configuration first, then one freshly configured
//! resource or data source instance per operation. Used by provider test
//! suites and by any transport that wants to dispatch into a provider.

use crate::context::Context;
use crate::data_source::{
    ConfigureDataSourceRequest, DataSourceSchemaRequest, DataSourceWithConfigure,
    ValidateDataSourceConfigRequest,
};
use crate::provider::{ConfigureProviderRequest, Provider, ProviderSchemaRequest};
use crate::resource::{
    ConfigureResourceRequest, ImportResourceStateRequest, ImportResourceStateResponse,
    ResourceSchemaRequest, ResourceWithConfigure, ValidateResourceConfigRequest,
};
use crate::schema::{PlannedChange, Schema};
use crate::types::{has_errors, Diagnostic, DynamicValue};
use std::any::Any;
use std::sync::Arc;

pub struct ProviderHost<P: Provider> {
    provider: P,
    provider_data: Option<Arc<dyn Any + Send + Sync>>,
}

impl<P: Provider> ProviderHost<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            provider_data: None,
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn is_configured(&self) -> bool {
        self.provider_data.is_some()
    }

    /// Resource type names, sorted
    pub fn resource_types(&self) -> Vec<String> {
        let mut names: Vec<String> = self.provider.resources().into_keys().collect();
        names.sort();
        names
    }

    /// Data source type names, sorted
    pub fn data_source_types(&self) -> Vec<String> {
        let mut names: Vec<String> = self.provider.data_sources().into_keys().collect();
        names.sort();
        names
    }

    pub async fn provider_schema(&self, ctx: Context) -> Schema {
        self.provider.schema(ctx, ProviderSchemaRequest).await.schema
    }

    pub async fn resource_schema(
        &self,
        ctx: Context,
        type_name: &str,
    ) -> Result<Schema, Vec<Diagnostic>> {
        let response = self
            .new_resource(type_name)?
            .schema(ctx, ResourceSchemaRequest)
            .await;
        if has_errors(&response.diagnostics) {
            return Err(response.diagnostics);
        }
        Ok(response.schema)
    }

    pub async fn data_source_schema(
        &self,
        ctx: Context,
        type_name: &str,
    ) -> Result<Schema, Vec<Diagnostic>> {
        let response = self
            .new_data_source(type_name)?
            .schema(ctx, DataSourceSchemaRequest)
            .await;
        if has_errors(&response.diagnostics) {
            return Err(response.diagnostics);
        }
        Ok(response.schema)
    }

    /// The provider block checked against the provider schema only
    pub async fn validate_provider_config(
        &self,
        ctx: Context,
        config: &DynamicValue,
    ) -> Vec<Diagnostic> {
        self.provider_schema(ctx).await.validate(config)
    }

    /// Validates the provider block against the provider schema, then
    /// configures the provider and keeps its provider data.
    pub async fn configure(
        &mut self,
        ctx: Context,
        terraform_version: &str,
        config: DynamicValue,
    ) -> Vec<Diagnostic> {
        let mut diagnostics = self.validate_provider_config(ctx.clone(), &config).await;
        if has_errors(&diagnostics) {
            return diagnostics;
        }

        let response = self
            .provider
            .configure(
                ctx,
                ConfigureProviderRequest {
                    terraform_version: terraform_version.to_string(),
                    config,
                },
            )
            .await;
        diagnostics.extend(response.diagnostics);
        if !has_errors(&diagnostics) {
            self.provider_data = response.provider_data;
        }
        diagnostics
    }

    fn new_resource(
        &self,
        type_name: &str,
    ) -> Result<Box<dyn ResourceWithConfigure>, Vec<Diagnostic>> {
        let factory = self
            .provider
            .resources()
            .get(type_name)
            .copied()
            .ok_or_else(|| {
                vec![Diagnostic::error(
                    "Unknown resource type",
                    format!("The provider does not support resource type \"{}\"", type_name),
                )]
            })?;
        Ok(factory())
    }

    fn new_data_source(
        &self,
        type_name: &str,
    ) -> Result<Box<dyn DataSourceWithConfigure>, Vec<Diagnostic>> {
        let factory = self
            .provider
            .data_sources()
            .get(type_name)
            .copied()
            .ok_or_else(|| {
                vec![Diagnostic::error(
                    "Unknown data source type",
                    format!("The provider does not support data source \"{}\"", type_name),
                )]
            })?;
        Ok(factory())
    }

    /// A resource instance configured with the provider data
    pub async fn resource(
        &self,
        ctx: Context,
        type_name: &str,
    ) -> Result<Box<dyn ResourceWithConfigure>, Vec<Diagnostic>> {
        let mut resource = self.new_resource(type_name)?;
        let response = resource
            .configure(
                ctx,
                ConfigureResourceRequest {
                    provider_data: self.provider_data.clone(),
                },
            )
            .await;
        if has_errors(&response.diagnostics) {
            return Err(response.diagnostics);
        }
        Ok(resource)
    }

    /// A data source instance configured with the provider data
    pub async fn data_source(
        &self,
        ctx: Context,
        type_name: &str,
    ) -> Result<Box<dyn DataSourceWithConfigure>, Vec<Diagnostic>> {
        let mut data_source = self.new_data_source(type_name)?;
        let response = data_source
            .configure(
                ctx,
                ConfigureDataSourceRequest {
                    provider_data: self.provider_data.clone(),
                },
            )
            .await;
        if has_errors(&response.diagnostics) {
            return Err(response.diagnostics);
        }
        Ok(data_source)
    }

    /// Schema validation followed by the resource's own checks. Works before
    /// the provider is configured, as Terraform validates first.
    pub async fn validate_resource_config(
        &self,
        ctx: Context,
        type_name: &str,
        config: &DynamicValue,
    ) -> Vec<Diagnostic> {
        let resource = match self.new_resource(type_name) {
            Ok(resource) => resource,
            Err(diagnostics) => return diagnostics,
        };
        let schema = resource.schema(ctx.clone(), ResourceSchemaRequest).await.schema;
        let mut diagnostics = schema.validate(config);
        let response = resource
            .validate(
                ctx,
                ValidateResourceConfigRequest {
                    type_name: type_name.to_string(),
                    config: config.clone(),
                },
            )
            .await;
        diagnostics.extend(response.diagnostics);
        diagnostics
    }

    pub async fn validate_data_source_config(
        &self,
        ctx: Context,
        type_name: &str,
        config: &DynamicValue,
    ) -> Vec<Diagnostic> {
        let data_source = match self.new_data_source(type_name) {
            Ok(data_source) => data_source,
            Err(diagnostics) => return diagnostics,
        };
        let schema = data_source
            .schema(ctx.clone(), DataSourceSchemaRequest)
            .await
            .schema;
        let mut diagnostics = schema.validate(config);
        let response = data_source
            .validate(
                ctx,
                ValidateDataSourceConfigRequest {
                    type_name: type_name.to_string(),
                    config: config.clone(),
                },
            )
            .await;
        diagnostics.extend(response.diagnostics);
        diagnostics
    }

    pub async fn plan_resource_change(
        &self,
        ctx: Context,
        type_name: &str,
        prior_state: &DynamicValue,
        config: &DynamicValue,
    ) -> Result<PlannedChange, Vec<Diagnostic>> {
        let schema = self.resource_schema(ctx, type_name).await?;
        Ok(schema.plan(prior_state, config))
    }

    pub async fn import_resource_state(
        &self,
        ctx: Context,
        type_name: &str,
        id: &str,
    ) -> ImportResourceStateResponse {
        let resource = match self.resource(ctx.clone(), type_name).await {
            Ok(resource) => resource,
            Err(diagnostics) => {
                return ImportResourceStateResponse {
                    imported_resources: vec![],
                    diagnostics,
                }
            }
        };

        match resource.importer() {
            Some(importer) => {
                importer
                    .import_state(
                        ctx,
                        ImportResourceStateRequest {
                            type_name: type_name.to_string(),
                            id: id.to_string(),
                        },
                    )
                    .await
            }
            None => ImportResourceStateResponse {
                imported_resources: vec![],
                diagnostics: vec![Diagnostic::error(
                    "Resource Import Not Implemented",
                    format!("Resource type \"{}\" does not support import", type_name),
                )],
            },
        }
    }
}
