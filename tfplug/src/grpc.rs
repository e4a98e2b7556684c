//! gRPC service for Terraform plugin protocol 6
//!
//! [`GrpcProvider`] decodes each call, dispatches it into a [`ProviderHost`]
//! and encodes the answer. Values travel as msgpack in both directions.
//! Provider failures are reported as diagnostics; a [`Status`] error means
//! the request itself could not be decoded.

use crate::context::Context;
use crate::data_source::{DataSource, ReadDataSourceRequest};
use crate::host::ProviderHost;
use crate::proto;
use crate::provider::Provider;
use crate::resource::{
    CreateResourceRequest, DeleteResourceRequest, ReadResourceRequest, Resource,
    ResourceWithConfigure, UpdateResourceRequest,
};
use crate::schema::{AttributeType, Schema};
use crate::types::{
    has_errors, AttributePath, AttributePathStep, Diagnostic, DiagnosticSeverity, Dynamic,
    DynamicValue,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tonic::{Request, Response, Status};

type RpcResult<T> = std::result::Result<Response<T>, Status>;

pub struct GrpcProvider<P: Provider> {
    host: Arc<RwLock<ProviderHost<P>>>,
    ctx: Context,
}

impl<P: Provider + 'static> GrpcProvider<P> {
    pub fn new(provider: P) -> Self {
        Self {
            host: Arc::new(RwLock::new(ProviderHost::new(provider))),
            ctx: Context::new(),
        }
    }

    /// Shared by every call; cancelled by StopProvider
    pub fn context(&self) -> Context {
        self.ctx.clone()
    }
}

#[tonic::async_trait]
impl<P: Provider + 'static> proto::ProviderService for GrpcProvider<P> {
    async fn get_metadata(
        &self,
        _request: Request<proto::get_metadata::Request>,
    ) -> RpcResult<proto::get_metadata::Response> {
        let host = self.host.read().await;
        Ok(Response::new(proto::get_metadata::Response {
            server_capabilities: Some(capabilities()),
            diagnostics: vec![],
            data_sources: host
                .data_source_types()
                .into_iter()
                .map(|type_name| proto::get_metadata::DataSourceMetadata { type_name })
                .collect(),
            resources: host
                .resource_types()
                .into_iter()
                .map(|type_name| proto::get_metadata::ResourceMetadata { type_name })
                .collect(),
        }))
    }

    async fn get_provider_schema(
        &self,
        _request: Request<proto::get_provider_schema::Request>,
    ) -> RpcResult<proto::get_provider_schema::Response> {
        let host = self.host.read().await;
        let mut diagnostics = Vec::new();

        let mut resource_schemas = HashMap::new();
        for type_name in host.resource_types() {
            match host.resource_schema(self.context(), &type_name).await {
                Ok(schema) => {
                    resource_schemas.insert(type_name, schema_to_proto(&schema));
                }
                Err(diags) => diagnostics.extend(diags),
            }
        }

        let mut data_source_schemas = HashMap::new();
        for type_name in host.data_source_types() {
            match host.data_source_schema(self.context(), &type_name).await {
                Ok(schema) => {
                    data_source_schemas.insert(type_name, schema_to_proto(&schema));
                }
                Err(diags) => diagnostics.extend(diags),
            }
        }

        let provider = host.provider_schema(self.context()).await;
        Ok(Response::new(proto::get_provider_schema::Response {
            provider: Some(schema_to_proto(&provider)),
            resource_schemas,
            data_source_schemas,
            diagnostics: diagnostics_to_proto(diagnostics),
            provider_meta: None,
            server_capabilities: Some(capabilities()),
        }))
    }

    async fn validate_provider_config(
        &self,
        request: Request<proto::validate_provider_config::Request>,
    ) -> RpcResult<proto::validate_provider_config::Response> {
        let config = decode(request.into_inner().config)?;
        let host = self.host.read().await;
        let diagnostics = host.validate_provider_config(self.context(), &config).await;
        Ok(Response::new(proto::validate_provider_config::Response {
            diagnostics: diagnostics_to_proto(diagnostics),
        }))
    }

    async fn validate_resource_config(
        &self,
        request: Request<proto::validate_resource_config::Request>,
    ) -> RpcResult<proto::validate_resource_config::Response> {
        let req = request.into_inner();
        let config = decode(req.config)?;
        let host = self.host.read().await;
        let diagnostics = host
            .validate_resource_config(self.context(), &req.type_name, &config)
            .await;
        Ok(Response::new(proto::validate_resource_config::Response {
            diagnostics: diagnostics_to_proto(diagnostics),
        }))
    }

    async fn validate_data_resource_config(
        &self,
        request: Request<proto::validate_data_resource_config::Request>,
    ) -> RpcResult<proto::validate_data_resource_config::Response> {
        let req = request.into_inner();
        let config = decode(req.config)?;
        let host = self.host.read().await;
        let diagnostics = host
            .validate_data_source_config(self.context(), &req.type_name, &config)
            .await;
        Ok(Response::new(proto::validate_data_resource_config::Response {
            diagnostics: diagnostics_to_proto(diagnostics),
        }))
    }

    async fn upgrade_resource_state(
        &self,
        request: Request<proto::upgrade_resource_state::Request>,
    ) -> RpcResult<proto::upgrade_resource_state::Response> {
        let req = request.into_inner();
        let host = self.host.read().await;
        let schema = match host.resource_schema(self.context(), &req.type_name).await {
            Ok(schema) => schema,
            Err(diagnostics) => {
                return Ok(Response::new(proto::upgrade_resource_state::Response {
                    upgraded_state: None,
                    diagnostics: diagnostics_to_proto(diagnostics),
                }))
            }
        };

        let state = match req.raw_state.filter(|raw| !raw.json.is_empty()) {
            Some(raw) => DynamicValue::decode_json(&raw.json)
                .map_err(|e| Status::invalid_argument(e.to_string()))?,
            None => DynamicValue::null(),
        };
        tracing::debug!(
            type_name = %req.type_name,
            from_version = req.version,
            to_version = schema.version,
            "upgrading resource state"
        );

        // Older states only lack attributes added since; conform fills them with null
        let upgraded = conform(&schema, state, true);
        Ok(Response::new(proto::upgrade_resource_state::Response {
            upgraded_state: Some(encode(&upgraded)?),
            diagnostics: vec![],
        }))
    }

    async fn configure_provider(
        &self,
        request: Request<proto::configure_provider::Request>,
    ) -> RpcResult<proto::configure_provider::Response> {
        let req = request.into_inner();
        let config = decode(req.config)?;
        let mut host = self.host.write().await;
        let diagnostics = host
            .configure(self.context(), &req.terraform_version, config)
            .await;
        tracing::info!(
            terraform_version = %req.terraform_version,
            configured = host.is_configured(),
            "provider configured"
        );
        Ok(Response::new(proto::configure_provider::Response {
            diagnostics: diagnostics_to_proto(diagnostics),
        }))
    }

    async fn read_resource(
        &self,
        request: Request<proto::read_resource::Request>,
    ) -> RpcResult<proto::read_resource::Response> {
        let req = request.into_inner();
        let current_state = decode(req.current_state)?;
        let host = self.host.read().await;
        let (schema, resource) =
            match resource_and_schema(&host, self.context(), &req.type_name).await {
                Ok(found) => found,
                Err(diagnostics) => {
                    return Ok(Response::new(proto::read_resource::Response {
                        new_state: None,
                        diagnostics: diagnostics_to_proto(diagnostics),
                        private: req.private,
                    }))
                }
            };

        let response = resource
            .read(
                self.context(),
                ReadResourceRequest {
                    type_name: req.type_name.clone(),
                    current_state,
                },
            )
            .await;
        let new_state = match response.new_state {
            Some(state) => conform(&schema, state, true),
            None => DynamicValue::null(),
        };
        Ok(Response::new(proto::read_resource::Response {
            new_state: Some(encode(&new_state)?),
            diagnostics: diagnostics_to_proto(response.diagnostics),
            private: req.private,
        }))
    }

    async fn plan_resource_change(
        &self,
        request: Request<proto::plan_resource_change::Request>,
    ) -> RpcResult<proto::plan_resource_change::Response> {
        let req = request.into_inner();
        let prior = decode(req.prior_state)?;
        let proposed = decode(req.proposed_new_state)?;
        let config = decode(req.config)?;

        // Equivalent spellings keep the prior value of a configured attribute,
        // which Terraform only accepts from the legacy type system.
        let mut response = proto::plan_resource_change::Response {
            planned_private: req.prior_private,
            legacy_type_system: true,
            ..Default::default()
        };

        if proposed.is_null() {
            response.planned_state = Some(encode(&DynamicValue::null())?);
            return Ok(Response::new(response));
        }

        let host = self.host.read().await;
        match host
            .plan_resource_change(self.context(), &req.type_name, &prior, &config)
            .await
        {
            Ok(planned) => {
                response.planned_state = Some(encode(&planned.planned_state)?);
                response.requires_replace =
                    planned.requires_replace.iter().map(path_to_proto).collect();
                response.diagnostics = diagnostics_to_proto(planned.diagnostics);
            }
            Err(diagnostics) => response.diagnostics = diagnostics_to_proto(diagnostics),
        }
        Ok(Response::new(response))
    }

    async fn apply_resource_change(
        &self,
        request: Request<proto::apply_resource_change::Request>,
    ) -> RpcResult<proto::apply_resource_change::Response> {
        let req = request.into_inner();
        let prior = decode(req.prior_state)?;
        let planned = decode(req.planned_state)?;
        let config = decode(req.config)?;
        let host = self.host.read().await;

        let (schema, resource) =
            match resource_and_schema(&host, self.context(), &req.type_name).await {
                Ok(found) => found,
                Err(diagnostics) => {
                    return Ok(Response::new(proto::apply_resource_change::Response {
                        new_state: Some(encode(&prior)?),
                        private: req.planned_private,
                        diagnostics: diagnostics_to_proto(diagnostics),
                        legacy_type_system: true,
                    }))
                }
            };

        let type_name = req.type_name.clone();
        let (new_state, diagnostics) = if planned.is_null() {
            tracing::debug!(%type_name, "deleting");
            let response = resource
                .delete(
                    self.context(),
                    DeleteResourceRequest {
                        type_name,
                        prior_state: prior.clone(),
                    },
                )
                .await;
            let state = if has_errors(&response.diagnostics) {
                prior
            } else {
                DynamicValue::null()
            };
            (state, response.diagnostics)
        } else if prior.is_null() {
            tracing::debug!(%type_name, "creating");
            let response = resource
                .create(
                    self.context(),
                    CreateResourceRequest {
                        type_name,
                        planned_state: planned.clone(),
                        config,
                    },
                )
                .await;
            // A failed create that produced nothing must not leave a tainted object behind
            let state = if has_errors(&response.diagnostics) && response.new_state == planned {
                DynamicValue::null()
            } else {
                response.new_state
            };
            (state, response.diagnostics)
        } else {
            tracing::debug!(%type_name, "updating");
            let response = resource
                .update(
                    self.context(),
                    UpdateResourceRequest {
                        type_name,
                        prior_state: prior,
                        planned_state: planned,
                        config,
                    },
                )
                .await;
            (response.new_state, response.diagnostics)
        };

        Ok(Response::new(proto::apply_resource_change::Response {
            new_state: Some(encode(&conform(&schema, new_state, true))?),
            private: req.planned_private,
            diagnostics: diagnostics_to_proto(diagnostics),
            legacy_type_system: true,
        }))
    }

    async fn import_resource_state(
        &self,
        request: Request<proto::import_resource_state::Request>,
    ) -> RpcResult<proto::import_resource_state::Response> {
        let req = request.into_inner();
        let host = self.host.read().await;
        let schema = match host.resource_schema(self.context(), &req.type_name).await {
            Ok(schema) => schema,
            Err(diagnostics) => {
                return Ok(Response::new(proto::import_resource_state::Response {
                    imported_resources: vec![],
                    diagnostics: diagnostics_to_proto(diagnostics),
                }))
            }
        };

        let response = host
            .import_resource_state(self.context(), &req.type_name, &req.id)
            .await;
        let imported_resources = response
            .imported_resources
            .into_iter()
            .map(|imported| {
                Ok(proto::import_resource_state::ImportedResource {
                    type_name: imported.type_name,
                    state: Some(encode(&conform(&schema, imported.state, true))?),
                    private: vec![],
                })
            })
            .collect::<Result<Vec<_>, Status>>()?;
        Ok(Response::new(proto::import_resource_state::Response {
            imported_resources,
            diagnostics: diagnostics_to_proto(response.diagnostics),
        }))
    }

    async fn read_data_source(
        &self,
        request: Request<proto::read_data_source::Request>,
    ) -> RpcResult<proto::read_data_source::Response> {
        let req = request.into_inner();
        let config = decode(req.config)?;
        let host = self.host.read().await;

        let found = match host.data_source_schema(self.context(), &req.type_name).await {
            Ok(schema) => host
                .data_source(self.context(), &req.type_name)
                .await
                .map(|data_source| (schema, data_source)),
            Err(diagnostics) => Err(diagnostics),
        };
        let (schema, data_source) = match found {
            Ok(found) => found,
            Err(diagnostics) => {
                return Ok(Response::new(proto::read_data_source::Response {
                    state: None,
                    diagnostics: diagnostics_to_proto(diagnostics),
                }))
            }
        };

        let response = data_source
            .read(
                self.context(),
                ReadDataSourceRequest {
                    type_name: req.type_name.clone(),
                    config,
                },
            )
            .await;
        Ok(Response::new(proto::read_data_source::Response {
            state: Some(encode(&conform(&schema, response.state, true))?),
            diagnostics: diagnostics_to_proto(response.diagnostics),
        }))
    }

    async fn get_functions(
        &self,
        _request: Request<proto::get_functions::Request>,
    ) -> RpcResult<proto::get_functions::Response> {
        Ok(Response::new(proto::get_functions::Response {
            diagnostics: vec![],
        }))
    }

    async fn stop_provider(
        &self,
        _request: Request<proto::stop_provider::Request>,
    ) -> RpcResult<proto::stop_provider::Response> {
        tracing::info!("stop requested, cancelling in-flight operations");
        self.ctx.cancel();
        Ok(Response::new(proto::stop_provider::Response {
            error: String::new(),
        }))
    }
}

async fn resource_and_schema<P: Provider>(
    host: &ProviderHost<P>,
    ctx: Context,
    type_name: &str,
) -> Result<(Schema, Box<dyn ResourceWithConfigure>), Vec<Diagnostic>> {
    let schema = host.resource_schema(ctx.clone(), type_name).await?;
    let resource = host.resource(ctx, type_name).await?;
    Ok((schema, resource))
}

fn capabilities() -> proto::ServerCapabilities {
    proto::ServerCapabilities {
        plan_destroy: false,
        get_provider_schema_optional: false,
        move_resource_state: false,
    }
}

/// Absent or empty values are null. Terraform sends msgpack; json only
/// appears in hand-built requests.
#[allow(clippy::result_large_err)]
fn decode(value: Option<proto::DynamicValue>) -> Result<DynamicValue, Status> {
    let decoded = match value {
        Some(value) if !value.msgpack.is_empty() => DynamicValue::decode_msgpack(&value.msgpack),
        Some(value) if !value.json.is_empty() => DynamicValue::decode_json(&value.json),
        _ => Ok(DynamicValue::null()),
    };
    decoded.map_err(|e| Status::invalid_argument(format!("malformed value: {}", e)))
}

#[allow(clippy::result_large_err)]
fn encode(value: &DynamicValue) -> Result<proto::DynamicValue, Status> {
    let msgpack = value
        .encode_msgpack()
        .map_err(|e| Status::internal(format!("cannot encode value: {}", e)))?;
    Ok(proto::DynamicValue {
        msgpack,
        json: vec![],
    })
}

/// Terraform's JSON type notation
fn type_json(attr_type: &AttributeType) -> serde_json::Value {
    match attr_type {
        AttributeType::String => json!("string"),
        AttributeType::Number => json!("number"),
        AttributeType::Bool => json!("bool"),
        AttributeType::List(element) => json!(["list", type_json(element)]),
        AttributeType::Set(element) => json!(["set", type_json(element)]),
        AttributeType::Map(element) => json!(["map", type_json(element)]),
        AttributeType::Object(fields) => {
            let fields: serde_json::Map<String, serde_json::Value> = fields
                .iter()
                .map(|(name, field)| (name.clone(), type_json(field)))
                .collect();
            json!(["object", fields])
        }
    }
}

fn schema_to_proto(schema: &Schema) -> proto::Schema {
    let attributes = schema
        .block
        .attributes
        .iter()
        .map(|attr| proto::schema::Attribute {
            name: attr.name.clone(),
            r#type: type_json(&attr.r#type).to_string().into_bytes(),
            description: attr.description.clone(),
            required: attr.required,
            optional: attr.optional,
            computed: attr.computed,
            sensitive: attr.sensitive,
            description_kind: proto::StringKind::Plain as i32,
            deprecated: attr.deprecated,
        })
        .collect();

    proto::Schema {
        version: schema.version,
        block: Some(proto::schema::Block {
            version: schema.version,
            attributes,
            description: schema.block.description.clone(),
            description_kind: proto::StringKind::Plain as i32,
            deprecated: schema.block.deprecated,
        }),
    }
}

fn path_to_proto(path: &AttributePath) -> proto::AttributePath {
    use proto::attribute_path::{step::Selector, Step};

    let steps = path
        .steps
        .iter()
        .map(|step| Step {
            selector: Some(match step {
                AttributePathStep::AttributeName(name) => Selector::AttributeName(name.clone()),
                AttributePathStep::ElementKeyString(key) => {
                    Selector::ElementKeyString(key.clone())
                }
                AttributePathStep::ElementKeyInt(index) => Selector::ElementKeyInt(*index),
            }),
        })
        .collect();
    proto::AttributePath { steps }
}

fn diagnostics_to_proto(diagnostics: Vec<Diagnostic>) -> Vec<proto::Diagnostic> {
    diagnostics
        .into_iter()
        .map(|diag| {
            let severity = match diag.severity {
                DiagnosticSeverity::Error => proto::diagnostic::Severity::Error,
                DiagnosticSeverity::Warning => proto::diagnostic::Severity::Warning,
            };
            proto::Diagnostic {
                severity: severity as i32,
                summary: diag.summary,
                detail: diag.detail,
                attribute: diag.attribute.as_ref().map(path_to_proto),
            }
        })
        .collect()
}

/// Shapes an object for Terraform: every schema attribute present and
/// nothing else. `settle` turns leftover unknowns into null, as applied
/// and read states may not contain unknowns.
fn conform(schema: &Schema, value: DynamicValue, settle: bool) -> DynamicValue {
    let mut fields = match value.value {
        Dynamic::Map(fields) => fields,
        other => return DynamicValue::new(other),
    };
    let conformed = schema
        .block
        .attributes
        .iter()
        .map(|attr| {
            let value = fields.remove(&attr.name).unwrap_or(Dynamic::Null);
            let value = if settle { settled(value) } else { value };
            (attr.name.clone(), value)
        })
        .collect();
    DynamicValue::from_map(conformed)
}

fn settled(value: Dynamic) -> Dynamic {
    match value {
        Dynamic::Unknown => Dynamic::Null,
        Dynamic::List(items) => Dynamic::List(items.into_iter().map(settled).collect()),
        Dynamic::Map(fields) => Dynamic::Map(
            fields
                .into_iter()
                .map(|(name, value)| (name, settled(value)))
                .collect(),
        ),
        other => other,
    }
}
