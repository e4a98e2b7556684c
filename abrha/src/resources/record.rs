//! DNS record resource

use async_trait::async_trait;
use tfplug::context::Context;
use tfplug::import::{import_failed, imported, split_import_id};
use tfplug::plan_modifier::{RequiresReplace, SuppressEquivalent, UseStateForUnknown};
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
use tfplug::validator::{IsWholeNumber, NumberBetween, StringLengthBetween, StringOneOf};

use super::{not_configured, provider_data_from, required_i64, required_string, state_of};
use crate::api::records::{DomainRecord, DomainRecordEditRequest};
use crate::dns::{names_equivalent, record_fqdn, values_equivalent};
use crate::AbrhaProviderData;

pub const RECORD_TYPES: [&str; 8] = ["A", "AAAA", "CAA", "CNAME", "MX", "NS", "TXT", "SRV"];
pub const CAA_TAGS: [&str; 3] = ["issue", "issuewild", "iodef"];

/// Attributes a record type cannot do without
fn required_for(record_type: &str) -> &'static [&'static str] {
    match record_type {
        "MX" => &["priority"],
        "SRV" => &["port", "priority", "weight"],
        "CAA" => &["flags", "tag"],
        _ => &[],
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordModel {
    pub domain: String,
    pub record_type: String,
    pub name: String,
    pub value: String,
    pub ttl: Option<i64>,
    pub priority: Option<i64>,
    pub port: Option<i64>,
    pub weight: Option<i64>,
    pub flags: Option<i64>,
    pub tag: Option<String>,
}

impl RecordModel {
    pub fn from_config(config: &DynamicValue) -> Result<Self, Diagnostic> {
        let int = |name: &str| config.opt_i64(&AttributePath::new(name));
        Ok(Self {
            domain: required_string(config, "domain")?,
            record_type: required_string(config, "type")?,
            name: required_string(config, "name")?,
            value: required_string(config, "value")?,
            ttl: int("ttl"),
            priority: int("priority"),
            port: int("port"),
            weight: int("weight"),
            flags: int("flags"),
            tag: config.opt_string(&AttributePath::new("tag")),
        })
    }

    pub fn to_request(&self) -> DomainRecordEditRequest {
        DomainRecordEditRequest {
            record_type: self.record_type.clone(),
            name: self.name.clone(),
            data: self.value.clone(),
            priority: self.priority,
            port: self.port,
            ttl: self.ttl,
            weight: self.weight,
            flags: self.flags,
            tag: self.tag.clone(),
        }
    }

    /// State for `record` in `domain`. Configured spellings of the name and
    /// value are kept while they denote what the API reports.
    pub fn into_state(record: &DomainRecord, domain: &str, prior: Option<&RecordModel>) -> DynamicValue {
        let name = match prior {
            Some(p) if names_equivalent(&p.name, &record.name, domain) => p.name.clone(),
            _ => record.name.clone(),
        };
        let value = match prior {
            Some(p) if values_equivalent(&record.record_type, &p.value, &record.data, domain) => {
                p.value.clone()
            }
            _ => record.data.clone(),
        };

        state_of([
            ("id", Dynamic::from(record.id.to_string())),
            ("domain", Dynamic::from(domain)),
            ("type", Dynamic::from(record.record_type.clone())),
            ("name", Dynamic::from(name)),
            ("value", Dynamic::from(value)),
            ("ttl", Dynamic::from(record.ttl)),
            ("priority", Dynamic::from(record.priority)),
            ("port", Dynamic::from(record.port)),
            ("weight", Dynamic::from(record.weight)),
            ("flags", Dynamic::from(record.flags)),
            ("tag", Dynamic::from(record.tag.clone())),
            ("fqdn", Dynamic::from(record_fqdn(&record.name, domain))),
        ])
    }
}

#[derive(Default)]
pub struct RecordResource {
    provider_data: Option<AbrhaProviderData>,
}

impl RecordResource {
    pub fn new() -> Self {
        Self::default()
    }
}

fn operation_failed(action: &str, domain: &str, e: impl std::fmt::Display) -> Diagnostic {
    Diagnostic::error(
        format!("Error {} domain record", action),
        format!("{}: {}", domain, e),
    )
}

#[async_trait]
impl Resource for RecordResource {
    fn type_name(&self) -> &str {
        "abrha_record"
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
            .version(1)
            .description("Manages a DNS record within a domain")
            .attribute(
                AttributeBuilder::new("id", AttributeType::String)
                    .description("The ID of the record")
                    .computed()
                    .plan_modifier(UseStateForUnknown)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("domain", AttributeType::String)
                    .description("The domain to add the record to")
                    .required()
                    .validator(StringLengthBetween::new(1, 253))
                    .plan_modifier(RequiresReplace)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("type", AttributeType::String)
                    .description("The type of record")
                    .required()
                    .validator(StringOneOf::new(RECORD_TYPES))
                    .plan_modifier(RequiresReplace)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("name", AttributeType::String)
                    .description("The name of the record; use @ for the zone apex")
                    .required()
                    .validator(StringLengthBetween::new(1, 253))
                    .plan_modifier(SuppressEquivalent::new(
                        "relative and fully qualified names are equivalent",
                        |prior: &str, planned: &str, config: &DynamicValue| {
                            config
                                .opt_string(&AttributePath::new("domain"))
                                .map(|domain| names_equivalent(prior, planned, &domain))
                                .unwrap_or(false)
                        },
                    ))
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("value", AttributeType::String)
                    .description("The value of the record")
                    .required()
                    .plan_modifier(SuppressEquivalent::new(
                        "host names with and without the final dot are equivalent",
                        |prior: &str, planned: &str, config: &DynamicValue| {
                            let domain = config.opt_string(&AttributePath::new("domain"));
                            let record_type = config.opt_string(&AttributePath::new("type"));
                            match (domain, record_type) {
                                (Some(domain), Some(record_type)) => {
                                    values_equivalent(&record_type, prior, planned, &domain)
                                }
                                _ => false,
                            }
                        },
                    ))
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("ttl", AttributeType::Number)
                    .description("The time to live for the record, in seconds")
                    .optional()
                    .computed()
                    .validator(NumberBetween::new(1.0, i32::MAX as f64))
                    .validator(IsWholeNumber)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("priority", AttributeType::Number)
                    .description("The priority for MX and SRV records")
                    .optional()
                    .validator(NumberBetween::new(0.0, 65535.0))
                    .validator(IsWholeNumber)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("port", AttributeType::Number)
                    .description("The port for SRV records")
                    .optional()
                    .validator(NumberBetween::new(0.0, 65535.0))
                    .validator(IsWholeNumber)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("weight", AttributeType::Number)
                    .description("The weight for SRV records")
                    .optional()
                    .validator(NumberBetween::new(0.0, 65535.0))
                    .validator(IsWholeNumber)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("flags", AttributeType::Number)
                    .description("The flags of the record (0-255), for CAA records")
                    .optional()
                    .validator(NumberBetween::new(0.0, 255.0))
                    .validator(IsWholeNumber)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("tag", AttributeType::String)
                    .description("The tag of the record, for CAA records")
                    .optional()
                    .validator(StringOneOf::new(CAA_TAGS))
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("fqdn", AttributeType::String)
                    .description("The fully qualified domain name of the record")
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
        request: ValidateResourceConfigRequest,
    ) -> ValidateResourceConfigResponse {
        let mut diagnostics = vec![];
        let Some(record_type) = request.config.opt_string(&AttributePath::new("type")) else {
            return ValidateResourceConfigResponse { diagnostics };
        };

        for attr in required_for(&record_type) {
            let path = AttributePath::new(attr);
            let present = request
                .config
                .get(&path)
                .map(|v| !v.is_null())
                .unwrap_or(false);
            if !present {
                diagnostics.push(
                    Diagnostic::error(
                        "Missing required argument",
                        format!("`{}` is required when type is `{}`", attr, record_type),
                    )
                    .with_attribute(path),
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
        let model = match RecordModel::from_config(&request.config) {
            Ok(model) => model,
            Err(diag) => {
                return CreateResourceResponse {
                    new_state: request.planned_state,
                    diagnostics: vec![diag],
                }
            }
        };

        tracing::info!("Creating {} record {} in {}", model.record_type, model.name, model.domain);
        match provider_data
            .client
            .records(&model.domain)
            .create(&model.to_request())
            .await
        {
            Ok(record) => {
                tracing::info!("Created domain record {}", record.id);
                CreateResourceResponse {
                    new_state: RecordModel::into_state(&record, &model.domain, Some(&model)),
                    diagnostics: vec![],
                }
            }
            Err(e) => CreateResourceResponse {
                new_state: request.planned_state,
                diagnostics: vec![operation_failed("creating", &model.domain, e)],
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
        let state = &request.current_state;
        let (domain, id) = match (required_string(state, "domain"), required_i64(state, "id")) {
            (Ok(domain), Ok(id)) => (domain, id),
            (Err(diag), _) | (_, Err(diag)) => {
                return ReadResourceResponse {
                    new_state: Some(request.current_state),
                    diagnostics: vec![diag],
                }
            }
        };
        // absent after import
        let prior = RecordModel::from_config(state).ok();

        match provider_data.client.records(&domain).get(id).await {
            Ok(record) => ReadResourceResponse {
                new_state: Some(RecordModel::into_state(&record, &domain, prior.as_ref())),
                diagnostics: vec![],
            },
            Err(e) if e.is_not_found() => {
                tracing::warn!("Domain record {} in {} not found, removing from state", id, domain);
                ReadResourceResponse {
                    new_state: None,
                    diagnostics: vec![],
                }
            }
            Err(e) => ReadResourceResponse {
                new_state: Some(request.current_state),
                diagnostics: vec![operation_failed("retrieving", &domain, e)],
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
        let parsed = RecordModel::from_config(&request.config)
            .and_then(|model| required_i64(&request.prior_state, "id").map(|id| (model, id)));
        let (model, id) = match parsed {
            Ok(parsed) => parsed,
            Err(diag) => {
                return UpdateResourceResponse {
                    new_state: request.planned_state,
                    diagnostics: vec![diag],
                }
            }
        };

        tracing::info!("Updating domain record {} in {}", id, model.domain);
        match provider_data
            .client
            .records(&model.domain)
            .update(id, &model.to_request())
            .await
        {
            Ok(record) => UpdateResourceResponse {
                new_state: RecordModel::into_state(&record, &model.domain, Some(&model)),
                diagnostics: vec![],
            },
            Err(e) => UpdateResourceResponse {
                new_state: request.prior_state,
                diagnostics: vec![operation_failed("updating", &model.domain, e)],
            },
        }
    }

    async fn delete(&self, _ctx: Context, request: DeleteResourceRequest) -> DeleteResourceResponse {
        let Some(provider_data) = &self.provider_data else {
            return DeleteResourceResponse {
                diagnostics: vec![not_configured()],
            };
        };
        let state = &request.prior_state;
        let (domain, id) = match (required_string(state, "domain"), required_i64(state, "id")) {
            (Ok(domain), Ok(id)) => (domain, id),
            (Err(diag), _) | (_, Err(diag)) => {
                return DeleteResourceResponse {
                    diagnostics: vec![diag],
                }
            }
        };

        tracing::info!("Deleting domain record {} in {}", id, domain);
        match provider_data.client.records(&domain).delete(id).await {
            Ok(()) => DeleteResourceResponse {
                diagnostics: vec![],
            },
            Err(e) if e.is_not_found() => DeleteResourceResponse {
                diagnostics: vec![],
            },
            Err(e) => DeleteResourceResponse {
                diagnostics: vec![operation_failed("deleting", &domain, e)],
            },
        }
    }

    fn importer(&self) -> Option<&dyn ResourceWithImportState> {
        Some(self)
    }
}

#[async_trait]
impl ResourceWithConfigure for RecordResource {
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
impl ResourceWithImportState for RecordResource {
    async fn import_state(
        &self,
        _ctx: Context,
        request: ImportResourceStateRequest,
    ) -> ImportResourceStateResponse {
        let parts = match split_import_id(&request.id, 2, "domain,record_id") {
            Ok(parts) => parts,
            Err(diag) => return import_failed(diag),
        };
        if parts[1].parse::<i64>().is_err() {
            return import_failed(Diagnostic::error(
                "Invalid import ID",
                format!("Record ID must be an integer, got \"{}\"", parts[1]),
            ));
        }

        imported(
            &request.type_name,
            state_of([
                ("domain", Dynamic::from(parts[0].clone())),
                ("id", Dynamic::from(parts[1].clone())),
            ]),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{configure_resource, provider_data, value};
    use mockito::{Matcher, Server};
    use tfplug::resource::ResourceSchemaRequest;

    fn record_config(record_type: &str, extra: &[(&str, Dynamic)]) -> DynamicValue {
        let mut pairs = vec![
            ("domain", Dynamic::from("example.com")),
            ("type", Dynamic::from(record_type)),
            ("name", Dynamic::from("www")),
            ("value", Dynamic::from("mail.example.com.")),
        ];
        pairs.extend(extra.iter().cloned());
        value(&pairs)
    }

    async fn validate(config: DynamicValue) -> Vec<Diagnostic> {
        RecordResource::new()
            .validate(
                Context::new(),
                ValidateResourceConfigRequest {
                    type_name: "abrha_record".into(),
                    config,
                },
            )
            .await
            .diagnostics
    }

    #[tokio::test]
    async fn mx_requires_priority() {
        let diagnostics = validate(record_config("MX", &[])).await;
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute.as_ref().unwrap().to_string(), "priority");

        let diagnostics = validate(record_config("MX", &[("priority", Dynamic::from(10i64))])).await;
        assert!(diagnostics.is_empty());
    }

    #[tokio::test]
    async fn srv_and_caa_require_their_fields() {
        let diagnostics = validate(record_config("SRV", &[("port", Dynamic::from(5060i64))])).await;
        let missing: Vec<String> = diagnostics
            .iter()
            .map(|d| d.attribute.as_ref().unwrap().to_string())
            .collect();
        assert_eq!(missing, vec!["priority", "weight"]);

        let diagnostics = validate(record_config("CAA", &[("tag", Dynamic::from("issue"))])).await;
        assert_eq!(diagnostics.len(), 1);

        // unknown values will be known at apply time
        let diagnostics = validate(record_config("CAA", &[
            ("tag", Dynamic::from("issue")),
            ("flags", Dynamic::Unknown),
        ]))
        .await;
        assert!(diagnostics.is_empty());
    }

    #[tokio::test]
    async fn plan_suppresses_equivalent_name_and_value() {
        let resource = RecordResource::new();
        let schema = resource
            .schema(Context::new(), ResourceSchemaRequest)
            .await
            .schema;
        let prior = value(&[
            ("id", Dynamic::from("1")),
            ("domain", Dynamic::from("example.com")),
            ("type", Dynamic::from("CNAME")),
            ("name", Dynamic::from("www")),
            ("value", Dynamic::from("target.example.com.")),
            ("ttl", Dynamic::from(1800i64)),
            ("fqdn", Dynamic::from("www.example.com")),
        ]);
        let config = value(&[
            ("domain", Dynamic::from("example.com")),
            ("type", Dynamic::from("CNAME")),
            ("name", Dynamic::from("www.example.com.")),
            ("value", Dynamic::from("target.example.com")),
        ]);

        let plan = schema.plan(&prior, &config);
        let planned = plan.planned_state;
        assert_eq!(planned.get_string(&AttributePath::new("name")).unwrap(), "www");
        assert_eq!(
            planned.get_string(&AttributePath::new("value")).unwrap(),
            "target.example.com."
        );
        assert!(plan.requires_replace.is_empty());
    }

    #[tokio::test]
    async fn fractional_ttl_is_rejected() {
        let schema = RecordResource::new()
            .schema(Context::new(), ResourceSchemaRequest)
            .await
            .schema;
        let diagnostics = schema.validate(&record_config("A", &[("ttl", Dynamic::from(1.5))]));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute, Some(AttributePath::new("ttl")));
    }

    #[tokio::test]
    async fn respelled_name_keeps_computed_attributes() {
        let schema = RecordResource::new()
            .schema(Context::new(), ResourceSchemaRequest)
            .await
            .schema;
        let prior = value(&[
            ("id", Dynamic::from("1")),
            ("domain", Dynamic::from("example.com")),
            ("type", Dynamic::from("A")),
            ("name", Dynamic::from("www")),
            ("value", Dynamic::from("192.0.2.10")),
            ("ttl", Dynamic::from(1800i64)),
            ("fqdn", Dynamic::from("www.example.com")),
        ]);
        let config = value(&[
            ("domain", Dynamic::from("example.com")),
            ("type", Dynamic::from("A")),
            ("name", Dynamic::from("www.example.com.")),
            ("value", Dynamic::from("192.0.2.10")),
        ]);

        let plan = schema.plan(&prior, &config);
        assert!(plan.diagnostics.is_empty(), "{:?}", plan.diagnostics);
        let planned = plan.planned_state;
        assert_eq!(
            planned.get_string(&AttributePath::new("fqdn")).unwrap(),
            "www.example.com"
        );
        assert_eq!(planned.get_number(&AttributePath::new("ttl")).unwrap(), 1800.0);
        assert_eq!(planned.get_string(&AttributePath::new("id")).unwrap(), "1");

        // a real rename still leaves fqdn to be recomputed
        let renamed = value(&[
            ("domain", Dynamic::from("example.com")),
            ("type", Dynamic::from("A")),
            ("name", Dynamic::from("api")),
            ("value", Dynamic::from("192.0.2.10")),
        ]);
        let planned = schema.plan(&prior, &renamed).planned_state;
        assert!(planned.get(&AttributePath::new("fqdn")).unwrap().is_unknown());
    }

    #[tokio::test]
    async fn create_writes_fqdn_and_id() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/v2/domains/example.com/records")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "type": "MX",
                "name": "@",
                "data": "mail.example.com.",
                "priority": 10
            })))
            .with_status(201)
            .with_body(r#"{"domain_record":{"id":3352896,"type":"MX","name":"@","data":"mail.example.com","priority":10,"ttl":1800}}"#)
            .create_async()
            .await;

        let (data, _) = provider_data(&server.url());
        let mut resource = RecordResource::new();
        configure_resource(&mut resource, &data).await;

        let config = value(&[
            ("domain", Dynamic::from("example.com")),
            ("type", Dynamic::from("MX")),
            ("name", Dynamic::from("@")),
            ("value", Dynamic::from("mail.example.com.")),
            ("priority", Dynamic::from(10i64)),
        ]);
        let response = resource
            .create(
                Context::new(),
                CreateResourceRequest {
                    type_name: "abrha_record".into(),
                    planned_state: config.clone(),
                    config,
                },
            )
            .await;

        mock.assert_async().await;
        assert!(response.diagnostics.is_empty(), "{:?}", response.diagnostics);
        let state = response.new_state;
        assert_eq!(state.get_string(&AttributePath::new("id")).unwrap(), "3352896");
        assert_eq!(state.get_string(&AttributePath::new("fqdn")).unwrap(), "example.com");
        // configured spelling survives
        assert_eq!(
            state.get_string(&AttributePath::new("value")).unwrap(),
            "mail.example.com."
        );
    }

    #[tokio::test]
    async fn read_after_import_fills_everything() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/v2/domains/example.com/records/42")
            .with_body(r#"{"domain_record":{"id":42,"type":"A","name":"www","data":"192.0.2.1","ttl":3600}}"#)
            .create_async()
            .await;

        let (data, _) = provider_data(&server.url());
        let mut resource = RecordResource::new();
        configure_resource(&mut resource, &data).await;

        let imported = resource
            .import_state(
                Context::new(),
                ImportResourceStateRequest {
                    type_name: "abrha_record".into(),
                    id: "example.com,42".into(),
                },
            )
            .await;
        let state = imported.imported_resources[0].state.clone();

        let response = resource
            .read(
                Context::new(),
                ReadResourceRequest {
                    type_name: "abrha_record".into(),
                    current_state: state,
                },
            )
            .await;
        let state = response.new_state.unwrap();
        assert_eq!(state.get_string(&AttributePath::new("type")).unwrap(), "A");
        assert_eq!(state.get_string(&AttributePath::new("value")).unwrap(), "192.0.2.1");
        assert_eq!(
            state.get_string(&AttributePath::new("fqdn")).unwrap(),
            "www.example.com"
        );
    }

    #[tokio::test]
    async fn import_rejects_malformed_ids() {
        let resource = RecordResource::new();
        for id in ["example.com", "example.com,abc"] {
            let response = resource
                .import_state(
                    Context::new(),
                    ImportResourceStateRequest {
                        type_name: "abrha_record".into(),
                        id: id.into(),
                    },
                )
                .await;
            assert!(response.imported_resources.is_empty());
            assert_eq!(response.diagnostics.len(), 1);
        }
    }
}
