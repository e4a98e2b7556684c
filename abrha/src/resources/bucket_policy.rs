//! Access policy attached to a bucket

use async_trait::async_trait;
use std::sync::Arc;
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
use tfplug::validator::IsJson;

use super::bucket::storage_failed;
use super::{not_configured, provider_data_from, required_string, state_of};
use crate::storage::ObjectStorage;
use crate::AbrhaProviderData;

/// Same document regardless of whitespace and key order
pub fn policies_equivalent(a: &str, b: &str) -> bool {
    match (
        serde_json::from_str::<serde_json::Value>(a),
        serde_json::from_str::<serde_json::Value>(b),
    ) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PolicyModel {
    pub region: String,
    pub bucket: String,
    pub policy: String,
}

impl PolicyModel {
    pub fn from_config(config: &DynamicValue) -> Result<Self, Diagnostic> {
        Ok(Self {
            region: required_string(config, "region")?,
            bucket: required_string(config, "bucket")?,
            policy: required_string(config, "policy")?,
        })
    }

    pub fn into_state(self) -> DynamicValue {
        state_of([
            ("id", Dynamic::from(self.bucket.clone())),
            ("region", Dynamic::from(self.region)),
            ("bucket", Dynamic::from(self.bucket)),
            ("policy", Dynamic::from(self.policy)),
        ])
    }
}

#[derive(Default)]
pub struct BucketPolicyResource {
    provider_data: Option<AbrhaProviderData>,
}

impl BucketPolicyResource {
    pub fn new() -> Self {
        Self::default()
    }

    fn prepare(
        provider_data: &AbrhaProviderData,
        value: &DynamicValue,
    ) -> Result<(PolicyModel, Arc<dyn ObjectStorage>), Diagnostic> {
        let model = PolicyModel::from_config(value)?;
        let storage = provider_data
            .storage_in(&model.region)
            .map_err(|e| storage_failed("connecting to", "object storage", e))?;
        Ok((model, storage))
    }

    async fn apply(
        provider_data: &AbrhaProviderData,
        planned: DynamicValue,
    ) -> (DynamicValue, Vec<Diagnostic>) {
        let (model, storage) = match Self::prepare(provider_data, &planned) {
            Ok(prepared) => prepared,
            Err(diag) => return (planned, vec![diag]),
        };
        tracing::info!("Putting policy on bucket {}", model.bucket);
        match storage.put_bucket_policy(&model.bucket, &model.policy).await {
            Ok(()) => (model.into_state(), vec![]),
            Err(e) => (planned, vec![storage_failed("putting policy on", "bucket", e)]),
        }
    }
}

#[async_trait]
impl Resource for BucketPolicyResource {
    fn type_name(&self) -> &str {
        "abrha_bucket_policy"
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
            .description("Manages the access policy of a storage bucket")
            .attribute(
                AttributeBuilder::new("id", AttributeType::String)
                    .computed()
                    .plan_modifier(UseStateForUnknown)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("region", AttributeType::String)
                    .description("The region of the bucket")
                    .required()
                    .plan_modifier(RequiresReplace)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("bucket", AttributeType::String)
                    .description("The bucket the policy applies to")
                    .required()
                    .plan_modifier(RequiresReplace)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("policy", AttributeType::String)
                    .description("The policy document as JSON")
                    .required()
                    .validator(IsJson)
                    .plan_modifier(SuppressEquivalent::new(
                        "Ignores whitespace and key order differences",
                        |prior: &str, planned: &str, _config: &DynamicValue| {
                            policies_equivalent(prior, planned)
                        },
                    ))
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
        for name in ["bucket", "policy"] {
            let path = AttributePath::new(name);
            let blank = match request.config.get(&path) {
                None | Some(Dynamic::Null) => true,
                Some(Dynamic::String(s)) => s.trim().is_empty(),
                Some(_) => false,
            };
            if blank {
                diagnostics.push(
                    Diagnostic::error("Invalid bucket policy", format!("`{}` must not be empty", name))
                        .with_attribute(path),
                );
            }
        }

        // Valid JSON that is not a document, e.g. `[]` or `"x"`
        if let Some(policy) = request.config.opt_string(&AttributePath::new("policy")) {
            if let Ok(parsed) = serde_json::from_str::<serde_json::Value>(&policy) {
                if !parsed.is_object() {
                    diagnostics.push(
                        Diagnostic::error(
                            "Invalid bucket policy",
                            "the policy must be a JSON object",
                        )
                        .with_attribute(AttributePath::new("policy")),
                    );
                }
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
        let (new_state, diagnostics) = Self::apply(provider_data, request.planned_state).await;
        CreateResourceResponse {
            new_state,
            diagnostics,
        }
    }

    async fn read(&self, _ctx: Context, request: ReadResourceRequest) -> ReadResourceResponse {
        let Some(provider_data) = &self.provider_data else {
            return ReadResourceResponse {
                new_state: Some(request.current_state),
                diagnostics: vec![not_configured()],
            };
        };
        let (mut model, storage) = match Self::prepare(provider_data, &request.current_state) {
            Ok(prepared) => prepared,
            Err(diag) => {
                return ReadResourceResponse {
                    new_state: Some(request.current_state),
                    diagnostics: vec![diag],
                }
            }
        };

        match storage.bucket_policy(&model.bucket).await {
            Ok(Some(policy)) => {
                // keep the configured formatting when the documents match
                if !policies_equivalent(&model.policy, &policy) {
                    model.policy = policy;
                }
                ReadResourceResponse {
                    new_state: Some(model.into_state()),
                    diagnostics: vec![],
                }
            }
            Ok(None) => {
                tracing::warn!("Bucket {} has no policy, removing from state", model.bucket);
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
                diagnostics: vec![storage_failed("retrieving policy of", "bucket", e)],
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
        let (new_state, diagnostics) = Self::apply(provider_data, request.planned_state).await;
        UpdateResourceResponse {
            new_state,
            diagnostics,
        }
    }

    async fn delete(&self, _ctx: Context, request: DeleteResourceRequest) -> DeleteResourceResponse {
        let Some(provider_data) = &self.provider_data else {
            return DeleteResourceResponse {
                diagnostics: vec![not_configured()],
            };
        };
        let (model, storage) = match Self::prepare(provider_data, &request.prior_state) {
            Ok(prepared) => prepared,
            Err(diag) => {
                return DeleteResourceResponse {
                    diagnostics: vec![diag],
                }
            }
        };

        tracing::info!("Removing policy from bucket {}", model.bucket);
        match storage.delete_bucket_policy(&model.bucket).await {
            Ok(()) => DeleteResourceResponse {
                diagnostics: vec![],
            },
            Err(e) if e.is_not_found() => DeleteResourceResponse {
                diagnostics: vec![],
            },
            Err(e) => DeleteResourceResponse {
                diagnostics: vec![storage_failed("deleting policy of", "bucket", e)],
            },
        }
    }

    fn importer(&self) -> Option<&dyn ResourceWithImportState> {
        Some(self)
    }
}

#[async_trait]
impl ResourceWithConfigure for BucketPolicyResource {
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
impl ResourceWithImportState for BucketPolicyResource {
    async fn import_state(
        &self,
        _ctx: Context,
        request: ImportResourceStateRequest,
    ) -> ImportResourceStateResponse {
        let Some(provider_data) = &self.provider_data else {
            return import_failed(not_configured());
        };
        let parts = match split_import_id(&request.id, 2, "<region>,<bucket>") {
            Ok(parts) => parts,
            Err(diag) => return import_failed(diag),
        };
        let (region, bucket) = (&parts[0], &parts[1]);

        let policy = match provider_data.storage_in(region) {
            Ok(storage) => storage.bucket_policy(bucket).await,
            Err(e) => Err(e),
        };
        match policy {
            Ok(Some(policy)) => imported(
                &request.type_name,
                PolicyModel {
                    region: region.clone(),
                    bucket: bucket.clone(),
                    policy,
                }
                .into_state(),
            ),
            Ok(None) => import_failed(Diagnostic::error(
                "Cannot import non-existent bucket policy",
                format!("bucket {} in {} has no policy", bucket, region),
            )),
            Err(e) => import_failed(storage_failed("retrieving policy of", "bucket", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryConnector;
    use crate::storage::{CannedAcl, StorageConnector};
    use crate::test_support::{configure_resource, provider_data, value};
    use tfplug::schema::Schema;

    const POLICY: &str = r#"{"Version":"2012-10-17","Statement":[{"Effect":"Allow","Principal":"*","Action":"s3:GetObject","Resource":"arn:aws:s3:::site/*"}]}"#;
    const POLICY_REFORMATTED: &str = r#"{
  "Statement": [{"Action": "s3:GetObject", "Effect": "Allow", "Principal": "*", "Resource": "arn:aws:s3:::site/*"}],
  "Version": "2012-10-17"
}"#;

    async fn setup() -> (BucketPolicyResource, MemoryConnector) {
        let (data, storage) = provider_data("http://127.0.0.1:1");
        storage
            .connect("fra1")
            .unwrap()
            .create_bucket("site", CannedAcl::Private)
            .await
            .unwrap();
        let mut resource = BucketPolicyResource::new();
        configure_resource(&mut resource, &data).await;
        (resource, storage)
    }

    fn config(policy: &str) -> DynamicValue {
        value(&[
            ("region", Dynamic::from("fra1")),
            ("bucket", Dynamic::from("site")),
            ("policy", Dynamic::from(policy)),
        ])
    }

    async fn schema(resource: &BucketPolicyResource) -> Schema {
        resource
            .schema(Context::new(), ResourceSchemaRequest)
            .await
            .schema
    }

    #[test]
    fn reformatted_policy_is_equivalent() {
        assert!(policies_equivalent(POLICY, POLICY_REFORMATTED));
        assert!(!policies_equivalent(POLICY, r#"{"Version":"2012-10-17"}"#));
    }

    #[tokio::test]
    async fn plan_ignores_formatting_changes() {
        let (resource, _) = setup().await;
        let schema = schema(&resource).await;
        let mut prior = config(POLICY);
        prior.set_string(&AttributePath::new("id"), "site").unwrap();

        let plan = schema.plan(&prior, &config(POLICY_REFORMATTED));
        assert!(plan.diagnostics.is_empty(), "{:?}", plan.diagnostics);
        assert_eq!(
            plan.planned_state.get_string(&AttributePath::new("policy")).unwrap(),
            POLICY
        );
        assert!(plan.requires_replace.is_empty());
    }

    #[tokio::test]
    async fn invalid_json_is_rejected() {
        let (resource, _) = setup().await;
        let schema = schema(&resource).await;
        let diagnostics = schema.validate(&config("{not json"));
        assert!(diagnostics.iter().any(|d| d.is_error()));
    }

    #[tokio::test]
    async fn validate_rejects_blank_bucket_and_policy() {
        let (resource, _) = setup().await;
        let resource = &resource;
        let validate = move |config: DynamicValue| {
            resource.validate(
                Context::new(),
                ValidateResourceConfigRequest {
                    type_name: "abrha_bucket_policy".into(),
                    config,
                },
            )
        };

        assert!(validate(config(POLICY)).await.diagnostics.is_empty());

        let blank_bucket = value(&[
            ("region", Dynamic::from("fra1")),
            ("bucket", Dynamic::from("  ")),
            ("policy", Dynamic::from(POLICY)),
        ]);
        let diagnostics = validate(blank_bucket).await.diagnostics;
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute, Some(AttributePath::new("bucket")));

        let missing_policy = value(&[
            ("region", Dynamic::from("fra1")),
            ("bucket", Dynamic::from("site")),
        ]);
        let diagnostics = validate(missing_policy).await.diagnostics;
        assert_eq!(diagnostics[0].attribute, Some(AttributePath::new("policy")));

        let diagnostics = validate(config("[]")).await.diagnostics;
        assert_eq!(diagnostics[0].attribute, Some(AttributePath::new("policy")));
    }

    #[tokio::test]
    async fn validate_accepts_unknown_values() {
        let (resource, _) = setup().await;
        let config = value(&[
            ("bucket", Dynamic::Unknown),
            ("policy", Dynamic::Unknown),
        ]);
        let response = resource
            .validate(
                Context::new(),
                ValidateResourceConfigRequest {
                    type_name: "abrha_bucket_policy".into(),
                    config,
                },
            )
            .await;
        assert!(response.diagnostics.is_empty(), "{:?}", response.diagnostics);
    }

    #[tokio::test]
    async fn create_read_delete() {
        let (resource, storage) = setup().await;
        let fra1 = storage.connect("fra1").unwrap();
        let created = resource
            .create(
                Context::new(),
                CreateResourceRequest {
                    type_name: "abrha_bucket_policy".into(),
                    planned_state: config(POLICY),
                    config: config(POLICY),
                },
            )
            .await;
        assert!(created.diagnostics.is_empty(), "{:?}", created.diagnostics);
        assert_eq!(fra1.bucket_policy("site").await.unwrap().as_deref(), Some(POLICY));

        // a stored document that only differs in layout keeps the configured text
        fra1.put_bucket_policy("site", POLICY_REFORMATTED).await.unwrap();
        let read = resource
            .read(
                Context::new(),
                ReadResourceRequest {
                    type_name: "abrha_bucket_policy".into(),
                    current_state: created.new_state.clone(),
                },
            )
            .await;
        assert_eq!(
            read.new_state
                .unwrap()
                .get_string(&AttributePath::new("policy"))
                .unwrap(),
            POLICY
        );

        let deleted = resource
            .delete(
                Context::new(),
                DeleteResourceRequest {
                    type_name: "abrha_bucket_policy".into(),
                    prior_state: created.new_state,
                },
            )
            .await;
        assert!(deleted.diagnostics.is_empty());
        assert!(fra1.bucket_policy("site").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn import_reads_existing_policy() {
        let (resource, storage) = setup().await;
        storage
            .connect("fra1")
            .unwrap()
            .put_bucket_policy("site", POLICY)
            .await
            .unwrap();

        let response = resource
            .import_state(
                Context::new(),
                ImportResourceStateRequest {
                    type_name: "abrha_bucket_policy".into(),
                    id: "fra1,site".into(),
                },
            )
            .await;
        assert!(response.diagnostics.is_empty(), "{:?}", response.diagnostics);
        let state = &response.imported_resources[0].state;
        assert_eq!(state.get_string(&AttributePath::new("policy")).unwrap(), POLICY);
        assert_eq!(state.get_string(&AttributePath::new("id")).unwrap(), "site");
    }
}
