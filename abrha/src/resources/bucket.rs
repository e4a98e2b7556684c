//! Object storage bucket resource

use async_trait::async_trait;
use std::sync::Arc;
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
use tfplug::types::{AttributePath, Diagnostic, Dynamic, DynamicValue};
use tfplug::validator::{StringLengthBetween, StringOneOf};

use super::{not_configured, provider_data_from, required_string, state_of};
use crate::storage::{CannedAcl, ObjectStorage, StorageError};
use crate::AbrhaProviderData;

pub const DEFAULT_REGION: &str = "nyc3";

/// Lowercase DNS label characters and dots, starting and ending
/// alphanumeric, no empty labels
pub fn is_dns_compatible(name: &str) -> bool {
    let edge_ok = |c: Option<char>| c.is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
    edge_ok(name.chars().next())
        && edge_ok(name.chars().last())
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
        && !name.contains("..")
        && name.parse::<std::net::Ipv4Addr>().is_err()
}

pub fn bucket_urn(name: &str) -> String {
    format!("abrha:space:{}", name)
}

/// Bucket FQDN and the endpoint it hangs off
pub fn bucket_location(storage: &dyn ObjectStorage, name: &str) -> (String, String) {
    let domain = storage.bucket_domain_name(name);
    let endpoint = domain
        .strip_prefix(&format!("{}.", name))
        .unwrap_or(&domain)
        .to_string();
    (domain, endpoint)
}

/// Computed attributes derived from where a bucket lives
pub(crate) fn location_attributes(
    storage: &dyn ObjectStorage,
    name: &str,
) -> [(&'static str, Dynamic); 3] {
    let (domain, endpoint) = bucket_location(storage, name);
    [
        ("urn", Dynamic::from(bucket_urn(name))),
        ("bucket_domain_name", Dynamic::from(domain)),
        ("endpoint", Dynamic::from(endpoint)),
    ]
}

pub(crate) fn storage_failed(action: &str, what: &str, e: StorageError) -> Diagnostic {
    Diagnostic::error(format!("Error {} {}", action, what), e.to_string())
}

#[derive(Debug, Clone, PartialEq)]
pub struct BucketModel {
    pub name: String,
    pub region: String,
    pub acl: CannedAcl,
    pub force_destroy: bool,
    pub versioning: bool,
}

impl BucketModel {
    pub fn from_config(config: &DynamicValue) -> Result<Self, Diagnostic> {
        let acl = match config.opt_string(&AttributePath::new("acl")) {
            Some(acl) => acl.parse().map_err(|e: StorageError| {
                Diagnostic::error("Invalid ACL", e.to_string()).with_attribute(AttributePath::new("acl"))
            })?,
            None => CannedAcl::default(),
        };
        Ok(Self {
            name: required_string(config, "name")?,
            region: config
                .opt_string(&AttributePath::new("region"))
                .unwrap_or_else(|| DEFAULT_REGION.to_string()),
            acl,
            force_destroy: config
                .opt_bool(&AttributePath::new("force_destroy"))
                .unwrap_or(false),
            versioning: config
                .opt_bool(&AttributePath::new("versioning"))
                .unwrap_or(false),
        })
    }

    pub fn into_state(&self, storage: &dyn ObjectStorage) -> DynamicValue {
        let mut pairs = vec![
            ("id", Dynamic::from(self.name.clone())),
            ("name", Dynamic::from(self.name.clone())),
            ("region", Dynamic::from(self.region.clone())),
            ("acl", Dynamic::from(self.acl.as_str())),
            ("force_destroy", Dynamic::from(self.force_destroy)),
            ("versioning", Dynamic::from(self.versioning)),
        ];
        pairs.extend(location_attributes(storage, &self.name));
        state_of(pairs)
    }
}

#[derive(Default)]
pub struct BucketResource {
    provider_data: Option<AbrhaProviderData>,
}

impl BucketResource {
    pub fn new() -> Self {
        Self::default()
    }

    fn storage(
        provider_data: &AbrhaProviderData,
        region: &str,
    ) -> Result<Arc<dyn ObjectStorage>, Diagnostic> {
        provider_data
            .storage_in(region)
            .map_err(|e| storage_failed("connecting to", "object storage", e))
    }
}

#[async_trait]
impl Resource for BucketResource {
    fn type_name(&self) -> &str {
        "abrha_bucket"
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
            .description("Manages an object storage bucket")
            .attribute(
                AttributeBuilder::new("id", AttributeType::String)
                    .computed()
                    .plan_modifier(UseStateForUnknown)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("name", AttributeType::String)
                    .description("The name of the bucket")
                    .required()
                    .validator(StringLengthBetween::new(3, 63))
                    .plan_modifier(RequiresReplace)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("region", AttributeType::String)
                    .description("The storage region of the bucket")
                    .optional()
                    .computed()
                    .plan_modifier(UseStateForUnknown)
                    .plan_modifier(RequiresReplace)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("acl", AttributeType::String)
                    .description("Canned ACL applied to the bucket")
                    .optional()
                    .computed()
                    .validator(StringOneOf::new(CannedAcl::VALUES))
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("force_destroy", AttributeType::Bool)
                    .description("Delete all objects when destroying the bucket")
                    .optional()
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("versioning", AttributeType::Bool)
                    .description("Keep every version of every object")
                    .optional()
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("urn", AttributeType::String)
                    .computed()
                    .plan_modifier(UseStateForUnknown)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("bucket_domain_name", AttributeType::String)
                    .description("The FQDN of the bucket")
                    .computed()
                    .plan_modifier(UseStateForUnknown)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("endpoint", AttributeType::String)
                    .description("The FQDN of the bucket without the bucket name")
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
            if !is_dns_compatible(&name) {
                diagnostics.push(
                    Diagnostic::error(
                        "Invalid bucket name",
                        format!(
                            "\"{}\" must be DNS compatible: lowercase letters, digits, dashes and dots",
                            name
                        ),
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
        let prepared = BucketModel::from_config(&request.config)
            .and_then(|model| Self::storage(provider_data, &model.region).map(|s| (model, s)));
        let (model, storage) = match prepared {
            Ok(prepared) => prepared,
            Err(diag) => {
                return CreateResourceResponse {
                    new_state: request.planned_state,
                    diagnostics: vec![diag],
                }
            }
        };

        tracing::info!("Creating bucket {} in {}", model.name, model.region);
        if let Err(e) = storage.create_bucket(&model.name, model.acl).await {
            return CreateResourceResponse {
                new_state: request.planned_state,
                diagnostics: vec![storage_failed("creating", "bucket", e)],
            };
        }
        if model.versioning {
            if let Err(e) = storage.set_versioning(&model.name, true).await {
                // the bucket exists; record it so it can be fixed or destroyed
                let partial = BucketModel {
                    versioning: false,
                    ..model.clone()
                };
                return CreateResourceResponse {
                    new_state: partial.into_state(storage.as_ref()),
                    diagnostics: vec![storage_failed("enabling versioning on", "bucket", e)],
                };
            }
        }

        CreateResourceResponse {
            new_state: model.into_state(storage.as_ref()),
            diagnostics: vec![],
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
        let prepared = BucketModel::from_config(state)
            .and_then(|model| Self::storage(provider_data, &model.region).map(|s| (model, s)));
        let (mut model, storage) = match prepared {
            Ok(prepared) => prepared,
            Err(diag) => {
                return ReadResourceResponse {
                    new_state: Some(request.current_state),
                    diagnostics: vec![diag],
                }
            }
        };

        match storage.bucket_exists(&model.name).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!("Bucket {} not found, removing from state", model.name);
                return ReadResourceResponse {
                    new_state: None,
                    diagnostics: vec![],
                };
            }
            Err(e) => {
                return ReadResourceResponse {
                    new_state: Some(request.current_state),
                    diagnostics: vec![storage_failed("retrieving", "bucket", e)],
                }
            }
        }

        let observed = async {
            model.acl = storage.bucket_acl(&model.name).await?;
            model.versioning = storage.versioning_enabled(&model.name).await?;
            Ok::<_, StorageError>(())
        }
        .await;
        match observed {
            Ok(()) => ReadResourceResponse {
                new_state: Some(model.into_state(storage.as_ref())),
                diagnostics: vec![],
            },
            Err(e) => ReadResourceResponse {
                new_state: Some(request.current_state),
                diagnostics: vec![storage_failed("retrieving", "bucket", e)],
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
        let prepared = BucketModel::from_config(&request.prior_state).and_then(|prior| {
            let mut planned = BucketModel::from_config(&request.config)?;
            // region is computed when left out of the configuration
            planned.region = prior.region.clone();
            Self::storage(provider_data, &prior.region).map(|s| (prior, planned, s))
        });
        let (prior, planned, storage) = match prepared {
            Ok(prepared) => prepared,
            Err(diag) => {
                return UpdateResourceResponse {
                    new_state: request.prior_state,
                    diagnostics: vec![diag],
                }
            }
        };

        if prior.acl != planned.acl {
            tracing::info!("Setting ACL of bucket {} to {}", planned.name, planned.acl);
            if let Err(e) = storage.set_bucket_acl(&planned.name, planned.acl).await {
                return UpdateResourceResponse {
                    new_state: request.prior_state,
                    diagnostics: vec![storage_failed("updating ACL of", "bucket", e)],
                };
            }
        }
        if prior.versioning != planned.versioning {
            tracing::info!(
                "Setting versioning of bucket {} to {}",
                planned.name,
                planned.versioning
            );
            if let Err(e) = storage.set_versioning(&planned.name, planned.versioning).await {
                let partial = BucketModel {
                    versioning: prior.versioning,
                    ..planned
                };
                return UpdateResourceResponse {
                    new_state: partial.into_state(storage.as_ref()),
                    diagnostics: vec![storage_failed("updating versioning of", "bucket", e)],
                };
            }
        }

        UpdateResourceResponse {
            new_state: planned.into_state(storage.as_ref()),
            diagnostics: vec![],
        }
    }

    async fn delete(&self, _ctx: Context, request: DeleteResourceRequest) -> DeleteResourceResponse {
        let Some(provider_data) = &self.provider_data else {
            return DeleteResourceResponse {
                diagnostics: vec![not_configured()],
            };
        };
        let prepared = BucketModel::from_config(&request.prior_state)
            .and_then(|model| Self::storage(provider_data, &model.region).map(|s| (model, s)));
        let (model, storage) = match prepared {
            Ok(prepared) => prepared,
            Err(diag) => {
                return DeleteResourceResponse {
                    diagnostics: vec![diag],
                }
            }
        };

        if model.force_destroy {
            match storage.empty_bucket(&model.name).await {
                Ok(count) => tracing::info!("Deleted {} objects from bucket {}", count, model.name),
                Err(e) if e.is_not_found() => {
                    return DeleteResourceResponse {
                        diagnostics: vec![],
                    }
                }
                Err(e) => {
                    return DeleteResourceResponse {
                        diagnostics: vec![storage_failed("emptying", "bucket", e)],
                    }
                }
            }
        }

        tracing::info!("Deleting bucket {}", model.name);
        match storage.delete_bucket(&model.name).await {
            Ok(()) => DeleteResourceResponse {
                diagnostics: vec![],
            },
            Err(e) if e.is_not_found() => DeleteResourceResponse {
                diagnostics: vec![],
            },
            Err(e) => DeleteResourceResponse {
                diagnostics: vec![storage_failed("deleting", "bucket", e)],
            },
        }
    }

    fn importer(&self) -> Option<&dyn ResourceWithImportState> {
        Some(self)
    }
}

#[async_trait]
impl ResourceWithConfigure for BucketResource {
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
impl ResourceWithImportState for BucketResource {
    async fn import_state(
        &self,
        _ctx: Context,
        request: ImportResourceStateRequest,
    ) -> ImportResourceStateResponse {
        match split_import_id(&request.id, 2, "<region>,<bucket_name>") {
            Ok(parts) => imported(
                &request.type_name,
                state_of([
                    ("id", Dynamic::from(parts[1].clone())),
                    ("name", Dynamic::from(parts[1].clone())),
                    ("region", Dynamic::from(parts[0].clone())),
                    ("force_destroy", Dynamic::from(false)),
                ]),
            ),
            Err(diag) => import_failed(diag),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryConnector;
    use crate::storage::{PutObject, StorageConnector};
    use crate::test_support::{configure_resource, provider_data, value};

    async fn resource() -> (BucketResource, MemoryConnector) {
        let (data, storage) = provider_data("http://127.0.0.1:1");
        let mut resource = BucketResource::new();
        configure_resource(&mut resource, &data).await;
        (resource, storage)
    }

    async fn create(resource: &BucketResource, config: DynamicValue) -> CreateResourceResponse {
        resource
            .create(
                Context::new(),
                CreateResourceRequest {
                    type_name: "abrha_bucket".into(),
                    planned_state: config.clone(),
                    config,
                },
            )
            .await
    }

    #[test]
    fn dns_compatible_names() {
        assert!(is_dns_compatible("my-bucket.assets"));
        assert!(!is_dns_compatible("My_Bucket"));
        assert!(!is_dns_compatible("-leading"));
        assert!(!is_dns_compatible("double..dot"));
        assert!(!is_dns_compatible("192.168.1.1"));
    }

    #[tokio::test]
    async fn create_then_read_reflects_storage() {
        let (resource, _) = resource().await;
        let response = create(
            &resource,
            value(&[
                ("name", Dynamic::from("assets")),
                ("region", Dynamic::from("fra1")),
                ("acl", Dynamic::from("public-read")),
                ("versioning", Dynamic::from(true)),
            ]),
        )
        .await;
        assert!(response.diagnostics.is_empty(), "{:?}", response.diagnostics);
        let state = response.new_state;
        assert_eq!(state.get_string(&AttributePath::new("urn")).unwrap(), "abrha:space:assets");
        assert_eq!(
            state.get_string(&AttributePath::new("bucket_domain_name")).unwrap(),
            "assets.fra1.memory.local"
        );
        assert_eq!(
            state.get_string(&AttributePath::new("endpoint")).unwrap(),
            "fra1.memory.local"
        );

        let read = resource
            .read(
                Context::new(),
                ReadResourceRequest {
                    type_name: "abrha_bucket".into(),
                    current_state: state,
                },
            )
            .await;
        let state = read.new_state.unwrap();
        assert_eq!(state.get_string(&AttributePath::new("acl")).unwrap(), "public-read");
        assert!(state.get_bool(&AttributePath::new("versioning")).unwrap());
    }

    #[tokio::test]
    async fn region_defaults_when_omitted() {
        let (resource, _) = resource().await;
        let response = create(&resource, value(&[("name", Dynamic::from("logs"))])).await;
        assert_eq!(
            response.new_state.get_string(&AttributePath::new("region")).unwrap(),
            DEFAULT_REGION
        );
    }

    #[tokio::test]
    async fn force_destroy_empties_the_bucket() {
        let (resource, storage) = resource().await;
        let config = value(&[
            ("name", Dynamic::from("full")),
            ("region", Dynamic::from("fra1")),
        ]);
        let state = create(&resource, config).await.new_state;

        let fra1 = storage.connect("fra1").unwrap();
        fra1.put_object(&PutObject {
            bucket: "full".into(),
            key: "a.txt".into(),
            body: b"a".to_vec(),
            ..PutObject::default()
        })
        .await
        .unwrap();

        let refused = resource
            .delete(
                Context::new(),
                DeleteResourceRequest {
                    type_name: "abrha_bucket".into(),
                    prior_state: state.clone(),
                },
            )
            .await;
        assert_eq!(refused.diagnostics.len(), 1);

        let mut forced = state;
        forced
            .set_bool(&AttributePath::new("force_destroy"), true)
            .unwrap();
        let deleted = resource
            .delete(
                Context::new(),
                DeleteResourceRequest {
                    type_name: "abrha_bucket".into(),
                    prior_state: forced,
                },
            )
            .await;
        assert!(deleted.diagnostics.is_empty(), "{:?}", deleted.diagnostics);
        assert!(!fra1.bucket_exists("full").await.unwrap());
    }

    #[tokio::test]
    async fn read_of_missing_bucket_clears_state() {
        let (resource, _) = resource().await;
        let response = resource
            .read(
                Context::new(),
                ReadResourceRequest {
                    type_name: "abrha_bucket".into(),
                    current_state: value(&[
                        ("name", Dynamic::from("ghost")),
                        ("region", Dynamic::from("fra1")),
                    ]),
                },
            )
            .await;
        assert!(response.new_state.is_none());
    }

    #[tokio::test]
    async fn import_splits_region_and_name() {
        let (resource, _) = resource().await;
        let response = resource
            .import_state(
                Context::new(),
                ImportResourceStateRequest {
                    type_name: "abrha_bucket".into(),
                    id: "fra1,assets".into(),
                },
            )
            .await;
        let state = &response.imported_resources[0].state;
        assert_eq!(state.get_string(&AttributePath::new("region")).unwrap(), "fra1");
        assert_eq!(state.get_string(&AttributePath::new("name")).unwrap(), "assets");

        let response = resource
            .import_state(
                Context::new(),
                ImportResourceStateRequest {
                    type_name: "abrha_bucket".into(),
                    id: "assets".into(),
                },
            )
            .await;
        assert!(response.imported_resources.is_empty());
    }
}
