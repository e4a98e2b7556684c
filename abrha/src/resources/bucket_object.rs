//! Object stored in a bucket

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::collections::HashMap;
use std::sync::Arc;
use tfplug::context::Context;
use tfplug::plan_modifier::{RequiresReplace, UseStateForUnknown};
use tfplug::resource::{
    ConfigureResourceRequest, ConfigureResourceResponse, CreateResourceRequest,
    CreateResourceResponse, DeleteResourceRequest, DeleteResourceResponse, ReadResourceRequest,
    ReadResourceResponse, Resource, ResourceMetadataRequest, ResourceMetadataResponse,
    ResourceSchemaRequest, ResourceSchemaResponse, ResourceWithConfigure, UpdateResourceRequest,
    UpdateResourceResponse, ValidateResourceConfigRequest, ValidateResourceConfigResponse,
};
use tfplug::schema::{AttributeBuilder, AttributeType, SchemaBuilder};
use tfplug::types::{AttributePath, Diagnostic, Dynamic, DynamicValue};
use tfplug::validator::StringOneOf;

use super::bucket::storage_failed;
use super::{not_configured, provider_data_from, required_string, state_of};
use crate::storage::{CannedAcl, ObjectHead, ObjectStorage, PutObject, StorageError};
use crate::AbrhaProviderData;

/// Optional string headers, by attribute name
const HEADERS: [&str; 6] = [
    "content_type",
    "cache_control",
    "content_disposition",
    "content_encoding",
    "content_language",
    "website_redirect",
];

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectModel {
    pub region: String,
    pub bucket: String,
    pub key: String,
    pub content: Option<String>,
    pub content_base64: Option<String>,
    pub acl: CannedAcl,
    pub headers: HashMap<&'static str, String>,
    pub metadata: HashMap<String, String>,
    pub force_destroy: bool,
}

impl ObjectModel {
    pub fn from_config(config: &DynamicValue) -> Result<Self, Diagnostic> {
        let acl = match config.opt_string(&AttributePath::new("acl")) {
            Some(acl) => acl.parse().map_err(|e: StorageError| {
                Diagnostic::error("Invalid ACL", e.to_string()).with_attribute(AttributePath::new("acl"))
            })?,
            None => CannedAcl::default(),
        };
        let headers = HEADERS
            .iter()
            .filter_map(|name| {
                config
                    .opt_string(&AttributePath::new(*name))
                    .map(|v| (*name, v))
            })
            .collect();
        let metadata = match config.get(&AttributePath::new("metadata")) {
            Some(Dynamic::Map(entries)) => entries
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect(),
            _ => HashMap::new(),
        };
        Ok(Self {
            region: required_string(config, "region")?,
            bucket: required_string(config, "bucket")?,
            key: required_string(config, "key")?,
            content: config.opt_string(&AttributePath::new("content")),
            content_base64: config.opt_string(&AttributePath::new("content_base64")),
            acl,
            headers,
            metadata,
            force_destroy: config
                .opt_bool(&AttributePath::new("force_destroy"))
                .unwrap_or(false),
        })
    }

    pub fn body(&self) -> Result<Vec<u8>, Diagnostic> {
        match (&self.content, &self.content_base64) {
            (Some(content), None) => Ok(content.as_bytes().to_vec()),
            (None, Some(encoded)) => BASE64.decode(encoded).map_err(|e| {
                Diagnostic::error("Invalid content_base64", e.to_string())
                    .with_attribute(AttributePath::new("content_base64"))
            }),
            _ => Err(Diagnostic::error(
                "Invalid object content",
                "exactly one of content or content_base64 must be set",
            )),
        }
    }

    pub fn to_put(&self) -> Result<PutObject, Diagnostic> {
        let header = |name: &str| self.headers.get(name).cloned();
        Ok(PutObject {
            bucket: self.bucket.clone(),
            key: self.key.clone(),
            body: self.body()?,
            acl: self.acl,
            content_type: header("content_type"),
            cache_control: header("cache_control"),
            content_disposition: header("content_disposition"),
            content_encoding: header("content_encoding"),
            content_language: header("content_language"),
            website_redirect: header("website_redirect"),
            metadata: self.metadata.clone(),
        })
    }

    /// Headers and metadata as the store reports them; content stays as configured
    pub fn observe(&mut self, head: &ObjectHead) {
        let observed = [
            ("content_type", &head.content_type),
            ("cache_control", &head.cache_control),
            ("content_disposition", &head.content_disposition),
            ("content_encoding", &head.content_encoding),
            ("content_language", &head.content_language),
            ("website_redirect", &head.website_redirect),
        ];
        self.headers = observed
            .into_iter()
            .filter_map(|(name, v)| v.clone().map(|v| (name, v)))
            .collect();
        self.metadata = head.metadata.clone();
    }

    pub fn into_state(&self, head: &ObjectHead) -> DynamicValue {
        let opt = |v: Option<&String>| v.cloned().map(Dynamic::from).unwrap_or(Dynamic::Null);
        let mut pairs = vec![
            ("id", Dynamic::from(self.key.clone())),
            ("region", Dynamic::from(self.region.clone())),
            ("bucket", Dynamic::from(self.bucket.clone())),
            ("key", Dynamic::from(self.key.clone())),
            ("content", opt(self.content.as_ref())),
            ("content_base64", opt(self.content_base64.as_ref())),
            ("acl", Dynamic::from(self.acl.as_str())),
            ("force_destroy", Dynamic::from(self.force_destroy)),
            ("etag", opt(head.etag.as_ref())),
            ("version_id", opt(head.version_id.as_ref())),
            (
                "metadata",
                Dynamic::Map(
                    self.metadata
                        .iter()
                        .map(|(k, v)| (k.clone(), Dynamic::from(v.clone())))
                        .collect(),
                ),
            ),
        ];
        pairs.extend(
            HEADERS
                .iter()
                .map(|name| (*name, opt(self.headers.get(name)))),
        );
        state_of(pairs)
    }
}

#[derive(Default)]
pub struct BucketObjectResource {
    provider_data: Option<AbrhaProviderData>,
}

impl BucketObjectResource {
    pub fn new() -> Self {
        Self::default()
    }

    fn prepare(
        provider_data: &AbrhaProviderData,
        value: &DynamicValue,
    ) -> Result<(ObjectModel, Arc<dyn ObjectStorage>), Diagnostic> {
        let model = ObjectModel::from_config(value)?;
        let storage = provider_data
            .storage_in(&model.region)
            .map_err(|e| storage_failed("connecting to", "object storage", e))?;
        Ok((model, storage))
    }

    async fn upload(
        storage: &dyn ObjectStorage,
        model: &ObjectModel,
    ) -> Result<ObjectHead, Diagnostic> {
        let put = model.to_put()?;
        tracing::info!("Uploading {} bytes to {}/{}", put.body.len(), put.bucket, put.key);
        storage
            .put_object(&put)
            .await
            .map_err(|e| storage_failed("uploading", "object", e))
    }
}

#[async_trait]
impl Resource for BucketObjectResource {
    fn type_name(&self) -> &str {
        "abrha_bucket_object"
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
        let mut builder = SchemaBuilder::new()
            .version(0)
            .description("Manages an object in a storage bucket")
            .attribute(
                AttributeBuilder::new("id", AttributeType::String)
                    .computed()
                    .plan_modifier(UseStateForUnknown)
                    .build(),
            );
        for (name, description) in [
            ("region", "The region of the bucket"),
            ("bucket", "The bucket to store the object in"),
            ("key", "The name of the object"),
        ] {
            builder = builder.attribute(
                AttributeBuilder::new(name, AttributeType::String)
                    .description(description)
                    .required()
                    .plan_modifier(RequiresReplace)
                    .build(),
            );
        }
        for (name, description) in [
            ("content", "Literal UTF-8 content of the object"),
            ("content_base64", "Base64 encoded binary content of the object"),
        ] {
            builder = builder.attribute(
                AttributeBuilder::new(name, AttributeType::String)
                    .description(description)
                    .optional()
                    .plan_modifier(RequiresReplace)
                    .build(),
            );
        }
        for name in HEADERS {
            builder = builder.attribute(
                AttributeBuilder::new(name, AttributeType::String)
                    .optional()
                    .computed()
                    .build(),
            );
        }
        let schema = builder
            .attribute(
                AttributeBuilder::new("acl", AttributeType::String)
                    .description("Canned ACL applied to the object")
                    .optional()
                    .computed()
                    .validator(StringOneOf::new(CannedAcl::VALUES))
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("metadata", AttributeType::Map(Box::new(AttributeType::String)))
                    .description("User metadata stored with the object")
                    .optional()
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("force_destroy", AttributeType::Bool)
                    .description("Delete every version of the object on destroy")
                    .optional()
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("etag", AttributeType::String)
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("version_id", AttributeType::String)
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
        let config = &request.config;
        let set = |name: &str| {
            config
                .get(&AttributePath::new(name))
                .is_some_and(|v| !v.is_null())
        };
        let mut diagnostics = vec![];
        if set("content") == set("content_base64") {
            diagnostics.push(Diagnostic::error(
                "Invalid object content",
                "exactly one of content or content_base64 must be set",
            ));
        }
        if let Some(encoded) = config.opt_string(&AttributePath::new("content_base64")) {
            if let Err(e) = BASE64.decode(&encoded) {
                diagnostics.push(
                    Diagnostic::error("Invalid content_base64", e.to_string())
                        .with_attribute(AttributePath::new("content_base64")),
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
        let (mut model, storage) = match Self::prepare(provider_data, &request.config) {
            Ok(prepared) => prepared,
            Err(diag) => {
                return CreateResourceResponse {
                    new_state: request.planned_state,
                    diagnostics: vec![diag],
                }
            }
        };

        match Self::upload(storage.as_ref(), &model).await {
            Ok(head) => {
                model.observe(&head);
                CreateResourceResponse {
                    new_state: model.into_state(&head),
                    diagnostics: vec![],
                }
            }
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
        let (mut model, storage) = match Self::prepare(provider_data, &request.current_state) {
            Ok(prepared) => prepared,
            Err(diag) => {
                return ReadResourceResponse {
                    new_state: Some(request.current_state),
                    diagnostics: vec![diag],
                }
            }
        };

        match storage.head_object(&model.bucket, &model.key).await {
            Ok(Some(head)) => {
                model.observe(&head);
                ReadResourceResponse {
                    new_state: Some(model.into_state(&head)),
                    diagnostics: vec![],
                }
            }
            Ok(None) => {
                tracing::warn!("Object {}/{} not found, removing from state", model.bucket, model.key);
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
                diagnostics: vec![storage_failed("retrieving", "object", e)],
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
        let prepared = Self::prepare(provider_data, &request.config).and_then(|(planned, storage)| {
            ObjectModel::from_config(&request.prior_state).map(|prior| (prior, planned, storage))
        });
        let (prior, mut planned, storage) = match prepared {
            Ok(prepared) => prepared,
            Err(diag) => {
                return UpdateResourceResponse {
                    new_state: request.prior_state,
                    diagnostics: vec![diag],
                }
            }
        };

        let headers_changed = HEADERS
            .iter()
            .any(|name| planned.headers.get(name).is_some_and(|v| prior.headers.get(name) != Some(v)))
            || (!planned.metadata.is_empty() && planned.metadata != prior.metadata);

        // headers can only change by writing the object again
        let head = if headers_changed {
            match Self::upload(storage.as_ref(), &planned).await {
                Ok(head) => head,
                Err(diag) => {
                    return UpdateResourceResponse {
                        new_state: request.prior_state,
                        diagnostics: vec![diag],
                    }
                }
            }
        } else {
            if prior.acl != planned.acl {
                tracing::info!("Setting ACL of {}/{} to {}", planned.bucket, planned.key, planned.acl);
                if let Err(e) = storage
                    .set_object_acl(&planned.bucket, &planned.key, planned.acl)
                    .await
                {
                    return UpdateResourceResponse {
                        new_state: request.prior_state,
                        diagnostics: vec![storage_failed("updating ACL of", "object", e)],
                    };
                }
            }
            match storage.head_object(&planned.bucket, &planned.key).await {
                Ok(Some(head)) => head,
                Ok(None) => {
                    return UpdateResourceResponse {
                        new_state: request.prior_state,
                        diagnostics: vec![Diagnostic::error(
                            "Error updating object",
                            format!("{}/{} no longer exists", planned.bucket, planned.key),
                        )],
                    }
                }
                Err(e) => {
                    return UpdateResourceResponse {
                        new_state: request.prior_state,
                        diagnostics: vec![storage_failed("retrieving", "object", e)],
                    }
                }
            }
        };

        planned.observe(&head);
        UpdateResourceResponse {
            new_state: planned.into_state(&head),
            diagnostics: vec![],
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

        let result = async {
            let versions = if model.force_destroy {
                storage.object_versions(&model.bucket, &model.key).await?
            } else {
                Vec::new()
            };
            if versions.is_empty() {
                tracing::info!("Deleting object {}/{}", model.bucket, model.key);
                return storage.delete_object(&model.bucket, &model.key, None).await;
            }
            for version in &versions {
                tracing::debug!("Deleting {}/{} version {}", model.bucket, model.key, version);
                storage
                    .delete_object(&model.bucket, &model.key, Some(version))
                    .await?;
            }
            Ok(())
        }
        .await;

        match result {
            Ok(()) => DeleteResourceResponse {
                diagnostics: vec![],
            },
            Err(e) if e.is_not_found() => DeleteResourceResponse {
                diagnostics: vec![],
            },
            Err(e) => DeleteResourceResponse {
                diagnostics: vec![storage_failed("deleting", "object", e)],
            },
        }
    }
}

#[async_trait]
impl ResourceWithConfigure for BucketObjectResource {
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
