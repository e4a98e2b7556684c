//! S3 implementation of [`ObjectStorage`] on `aws-sdk-s3`

use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::primitives::{ByteStream, DateTimeFormat};
use aws_sdk_s3::types::{
    BucketCannedAcl, BucketLocationConstraint, BucketVersioningStatus, CreateBucketConfiguration,
    ObjectCannedAcl, Permission, VersioningConfiguration,
};
use aws_sdk_s3::Client;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::{
    BucketSummary, CannedAcl, ObjectHead, ObjectStorage, PutObject, StorageConnector,
    StorageError, StorageResult,
};

pub const DEFAULT_ENDPOINT_TEMPLATE: &str = "https://{region}.abrhaspaces.net";

const ALL_USERS_GROUP: &str = "http://acs.amazonaws.com/groups/global/AllUsers";

/// Builds one S3 client per region from shared credentials
pub struct S3Connector {
    access_id: Option<String>,
    secret_key: Option<String>,
    endpoint_template: String,
    clients: Mutex<HashMap<String, Arc<dyn ObjectStorage>>>,
}

impl S3Connector {
    /// `endpoint_template` contains a `{region}` placeholder
    pub fn new(
        access_id: Option<String>,
        secret_key: Option<String>,
        endpoint_template: impl Into<String>,
    ) -> Self {
        Self {
            access_id,
            secret_key,
            endpoint_template: endpoint_template.into(),
            clients: Mutex::new(HashMap::new()),
        }
    }

    pub fn endpoint_for(&self, region: &str) -> String {
        self.endpoint_template.replace("{region}", region)
    }
}

impl StorageConnector for S3Connector {
    fn connect(&self, region: &str) -> StorageResult<Arc<dyn ObjectStorage>> {
        let (access_id, secret_key) = match (&self.access_id, &self.secret_key) {
            (Some(id), Some(key)) => (id.clone(), key.clone()),
            _ => {
                return Err(StorageError::NotConfigured(
                    "spaces_access_id and spaces_secret_key must be set (or SPACES_ACCESS_KEY_ID and SPACES_SECRET_ACCESS_KEY)"
                        .to_string(),
                ))
            }
        };

        let mut clients = self
            .clients
            .lock()
            .map_err(|_| StorageError::Service("storage client cache poisoned".to_string()))?;
        if let Some(existing) = clients.get(region) {
            return Ok(existing.clone());
        }

        let endpoint = self.endpoint_for(region);
        tracing::debug!("Creating object storage client for {} at {}", region, endpoint);

        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .endpoint_url(endpoint.clone())
            .credentials_provider(Credentials::new(access_id, secret_key, None, None, "abrha"))
            .build();

        let storage: Arc<dyn ObjectStorage> = Arc::new(S3Storage {
            client: Client::from_conf(config),
            region: region.to_string(),
            endpoint,
        });
        clients.insert(region.to_string(), storage.clone());
        Ok(storage)
    }
}

pub struct S3Storage {
    client: Client,
    region: String,
    endpoint: String,
}

fn is_not_found_error<E: std::fmt::Debug>(err: &SdkError<E>) -> bool {
    err.raw_response()
        .is_some_and(|raw| raw.status().as_u16() == 404)
}

fn service_error<E>(action: &str, err: SdkError<E>) -> StorageError
where
    E: std::error::Error + Send + Sync + 'static,
{
    StorageError::Service(format!("{}: {}", action, DisplayErrorContext(&err)))
}

fn bucket_not_found(bucket: &str) -> StorageError {
    StorageError::NotFound(format!("bucket {}", bucket))
}

#[async_trait]
impl ObjectStorage for S3Storage {
    fn region(&self) -> &str {
        &self.region
    }

    fn bucket_domain_name(&self, bucket: &str) -> String {
        let host = self
            .endpoint
            .trim_start_matches("https://")
            .trim_start_matches("http://");
        format!("{}.{}", bucket, host)
    }

    async fn list_buckets(&self) -> StorageResult<Vec<BucketSummary>> {
        let output = self
            .client
            .list_buckets()
            .send()
            .await
            .map_err(|e| service_error("listing buckets", e))?;

        Ok(output
            .buckets()
            .iter()
            .filter_map(|bucket| {
                bucket.name().map(|name| BucketSummary {
                    name: name.to_string(),
                    region: self.region.clone(),
                    creation_date: bucket
                        .creation_date()
                        .and_then(|d| d.fmt(DateTimeFormat::DateTime).ok()),
                })
            })
            .collect())
    }

    async fn bucket_exists(&self, bucket: &str) -> StorageResult<bool> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(err) if is_not_found_error(&err) => Ok(false),
            Err(err) => Err(service_error("checking bucket", err)),
        }
    }

    async fn create_bucket(&self, bucket: &str, acl: CannedAcl) -> StorageResult<()> {
        let configuration = CreateBucketConfiguration::builder()
            .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
            .build();
        self.client
            .create_bucket()
            .bucket(bucket)
            .acl(BucketCannedAcl::from(acl.as_str()))
            .create_bucket_configuration(configuration)
            .send()
            .await
            .map_err(|e| service_error("creating bucket", e))?;
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> StorageResult<()> {
        match self.client.delete_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(()),
            Err(err) if is_not_found_error(&err) => Err(bucket_not_found(bucket)),
            Err(err) => Err(service_error("deleting bucket", err)),
        }
    }

    async fn bucket_acl(&self, bucket: &str) -> StorageResult<CannedAcl> {
        let output = match self.client.get_bucket_acl().bucket(bucket).send().await {
            Ok(output) => output,
            Err(err) if is_not_found_error(&err) => return Err(bucket_not_found(bucket)),
            Err(err) => return Err(service_error("reading bucket ACL", err)),
        };

        let public = output.grants().iter().any(|grant| {
            grant.permission() == Some(&Permission::Read)
                && grant
                    .grantee()
                    .and_then(|grantee| grantee.uri())
                    .is_some_and(|uri| uri == ALL_USERS_GROUP)
        });
        Ok(if public {
            CannedAcl::PublicRead
        } else {
            CannedAcl::Private
        })
    }

    async fn set_bucket_acl(&self, bucket: &str, acl: CannedAcl) -> StorageResult<()> {
        self.client
            .put_bucket_acl()
            .bucket(bucket)
            .acl(BucketCannedAcl::from(acl.as_str()))
            .send()
            .await
            .map_err(|e| service_error("updating bucket ACL", e))?;
        Ok(())
    }

    async fn versioning_enabled(&self, bucket: &str) -> StorageResult<bool> {
        let output = match self.client.get_bucket_versioning().bucket(bucket).send().await {
            Ok(output) => output,
            Err(err) if is_not_found_error(&err) => return Err(bucket_not_found(bucket)),
            Err(err) => return Err(service_error("reading bucket versioning", err)),
        };
        Ok(output.status() == Some(&BucketVersioningStatus::Enabled))
    }

    async fn set_versioning(&self, bucket: &str, enabled: bool) -> StorageResult<()> {
        let status = if enabled {
            BucketVersioningStatus::Enabled
        } else {
            BucketVersioningStatus::Suspended
        };
        self.client
            .put_bucket_versioning()
            .bucket(bucket)
            .versioning_configuration(VersioningConfiguration::builder().status(status).build())
            .send()
            .await
            .map_err(|e| service_error("updating bucket versioning", e))?;
        Ok(())
    }

    async fn empty_bucket(&self, bucket: &str) -> StorageResult<usize> {
        let mut deleted = 0;
        let mut key_marker: Option<String> = None;
        let mut version_marker: Option<String> = None;

        loop {
            let output = self
                .client
                .list_object_versions()
                .bucket(bucket)
                .set_key_marker(key_marker.clone())
                .set_version_id_marker(version_marker.clone())
                .send()
                .await
                .map_err(|e| service_error("listing object versions", e))?;

            let entries = output
                .versions()
                .iter()
                .map(|v| (v.key(), v.version_id()))
                .chain(
                    output
                        .delete_markers()
                        .iter()
                        .map(|m| (m.key(), m.version_id())),
                );
            for (key, version_id) in entries {
                if let Some(key) = key {
                    self.delete_object(bucket, key, version_id).await?;
                    deleted += 1;
                }
            }

            if output.is_truncated() != Some(true) {
                break;
            }
            key_marker = output.next_key_marker().map(str::to_string);
            version_marker = output.next_version_id_marker().map(str::to_string);
        }

        Ok(deleted)
    }

    async fn put_object(&self, object: &PutObject) -> StorageResult<ObjectHead> {
        let metadata = (!object.metadata.is_empty()).then(|| object.metadata.clone());
        let output = self
            .client
            .put_object()
            .bucket(&object.bucket)
            .key(&object.key)
            .body(ByteStream::from(object.body.clone()))
            .acl(ObjectCannedAcl::from(object.acl.as_str()))
            .set_content_type(object.content_type.clone())
            .set_cache_control(object.cache_control.clone())
            .set_content_disposition(object.content_disposition.clone())
            .set_content_encoding(object.content_encoding.clone())
            .set_content_language(object.content_language.clone())
            .set_website_redirect_location(object.website_redirect.clone())
            .set_metadata(metadata)
            .send()
            .await
            .map_err(|e| service_error("putting object", e))?;

        Ok(ObjectHead {
            etag: output.e_tag().map(str::to_string),
            version_id: output.version_id().map(str::to_string),
            ..ObjectHead::default()
        })
    }

    async fn head_object(&self, bucket: &str, key: &str) -> StorageResult<Option<ObjectHead>> {
        let output = match self.client.head_object().bucket(bucket).key(key).send().await {
            Ok(output) => output,
            Err(err) if is_not_found_error(&err) => return Ok(None),
            Err(err) => return Err(service_error("reading object", err)),
        };

        Ok(Some(ObjectHead {
            etag: output.e_tag().map(str::to_string),
            version_id: output.version_id().map(str::to_string),
            content_type: output.content_type().map(str::to_string),
            cache_control: output.cache_control().map(str::to_string),
            content_disposition: output.content_disposition().map(str::to_string),
            content_encoding: output.content_encoding().map(str::to_string),
            content_language: output.content_language().map(str::to_string),
            website_redirect: output.website_redirect_location().map(str::to_string),
            metadata: output.metadata().cloned().unwrap_or_default(),
        }))
    }

    async fn set_object_acl(&self, bucket: &str, key: &str, acl: CannedAcl) -> StorageResult<()> {
        self.client
            .put_object_acl()
            .bucket(bucket)
            .key(key)
            .acl(ObjectCannedAcl::from(acl.as_str()))
            .send()
            .await
            .map_err(|e| service_error("updating object ACL", e))?;
        Ok(())
    }

    async fn object_versions(&self, bucket: &str, key: &str) -> StorageResult<Vec<String>> {
        let output = self
            .client
            .list_object_versions()
            .bucket(bucket)
            .prefix(key)
            .send()
            .await
            .map_err(|e| service_error("listing object versions", e))?;

        Ok(output
            .versions()
            .iter()
            .filter(|v| v.key() == Some(key))
            .filter_map(|v| v.version_id().map(str::to_string))
            .filter(|id| id != "null")
            .collect())
    }

    async fn delete_object(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> StorageResult<()> {
        match self
            .client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .set_version_id(version_id.map(str::to_string))
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(err) if is_not_found_error(&err) => Ok(()),
            Err(err) => Err(service_error("deleting object", err)),
        }
    }

    async fn bucket_policy(&self, bucket: &str) -> StorageResult<Option<String>> {
        match self.client.get_bucket_policy().bucket(bucket).send().await {
            Ok(output) => Ok(output.policy().map(str::to_string)),
            Err(err) if is_not_found_error(&err) => Ok(None),
            Err(err) => Err(service_error("reading bucket policy", err)),
        }
    }

    async fn put_bucket_policy(&self, bucket: &str, policy: &str) -> StorageResult<()> {
        self.client
            .put_bucket_policy()
            .bucket(bucket)
            .policy(policy)
            .send()
            .await
            .map_err(|e| service_error("putting bucket policy", e))?;
        Ok(())
    }

    async fn delete_bucket_policy(&self, bucket: &str) -> StorageResult<()> {
        match self.client.delete_bucket_policy().bucket(bucket).send().await {
            Ok(_) => Ok(()),
            Err(err) if is_not_found_error(&err) => Ok(()),
            Err(err) => Err(service_error("deleting bucket policy", err)),
        }
    }
}
