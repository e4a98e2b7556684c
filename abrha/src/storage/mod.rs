//! Object storage (S3-compatible "Spaces") access
//!
//! Buckets live in storage regions, each with its own endpoint. Resources
//! ask the [`StorageConnector`] for a region-bound [`ObjectStorage`] and
//! work through that trait only.

pub mod memory;
pub mod s3;

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Object storage is not configured: {0}")]
    NotConfigured(String),

    #[error("Invalid storage request: {0}")]
    InvalidRequest(String),

    #[error("Object storage request failed: {0}")]
    Service(String),

    #[error("Failed to read object storage response: {0}")]
    Io(String),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Canned ACL of a bucket or object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CannedAcl {
    #[default]
    Private,
    PublicRead,
}

impl CannedAcl {
    pub const VALUES: [&'static str; 2] = ["private", "public-read"];

    pub fn as_str(self) -> &'static str {
        match self {
            CannedAcl::Private => "private",
            CannedAcl::PublicRead => "public-read",
        }
    }
}

impl FromStr for CannedAcl {
    type Err = StorageError;

    fn from_str(s: &str) -> StorageResult<Self> {
        match s {
            "private" => Ok(CannedAcl::Private),
            "public-read" => Ok(CannedAcl::PublicRead),
            other => Err(StorageError::InvalidRequest(format!(
                "unsupported ACL \"{}\"",
                other
            ))),
        }
    }
}

impl fmt::Display for CannedAcl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BucketSummary {
    pub name: String,
    pub region: String,
    pub creation_date: Option<String>,
}

/// Everything needed to write one object
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PutObject {
    pub bucket: String,
    pub key: String,
    pub body: Vec<u8>,
    pub acl: CannedAcl,
    pub content_type: Option<String>,
    pub cache_control: Option<String>,
    pub content_disposition: Option<String>,
    pub content_encoding: Option<String>,
    pub content_language: Option<String>,
    pub website_redirect: Option<String>,
    pub metadata: HashMap<String, String>,
}

/// Object attributes as reported by a HEAD request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectHead {
    pub etag: Option<String>,
    pub version_id: Option<String>,
    pub content_type: Option<String>,
    pub cache_control: Option<String>,
    pub content_disposition: Option<String>,
    pub content_encoding: Option<String>,
    pub content_language: Option<String>,
    pub website_redirect: Option<String>,
    pub metadata: HashMap<String, String>,
}

/// Operations against the object storage of a single region
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    fn region(&self) -> &str;

    /// `https://{bucket}.{region}.<storage domain>` style endpoint host
    fn bucket_domain_name(&self, bucket: &str) -> String;

    async fn list_buckets(&self) -> StorageResult<Vec<BucketSummary>>;

    async fn bucket_exists(&self, bucket: &str) -> StorageResult<bool>;

    async fn create_bucket(&self, bucket: &str, acl: CannedAcl) -> StorageResult<()>;

    async fn delete_bucket(&self, bucket: &str) -> StorageResult<()>;

    async fn bucket_acl(&self, bucket: &str) -> StorageResult<CannedAcl>;

    async fn set_bucket_acl(&self, bucket: &str, acl: CannedAcl) -> StorageResult<()>;

    async fn versioning_enabled(&self, bucket: &str) -> StorageResult<bool>;

    async fn set_versioning(&self, bucket: &str, enabled: bool) -> StorageResult<()>;

    /// Deletes every object version and delete marker; returns how many
    async fn empty_bucket(&self, bucket: &str) -> StorageResult<usize>;

    async fn put_object(&self, object: &PutObject) -> StorageResult<ObjectHead>;

    /// `None` when the object does not exist
    async fn head_object(&self, bucket: &str, key: &str) -> StorageResult<Option<ObjectHead>>;

    async fn set_object_acl(&self, bucket: &str, key: &str, acl: CannedAcl) -> StorageResult<()>;

    /// Version ids of `key`, newest first; empty for unversioned buckets
    async fn object_versions(&self, bucket: &str, key: &str) -> StorageResult<Vec<String>>;

    async fn delete_object(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> StorageResult<()>;

    /// `None` when the bucket has no policy
    async fn bucket_policy(&self, bucket: &str) -> StorageResult<Option<String>>;

    async fn put_bucket_policy(&self, bucket: &str, policy: &str) -> StorageResult<()>;

    async fn delete_bucket_policy(&self, bucket: &str) -> StorageResult<()>;
}

/// Hands out region-bound storage clients
pub trait StorageConnector: Send + Sync {
    fn connect(&self, region: &str) -> StorageResult<Arc<dyn ObjectStorage>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canned_acl_parses_known_values_only() {
        assert_eq!("private".parse::<CannedAcl>().unwrap(), CannedAcl::Private);
        assert_eq!(
            "public-read".parse::<CannedAcl>().unwrap(),
            CannedAcl::PublicRead
        );
        assert!("authenticated-read".parse::<CannedAcl>().is_err());
        assert_eq!(CannedAcl::PublicRead.to_string(), "public-read");
    }
}
