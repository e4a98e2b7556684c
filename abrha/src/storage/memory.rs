//! In-process object storage
//!
//! Keeps buckets and objects in memory. Useful for driving the bucket
//! resources without a live endpoint.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{
    BucketSummary, CannedAcl, ObjectHead, ObjectStorage, PutObject, StorageConnector,
    StorageError, StorageResult,
};

#[derive(Debug, Clone)]
struct StoredObject {
    head: ObjectHead,
    acl: CannedAcl,
    body: Vec<u8>,
}

#[derive(Debug, Default)]
struct StoredBucket {
    acl: CannedAcl,
    versioning: bool,
    policy: Option<String>,
    /// key -> versions, oldest first
    objects: BTreeMap<String, Vec<StoredObject>>,
    next_version: u64,
}

#[derive(Debug, Default)]
struct Regions {
    buckets: HashMap<String, BTreeMap<String, StoredBucket>>,
}

/// Connector whose regions share one in-memory store
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    state: Arc<Mutex<Regions>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Body of the latest version of an object, for assertions
    pub fn object_body(&self, region: &str, bucket: &str, key: &str) -> Option<Vec<u8>> {
        let state = self.state.lock().ok()?;
        state
            .buckets
            .get(region)?
            .get(bucket)?
            .objects
            .get(key)?
            .last()
            .map(|o| o.body.clone())
    }
}

impl StorageConnector for MemoryConnector {
    fn connect(&self, region: &str) -> StorageResult<Arc<dyn ObjectStorage>> {
        Ok(Arc::new(MemoryStorage {
            region: region.to_string(),
            state: self.state.clone(),
        }))
    }
}

pub struct MemoryStorage {
    region: String,
    state: Arc<Mutex<Regions>>,
}

impl MemoryStorage {
    fn lock(&self) -> StorageResult<MutexGuard<'_, Regions>> {
        self.state
            .lock()
            .map_err(|_| StorageError::Service("memory storage poisoned".to_string()))
    }

    fn with_bucket<T>(
        &self,
        bucket: &str,
        f: impl FnOnce(&mut StoredBucket) -> StorageResult<T>,
    ) -> StorageResult<T> {
        let mut state = self.lock()?;
        let stored = state
            .buckets
            .get_mut(&self.region)
            .and_then(|b| b.get_mut(bucket))
            .ok_or_else(|| StorageError::NotFound(format!("bucket {}", bucket)))?;
        f(stored)
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    fn region(&self) -> &str {
        &self.region
    }

    fn bucket_domain_name(&self, bucket: &str) -> String {
        format!("{}.{}.memory.local", bucket, self.region)
    }

    async fn list_buckets(&self) -> StorageResult<Vec<BucketSummary>> {
        let state = self.lock()?;
        Ok(state
            .buckets
            .get(&self.region)
            .map(|buckets| {
                buckets
                    .keys()
                    .map(|name| BucketSummary {
                        name: name.clone(),
                        region: self.region.clone(),
                        creation_date: None,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn bucket_exists(&self, bucket: &str) -> StorageResult<bool> {
        let state = self.lock()?;
        Ok(state
            .buckets
            .get(&self.region)
            .is_some_and(|b| b.contains_key(bucket)))
    }

    async fn create_bucket(&self, bucket: &str, acl: CannedAcl) -> StorageResult<()> {
        let mut state = self.lock()?;
        let exists = state
            .buckets
            .values()
            .any(|region| region.contains_key(bucket));
        if exists {
            return Err(StorageError::Service(format!(
                "BucketAlreadyExists: {}",
                bucket
            )));
        }
        state.buckets.entry(self.region.clone()).or_default().insert(
            bucket.to_string(),
            StoredBucket {
                acl,
                ..StoredBucket::default()
            },
        );
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> StorageResult<()> {
        let mut state = self.lock()?;
        let buckets = state
            .buckets
            .get_mut(&self.region)
            .ok_or_else(|| StorageError::NotFound(format!("bucket {}", bucket)))?;
        match buckets.get(bucket) {
            None => Err(StorageError::NotFound(format!("bucket {}", bucket))),
            Some(stored) if !stored.objects.is_empty() => Err(StorageError::Service(format!(
                "BucketNotEmpty: {}",
                bucket
            ))),
            Some(_) => {
                buckets.remove(bucket);
                Ok(())
            }
        }
    }

    async fn bucket_acl(&self, bucket: &str) -> StorageResult<CannedAcl> {
        self.with_bucket(bucket, |b| Ok(b.acl))
    }

    async fn set_bucket_acl(&self, bucket: &str, acl: CannedAcl) -> StorageResult<()> {
        self.with_bucket(bucket, |b| {
            b.acl = acl;
            Ok(())
        })
    }

    async fn versioning_enabled(&self, bucket: &str) -> StorageResult<bool> {
        self.with_bucket(bucket, |b| Ok(b.versioning))
    }

    async fn set_versioning(&self, bucket: &str, enabled: bool) -> StorageResult<()> {
        self.with_bucket(bucket, |b| {
            b.versioning = enabled;
            Ok(())
        })
    }

    async fn empty_bucket(&self, bucket: &str) -> StorageResult<usize> {
        self.with_bucket(bucket, |b| {
            let count = b.objects.values().map(Vec::len).sum();
            b.objects.clear();
            Ok(count)
        })
    }

    async fn put_object(&self, object: &PutObject) -> StorageResult<ObjectHead> {
        self.with_bucket(&object.bucket, |b| {
            let version_id = if b.versioning {
                b.next_version += 1;
                Some(format!("v{}", b.next_version))
            } else {
                None
            };
            let head = ObjectHead {
                etag: Some(format!("\"{:x}\"", fingerprint(&object.body))),
                version_id,
                content_type: object.content_type.clone(),
                cache_control: object.cache_control.clone(),
                content_disposition: object.content_disposition.clone(),
                content_encoding: object.content_encoding.clone(),
                content_language: object.content_language.clone(),
                website_redirect: object.website_redirect.clone(),
                metadata: object.metadata.clone(),
            };
            let stored = StoredObject {
                head: head.clone(),
                acl: object.acl,
                body: object.body.clone(),
            };
            let versions = b.objects.entry(object.key.clone()).or_default();
            if !b.versioning {
                versions.clear();
            }
            versions.push(stored);
            Ok(head)
        })
    }

    async fn head_object(&self, bucket: &str, key: &str) -> StorageResult<Option<ObjectHead>> {
        self.with_bucket(bucket, |b| {
            Ok(b.objects
                .get(key)
                .and_then(|v| v.last())
                .map(|o| o.head.clone()))
        })
    }

    async fn set_object_acl(&self, bucket: &str, key: &str, acl: CannedAcl) -> StorageResult<()> {
        self.with_bucket(bucket, |b| {
            let latest = b
                .objects
                .get_mut(key)
                .and_then(|v| v.last_mut())
                .ok_or_else(|| StorageError::NotFound(format!("object {}", key)))?;
            latest.acl = acl;
            Ok(())
        })
    }

    async fn object_versions(&self, bucket: &str, key: &str) -> StorageResult<Vec<String>> {
        self.with_bucket(bucket, |b| {
            Ok(b.objects
                .get(key)
                .map(|versions| {
                    versions
                        .iter()
                        .rev()
                        .filter_map(|o| o.head.version_id.clone())
                        .collect()
                })
                .unwrap_or_default())
        })
    }

    async fn delete_object(
        &self,
        bucket: &str,
        key: &str,
        version_id: Option<&str>,
    ) -> StorageResult<()> {
        self.with_bucket(bucket, |b| {
            if let Some(versions) = b.objects.get_mut(key) {
                match version_id {
                    Some(id) => versions.retain(|o| o.head.version_id.as_deref() != Some(id)),
                    None => versions.clear(),
                }
                if versions.is_empty() {
                    b.objects.remove(key);
                }
            }
            Ok(())
        })
    }

    async fn bucket_policy(&self, bucket: &str) -> StorageResult<Option<String>> {
        self.with_bucket(bucket, |b| Ok(b.policy.clone()))
    }

    async fn put_bucket_policy(&self, bucket: &str, policy: &str) -> StorageResult<()> {
        self.with_bucket(bucket, |b| {
            b.policy = Some(policy.to_string());
            Ok(())
        })
    }

    async fn delete_bucket_policy(&self, bucket: &str) -> StorageResult<()> {
        self.with_bucket(bucket, |b| {
            b.policy = None;
            Ok(())
        })
    }
}

// FNV-1a; only needs to change when the body does.
fn fingerprint(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf29ce484222325, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(0x100000001b3)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn versioned_bucket_keeps_every_put() {
        let connector = MemoryConnector::new();
        let storage = connector.connect("fra1").unwrap();
        storage
            .create_bucket("assets", CannedAcl::Private)
            .await
            .unwrap();
        storage.set_versioning("assets", true).await.unwrap();

        for body in ["one", "two"] {
            storage
                .put_object(&PutObject {
                    bucket: "assets".into(),
                    key: "a.txt".into(),
                    body: body.as_bytes().to_vec(),
                    ..PutObject::default()
                })
                .await
                .unwrap();
        }

        let versions = storage.object_versions("assets", "a.txt").await.unwrap();
        assert_eq!(versions, vec!["v2".to_string(), "v1".to_string()]);
        assert_eq!(
            connector.object_body("fra1", "assets", "a.txt").unwrap(),
            b"two".to_vec()
        );

        assert!(storage.delete_bucket("assets").await.is_err());
        assert_eq!(storage.empty_bucket("assets").await.unwrap(), 2);
        storage.delete_bucket("assets").await.unwrap();
        assert!(!storage.bucket_exists("assets").await.unwrap());
    }

    #[tokio::test]
    async fn bucket_names_are_global() {
        let connector = MemoryConnector::new();
        let fra = connector.connect("fra1").unwrap();
        let ams = connector.connect("ams3").unwrap();

        fra.create_bucket("shared", CannedAcl::Private).await.unwrap();
        assert!(ams.create_bucket("shared", CannedAcl::Private).await.is_err());
        assert!(ams.list_buckets().await.unwrap().is_empty());
        assert!(ams.bucket_acl("shared").await.unwrap_err().is_not_found());
    }
}
