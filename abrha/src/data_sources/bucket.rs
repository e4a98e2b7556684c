//! `abrha_bucket` and `abrha_buckets`

use async_trait::async_trait;
use futures::future::try_join_all;
use std::collections::HashSet;
use tfplug::schema::{AttributeBuilder, AttributeType, Schema, SchemaBuilder};
use tfplug::types::{Diagnostic, Dynamic, DynamicValue};

use super::{lookup_failed, Lookup, LookupDataSource};
use crate::datalist::{
    attribute_map, AttrKind, AttrValue, AttributeMap, DataListError, ExtraValues, ListDataSource,
    RecordSchema, RecordSource,
};
use crate::resources::bucket::{bucket_location, bucket_urn, location_attributes};
use crate::resources::{required_string, state_of};
use crate::storage::StorageError;
use crate::AbrhaProviderData;

/// A bucket as found in one region
#[derive(Debug, Clone, PartialEq)]
pub struct BucketListing {
    pub name: String,
    pub region: String,
    pub bucket_domain_name: String,
    pub endpoint: String,
}

async fn buckets_in(
    provider: &AbrhaProviderData,
    region: &str,
) -> Result<Vec<BucketListing>, StorageError> {
    let storage = provider.storage_in(region)?;
    let buckets = storage.list_buckets().await?;
    tracing::debug!("{} buckets in {}", buckets.len(), region);
    Ok(buckets
        .into_iter()
        .map(|bucket| {
            let (bucket_domain_name, endpoint) = bucket_location(storage.as_ref(), &bucket.name);
            BucketListing {
                name: bucket.name,
                region: region.to_string(),
                bucket_domain_name,
                endpoint,
            }
        })
        .collect())
}

pub struct BucketList;

#[async_trait]
impl RecordSource for BucketList {
    type Record = BucketListing;

    fn type_name() -> &'static str {
        "abrha_buckets"
    }

    fn description() -> &'static str {
        "Lists object storage buckets across all configured regions"
    }

    fn record_schema() -> RecordSchema {
        RecordSchema::new()
            .attr("name", AttrKind::String, "Name of the bucket")
            .attr("region", AttrKind::String, "Region of the bucket")
            .attr("urn", AttrKind::String, "Uniform resource name of the bucket")
            .attr("bucket_domain_name", AttrKind::String, "FQDN of the bucket")
            .attr("endpoint", AttrKind::String, "FQDN of the bucket without the bucket name")
    }

    fn result_attribute() -> &'static str {
        "buckets"
    }

    /// Regions are listed concurrently. A bucket seen from several regions
    /// is reported once, for the first region that lists it.
    async fn fetch(
        provider: &AbrhaProviderData,
        _extra: &ExtraValues,
    ) -> Result<Vec<BucketListing>, DataListError> {
        let per_region = try_join_all(
            provider
                .storage_regions
                .iter()
                .map(|region| buckets_in(provider, region)),
        )
        .await?;

        let mut seen = HashSet::new();
        Ok(per_region
            .into_iter()
            .flatten()
            .filter(|bucket| seen.insert(bucket.name.clone()))
            .collect())
    }

    fn flatten(bucket: &BucketListing, _extra: &ExtraValues) -> Result<AttributeMap, DataListError> {
        Ok(attribute_map([
            ("name", AttrValue::from(bucket.name.as_str())),
            ("region", AttrValue::from(bucket.region.as_str())),
            ("urn", AttrValue::from(bucket_urn(&bucket.name))),
            (
                "bucket_domain_name",
                AttrValue::from(bucket.bucket_domain_name.as_str()),
            ),
            ("endpoint", AttrValue::from(bucket.endpoint.as_str())),
        ]))
    }
}

pub type BucketsDataSource = ListDataSource<BucketList>;

pub struct BucketLookup;

#[async_trait]
impl Lookup for BucketLookup {
    fn type_name() -> &'static str {
        "abrha_bucket"
    }

    fn schema() -> Schema {
        SchemaBuilder::new()
            .version(0)
            .description("Looks up an object storage bucket")
            .attribute(
                AttributeBuilder::new("name", AttributeType::String)
                    .description("Name of the bucket")
                    .required()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("region", AttributeType::String)
                    .description("Region of the bucket")
                    .required()
                    .build(),
            )
            .attribute(AttributeBuilder::new("id", AttributeType::String).computed().build())
            .attribute(AttributeBuilder::new("urn", AttributeType::String).computed().build())
            .attribute(
                AttributeBuilder::new("bucket_domain_name", AttributeType::String)
                    .computed()
                    .build(),
            )
            .attribute(AttributeBuilder::new("endpoint", AttributeType::String).computed().build())
            .build()
    }

    async fn find(
        provider: &AbrhaProviderData,
        config: &DynamicValue,
    ) -> Result<DynamicValue, Diagnostic> {
        let name = required_string(config, "name")?;
        let region = required_string(config, "region")?;
        let storage = provider
            .storage_in(&region)
            .map_err(|e| lookup_failed("bucket", e))?;

        match storage.bucket_exists(&name).await {
            Ok(true) => {}
            Ok(false) => {
                return Err(Diagnostic::error(
                    "Bucket not found",
                    format!("bucket {} does not exist in {}", name, region),
                ))
            }
            Err(e) => return Err(lookup_failed("bucket", e)),
        }

        let mut pairs = vec![
            ("id", Dynamic::from(name.clone())),
            ("name", Dynamic::from(name.clone())),
            ("region", Dynamic::from(region)),
        ];
        pairs.extend(location_attributes(storage.as_ref(), &name));
        Ok(state_of(pairs))
    }
}

pub type BucketDataSource = LookupDataSource<BucketLookup>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{CannedAcl, StorageConnector};
    use crate::test_support::{configure_data_source, provider_data, value};
    use std::collections::HashMap;
    use tfplug::context::Context;
    use tfplug::data_source::{DataSource, ReadDataSourceRequest};
    use tfplug::types::AttributePath;

    #[tokio::test]
    async fn lists_buckets_across_regions() {
        let (data, storage) = provider_data("http://127.0.0.1:1");
        for (region, bucket) in [("fra1", "logs"), ("ams3", "assets"), ("fra1", "backups")] {
            storage
                .connect(region)
                .unwrap()
                .create_bucket(bucket, CannedAcl::Private)
                .await
                .unwrap();
        }
        let mut source = BucketsDataSource::new();
        configure_data_source(&mut source, &data).await;

        let mut sort = HashMap::new();
        sort.insert("key".to_string(), Dynamic::from("name"));
        let response = source
            .read(
                Context::new(),
                ReadDataSourceRequest {
                    type_name: "abrha_buckets".into(),
                    config: value(&[("sort", Dynamic::List(vec![Dynamic::Map(sort)]))]),
                },
            )
            .await;
        assert!(response.diagnostics.is_empty(), "{:?}", response.diagnostics);

        let buckets = response.state.get_list(&AttributePath::new("buckets")).unwrap();
        let listed: Vec<(&str, &str)> = buckets
            .iter()
            .map(|b| {
                let b = b.as_map().unwrap();
                (b["name"].as_str().unwrap(), b["region"].as_str().unwrap())
            })
            .collect();
        assert_eq!(
            listed,
            vec![("assets", "ams3"), ("backups", "fra1"), ("logs", "fra1")]
        );
        assert_eq!(
            buckets[0].as_map().unwrap()["urn"].as_str(),
            Some("abrha:space:assets")
        );
    }

    #[tokio::test]
    async fn lookup_requires_an_existing_bucket() {
        let (data, storage) = provider_data("http://127.0.0.1:1");
        storage
            .connect("ams3")
            .unwrap()
            .create_bucket("assets", CannedAcl::Private)
            .await
            .unwrap();
        let mut source = BucketDataSource::new();
        configure_data_source(&mut source, &data).await;

        let found = source
            .read(
                Context::new(),
                ReadDataSourceRequest {
                    type_name: "abrha_bucket".into(),
                    config: value(&[
                        ("name", Dynamic::from("assets")),
                        ("region", Dynamic::from("ams3")),
                    ]),
                },
            )
            .await;
        assert!(found.diagnostics.is_empty(), "{:?}", found.diagnostics);
        assert_eq!(
            found
                .state
                .get_string(&AttributePath::new("bucket_domain_name"))
                .unwrap(),
            "assets.ams3.memory.local"
        );

        let missing = source
            .read(
                Context::new(),
                ReadDataSourceRequest {
                    type_name: "abrha_bucket".into(),
                    config: value(&[
                        ("name", Dynamic::from("assets")),
                        ("region", Dynamic::from("fra1")),
                    ]),
                },
            )
            .await;
        assert_eq!(missing.diagnostics[0].summary, "Bucket not found");
    }
}
