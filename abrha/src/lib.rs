//! Terraform provider for the Abrha cloud
//!
//! [`AbrhaProvider`] turns the provider block into one shared
//! [`AbrhaProviderData`] and hands it to every resource and data source.

pub mod api;
pub mod config;
pub mod data_sources;
pub mod datalist;
pub mod dns;
pub mod poll;
pub mod provider_data;
pub mod resources;
pub mod storage;

#[cfg(test)]
mod test_support;

pub use provider_data::AbrhaProviderData;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tfplug::context::Context;
use tfplug::data_source::DataSourceWithConfigure;
use tfplug::provider::{
    ConfigureProviderRequest, ConfigureProviderResponse, DataSourceFactory, Provider,
    ProviderSchemaRequest, ProviderSchemaResponse, ResourceFactory,
};
use tfplug::resource::ResourceWithConfigure;
use tfplug::schema::{AttributeBuilder, AttributeType, SchemaBuilder};
use tfplug::types::Diagnostic;
use tfplug::validator::{IsWholeNumber, NumberBetween};

use crate::api::Client;
use crate::config::ProviderConfig;
use crate::data_sources::{
    BucketDataSource, BucketsDataSource, ContainerRegistryDataSource, DomainDataSource,
    DomainsDataSource, FloatingIpDataSource, RecordDataSource, RecordsDataSource,
    ReservedIpDataSource, VpcPeeringDataSource,
};
use crate::poll::Poller;
use crate::resources::{
    BucketObjectResource, BucketPolicyResource, BucketResource, ContainerRegistryResource,
    DomainResource, FloatingIpAssignmentResource, FloatingIpResource, RecordResource,
    RegistryCredentialsResource, ReservedIpAssignmentResource, ReservedIpResource,
    VpcPeeringResource,
};
use crate::storage::s3::S3Connector;
use crate::storage::StorageConnector;

#[derive(Default)]
pub struct AbrhaProvider {
    storage: Option<Arc<dyn StorageConnector>>,
    poller: Option<Poller>,
}

impl AbrhaProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Object storage to use instead of the S3 endpoint from configuration
    pub fn with_storage(mut self, storage: Arc<dyn StorageConnector>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_poller(mut self, poller: Poller) -> Self {
        self.poller = Some(poller);
        self
    }
}

fn resource<R>() -> Box<dyn ResourceWithConfigure>
where
    R: ResourceWithConfigure + Default + 'static,
{
    Box::new(R::default())
}

fn data_source<D>() -> Box<dyn DataSourceWithConfigure>
where
    D: DataSourceWithConfigure + Default + 'static,
{
    Box::new(D::default())
}

#[async_trait]
impl Provider for AbrhaProvider {
    fn type_name(&self) -> &str {
        "abrha"
    }

    async fn schema(
        &self,
        _ctx: Context,
        _request: ProviderSchemaRequest,
    ) -> ProviderSchemaResponse {
        let schema = SchemaBuilder::new()
            .version(0)
            .description("The Abrha provider manages DNS, container registry, IP, VPC peering and object storage resources")
            .attribute(
                AttributeBuilder::new("token", AttributeType::String)
                    .description("API token. Falls back to ABRHA_TOKEN or ABRHA_ACCESS_TOKEN")
                    .optional()
                    .sensitive()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("api_endpoint", AttributeType::String)
                    .description("Base URL of the API. Falls back to ABRHA_API_URL")
                    .optional()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("spaces_endpoint", AttributeType::String)
                    .description("Object storage URL template with a {region} placeholder. Falls back to SPACES_ENDPOINT_URL")
                    .optional()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("spaces_access_id", AttributeType::String)
                    .description("Object storage access key. Falls back to SPACES_ACCESS_KEY_ID")
                    .optional()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("spaces_secret_key", AttributeType::String)
                    .description("Object storage secret key. Falls back to SPACES_SECRET_ACCESS_KEY")
                    .optional()
                    .sensitive()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("storage_regions", AttributeType::list_of(AttributeType::String))
                    .description("Regions searched by abrha_buckets")
                    .optional()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("http_retry_max", AttributeType::Number)
                    .description("Retries for throttled or failed requests")
                    .optional()
                    .validator(NumberBetween::new(0.0, 100.0))
                    .validator(IsWholeNumber)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("http_retry_wait_min", AttributeType::Number)
                    .description("Minimum seconds between retries")
                    .optional()
                    .validator(NumberBetween::new(0.0, f64::MAX))
                    .validator(IsWholeNumber)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("http_retry_wait_max", AttributeType::Number)
                    .description("Maximum seconds between retries")
                    .optional()
                    .validator(NumberBetween::new(0.0, f64::MAX))
                    .validator(IsWholeNumber)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("request_timeout", AttributeType::Number)
                    .description("Seconds before a single request is abandoned")
                    .optional()
                    .validator(NumberBetween::new(1.0, f64::MAX))
                    .validator(IsWholeNumber)
                    .build(),
            )
            .build();

        ProviderSchemaResponse {
            schema,
            diagnostics: vec![],
        }
    }

    async fn configure(
        &mut self,
        _ctx: Context,
        request: ConfigureProviderRequest,
    ) -> ConfigureProviderResponse {
        // A host that already installed a subscriber keeps its own
        if let Err(e) = tfplug::logging::init_from_env() {
            tracing::debug!("Provider logging not installed: {}", e);
        }

        let config = match ProviderConfig::from_config(&request.config) {
            Ok(config) => config,
            Err(e) => {
                return ConfigureProviderResponse {
                    diagnostics: vec![Diagnostic::error("Invalid provider configuration", e.to_string())
                        .with_attribute(e.attribute())],
                    provider_data: None,
                }
            }
        };

        let client = match Client::with_config(&config.api_endpoint, &config.token, config.retry.clone()) {
            Ok(client) => client,
            Err(e) => {
                return ConfigureProviderResponse {
                    diagnostics: vec![Diagnostic::error("Failed to create API client", e.to_string())],
                    provider_data: None,
                }
            }
        };

        let storage: Arc<dyn StorageConnector> = match &self.storage {
            Some(storage) => storage.clone(),
            None => Arc::new(S3Connector::new(
                config.spaces_access_id.clone(),
                config.spaces_secret_key.clone(),
                config.spaces_endpoint.clone(),
            )),
        };
        let poller = self.poller.clone().unwrap_or_default();

        tracing::info!(
            "Configured provider for {} (Terraform {})",
            config.api_endpoint,
            request.terraform_version
        );
        let data = AbrhaProviderData::new(client, storage, poller)
            .with_storage_regions(config.storage_regions);

        ConfigureProviderResponse {
            diagnostics: vec![],
            provider_data: Some(Arc::new(data)),
        }
    }

    fn resources(&self) -> HashMap<String, ResourceFactory> {
        let factories: [(&str, ResourceFactory); 12] = [
            ("abrha_domain", resource::<DomainResource>),
            ("abrha_record", resource::<RecordResource>),
            ("abrha_container_registry", resource::<ContainerRegistryResource>),
            (
                "abrha_container_registry_docker_credentials",
                resource::<RegistryCredentialsResource>,
            ),
            ("abrha_reserved_ip", resource::<ReservedIpResource>),
            ("abrha_floating_ip", resource::<FloatingIpResource>),
            (
                "abrha_reserved_ip_assignment",
                resource::<ReservedIpAssignmentResource>,
            ),
            (
                "abrha_floating_ip_assignment",
                resource::<FloatingIpAssignmentResource>,
            ),
            ("abrha_vpc_peering", resource::<VpcPeeringResource>),
            ("abrha_bucket", resource::<BucketResource>),
            ("abrha_bucket_object", resource::<BucketObjectResource>),
            ("abrha_bucket_policy", resource::<BucketPolicyResource>),
        ];
        factories
            .into_iter()
            .map(|(name, factory)| (name.to_string(), factory))
            .collect()
    }

    fn data_sources(&self) -> HashMap<String, DataSourceFactory> {
        let factories: [(&str, DataSourceFactory); 10] = [
            ("abrha_domain", data_source::<DomainDataSource>),
            ("abrha_domains", data_source::<DomainsDataSource>),
            ("abrha_record", data_source::<RecordDataSource>),
            ("abrha_records", data_source::<RecordsDataSource>),
            (
                "abrha_container_registry",
                data_source::<ContainerRegistryDataSource>,
            ),
            ("abrha_reserved_ip", data_source::<ReservedIpDataSource>),
            ("abrha_floating_ip", data_source::<FloatingIpDataSource>),
            ("abrha_vpc_peering", data_source::<VpcPeeringDataSource>),
            ("abrha_bucket", data_source::<BucketDataSource>),
            ("abrha_buckets", data_source::<BucketsDataSource>),
        ];
        factories
            .into_iter()
            .map(|(name, factory)| (name.to_string(), factory))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryConnector;
    use serial_test::serial;
    use tfplug::types::{AttributePath, Dynamic, DynamicValue};

    fn provider_config(pairs: &[(&str, Dynamic)]) -> DynamicValue {
        DynamicValue::from_map(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    #[test]
    fn every_factory_builds_its_type() {
        let provider = AbrhaProvider::new();
        for (name, factory) in provider.resources() {
            let built = factory();
            let built_name = built.type_name().to_string();
            assert_eq!(built_name, name);
        }
        for (name, factory) in provider.data_sources() {
            assert_eq!(factory().type_name(), name);
        }
    }

    #[tokio::test]
    #[serial]
    async fn configure_builds_provider_data() {
        let mut provider = AbrhaProvider::new().with_storage(Arc::new(MemoryConnector::new()));
        let response = provider
            .configure(
                Context::new(),
                ConfigureProviderRequest {
                    terraform_version: "1.9.0".into(),
                    config: provider_config(&[
                        ("token", Dynamic::from("secret")),
                        ("api_endpoint", Dynamic::from("http://127.0.0.1:9999")),
                        ("storage_regions", Dynamic::string_list(["fra1"])),
                    ]),
                },
            )
            .await;
        assert!(response.diagnostics.is_empty(), "{:?}", response.diagnostics);

        let data = response.provider_data.unwrap();
        let data = data.downcast_ref::<AbrhaProviderData>().unwrap();
        assert_eq!(data.client.base_url(), "http://127.0.0.1:9999");
        assert_eq!(data.storage_regions, vec!["fra1".to_string()]);
    }

    #[tokio::test]
    #[serial]
    async fn configure_without_token_points_at_token() {
        std::env::remove_var(config::ENV_TOKEN);
        std::env::remove_var(config::ENV_ACCESS_TOKEN);

        let mut provider = AbrhaProvider::new();
        let response = provider
            .configure(
                Context::new(),
                ConfigureProviderRequest {
                    terraform_version: "1.9.0".into(),
                    config: provider_config(&[]),
                },
            )
            .await;
        assert!(response.provider_data.is_none());
        assert_eq!(
            response.diagnostics[0].attribute,
            Some(AttributePath::new("token"))
        );
    }

    #[tokio::test]
    #[serial]
    async fn token_falls_back_to_environment() {
        std::env::set_var(config::ENV_TOKEN, "from-env");
        let mut provider = AbrhaProvider::new().with_storage(Arc::new(MemoryConnector::new()));
        let response = provider
            .configure(
                Context::new(),
                ConfigureProviderRequest {
                    terraform_version: "1.9.0".into(),
                    config: provider_config(&[]),
                },
            )
            .await;
        std::env::remove_var(config::ENV_TOKEN);
        assert!(response.diagnostics.is_empty(), "{:?}", response.diagnostics);
        assert!(response.provider_data.is_some());
    }
}
