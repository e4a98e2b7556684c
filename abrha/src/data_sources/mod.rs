//! Data source implementations
//!
//! List data sources are `ListDataSource`s over a `RecordSource`. Single
//! object lookups implement [`Lookup`] and are served by [`LookupDataSource`].

pub mod bucket;
pub mod container_registry;
pub mod domain;
pub mod record;
pub mod reserved_ip;
pub mod vpc_peering;

pub use bucket::{BucketDataSource, BucketList, BucketsDataSource};
pub use container_registry::ContainerRegistryDataSource;
pub use domain::{DomainDataSource, DomainList, DomainsDataSource};
pub use record::{RecordDataSource, RecordList, RecordsDataSource};
pub use reserved_ip::{FloatingIpDataSource, ReservedIpDataSource};
pub use vpc_peering::VpcPeeringDataSource;

use async_trait::async_trait;
use std::marker::PhantomData;
use tfplug::context::Context;
use tfplug::data_source::{
    ConfigureDataSourceRequest, ConfigureDataSourceResponse, DataSource, DataSourceMetadataRequest,
    DataSourceMetadataResponse, DataSourceSchemaRequest, DataSourceSchemaResponse,
    DataSourceWithConfigure, ReadDataSourceRequest, ReadDataSourceResponse,
    ValidateDataSourceConfigRequest, ValidateDataSourceConfigResponse,
};
use tfplug::schema::Schema;
use tfplug::types::{Diagnostic, DynamicValue};

use crate::resources::{not_configured, provider_data_from};
use crate::AbrhaProviderData;

/// Finds one object from its identifying arguments
#[async_trait]
pub trait Lookup: Send + Sync + 'static {
    fn type_name() -> &'static str;

    fn schema() -> Schema;

    /// Checks beyond what the schema expresses
    fn validate(_config: &DynamicValue) -> Vec<Diagnostic> {
        Vec::new()
    }

    /// Complete state of the object, or an error when there is none
    async fn find(
        provider: &AbrhaProviderData,
        config: &DynamicValue,
    ) -> Result<DynamicValue, Diagnostic>;
}

/// Data source reading the single object `L` describes
pub struct LookupDataSource<L: Lookup> {
    provider_data: Option<AbrhaProviderData>,
    _lookup: PhantomData<fn() -> L>,
}

impl<L: Lookup> LookupDataSource<L> {
    pub fn new() -> Self {
        Self {
            provider_data: None,
            _lookup: PhantomData,
        }
    }

    pub fn factory() -> Box<dyn DataSourceWithConfigure> {
        Box::new(Self::new())
    }
}

impl<L: Lookup> Default for LookupDataSource<L> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<L: Lookup> DataSource for LookupDataSource<L> {
    fn type_name(&self) -> &str {
        L::type_name()
    }

    async fn metadata(
        &self,
        _ctx: Context,
        _request: DataSourceMetadataRequest,
    ) -> DataSourceMetadataResponse {
        DataSourceMetadataResponse {
            type_name: L::type_name().to_string(),
        }
    }

    async fn schema(
        &self,
        _ctx: Context,
        _request: DataSourceSchemaRequest,
    ) -> DataSourceSchemaResponse {
        DataSourceSchemaResponse {
            schema: L::schema(),
            diagnostics: vec![],
        }
    }

    async fn validate(
        &self,
        _ctx: Context,
        request: ValidateDataSourceConfigRequest,
    ) -> ValidateDataSourceConfigResponse {
        ValidateDataSourceConfigResponse {
            diagnostics: L::validate(&request.config),
        }
    }

    async fn read(&self, _ctx: Context, request: ReadDataSourceRequest) -> ReadDataSourceResponse {
        let Some(provider_data) = &self.provider_data else {
            return ReadDataSourceResponse {
                state: request.config,
                diagnostics: vec![not_configured()],
            };
        };

        let mut diagnostics = L::validate(&request.config);
        if !diagnostics.is_empty() {
            return ReadDataSourceResponse {
                state: request.config,
                diagnostics,
            };
        }

        match L::find(provider_data, &request.config).await {
            Ok(state) => ReadDataSourceResponse {
                state,
                diagnostics,
            },
            Err(diag) => {
                diagnostics.push(diag);
                ReadDataSourceResponse {
                    state: request.config,
                    diagnostics,
                }
            }
        }
    }
}

#[async_trait]
impl<L: Lookup> DataSourceWithConfigure for LookupDataSource<L> {
    async fn configure(
        &mut self,
        _ctx: Context,
        request: ConfigureDataSourceRequest,
    ) -> ConfigureDataSourceResponse {
        match provider_data_from(request.provider_data) {
            Ok(data) => {
                self.provider_data = data;
                ConfigureDataSourceResponse {
                    diagnostics: vec![],
                }
            }
            Err(diag) => ConfigureDataSourceResponse {
                diagnostics: vec![diag],
            },
        }
    }
}

/// "Error retrieving {what}" with the underlying failure as detail
pub(crate) fn lookup_failed(what: &str, e: impl std::fmt::Display) -> Diagnostic {
    Diagnostic::error(format!("Error retrieving {}", what), e.to_string())
}
