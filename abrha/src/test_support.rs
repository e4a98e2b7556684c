//! Shared fixtures for handler tests

use std::sync::Arc;
use std::time::Duration;
use tfplug::context::Context;
use tfplug::data_source::{ConfigureDataSourceRequest, DataSourceWithConfigure};
use tfplug::resource::{ConfigureResourceRequest, ResourceWithConfigure};
use tfplug::types::{Dynamic, DynamicValue};

use crate::api::test_helpers::create_test_client;
use crate::poll::{ManualClock, PollSettings, Poller};
use crate::storage::memory::MemoryConnector;
use crate::AbrhaProviderData;

/// Provider data against a mock API, in-memory storage and virtual time
pub fn provider_data(url: &str) -> (AbrhaProviderData, MemoryConnector) {
    let storage = MemoryConnector::new();
    let poller = Poller::new(
        PollSettings {
            delay: Duration::from_secs(1),
            min_interval: Duration::from_secs(1),
            timeout: Duration::from_secs(60),
            not_found_checks: 2,
        },
        Arc::new(ManualClock::new()),
    );
    let data = AbrhaProviderData::new(create_test_client(url), Arc::new(storage.clone()), poller)
        .with_storage_regions(vec!["fra1".to_string(), "ams3".to_string()]);
    (data, storage)
}

pub async fn configure_resource<R: ResourceWithConfigure>(resource: &mut R, data: &AbrhaProviderData) {
    let response = resource
        .configure(
            Context::new(),
            ConfigureResourceRequest {
                provider_data: Some(Arc::new(data.clone())),
            },
        )
        .await;
    assert!(response.diagnostics.is_empty(), "{:?}", response.diagnostics);
}

pub async fn configure_data_source<D: DataSourceWithConfigure>(
    data_source: &mut D,
    data: &AbrhaProviderData,
) {
    let response = data_source
        .configure(
            Context::new(),
            ConfigureDataSourceRequest {
                provider_data: Some(Arc::new(data.clone())),
            },
        )
        .await;
    assert!(response.diagnostics.is_empty(), "{:?}", response.diagnostics);
}

/// Object value from attribute pairs
pub fn value(pairs: &[(&str, Dynamic)]) -> DynamicValue {
    DynamicValue::from_map(
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect(),
    )
}
