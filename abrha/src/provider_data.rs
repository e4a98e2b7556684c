//! Provider data structure passed to resources and data sources

use std::sync::Arc;

use crate::api::Client;
use crate::poll::Poller;
use crate::storage::{ObjectStorage, StorageConnector, StorageError};

/// Built once by the provider's configure and shared with every handler
#[derive(Clone)]
pub struct AbrhaProviderData {
    pub client: Arc<Client>,
    pub storage: Arc<dyn StorageConnector>,
    pub poller: Poller,
    /// Regions searched when a bucket lookup spans all of object storage
    pub storage_regions: Vec<String>,
}

impl AbrhaProviderData {
    pub fn new(client: Client, storage: Arc<dyn StorageConnector>, poller: Poller) -> Self {
        Self {
            client: Arc::new(client),
            storage,
            poller,
            storage_regions: Vec::new(),
        }
    }

    pub fn with_storage_regions(mut self, regions: Vec<String>) -> Self {
        self.storage_regions = regions;
        self
    }

    pub fn storage_in(&self, region: &str) -> Result<Arc<dyn ObjectStorage>, StorageError> {
        self.storage.connect(region)
    }
}
