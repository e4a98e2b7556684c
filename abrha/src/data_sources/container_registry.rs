//! `abrha_container_registry`

use async_trait::async_trait;
use tfplug::schema::{AttributeBuilder, AttributeType, Schema, SchemaBuilder};
use tfplug::types::{Diagnostic, DynamicValue};

use super::{lookup_failed, Lookup, LookupDataSource};
use crate::resources::container_registry::{ContainerRegistryResource, RegistryModel};
use crate::resources::required_string;
use crate::AbrhaProviderData;

pub struct RegistryLookup;

#[async_trait]
impl Lookup for RegistryLookup {
    fn type_name() -> &'static str {
        "abrha_container_registry"
    }

    fn schema() -> Schema {
        let mut builder = SchemaBuilder::new()
            .version(0)
            .description("Looks up the account's container registry")
            .attribute(
                AttributeBuilder::new("name", AttributeType::String)
                    .description("Name of the registry")
                    .required()
                    .build(),
            );
        for (name, kind) in [
            ("id", AttributeType::String),
            ("subscription_tier_slug", AttributeType::String),
            ("region", AttributeType::String),
            ("endpoint", AttributeType::String),
            ("server_url", AttributeType::String),
            ("storage_usage_bytes", AttributeType::Number),
            ("created_at", AttributeType::String),
        ] {
            builder = builder.attribute(AttributeBuilder::new(name, kind).computed().build());
        }
        builder.build()
    }

    async fn find(
        provider: &AbrhaProviderData,
        config: &DynamicValue,
    ) -> Result<DynamicValue, Diagnostic> {
        let name = required_string(config, "name")?;
        match ContainerRegistryResource::fetch(provider, &name).await {
            Ok(Some((registry, tier))) => Ok(RegistryModel::into_state(&registry, &tier)),
            Ok(None) => Err(Diagnostic::error(
                "Container registry not found",
                format!("there is no container registry named {}", name),
            )),
            Err(e) => Err(lookup_failed("container registry", e)),
        }
    }
}

pub type ContainerRegistryDataSource = LookupDataSource<RegistryLookup>;
