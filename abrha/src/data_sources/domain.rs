//! `abrha_domain` and `abrha_domains`

use async_trait::async_trait;
use tfplug::schema::{AttributeBuilder, AttributeType, Schema, SchemaBuilder};
use tfplug::types::{AttributePath, Diagnostic, Dynamic, DynamicValue};

use super::{lookup_failed, Lookup, LookupDataSource};
use crate::api::domains::Domain;
use crate::datalist::{
    attribute_map, AttrKind, AttrValue, AttributeMap, DataListError, ExtraValues, ListDataSource,
    RecordSchema, RecordSource,
};
use crate::resources::domain::domain_state;
use crate::resources::required_string;
use crate::AbrhaProviderData;

pub struct DomainList;

#[async_trait]
impl RecordSource for DomainList {
    type Record = Domain;

    fn type_name() -> &'static str {
        "abrha_domains"
    }

    fn description() -> &'static str {
        "Lists DNS domains, optionally filtered and sorted"
    }

    fn record_schema() -> RecordSchema {
        RecordSchema::new()
            .attr("name", AttrKind::String, "Name of the domain")
            .attr("urn", AttrKind::String, "Uniform resource name of the domain")
            .attr("ttl", AttrKind::Int, "Default TTL of the domain's records")
    }

    fn result_attribute() -> &'static str {
        "domains"
    }

    async fn fetch(
        provider: &AbrhaProviderData,
        _extra: &ExtraValues,
    ) -> Result<Vec<Domain>, DataListError> {
        Ok(provider.client.domains().list_all().await?)
    }

    fn flatten(domain: &Domain, _extra: &ExtraValues) -> Result<AttributeMap, DataListError> {
        Ok(attribute_map([
            ("name", AttrValue::from(domain.name.as_str())),
            ("urn", AttrValue::from(domain.urn())),
            ("ttl", AttrValue::from(domain.ttl)),
        ]))
    }
}

pub type DomainsDataSource = ListDataSource<DomainList>;

pub struct DomainLookup;

#[async_trait]
impl Lookup for DomainLookup {
    fn type_name() -> &'static str {
        "abrha_domain"
    }

    fn schema() -> Schema {
        SchemaBuilder::new()
            .version(0)
            .description("Looks up a DNS domain by name")
            .attribute(
                AttributeBuilder::new("name", AttributeType::String)
                    .description("Name of the domain")
                    .required()
                    .build(),
            )
            .attribute(AttributeBuilder::new("id", AttributeType::String).computed().build())
            .attribute(AttributeBuilder::new("ip_address", AttributeType::String).computed().build())
            .attribute(AttributeBuilder::new("ttl", AttributeType::Number).computed().build())
            .attribute(AttributeBuilder::new("urn", AttributeType::String).computed().build())
            .attribute(
                AttributeBuilder::new("zone_file", AttributeType::String)
                    .description("Zone file of the domain")
                    .computed()
                    .build(),
            )
            .build()
    }

    async fn find(
        provider: &AbrhaProviderData,
        config: &DynamicValue,
    ) -> Result<DynamicValue, Diagnostic> {
        let name = required_string(config, "name")?;
        let domain = provider.client.domains().get(&name).await.map_err(|e| {
            if e.is_not_found() {
                Diagnostic::error("Domain not found", format!("domain {} does not exist", name))
            } else {
                lookup_failed("domain", e)
            }
        })?;

        let mut state = domain_state(&domain, Dynamic::Null);
        state
            .set_string(&AttributePath::new("zone_file"), domain.zone_file.clone())
            .map_err(|e| Diagnostic::error("Failed to set state", e.to_string()))?;
        Ok(state)
    }
}

pub type DomainDataSource = LookupDataSource<DomainLookup>;
