//! `abrha_record` and `abrha_records`

use async_trait::async_trait;
use tfplug::schema::{AttributeBuilder, AttributeType, Schema, SchemaBuilder};
use tfplug::types::{Diagnostic, DynamicValue};

use super::{lookup_failed, Lookup, LookupDataSource};
use crate::api::records::DomainRecord;
use crate::datalist::{
    attribute_map, AttrKind, AttrValue, AttributeMap, DataListError, ExtraParam, ExtraValues,
    ListDataSource, RecordSchema, RecordSource,
};
use crate::dns::record_fqdn;
use crate::resources::record::RecordModel;
use crate::resources::required_string;
use crate::AbrhaProviderData;

pub struct RecordList;

#[async_trait]
impl RecordSource for RecordList {
    type Record = DomainRecord;

    fn type_name() -> &'static str {
        "abrha_records"
    }

    fn description() -> &'static str {
        "Lists the DNS records of a domain, optionally filtered and sorted"
    }

    fn record_schema() -> RecordSchema {
        RecordSchema::new()
            .attr("id", AttrKind::Int, "ID of the record")
            .attr("domain", AttrKind::String, "Domain the record belongs to")
            .attr("type", AttrKind::String, "Record type")
            .attr("name", AttrKind::String, "Name of the record")
            .attr("value", AttrKind::String, "Value of the record")
            .attr("priority", AttrKind::Int, "Priority of MX and SRV records")
            .attr("port", AttrKind::Int, "Port of SRV records")
            .attr("ttl", AttrKind::Int, "Time to live in seconds")
            .attr("weight", AttrKind::Int, "Weight of SRV records")
            .attr("flags", AttrKind::Int, "Flags of CAA records")
            .attr("tag", AttrKind::String, "Tag of CAA records")
            .plain("fqdn", AttrKind::String, "Fully qualified name of the record")
    }

    fn result_attribute() -> &'static str {
        "records"
    }

    fn extra_params() -> Vec<ExtraParam> {
        vec![ExtraParam {
            name: "domain",
            description: "Domain whose records are listed",
            required: true,
        }]
    }

    async fn fetch(
        provider: &AbrhaProviderData,
        extra: &ExtraValues,
    ) -> Result<Vec<DomainRecord>, DataListError> {
        let domain = extra
            .get("domain")
            .ok_or(DataListError::MissingParam("domain"))?;
        Ok(provider.client.records(domain).list_all().await?)
    }

    fn flatten(record: &DomainRecord, extra: &ExtraValues) -> Result<AttributeMap, DataListError> {
        let domain = extra
            .get("domain")
            .ok_or(DataListError::MissingParam("domain"))?;
        Ok(attribute_map([
            ("id", AttrValue::from(record.id)),
            ("domain", AttrValue::from(domain.as_str())),
            ("type", AttrValue::from(record.record_type.as_str())),
            ("name", AttrValue::from(record.name.as_str())),
            ("value", AttrValue::from(record.data.as_str())),
            ("priority", AttrValue::from(record.priority)),
            ("port", AttrValue::from(record.port)),
            ("ttl", AttrValue::from(record.ttl)),
            ("weight", AttrValue::from(record.weight)),
            ("flags", AttrValue::from(record.flags)),
            ("tag", AttrValue::from(record.tag.clone())),
            ("fqdn", AttrValue::from(record_fqdn(&record.name, domain))),
        ]))
    }
}

pub type RecordsDataSource = ListDataSource<RecordList>;

pub struct RecordLookup;

#[async_trait]
impl Lookup for RecordLookup {
    fn type_name() -> &'static str {
        "abrha_record"
    }

    fn schema() -> Schema {
        let mut builder = SchemaBuilder::new()
            .version(0)
            .description("Looks up a DNS record by domain and name; the first match wins")
            .attribute(
                AttributeBuilder::new("domain", AttributeType::String)
                    .description("Domain the record belongs to")
                    .required()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("name", AttributeType::String)
                    .description("Name of the record")
                    .required()
                    .build(),
            );
        for (name, kind) in [
            ("id", AttributeType::String),
            ("type", AttributeType::String),
            ("value", AttributeType::String),
            ("ttl", AttributeType::Number),
            ("priority", AttributeType::Number),
            ("port", AttributeType::Number),
            ("weight", AttributeType::Number),
            ("flags", AttributeType::Number),
            ("tag", AttributeType::String),
            ("fqdn", AttributeType::String),
        ] {
            builder = builder.attribute(AttributeBuilder::new(name, kind).computed().build());
        }
        builder.build()
    }

    async fn find(
        provider: &AbrhaProviderData,
        config: &DynamicValue,
    ) -> Result<DynamicValue, Diagnostic> {
        let domain = required_string(config, "domain")?;
        let name = required_string(config, "name")?;

        let records = provider
            .client
            .records(&domain)
            .list_all()
            .await
            .map_err(|e| lookup_failed("domain records", e))?;
        let record = records
            .iter()
            .find(|r| r.name == name)
            .ok_or_else(|| {
                Diagnostic::error(
                    "Record not found",
                    format!("no record named {} in domain {}", name, domain),
                )
            })?;
        Ok(RecordModel::into_state(record, &domain, None))
    }
}

pub type RecordDataSource = LookupDataSource<RecordLookup>;
