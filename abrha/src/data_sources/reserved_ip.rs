//! `abrha_reserved_ip` and `abrha_floating_ip`

use async_trait::async_trait;
use std::marker::PhantomData;
use tfplug::schema::{AttributeBuilder, AttributeType, Schema, SchemaBuilder};
use tfplug::types::{Diagnostic, DynamicValue};
use tfplug::validator::IsIpAddress;

use super::{lookup_failed, Lookup, LookupDataSource};
use crate::resources::required_string;
use crate::resources::reserved_ip::{Floating, IpKind, IpModel, Reserved};
use crate::AbrhaProviderData;

pub struct IpLookup<K: IpKind>(PhantomData<fn() -> K>);

#[async_trait]
impl<K: IpKind> Lookup for IpLookup<K> {
    fn type_name() -> &'static str {
        K::TYPE_NAME
    }

    fn schema() -> Schema {
        SchemaBuilder::new()
            .version(0)
            .description("Looks up an IP address reserved by the account")
            .attribute(
                AttributeBuilder::new("ip_address", AttributeType::String)
                    .description("The IP address")
                    .required()
                    .validator(IsIpAddress)
                    .build(),
            )
            .attribute(AttributeBuilder::new("id", AttributeType::String).computed().build())
            .attribute(
                AttributeBuilder::new("region", AttributeType::String)
                    .description("Region the IP is reserved in")
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("vm_id", AttributeType::Number)
                    .description("VM the IP is assigned to, if any")
                    .computed()
                    .build(),
            )
            .attribute(AttributeBuilder::new("urn", AttributeType::String).computed().build())
            .build()
    }

    async fn find(
        provider: &AbrhaProviderData,
        config: &DynamicValue,
    ) -> Result<DynamicValue, Diagnostic> {
        let ip = required_string(config, "ip_address")?;
        let label = K::FLAVOR.label();
        match provider.client.reserved_ips_of(K::FLAVOR).get(&ip).await {
            Ok(found) => Ok(IpModel::into_state(&found, K::FLAVOR)),
            Err(e) if e.is_not_found() => Err(Diagnostic::error(
                format!("No {} found", label),
                format!("{} is not reserved by this account", ip),
            )),
            Err(e) => Err(lookup_failed(label, e)),
        }
    }
}

pub type ReservedIpDataSource = LookupDataSource<IpLookup<Reserved>>;
pub type FloatingIpDataSource = LookupDataSource<IpLookup<Floating>>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{configure_data_source, provider_data, value};
    use mockito::Server;
    use tfplug::context::Context;
    use tfplug::data_source::{DataSource, ReadDataSourceRequest};
    use tfplug::types::{AttributePath, Dynamic};

    #[tokio::test]
    async fn reserved_ip_lookup() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/v2/reserved_ips/192.0.2.1")
            .with_status(200)
            .with_body(r#"{"reserved_ip":{"ip":"192.0.2.1","region":{"slug":"fra1","name":"Frankfurt 1"},"vm":{"id":12345},"locked":false}}"#)
            .create_async()
            .await;

        let (data, _) = provider_data(&server.url());
        let mut source = ReservedIpDataSource::new();
        configure_data_source(&mut source, &data).await;

        let response = source
            .read(
                Context::new(),
                ReadDataSourceRequest {
                    type_name: "abrha_reserved_ip".into(),
                    config: value(&[("ip_address", Dynamic::from("192.0.2.1"))]),
                },
            )
            .await;
        assert!(response.diagnostics.is_empty(), "{:?}", response.diagnostics);
        let state = response.state;
        assert_eq!(state.get_string(&AttributePath::new("region")).unwrap(), "fra1");
        assert_eq!(state.get_number(&AttributePath::new("vm_id")).unwrap(), 12345.0);
        assert_eq!(
            state.get_string(&AttributePath::new("urn")).unwrap(),
            "abrha:reservedip:192.0.2.1"
        );
    }

    #[tokio::test]
    async fn unknown_floating_ip_is_an_error() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/v2/floating_ips/192.0.2.9")
            .with_status(404)
            .with_body(r#"{"id":"not_found","message":"not found"}"#)
            .create_async()
            .await;

        let (data, _) = provider_data(&server.url());
        let mut source = FloatingIpDataSource::new();
        configure_data_source(&mut source, &data).await;

        let response = source
            .read(
                Context::new(),
                ReadDataSourceRequest {
                    type_name: "abrha_floating_ip".into(),
                    config: value(&[("ip_address", Dynamic::from("192.0.2.9"))]),
                },
            )
            .await;
        assert_eq!(response.diagnostics[0].summary, "No floating IP found");
    }
}
