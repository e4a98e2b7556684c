//! `abrha_vpc_peering`

use async_trait::async_trait;
use tfplug::schema::{AttributeBuilder, AttributeType, Schema, SchemaBuilder};
use tfplug::types::{AttributePath, Diagnostic, DynamicValue};

use super::{lookup_failed, Lookup, LookupDataSource};
use crate::resources::vpc_peering::PeeringModel;
use crate::AbrhaProviderData;

pub struct PeeringLookup;

#[async_trait]
impl Lookup for PeeringLookup {
    fn type_name() -> &'static str {
        "abrha_vpc_peering"
    }

    fn schema() -> Schema {
        SchemaBuilder::new()
            .version(0)
            .description("Looks up a VPC peering by id or by name")
            .attribute(
                AttributeBuilder::new("id", AttributeType::String)
                    .description("ID of the peering; conflicts with name")
                    .optional()
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("name", AttributeType::String)
                    .description("Name of the peering; conflicts with id")
                    .optional()
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("vpc_ids", AttributeType::list_of(AttributeType::String))
                    .computed()
                    .build(),
            )
            .attribute(AttributeBuilder::new("status", AttributeType::String).computed().build())
            .attribute(
                AttributeBuilder::new("created_at", AttributeType::String)
                    .computed()
                    .build(),
            )
            .build()
    }

    fn validate(config: &DynamicValue) -> Vec<Diagnostic> {
        let set = |name: &str| {
            config
                .get(&AttributePath::new(name))
                .is_some_and(|v| !v.is_null())
        };
        if set("id") == set("name") {
            vec![Diagnostic::error(
                "Invalid configuration",
                "Exactly one of `id` or `name` must be set",
            )]
        } else {
            vec![]
        }
    }

    async fn find(
        provider: &AbrhaProviderData,
        config: &DynamicValue,
    ) -> Result<DynamicValue, Diagnostic> {
        let api = provider.client.vpc_peerings();

        if let Some(id) = config.opt_string(&AttributePath::new("id")) {
            return match api.get(&id).await {
                Ok(peering) => Ok(PeeringModel::into_state(&peering)),
                Err(e) if e.is_not_found() => Err(Diagnostic::error(
                    "VPC peering not found",
                    format!("no VPC peering with id {}", id),
                )),
                Err(e) => Err(lookup_failed("VPC peering", e)),
            };
        }

        let name = config
            .opt_string(&AttributePath::new("name"))
            .unwrap_or_default();
        let peerings = api
            .list_all()
            .await
            .map_err(|e| lookup_failed("VPC peerings", e))?;
        peerings
            .iter()
            .find(|p| p.name == name)
            .map(PeeringModel::into_state)
            .ok_or_else(|| {
                Diagnostic::error(
                    "VPC peering not found",
                    format!("no VPC peering named {}", name),
                )
            })
    }
}

pub type VpcPeeringDataSource = LookupDataSource<PeeringLookup>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{configure_data_source, provider_data, value};
    use mockito::{Matcher, Server};
    use tfplug::context::Context;
    use tfplug::data_source::{DataSource, ReadDataSourceRequest, ValidateDataSourceConfigRequest};
    use tfplug::types::Dynamic;

    const PEERINGS: &str = r#"{"vpc_peerings":[
        {"id":"p-1","name":"one","vpc_ids":["a","b"],"status":"ACTIVE","created_at":"2024-01-01T00:00:00Z"},
        {"id":"p-2","name":"two","vpc_ids":["c","d"],"status":"ACTIVE","created_at":"2024-01-02T00:00:00Z"}
    ],"links":{},"meta":{"total":2}}"#;

    #[tokio::test]
    async fn id_and_name_are_exclusive() {
        let source = VpcPeeringDataSource::new();
        for config in [
            value(&[]),
            value(&[("id", Dynamic::from("p-1")), ("name", Dynamic::from("one"))]),
        ] {
            let response = source
                .validate(
                    Context::new(),
                    ValidateDataSourceConfigRequest {
                        type_name: "abrha_vpc_peering".into(),
                        config,
                    },
                )
                .await;
            assert_eq!(response.diagnostics.len(), 1);
        }
    }

    #[tokio::test]
    async fn lookup_by_name_scans_the_list() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/v2/vpc_peerings")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(PEERINGS)
            .create_async()
            .await;

        let (data, _) = provider_data(&server.url());
        let mut source = VpcPeeringDataSource::new();
        configure_data_source(&mut source, &data).await;

        let response = source
            .read(
                Context::new(),
                ReadDataSourceRequest {
                    type_name: "abrha_vpc_peering".into(),
                    config: value(&[("name", Dynamic::from("two"))]),
                },
            )
            .await;
        assert!(response.diagnostics.is_empty(), "{:?}", response.diagnostics);
        assert_eq!(
            response.state.get_string(&AttributePath::new("id")).unwrap(),
            "p-2"
        );
        assert_eq!(
            response
                .state
                .opt_string_list(&AttributePath::new("vpc_ids"))
                .unwrap(),
            vec!["c".to_string(), "d".to_string()]
        );
    }

    #[tokio::test]
    async fn lookup_by_id() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/v2/vpc_peerings/p-1")
            .with_status(200)
            .with_body(r#"{"vpc_peering":{"id":"p-1","name":"one","vpc_ids":["a","b"],"status":"ACTIVE","created_at":"2024-01-01T00:00:00Z"}}"#)
            .create_async()
            .await;

        let (data, _) = provider_data(&server.url());
        let mut source = VpcPeeringDataSource::new();
        configure_data_source(&mut source, &data).await;

        let response = source
            .read(
                Context::new(),
                ReadDataSourceRequest {
                    type_name: "abrha_vpc_peering".into(),
                    config: value(&[("id", Dynamic::from("p-1"))]),
                },
            )
            .await;
        assert!(response.diagnostics.is_empty(), "{:?}", response.diagnostics);
        assert_eq!(
            response.state.get_string(&AttributePath::new("name")).unwrap(),
            "one"
        );
    }
}
