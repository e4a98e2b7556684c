//! [`RecordSource`] and the data source built on it

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::marker::PhantomData;
use tfplug::context::Context;
use tfplug::data_source::{
    ConfigureDataSourceRequest, ConfigureDataSourceResponse, DataSource, DataSourceMetadataRequest,
    DataSourceMetadataResponse, DataSourceSchemaRequest, DataSourceSchemaResponse,
    DataSourceWithConfigure, ReadDataSourceRequest, ReadDataSourceResponse,
    ValidateDataSourceConfigRequest, ValidateDataSourceConfigResponse,
};
use tfplug::schema::{AttributeBuilder, AttributeType, SchemaBuilder};
use tfplug::types::{AttributePath, Diagnostic, Dynamic, DynamicValue};
use uuid::Uuid;

use super::filter::{apply_filters, parse_filters, CompiledFilter, Filter};
use super::schema::{to_dynamic, AttributeMap, RecordSchema};
use super::sort::{apply_sorts, parse_sorts, Sort};
use super::DataListError;
use crate::AbrhaProviderData;

/// An additional lookup argument such as the domain of `abrha_records`
#[derive(Debug, Clone)]
pub struct ExtraParam {
    pub name: &'static str,
    pub description: &'static str,
    pub required: bool,
}

pub type ExtraValues = BTreeMap<&'static str, String>;

/// Fetching and flattening for one kind of listable record
#[async_trait]
pub trait RecordSource: Send + Sync + 'static {
    type Record: Send + Sync;

    fn type_name() -> &'static str;

    fn description() -> &'static str;

    fn record_schema() -> RecordSchema;

    /// Name of the computed list holding the results
    fn result_attribute() -> &'static str;

    fn extra_params() -> Vec<ExtraParam> {
        Vec::new()
    }

    /// Every record, across all pages
    async fn fetch(
        provider: &AbrhaProviderData,
        extra: &ExtraValues,
    ) -> Result<Vec<Self::Record>, DataListError>;

    fn flatten(record: &Self::Record, extra: &ExtraValues) -> Result<AttributeMap, DataListError>;
}

/// Parsed and validated arguments of one read
struct Query {
    extra: ExtraValues,
    filters: Vec<Filter>,
    compiled: Vec<CompiledFilter>,
    sorts: Vec<Sort>,
}

fn contains_unknown(value: &Dynamic) -> bool {
    match value {
        Dynamic::Unknown => true,
        Dynamic::List(items) => items.iter().any(contains_unknown),
        Dynamic::Map(fields) => fields.values().any(contains_unknown),
        _ => false,
    }
}

impl Query {
    fn parse<S: RecordSource>(config: &DynamicValue) -> Result<Self, Vec<DataListError>> {
        let schema = S::record_schema();
        let mut errors = Vec::new();

        let mut extra = ExtraValues::new();
        for param in S::extra_params() {
            match config.opt_string(&AttributePath::new(param.name)) {
                Some(value) => {
                    extra.insert(param.name, value);
                }
                None if param.required => errors.push(DataListError::MissingParam(param.name)),
                None => {}
            }
        }

        let filters = parse_filters(config.get(&AttributePath::new("filter"))).unwrap_or_else(|e| {
            errors.push(e);
            Vec::new()
        });
        let compiled: Vec<CompiledFilter> = filters
            .iter()
            .enumerate()
            .filter_map(|(index, f)| f.compile(index, &schema).map_err(|e| errors.push(e)).ok())
            .collect();

        let sorts = parse_sorts(config.get(&AttributePath::new("sort"))).unwrap_or_else(|e| {
            errors.push(e);
            Vec::new()
        });
        for (index, sort) in sorts.iter().enumerate() {
            if let Err(e) = sort.check(index, &schema) {
                errors.push(e);
            }
        }

        if errors.is_empty() {
            Ok(Self {
                extra,
                filters,
                compiled,
                sorts,
            })
        } else {
            Err(errors)
        }
    }

    /// Stable across reads with the same arguments
    fn id(&self, type_name: &str) -> String {
        let mut canonical = String::from(type_name);
        for (name, value) in &self.extra {
            canonical.push_str(&format!("|{}={}", name, value));
        }
        for filter in &self.filters {
            canonical.push_str(&format!(
                "|filter:{}:{}:{}:{}",
                filter.key,
                filter.match_by,
                filter.all,
                filter.values.join(",")
            ));
        }
        for sort in &self.sorts {
            canonical.push_str(&format!("|sort:{}:{}", sort.key, sort.direction.as_str()));
        }
        Uuid::new_v5(&Uuid::NAMESPACE_OID, canonical.as_bytes()).to_string()
    }
}

fn config_diagnostics(errors: Vec<DataListError>) -> Vec<Diagnostic> {
    errors
        .iter()
        .map(|e| e.to_diagnostic("Invalid data source configuration"))
        .collect()
}

/// Data source listing the records of `S`
pub struct ListDataSource<S: RecordSource> {
    provider_data: Option<AbrhaProviderData>,
    _source: PhantomData<fn() -> S>,
}

impl<S: RecordSource> ListDataSource<S> {
    pub fn new() -> Self {
        Self {
            provider_data: None,
            _source: PhantomData,
        }
    }

    pub fn factory() -> Box<dyn DataSourceWithConfigure> {
        Box::new(Self::new())
    }

    /// Fetches, flattens, filters and sorts
    async fn list(
        &self,
        provider_data: &AbrhaProviderData,
        query: &Query,
    ) -> Result<Vec<AttributeMap>, Diagnostic> {
        let retrieve_failed = |e: DataListError| {
            Diagnostic::error(
                format!("Error retrieving {}", S::result_attribute()),
                e.to_string(),
            )
        };

        let records = S::fetch(provider_data, &query.extra)
            .await
            .map_err(retrieve_failed)?;
        tracing::debug!("{}: fetched {} records", S::type_name(), records.len());

        let flattened = records
            .iter()
            .map(|record| S::flatten(record, &query.extra))
            .collect::<Result<Vec<_>, _>>()
            .map_err(retrieve_failed)?;

        let mut kept = apply_filters(flattened, &query.compiled);
        apply_sorts(&mut kept, &query.sorts);
        Ok(kept)
    }
}

impl<S: RecordSource> Default for ListDataSource<S> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<S: RecordSource> DataSource for ListDataSource<S> {
    fn type_name(&self) -> &str {
        S::type_name()
    }

    async fn metadata(
        &self,
        _ctx: Context,
        _request: DataSourceMetadataRequest,
    ) -> DataSourceMetadataResponse {
        DataSourceMetadataResponse {
            type_name: S::type_name().to_string(),
        }
    }

    async fn schema(
        &self,
        _ctx: Context,
        _request: DataSourceSchemaRequest,
    ) -> DataSourceSchemaResponse {
        let record_schema = S::record_schema();
        let mut builder = SchemaBuilder::new().version(0).description(S::description());

        for param in S::extra_params() {
            let attr = AttributeBuilder::new(param.name, AttributeType::String)
                .description(param.description);
            builder = builder.attribute(if param.required {
                attr.required().build()
            } else {
                attr.optional().build()
            });
        }

        let schema = builder
            .attribute(
                AttributeBuilder::new("id", AttributeType::String)
                    .description("Identifier derived from the query arguments")
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new(
                    "filter",
                    AttributeType::list_of(AttributeType::object([
                        ("key", AttributeType::String),
                        ("values", AttributeType::list_of(AttributeType::String)),
                        ("match_by", AttributeType::String),
                        ("all", AttributeType::Bool),
                    ])),
                )
                .description(
                    "Keep only records whose attribute `key` matches one of `values` \
                     (all of them when `all` is true). `match_by` is exact, substring or re.",
                )
                .optional()
                .build(),
            )
            .attribute(
                AttributeBuilder::new(
                    "sort",
                    AttributeType::list_of(AttributeType::object([
                        ("key", AttributeType::String),
                        ("direction", AttributeType::String),
                    ])),
                )
                .description("Sort results by `key`, `direction` asc or desc. Earlier entries take precedence.")
                .optional()
                .build(),
            )
            .attribute(
                AttributeBuilder::new(
                    S::result_attribute(),
                    AttributeType::list_of(record_schema.object_type()),
                )
                .description("Matching records")
                .computed()
                .build(),
            )
            .build();

        DataSourceSchemaResponse {
            schema,
            diagnostics: vec![],
        }
    }

    async fn validate(
        &self,
        _ctx: Context,
        request: ValidateDataSourceConfigRequest,
    ) -> ValidateDataSourceConfigResponse {
        if contains_unknown(&request.config.value) {
            return ValidateDataSourceConfigResponse {
                diagnostics: vec![],
            };
        }

        let diagnostics = match Query::parse::<S>(&request.config) {
            Ok(_) => vec![],
            Err(errors) => config_diagnostics(errors),
        };
        ValidateDataSourceConfigResponse { diagnostics }
    }

    async fn read(&self, _ctx: Context, request: ReadDataSourceRequest) -> ReadDataSourceResponse {
        let mut state = request.config.clone();

        let Some(provider_data) = &self.provider_data else {
            return ReadDataSourceResponse {
                state,
                diagnostics: vec![Diagnostic::error(
                    "Provider not configured",
                    "Provider data was not properly configured",
                )],
            };
        };

        let query = match Query::parse::<S>(&request.config) {
            Ok(query) => query,
            Err(errors) => {
                return ReadDataSourceResponse {
                    state,
                    diagnostics: config_diagnostics(errors),
                }
            }
        };

        let records = match self.list(provider_data, &query).await {
            Ok(records) => records,
            Err(diagnostic) => {
                return ReadDataSourceResponse {
                    state,
                    diagnostics: vec![diagnostic],
                }
            }
        };

        let record_schema = S::record_schema();
        let list = records
            .iter()
            .map(|record| to_dynamic(&record_schema, record))
            .collect();

        let mut diagnostics = vec![];
        for result in [
            state.set_list(&AttributePath::new(S::result_attribute()), list),
            state.set_string(&AttributePath::new("id"), query.id(S::type_name())),
        ] {
            if let Err(e) = result {
                diagnostics.push(Diagnostic::error("Failed to set state", e.to_string()));
            }
        }

        ReadDataSourceResponse { state, diagnostics }
    }
}

#[async_trait]
impl<S: RecordSource> DataSourceWithConfigure for ListDataSource<S> {
    async fn configure(
        &mut self,
        _ctx: Context,
        request: ConfigureDataSourceRequest,
    ) -> ConfigureDataSourceResponse {
        let mut diagnostics = vec![];

        if let Some(data) = request.provider_data {
            if let Some(provider_data) = data.downcast_ref::<AbrhaProviderData>() {
                self.provider_data = Some(provider_data.clone());
            } else {
                diagnostics.push(Diagnostic::error(
                    "Unexpected provider data type",
                    "Expected AbrhaProviderData",
                ));
            }
        }

        ConfigureDataSourceResponse { diagnostics }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datalist::{attribute_map, AttrKind, AttrValue};
    use crate::test_support::{configure_data_source, provider_data, value};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static FETCHES: AtomicUsize = AtomicUsize::new(0);

    struct Tagged {
        name: &'static str,
        tags: Vec<String>,
    }

    struct TaggedList;

    #[async_trait]
    impl RecordSource for TaggedList {
        type Record = Tagged;

        fn type_name() -> &'static str {
            "abrha_tagged"
        }

        fn description() -> &'static str {
            "Tagged things"
        }

        fn record_schema() -> RecordSchema {
            RecordSchema::new()
                .attr("name", AttrKind::String, "")
                .attr("tags", AttrKind::StringSet, "")
        }

        fn result_attribute() -> &'static str {
            "things"
        }

        async fn fetch(
            _provider: &AbrhaProviderData,
            _extra: &ExtraValues,
        ) -> Result<Vec<Tagged>, DataListError> {
            FETCHES.fetch_add(1, Ordering::SeqCst);
            Ok(vec![
                Tagged {
                    name: "b",
                    tags: vec!["web".into()],
                },
                Tagged {
                    name: "a",
                    tags: vec!["web".into(), "db".into()],
                },
            ])
        }

        fn flatten(record: &Tagged, _extra: &ExtraValues) -> Result<AttributeMap, DataListError> {
            Ok(attribute_map([
                ("name", AttrValue::from(record.name)),
                ("tags", AttrValue::from(record.tags.clone())),
            ]))
        }
    }

    fn block(pairs: &[(&str, Dynamic)]) -> Dynamic {
        Dynamic::Map(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect::<HashMap<_, _>>(),
        )
    }

    async fn configured() -> ListDataSource<TaggedList> {
        let (data, _) = provider_data("http://127.0.0.1:1");
        let mut source = ListDataSource::<TaggedList>::new();
        configure_data_source(&mut source, &data).await;
        source
    }

    async fn read(
        source: &ListDataSource<TaggedList>,
        config: DynamicValue,
    ) -> ReadDataSourceResponse {
        source
            .read(
                Context::new(),
                ReadDataSourceRequest {
                    type_name: "abrha_tagged".into(),
                    config,
                },
            )
            .await
    }

    #[tokio::test]
    async fn sorting_on_a_set_is_rejected_before_fetching() {
        let source = configured().await;
        let before = FETCHES.load(Ordering::SeqCst);

        let config = value(&[
            (
                "filter",
                Dynamic::List(vec![block(&[
                    ("key", Dynamic::from("zone")),
                    ("values", Dynamic::string_list(["x"])),
                ])]),
            ),
            ("sort", Dynamic::List(vec![block(&[("key", Dynamic::from("tags"))])])),
        ]);
        let response = read(&source, config.clone()).await;

        let paths: Vec<String> = response
            .diagnostics
            .iter()
            .map(|d| d.attribute.as_ref().map(ToString::to_string).unwrap_or_default())
            .collect();
        assert_eq!(paths, vec!["filter[0].key", "sort[0].key"]);
        assert!(response.diagnostics[1].detail.contains("valid keys are: name"));
        assert_eq!(FETCHES.load(Ordering::SeqCst), before);

        let validated = source
            .validate(
                Context::new(),
                ValidateDataSourceConfigRequest {
                    type_name: "abrha_tagged".into(),
                    config,
                },
            )
            .await;
        assert_eq!(validated.diagnostics.len(), 2);
    }

    #[tokio::test]
    async fn set_attributes_filter_by_membership() {
        let source = configured().await;
        let config = value(&[
            (
                "filter",
                Dynamic::List(vec![block(&[
                    ("key", Dynamic::from("tags")),
                    ("values", Dynamic::string_list(["db"])),
                ])]),
            ),
            ("sort", Dynamic::List(vec![block(&[("key", Dynamic::from("name"))])])),
        ]);
        let response = read(&source, config).await;
        assert!(response.diagnostics.is_empty(), "{:?}", response.diagnostics);

        let things = response.state.get_list(&AttributePath::new("things")).unwrap();
        assert_eq!(things.len(), 1);
        assert_eq!(things[0].as_map().unwrap()["name"].as_str(), Some("a"));
        assert!(response.state.get_string(&AttributePath::new("id")).is_ok());
    }
}
