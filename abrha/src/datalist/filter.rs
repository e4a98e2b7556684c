//! `filter` blocks: parsing, validation and matching

use regex::Regex;
use std::fmt;
use std::str::FromStr;
use tfplug::Dynamic;

use super::schema::{AttrKind, AttrValue, AttributeMap, RecordSchema};
use super::DataListError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchBy {
    #[default]
    Exact,
    Substring,
    Re,
}

impl MatchBy {
    pub const VALUES: [&'static str; 3] = ["exact", "substring", "re"];

    pub fn as_str(self) -> &'static str {
        match self {
            MatchBy::Exact => "exact",
            MatchBy::Substring => "substring",
            MatchBy::Re => "re",
        }
    }
}

impl FromStr for MatchBy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, ()> {
        match s {
            "exact" => Ok(MatchBy::Exact),
            "substring" => Ok(MatchBy::Substring),
            "re" => Ok(MatchBy::Re),
            _ => Err(()),
        }
    }
}

impl fmt::Display for MatchBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `filter` entry as written in configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub key: String,
    pub values: Vec<String>,
    pub match_by: MatchBy,
    pub all: bool,
}

#[derive(Debug, Clone)]
enum Matcher {
    Exact(AttrValue),
    Substring(String),
    Re(Regex),
}

impl Matcher {
    fn matches_scalar(&self, value: &AttrValue) -> bool {
        match (self, value) {
            (_, AttrValue::Null) => false,
            (Matcher::Exact(AttrValue::Float(want)), AttrValue::Float(got)) => {
                (want - got).abs() < f64::EPSILON
            }
            (Matcher::Exact(want), got) => want == got,
            (Matcher::Substring(needle), AttrValue::String(s)) => s.contains(needle.as_str()),
            (Matcher::Re(re), AttrValue::String(s)) => re.is_match(s),
            _ => false,
        }
    }

    fn matches(&self, value: &AttrValue) -> bool {
        match value {
            AttrValue::StringSet(items) => items
                .iter()
                .any(|item| self.matches_scalar(&AttrValue::String(item.clone()))),
            other => self.matches_scalar(other),
        }
    }
}

/// A validated filter ready to run against flattened records
#[derive(Debug, Clone)]
pub struct CompiledFilter {
    key: String,
    matchers: Vec<Matcher>,
    all: bool,
}

impl CompiledFilter {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn matches(&self, record: &AttributeMap) -> bool {
        let value = record.get(&self.key).unwrap_or(&AttrValue::Null);
        if self.all {
            self.matchers.iter().all(|m| m.matches(value))
        } else {
            self.matchers.iter().any(|m| m.matches(value))
        }
    }
}

/// Typed form of a filter value for exact matching
fn parse_exact(kind: AttrKind, raw: &str) -> Option<AttrValue> {
    match kind {
        AttrKind::String | AttrKind::StringSet => Some(AttrValue::String(raw.to_string())),
        AttrKind::Int => raw.trim().parse::<i64>().ok().map(AttrValue::Int),
        AttrKind::Float => raw.trim().parse::<f64>().ok().map(AttrValue::Float),
        AttrKind::Bool => raw.trim().parse::<bool>().ok().map(AttrValue::Bool),
    }
}

impl Filter {
    pub fn compile(&self, index: usize, schema: &RecordSchema) -> Result<CompiledFilter, DataListError> {
        let attr = schema
            .get(&self.key)
            .filter(|a| a.filterable)
            .ok_or_else(|| DataListError::InvalidFilterKey {
                index,
                key: self.key.clone(),
                allowed: schema.filterable_keys().join(", "),
            })?;

        if self.match_by != MatchBy::Exact && !attr.kind.is_textual() {
            return Err(DataListError::UnsupportedMatch {
                index,
                key: self.key.clone(),
                match_by: self.match_by,
                kind: attr.kind,
            });
        }

        let matchers = self
            .values
            .iter()
            .map(|raw| match self.match_by {
                MatchBy::Exact => {
                    parse_exact(attr.kind, raw)
                        .map(Matcher::Exact)
                        .ok_or_else(|| DataListError::InvalidFilterValue {
                            index,
                            key: self.key.clone(),
                            value: raw.clone(),
                            kind: attr.kind,
                        })
                }
                MatchBy::Substring => Ok(Matcher::Substring(raw.clone())),
                MatchBy::Re => Regex::new(raw).map(Matcher::Re).map_err(|source| {
                    DataListError::InvalidRegex {
                        index,
                        value: raw.clone(),
                        source,
                    }
                }),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(CompiledFilter {
            key: self.key.clone(),
            matchers,
            all: self.all,
        })
    }
}

/// Reads the `filter` attribute; null or unknown means no filters
pub fn parse_filters(value: Option<&Dynamic>) -> Result<Vec<Filter>, DataListError> {
    let Some(items) = value.and_then(Dynamic::as_list) else {
        return Ok(Vec::new());
    };

    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let fields = item.as_map().ok_or(DataListError::MalformedBlock {
                block: "filter",
                index,
            })?;
            let key = fields
                .get("key")
                .and_then(Dynamic::as_str)
                .ok_or(DataListError::MissingField {
                    block: "filter",
                    index,
                    field: "key",
                })?
                .to_string();
            let values: Vec<String> = fields
                .get("values")
                .and_then(Dynamic::as_list)
                .map(|vs| {
                    vs.iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default();
            if values.is_empty() {
                return Err(DataListError::MissingField {
                    block: "filter",
                    index,
                    field: "values",
                });
            }
            let match_by = match fields.get("match_by").and_then(Dynamic::as_str) {
                None => MatchBy::default(),
                Some(raw) => raw.parse().map_err(|_| DataListError::InvalidMatchBy {
                    index,
                    value: raw.to_string(),
                })?,
            };
            let all = fields.get("all").and_then(Dynamic::as_bool).unwrap_or(false);

            Ok(Filter {
                key,
                values,
                match_by,
                all,
            })
        })
        .collect()
}

/// Keeps records that satisfy every filter, preserving order
pub fn apply_filters(records: Vec<AttributeMap>, filters: &[CompiledFilter]) -> Vec<AttributeMap> {
    records
        .into_iter()
        .filter(|record| filters.iter().all(|f| f.matches(record)))
        .collect()
}
