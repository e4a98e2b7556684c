//! Generic list data sources
//!
//! A [`RecordSource`] knows how to fetch and flatten one kind of record.
//! [`ListDataSource`] turns any source into a data source with `filter` and
//! `sort` arguments and a computed result list.

pub mod filter;
pub mod schema;
pub mod sort;
pub mod source;

pub use filter::{Filter, MatchBy};
pub use schema::{attribute_map, AttrKind, AttrValue, AttributeMap, RecordSchema};
pub use sort::{Direction, Sort};
pub use source::{ExtraParam, ExtraValues, ListDataSource, RecordSource};

use tfplug::{AttributePath, Diagnostic};
use thiserror::Error;

use crate::api::ApiError;
use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum DataListError {
    #[error("invalid filter key \"{key}\"; valid keys are: {allowed}")]
    InvalidFilterKey {
        index: usize,
        key: String,
        allowed: String,
    },

    #[error("invalid sort key \"{key}\"; valid keys are: {allowed}")]
    InvalidSortKey {
        index: usize,
        key: String,
        allowed: String,
    },

    #[error("invalid match_by \"{value}\"; expected one of exact, substring, re")]
    InvalidMatchBy { index: usize, value: String },

    #[error("invalid direction \"{value}\"; expected asc or desc")]
    InvalidDirection { index: usize, value: String },

    #[error("match_by = \"{match_by}\" is not supported for {key}, a {} attribute", .kind.label())]
    UnsupportedMatch {
        index: usize,
        key: String,
        match_by: MatchBy,
        kind: AttrKind,
    },

    #[error("value \"{value}\" for {key} is not a valid {}", .kind.label())]
    InvalidFilterValue {
        index: usize,
        key: String,
        value: String,
        kind: AttrKind,
    },

    #[error("invalid regular expression \"{value}\": {source}")]
    InvalidRegex {
        index: usize,
        value: String,
        #[source]
        source: regex::Error,
    },

    #[error("{block} entry is not an object")]
    MalformedBlock { block: &'static str, index: usize },

    #[error("{block} entry is missing \"{field}\"")]
    MissingField {
        block: &'static str,
        index: usize,
        field: &'static str,
    },

    #[error("\"{0}\" is required")]
    MissingParam(&'static str),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("{0}")]
    Flatten(String),
}

impl DataListError {
    /// Configuration problems point at the offending block entry
    pub fn attribute_path(&self) -> Option<AttributePath> {
        let (block, index, field) = match self {
            DataListError::InvalidFilterKey { index, .. } => ("filter", *index, "key"),
            DataListError::InvalidFilterValue { index, .. }
            | DataListError::InvalidRegex { index, .. } => ("filter", *index, "values"),
            DataListError::InvalidMatchBy { index, .. }
            | DataListError::UnsupportedMatch { index, .. } => ("filter", *index, "match_by"),
            DataListError::InvalidSortKey { index, .. } => ("sort", *index, "key"),
            DataListError::InvalidDirection { index, .. } => ("sort", *index, "direction"),
            DataListError::MissingField {
                block,
                index,
                field,
            } => (*block, *index, *field),
            DataListError::MalformedBlock { block, index } => {
                return Some(AttributePath::new(block).index(*index as i64))
            }
            DataListError::MissingParam(name) => return Some(AttributePath::new(name)),
            _ => return None,
        };
        Some(AttributePath::new(block).index(index as i64).attribute(field))
    }

    pub fn is_config_error(&self) -> bool {
        self.attribute_path().is_some()
    }

    pub fn to_diagnostic(&self, summary: &str) -> Diagnostic {
        let diagnostic = Diagnostic::error(summary, self.to_string());
        match self.attribute_path() {
            Some(path) => diagnostic.with_attribute(path),
            None => diagnostic,
        }
    }
}
