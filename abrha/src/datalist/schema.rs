//! Record schemas and flattened attribute values

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use tfplug::{AttributeType, Dynamic};

/// Semantic kind of a record attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrKind {
    String,
    Int,
    Float,
    Bool,
    StringSet,
}

impl AttrKind {
    pub fn attribute_type(self) -> AttributeType {
        match self {
            AttrKind::String => AttributeType::String,
            AttrKind::Int | AttrKind::Float => AttributeType::Number,
            AttrKind::Bool => AttributeType::Bool,
            AttrKind::StringSet => AttributeType::set_of(AttributeType::String),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AttrKind::String => "string",
            AttrKind::Int => "integer",
            AttrKind::Float => "float",
            AttrKind::Bool => "bool",
            AttrKind::StringSet => "set of strings",
        }
    }

    pub fn is_textual(self) -> bool {
        matches!(self, AttrKind::String | AttrKind::StringSet)
    }
}

#[derive(Debug, Clone)]
pub struct RecordAttr {
    pub name: &'static str,
    pub kind: AttrKind,
    pub description: &'static str,
    pub filterable: bool,
    pub sortable: bool,
}

/// Ordered attribute declarations of one record type
#[derive(Debug, Clone, Default)]
pub struct RecordSchema {
    attrs: Vec<RecordAttr>,
}

impl RecordSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a filterable attribute; sets are never sortable
    pub fn attr(mut self, name: &'static str, kind: AttrKind, description: &'static str) -> Self {
        self.attrs.push(RecordAttr {
            name,
            kind,
            description,
            filterable: true,
            sortable: kind != AttrKind::StringSet,
        });
        self
    }

    /// Adds an attribute that is only reported, never filtered or sorted on
    pub fn plain(mut self, name: &'static str, kind: AttrKind, description: &'static str) -> Self {
        self.attrs.push(RecordAttr {
            name,
            kind,
            description,
            filterable: false,
            sortable: false,
        });
        self
    }

    pub fn attrs(&self) -> &[RecordAttr] {
        &self.attrs
    }

    pub fn get(&self, name: &str) -> Option<&RecordAttr> {
        self.attrs.iter().find(|a| a.name == name)
    }

    pub fn filterable_keys(&self) -> Vec<&'static str> {
        self.attrs
            .iter()
            .filter(|a| a.filterable)
            .map(|a| a.name)
            .collect()
    }

    pub fn sortable_keys(&self) -> Vec<&'static str> {
        self.attrs
            .iter()
            .filter(|a| a.sortable)
            .map(|a| a.name)
            .collect()
    }

    /// Element type of the result list
    pub fn object_type(&self) -> AttributeType {
        AttributeType::object(self.attrs.iter().map(|a| (a.name, a.kind.attribute_type())))
    }
}

/// One flattened attribute value
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Null,
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    StringSet(Vec<String>),
}

impl AttrValue {
    pub fn to_dynamic(&self) -> Dynamic {
        match self {
            AttrValue::Null => Dynamic::Null,
            AttrValue::String(s) => Dynamic::String(s.clone()),
            AttrValue::Int(i) => Dynamic::from(*i),
            AttrValue::Float(f) => Dynamic::Number(*f),
            AttrValue::Bool(b) => Dynamic::Bool(*b),
            AttrValue::StringSet(items) => Dynamic::string_list(items.iter().cloned()),
        }
    }

    /// Orders values of the same kind; nulls sort first
    pub fn compare(&self, other: &AttrValue) -> Ordering {
        match (self, other) {
            (AttrValue::Null, AttrValue::Null) => Ordering::Equal,
            (AttrValue::Null, _) => Ordering::Less,
            (_, AttrValue::Null) => Ordering::Greater,
            (AttrValue::String(a), AttrValue::String(b)) => a.cmp(b),
            (AttrValue::Int(a), AttrValue::Int(b)) => a.cmp(b),
            (AttrValue::Float(a), AttrValue::Float(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            (AttrValue::Bool(a), AttrValue::Bool(b)) => a.cmp(b),
            (AttrValue::StringSet(a), AttrValue::StringSet(b)) => a.cmp(b),
            _ => Ordering::Equal,
        }
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::String(s)
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::String(s.to_string())
    }
}

impl From<i64> for AttrValue {
    fn from(i: i64) -> Self {
        AttrValue::Int(i)
    }
}

impl From<f64> for AttrValue {
    fn from(f: f64) -> Self {
        AttrValue::Float(f)
    }
}

impl From<bool> for AttrValue {
    fn from(b: bool) -> Self {
        AttrValue::Bool(b)
    }
}

impl From<Vec<String>> for AttrValue {
    fn from(items: Vec<String>) -> Self {
        AttrValue::StringSet(items)
    }
}

impl<T: Into<AttrValue>> From<Option<T>> for AttrValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(AttrValue::Null)
    }
}

pub type AttributeMap = BTreeMap<String, AttrValue>;

/// Builds an [`AttributeMap`] from `(name, value)` pairs
pub fn attribute_map<I, V>(pairs: I) -> AttributeMap
where
    I: IntoIterator<Item = (&'static str, V)>,
    V: Into<AttrValue>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.into()))
        .collect()
}

/// Object value for state; attributes missing from the map become null
pub fn to_dynamic(schema: &RecordSchema, record: &AttributeMap) -> Dynamic {
    let fields: HashMap<String, Dynamic> = schema
        .attrs()
        .iter()
        .map(|attr| {
            let value = record
                .get(attr.name)
                .map(AttrValue::to_dynamic)
                .unwrap_or(Dynamic::Null);
            (attr.name.to_string(), value)
        })
        .collect();
    Dynamic::Map(fields)
}
