//! `sort` blocks

use std::cmp::Ordering;
use std::str::FromStr;
use tfplug::Dynamic;

use super::schema::{AttrValue, AttributeMap, RecordSchema};
use super::DataListError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub const VALUES: [&'static str; 2] = ["asc", "desc"];

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Asc => "asc",
            Direction::Desc => "desc",
        }
    }
}

impl FromStr for Direction {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, ()> {
        match s {
            "asc" => Ok(Direction::Asc),
            "desc" => Ok(Direction::Desc),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sort {
    pub key: String,
    pub direction: Direction,
}

impl Sort {
    pub fn check(&self, index: usize, schema: &RecordSchema) -> Result<(), DataListError> {
        match schema.get(&self.key) {
            Some(attr) if attr.sortable => Ok(()),
            _ => Err(DataListError::InvalidSortKey {
                index,
                key: self.key.clone(),
                allowed: schema.sortable_keys().join(", "),
            }),
        }
    }
}

pub fn parse_sorts(value: Option<&Dynamic>) -> Result<Vec<Sort>, DataListError> {
    let Some(items) = value.and_then(Dynamic::as_list) else {
        return Ok(Vec::new());
    };

    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let fields = item.as_map().ok_or(DataListError::MalformedBlock {
                block: "sort",
                index,
            })?;
            let key = fields
                .get("key")
                .and_then(Dynamic::as_str)
                .ok_or(DataListError::MissingField {
                    block: "sort",
                    index,
                    field: "key",
                })?
                .to_string();
            let direction = match fields.get("direction").and_then(Dynamic::as_str) {
                None => Direction::default(),
                Some(raw) => raw.parse().map_err(|_| DataListError::InvalidDirection {
                    index,
                    value: raw.to_string(),
                })?,
            };
            Ok(Sort { key, direction })
        })
        .collect()
}

/// Stable sort; the first entry in `sorts` is the most significant
pub fn apply_sorts(records: &mut [AttributeMap], sorts: &[Sort]) {
    if sorts.is_empty() {
        return;
    }
    records.sort_by(|a, b| {
        sorts
            .iter()
            .map(|sort| {
                let left = a.get(&sort.key).unwrap_or(&AttrValue::Null);
                let right = b.get(&sort.key).unwrap_or(&AttrValue::Null);
                let ordering = left.compare(right);
                match sort.direction {
                    Direction::Asc => ordering,
                    Direction::Desc => ordering.reverse(),
                }
            })
            .find(|o| *o != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datalist::schema::{attribute_map, AttrKind};

    fn rec(name: &str, ttl: i64) -> AttributeMap {
        attribute_map([("name", AttrValue::from(name)), ("ttl", AttrValue::from(ttl))])
    }

    fn names(records: &[AttributeMap]) -> Vec<String> {
        records
            .iter()
            .map(|r| match &r["name"] {
                AttrValue::String(s) => s.clone(),
                other => panic!("unexpected {:?}", other),
            })
            .collect()
    }

    fn sort(key: &str, direction: Direction) -> Sort {
        Sort {
            key: key.to_string(),
            direction,
        }
    }

    #[test]
    fn multiple_sorts_apply_in_order() {
        let mut records = vec![rec("c", 300), rec("a", 300), rec("b", 100)];
        apply_sorts(
            &mut records,
            &[sort("ttl", Direction::Desc), sort("name", Direction::Asc)],
        );
        assert_eq!(names(&records), vec!["a", "c", "b"]);
    }

    #[test]
    fn ties_keep_fetch_order() {
        let mut records = vec![rec("z", 1), rec("y", 1), rec("x", 0)];
        apply_sorts(&mut records, &[sort("ttl", Direction::Desc)]);
        assert_eq!(names(&records), vec!["z", "y", "x"]);
    }

    #[test]
    fn set_attributes_cannot_be_sort_keys() {
        let schema = RecordSchema::new()
            .attr("name", AttrKind::String, "")
            .attr("vpc_ids", AttrKind::StringSet, "");
        assert!(sort("name", Direction::Asc).check(0, &schema).is_ok());
        assert!(matches!(
            sort("vpc_ids", Direction::Asc).check(1, &schema),
            Err(DataListError::InvalidSortKey { index: 1, .. })
        ));
    }
}
