//! Attribute validators run by [`crate::schema::Schema::validate`]

use crate::types::{AttributePath, Diagnostic, Dynamic};
use std::net::IpAddr;

pub trait Validator: Send + Sync {
    fn description(&self) -> String;

    /// Called only with known, non-null values
    fn validate(&self, value: &Dynamic, path: &AttributePath) -> Vec<Diagnostic>;
}

fn invalid(path: &AttributePath, summary: String, detail: String) -> Vec<Diagnostic> {
    vec![Diagnostic::error(summary, detail).with_attribute(path.clone())]
}

pub struct StringLengthBetween {
    pub min: usize,
    pub max: usize,
}

impl StringLengthBetween {
    pub fn new(min: usize, max: usize) -> Self {
        Self { min, max }
    }
}

impl Validator for StringLengthBetween {
    fn description(&self) -> String {
        format!("length must be between {} and {}", self.min, self.max)
    }

    fn validate(&self, value: &Dynamic, path: &AttributePath) -> Vec<Diagnostic> {
        match value.as_str() {
            Some(s) if s.len() < self.min || s.len() > self.max => invalid(
                path,
                format!("{} must be between {} and {} characters", path, self.min, self.max),
                format!("Got length {}", s.len()),
            ),
            _ => vec![],
        }
    }
}

pub struct StringOneOf {
    pub allowed: Vec<String>,
}

impl StringOneOf {
    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: allowed.into_iter().map(Into::into).collect(),
        }
    }
}

impl Validator for StringOneOf {
    fn description(&self) -> String {
        format!("value must be one of: {}", self.allowed.join(", "))
    }

    fn validate(&self, value: &Dynamic, path: &AttributePath) -> Vec<Diagnostic> {
        match value.as_str() {
            Some(s) if !self.allowed.iter().any(|a| a == s) => invalid(
                path,
                format!("Invalid value for {}", path),
                format!("expected one of [{}], got \"{}\"", self.allowed.join(", "), s),
            ),
            _ => vec![],
        }
    }
}

pub struct StringMatches {
    pub pattern: regex::Regex,
    pub description: String,
}

impl StringMatches {
    pub fn new(pattern: regex::Regex, description: &str) -> Self {
        Self {
            pattern,
            description: description.to_string(),
        }
    }
}

impl Validator for StringMatches {
    fn description(&self) -> String {
        self.description.clone()
    }

    fn validate(&self, value: &Dynamic, path: &AttributePath) -> Vec<Diagnostic> {
        match value.as_str() {
            Some(s) if !self.pattern.is_match(s) => invalid(
                path,
                format!("{} must match {}", path, self.description),
                format!("Value '{}' does not match pattern", s),
            ),
            _ => vec![],
        }
    }
}

pub struct NumberBetween {
    pub min: f64,
    pub max: f64,
}

impl NumberBetween {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }
}

impl Validator for NumberBetween {
    fn description(&self) -> String {
        format!("value must be between {} and {}", self.min, self.max)
    }

    fn validate(&self, value: &Dynamic, path: &AttributePath) -> Vec<Diagnostic> {
        match value.as_f64() {
            Some(n) if n < self.min || n > self.max => invalid(
                path,
                format!("{} must be between {} and {}", path, self.min, self.max),
                format!("Got {}", n),
            ),
            _ => vec![],
        }
    }
}

/// Rejects numbers with a fractional part
pub struct IsWholeNumber;

impl Validator for IsWholeNumber {
    fn description(&self) -> String {
        "value must be a whole number".to_string()
    }

    fn validate(&self, value: &Dynamic, path: &AttributePath) -> Vec<Diagnostic> {
        match value.as_f64() {
            Some(n) if value.as_i64().is_none() => invalid(
                path,
                format!("{} must be a whole number", path),
                format!("Got {}", n),
            ),
            _ => vec![],
        }
    }
}

pub struct ListLengthBetween {
    pub min: usize,
    pub max: usize,
}

impl ListLengthBetween {
    pub fn new(min: usize, max: usize) -> Self {
        Self { min, max }
    }
}

impl Validator for ListLengthBetween {
    fn description(&self) -> String {
        format!("must contain between {} and {} items", self.min, self.max)
    }

    fn validate(&self, value: &Dynamic, path: &AttributePath) -> Vec<Diagnostic> {
        match value.as_list() {
            Some(items) if items.len() < self.min || items.len() > self.max => invalid(
                path,
                format!(
                    "{} must contain between {} and {} items",
                    path, self.min, self.max
                ),
                format!("Got {} items", items.len()),
            ),
            _ => vec![],
        }
    }
}

/// Accepts IPv4 and IPv6 literals
pub struct IsIpAddress;

impl Validator for IsIpAddress {
    fn description(&self) -> String {
        "value must be an IP address".to_string()
    }

    fn validate(&self, value: &Dynamic, path: &AttributePath) -> Vec<Diagnostic> {
        match value.as_str() {
            Some(s) if s.parse::<IpAddr>().is_err() => invalid(
                path,
                format!("{} must be a valid IP address", path),
                format!("\"{}\" is not an IPv4 or IPv6 address", s),
            ),
            _ => vec![],
        }
    }
}

/// Accepts strings that parse as JSON
pub struct IsJson;

impl Validator for IsJson {
    fn description(&self) -> String {
        "value must be valid JSON".to_string()
    }

    fn validate(&self, value: &Dynamic, path: &AttributePath) -> Vec<Diagnostic> {
        match value.as_str() {
            Some(s) => match serde_json::from_str::<serde_json::Value>(s) {
                Ok(_) => vec![],
                Err(e) => invalid(path, format!("{} must be valid JSON", path), e.to_string()),
            },
            None => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path() -> AttributePath {
        AttributePath::new("field")
    }

    #[test]
    fn string_length_between() {
        let v = StringLengthBetween::new(3, 5);
        assert!(v.validate(&Dynamic::from("abcd"), &path()).is_empty());
        assert_eq!(v.validate(&Dynamic::from("ab"), &path()).len(), 1);
        assert_eq!(v.validate(&Dynamic::from("abcdef"), &path()).len(), 1);
    }

    #[test]
    fn string_one_of_names_allowed_values() {
        let v = StringOneOf::new(["private", "public-read"]);
        assert!(v.validate(&Dynamic::from("private"), &path()).is_empty());

        let diags = v.validate(&Dynamic::from("public"), &path());
        assert_eq!(diags.len(), 1);
        assert!(diags[0].detail.contains("private, public-read"));
        assert_eq!(diags[0].attribute, Some(path()));
    }

    #[test]
    fn string_matches_pattern() {
        let v = StringMatches::new(
            regex::Regex::new(r"^[a-z0-9-]+$").unwrap(),
            "lowercase alphanumerics and dashes",
        );
        assert!(v.validate(&Dynamic::from("my-bucket"), &path()).is_empty());
        assert_eq!(v.validate(&Dynamic::from("My_Bucket"), &path()).len(), 1);
    }

    #[test]
    fn number_between() {
        let v = NumberBetween::new(0.0, 65535.0);
        assert!(v.validate(&Dynamic::Number(443.0), &path()).is_empty());
        assert_eq!(v.validate(&Dynamic::Number(-1.0), &path()).len(), 1);
        assert_eq!(v.validate(&Dynamic::Number(70000.0), &path()).len(), 1);
    }

    #[test]
    fn whole_number() {
        assert!(IsWholeNumber.validate(&Dynamic::Number(1800.0), &path()).is_empty());
        assert_eq!(IsWholeNumber.validate(&Dynamic::Number(1.5), &path()).len(), 1);
        assert!(IsWholeNumber.validate(&Dynamic::Unknown, &path()).is_empty());
    }

    #[test]
    fn list_length_between() {
        let v = ListLengthBetween::new(2, 2);
        assert!(v
            .validate(&Dynamic::string_list(["a", "b"]), &path())
            .is_empty());
        assert_eq!(v.validate(&Dynamic::string_list(["a"]), &path()).len(), 1);
    }

    #[test]
    fn ip_address() {
        assert!(IsIpAddress
            .validate(&Dynamic::from("192.0.2.1"), &path())
            .is_empty());
        assert!(IsIpAddress
            .validate(&Dynamic::from("2001:db8::1"), &path())
            .is_empty());
        assert_eq!(
            IsIpAddress
                .validate(&Dynamic::from("192.0.2"), &path())
                .len(),
            1
        );
    }

    #[test]
    fn json_documents() {
        assert!(IsJson
            .validate(&Dynamic::from(r#"{"Version":"2012-10-17"}"#), &path())
            .is_empty());
        assert_eq!(IsJson.validate(&Dynamic::from("{"), &path()).len(), 1);
    }
}
