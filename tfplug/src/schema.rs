//! Schema types and builders for tfplug
//!
//! A [`Schema`] declares the attributes of a provider, resource or data
//! source. Besides describing the shape to Terraform it drives two framework
//! steps the plugin host runs before calling a handler:
//! [`Schema::validate`] and [`Schema::plan`].

use crate::plan_modifier::{PlanModifier, PlanModifierRequest};
use crate::types::{AttributePath, Diagnostic, Dynamic, DynamicValue};
use crate::validator::Validator;
use std::collections::HashMap;
use std::sync::Arc;

/// AttributeType mirrors Terraform's type system
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeType {
    String,
    Number, // Always f64
    Bool,
    List(Box<AttributeType>),               // Ordered, allows duplicates
    Set(Box<AttributeType>),                // Unordered, no duplicates
    Map(Box<AttributeType>),                // String keys only
    Object(HashMap<String, AttributeType>), // Fixed structure
}

impl AttributeType {
    pub fn list_of(element: AttributeType) -> Self {
        AttributeType::List(Box::new(element))
    }

    pub fn set_of(element: AttributeType) -> Self {
        AttributeType::Set(Box::new(element))
    }

    pub fn object<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = (S, AttributeType)>,
        S: Into<String>,
    {
        AttributeType::Object(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// Schema is returned by providers/resources/data sources
/// Version is used for state migration
#[derive(Debug, Clone)]
pub struct Schema {
    pub version: i64,
    pub block: Block,
}

#[derive(Debug, Clone, Default)]
pub struct Block {
    pub attributes: Vec<Attribute>,
    pub description: String,
    pub deprecated: bool,
}

#[derive(Clone)]
pub struct Attribute {
    pub name: String,
    pub r#type: AttributeType,
    pub description: String,
    pub required: bool,
    pub optional: bool,
    pub computed: bool,
    pub sensitive: bool,
    pub deprecated: bool,
    pub validators: Vec<Arc<dyn Validator>>,
    pub plan_modifiers: Vec<Arc<dyn PlanModifier>>,
}

impl Attribute {
    /// Computed and not settable by the user
    pub fn is_read_only(&self) -> bool {
        self.computed && !self.optional && !self.required
    }
}

impl std::fmt::Debug for Attribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attribute")
            .field("name", &self.name)
            .field("type", &self.r#type)
            .field("required", &self.required)
            .field("optional", &self.optional)
            .field("computed", &self.computed)
            .field("sensitive", &self.sensitive)
            .field("validators", &self.validators.len())
            .field("plan_modifiers", &self.plan_modifiers.len())
            .finish()
    }
}

/// AttributeBuilder provides fluent API for building attributes
pub struct AttributeBuilder {
    attribute: Attribute,
}

impl AttributeBuilder {
    pub fn new(name: &str, type_: AttributeType) -> Self {
        Self {
            attribute: Attribute {
                name: name.to_string(),
                r#type: type_,
                description: String::new(),
                required: false,
                optional: false,
                computed: false,
                sensitive: false,
                deprecated: false,
                validators: Vec::new(),
                plan_modifiers: Vec::new(),
            },
        }
    }

    pub fn description(mut self, desc: &str) -> Self {
        self.attribute.description = desc.to_string();
        self
    }

    pub fn required(mut self) -> Self {
        self.attribute.required = true;
        self.attribute.optional = false;
        self
    }

    pub fn optional(mut self) -> Self {
        self.attribute.optional = true;
        self.attribute.required = false;
        self
    }

    pub fn computed(mut self) -> Self {
        self.attribute.computed = true;
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.attribute.sensitive = true;
        self
    }

    pub fn deprecated(mut self) -> Self {
        self.attribute.deprecated = true;
        self
    }

    pub fn validator(mut self, validator: impl Validator + 'static) -> Self {
        self.attribute.validators.push(Arc::new(validator));
        self
    }

    pub fn plan_modifier(mut self, modifier: impl PlanModifier + 'static) -> Self {
        self.attribute.plan_modifiers.push(Arc::new(modifier));
        self
    }

    pub fn build(self) -> Attribute {
        self.attribute
    }
}

pub struct SchemaBuilder {
    schema: Schema,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self {
            schema: Schema {
                version: 0,
                block: Block::default(),
            },
        }
    }

    pub fn version(mut self, version: i64) -> Self {
        self.schema.version = version;
        self
    }

    pub fn attribute(mut self, attr: Attribute) -> Self {
        self.schema.block.attributes.push(attr);
        self
    }

    pub fn attributes(mut self, attrs: impl IntoIterator<Item = Attribute>) -> Self {
        self.schema.block.attributes.extend(attrs);
        self
    }

    pub fn description(mut self, desc: &str) -> Self {
        self.schema.block.description = desc.to_string();
        self
    }

    pub fn deprecated(mut self) -> Self {
        self.schema.block.deprecated = true;
        self
    }

    pub fn build(self) -> Schema {
        self.schema
    }
}

impl Default for SchemaBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of [`Schema::plan`]
#[derive(Debug, Clone)]
pub struct PlannedChange {
    pub planned_state: DynamicValue,
    pub requires_replace: Vec<AttributePath>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Schema {
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.block.attributes.iter().find(|a| a.name == name)
    }

    /// Checks required/read-only rules and runs attribute validators.
    /// Unknown values are skipped; they are validated again at apply time.
    pub fn validate(&self, config: &DynamicValue) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();

        for attr in &self.block.attributes {
            let path = AttributePath::new(&attr.name);
            let value = config.get(&path).cloned().unwrap_or(Dynamic::Null);

            if value.is_null() {
                if attr.required {
                    diagnostics.push(
                        Diagnostic::error(
                            "Missing required argument",
                            format!(
                                "The argument \"{}\" is required, but no definition was found.",
                                attr.name
                            ),
                        )
                        .with_attribute(path),
                    );
                }
                continue;
            }

            if attr.is_read_only() && value.is_known() {
                diagnostics.push(
                    Diagnostic::error(
                        "Invalid configuration",
                        format!("\"{}\" is computed and cannot be set", attr.name),
                    )
                    .with_attribute(path),
                );
                continue;
            }

            if value.is_unknown() {
                continue;
            }

            for validator in &attr.validators {
                diagnostics.extend(validator.validate(&value, &path));
            }
        }

        diagnostics
    }

    /// Computes the planned state from the prior state and configuration.
    ///
    /// Configured attributes are planned first and run their modifiers. A
    /// computed attribute left null in config then keeps its prior value
    /// unless one of those planned values differs from the prior state, in
    /// which case it becomes unknown before its own modifiers run.
    pub fn plan(&self, prior: &DynamicValue, config: &DynamicValue) -> PlannedChange {
        if config.is_null() {
            return PlannedChange {
                planned_state: DynamicValue::null(),
                requires_replace: Vec::new(),
                diagnostics: Vec::new(),
            };
        }

        let creating = prior.is_null();
        let value_at = |dv: &DynamicValue, path: &AttributePath| {
            dv.get(path).cloned().unwrap_or(Dynamic::Null)
        };

        let mut requires_replace = Vec::new();
        let mut diagnostics = Vec::new();
        let mut modify = |attr: &Attribute, path: &AttributePath, plan_value: Dynamic| {
            let mut plan_value = plan_value;
            for modifier in &attr.plan_modifiers {
                let response = modifier.modify(PlanModifierRequest {
                    config_value: value_at(config, path),
                    state_value: value_at(prior, path),
                    plan_value,
                    path: path.clone(),
                    creating,
                    config: config.clone(),
                });
                plan_value = response.plan_value;
                diagnostics.extend(response.diagnostics);
                if response.requires_replace && !requires_replace.contains(path) {
                    requires_replace.push(path.clone());
                }
            }
            plan_value
        };

        let derived = |attr: &Attribute| {
            attr.computed && value_at(config, &AttributePath::new(&attr.name)).is_null()
        };

        let mut planned_values: Vec<Option<Dynamic>> = self
            .block
            .attributes
            .iter()
            .map(|attr| {
                if derived(attr) {
                    return None;
                }
                let path = AttributePath::new(&attr.name);
                Some(modify(attr, &path, value_at(config, &path)))
            })
            .collect();

        let changed = !creating
            && self
                .block
                .attributes
                .iter()
                .zip(&planned_values)
                .any(|(attr, value)| match value {
                    Some(value) => *value != value_at(prior, &AttributePath::new(&attr.name)),
                    None => false,
                });

        for (attr, value) in self.block.attributes.iter().zip(planned_values.iter_mut()) {
            if value.is_some() {
                continue;
            }
            let path = AttributePath::new(&attr.name);
            let initial = if creating || changed {
                Dynamic::Unknown
            } else {
                value_at(prior, &path)
            };
            *value = Some(modify(attr, &path, initial));
        }

        let mut planned = DynamicValue::object();
        for (attr, value) in self.block.attributes.iter().zip(planned_values) {
            let path = AttributePath::new(&attr.name);
            if let Err(e) = planned.set_value(&path, value.unwrap_or(Dynamic::Null)) {
                diagnostics.push(
                    Diagnostic::error("Failed to build plan", e.to_string()).with_attribute(path),
                );
            }
        }

        PlannedChange {
            planned_state: planned,
            requires_replace,
            diagnostics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan_modifier::{RequiresReplace, SuppressEquivalent, UseStateForUnknown};
    use crate::validator::StringLengthBetween;

    fn sample_schema() -> Schema {
        SchemaBuilder::new()
            .version(1)
            .description("Test resource schema")
            .attribute(
                AttributeBuilder::new("id", AttributeType::String)
                    .computed()
                    .plan_modifier(UseStateForUnknown)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("name", AttributeType::String)
                    .required()
                    .validator(StringLengthBetween::new(1, 10))
                    .plan_modifier(RequiresReplace)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("ttl", AttributeType::Number)
                    .optional()
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("urn", AttributeType::String)
                    .computed()
                    .build(),
            )
            .build()
    }

    fn object(pairs: &[(&str, Dynamic)]) -> DynamicValue {
        let mut dv = DynamicValue::object();
        for (k, v) in pairs {
            dv.set_value(&AttributePath::new(k), v.clone()).unwrap();
        }
        dv
    }

    #[test]
    fn attribute_builder_creates_required_string() {
        let attr = AttributeBuilder::new("name", AttributeType::String)
            .description("The name of the resource")
            .required()
            .build();

        assert_eq!(attr.name, "name");
        assert!(attr.required);
        assert!(!attr.optional);
        assert_eq!(attr.description, "The name of the resource");
    }

    #[test]
    fn cloned_attributes_keep_validators() {
        let schema = sample_schema();
        let cloned = schema.clone();
        assert_eq!(cloned.attribute("name").unwrap().validators.len(), 1);
    }

    #[test]
    fn validate_reports_missing_required_attribute() {
        let diags = sample_schema().validate(&DynamicValue::object());
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].attribute, Some(AttributePath::new("name")));
    }

    #[test]
    fn validate_rejects_read_only_attributes_and_runs_validators() {
        let config = object(&[
            ("name", Dynamic::from("much-too-long-name")),
            ("urn", Dynamic::from("do:domain:x")),
        ]);
        let diags = sample_schema().validate(&config);
        assert_eq!(diags.len(), 2);
    }

    #[test]
    fn validate_skips_unknown_values() {
        let config = object(&[("name", Dynamic::Unknown)]);
        assert!(sample_schema().validate(&config).is_empty());
    }

    #[test]
    fn plan_on_create_marks_computed_unknown() {
        let config = object(&[("name", Dynamic::from("web"))]);
        let plan = sample_schema().plan(&DynamicValue::null(), &config);

        assert!(plan.requires_replace.is_empty());
        assert!(plan
            .planned_state
            .get(&AttributePath::new("urn"))
            .unwrap()
            .is_unknown());
        assert!(plan
            .planned_state
            .get(&AttributePath::new("id"))
            .unwrap()
            .is_unknown());
    }

    #[test]
    fn plan_without_changes_keeps_prior_values() {
        let prior = object(&[
            ("id", Dynamic::from("1")),
            ("name", Dynamic::from("web")),
            ("ttl", Dynamic::Number(1800.0)),
            ("urn", Dynamic::from("urn:1")),
        ]);
        let config = object(&[("name", Dynamic::from("web"))]);
        let plan = sample_schema().plan(&prior, &config);

        assert_eq!(plan.planned_state, prior);
    }

    #[test]
    fn plan_with_replacing_change_collects_paths() {
        let prior = object(&[
            ("id", Dynamic::from("1")),
            ("name", Dynamic::from("web")),
            ("ttl", Dynamic::Number(1800.0)),
            ("urn", Dynamic::from("urn:1")),
        ]);
        let config = object(&[("name", Dynamic::from("api"))]);
        let plan = sample_schema().plan(&prior, &config);

        assert_eq!(plan.requires_replace, vec![AttributePath::new("name")]);
        assert_eq!(
            plan.planned_state.get(&AttributePath::new("id")),
            Some(&Dynamic::from("1"))
        );
        assert!(plan
            .planned_state
            .get(&AttributePath::new("urn"))
            .unwrap()
            .is_unknown());
    }

    #[test]
    fn suppressed_difference_keeps_computed_values() {
        let schema = SchemaBuilder::new()
            .attribute(
                AttributeBuilder::new("name", AttributeType::String)
                    .required()
                    .plan_modifier(SuppressEquivalent::new("case insensitive", |a, b, _| {
                        a.eq_ignore_ascii_case(b)
                    }))
                    .plan_modifier(RequiresReplace)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("urn", AttributeType::String)
                    .computed()
                    .build(),
            )
            .build();
        let prior = object(&[
            ("name", Dynamic::from("WEB")),
            ("urn", Dynamic::from("urn:1")),
        ]);

        let plan = schema.plan(&prior, &object(&[("name", Dynamic::from("web"))]));
        assert_eq!(plan.planned_state, prior);
        assert!(plan.requires_replace.is_empty());

        let plan = schema.plan(&prior, &object(&[("name", Dynamic::from("api"))]));
        assert!(plan
            .planned_state
            .get(&AttributePath::new("urn"))
            .unwrap()
            .is_unknown());
    }

    #[test]
    fn plan_for_destroy_is_null() {
        let prior = object(&[("name", Dynamic::from("web"))]);
        let plan = sample_schema().plan(&prior, &DynamicValue::null());
        assert!(plan.planned_state.is_null());
    }
}
