//! Attribute plan modifiers
//!
//! Plan modifiers run after the framework computed a planned value for an
//! attribute. They can rewrite that value (keep the prior state, suppress a
//! cosmetic difference) or flag that changing it requires replacement.

use crate::types::{AttributePath, Diagnostic, Dynamic, DynamicValue};

#[derive(Debug, Clone)]
pub struct PlanModifierRequest {
    pub config_value: Dynamic,
    pub state_value: Dynamic,
    pub plan_value: Dynamic,
    pub path: AttributePath,
    /// True when there is no prior state
    pub creating: bool,
    /// The whole configuration object, for modifiers that depend on siblings
    pub config: DynamicValue,
}

#[derive(Debug, Clone)]
pub struct PlanModifierResponse {
    pub plan_value: Dynamic,
    pub requires_replace: bool,
    pub diagnostics: Vec<Diagnostic>,
}

impl PlanModifierResponse {
    fn keep(plan_value: Dynamic) -> Self {
        Self {
            plan_value,
            requires_replace: false,
            diagnostics: Vec::new(),
        }
    }
}

pub trait PlanModifier: Send + Sync {
    fn description(&self) -> String;

    fn modify(&self, request: PlanModifierRequest) -> PlanModifierResponse;
}

/// Any change to the attribute destroys and recreates the resource
pub struct RequiresReplace;

impl PlanModifier for RequiresReplace {
    fn description(&self) -> String {
        "changing this value forces replacement".to_string()
    }

    fn modify(&self, request: PlanModifierRequest) -> PlanModifierResponse {
        let requires_replace = !request.creating
            && !request.state_value.is_null()
            && !request.plan_value.is_unknown()
            && request.plan_value != request.state_value;

        PlanModifierResponse {
            requires_replace,
            ..PlanModifierResponse::keep(request.plan_value)
        }
    }
}

/// Keeps the prior state for computed values that would otherwise show as
/// "known after apply" on every update.
pub struct UseStateForUnknown;

impl PlanModifier for UseStateForUnknown {
    fn description(&self) -> String {
        "once set, the value does not change".to_string()
    }

    fn modify(&self, request: PlanModifierRequest) -> PlanModifierResponse {
        let plan_value = match (&request.plan_value, &request.state_value) {
            (Dynamic::Unknown, state) if !state.is_null() => state.clone(),
            _ => request.plan_value,
        };
        PlanModifierResponse::keep(plan_value)
    }
}

/// Keeps the prior state value when the predicate considers it equivalent to
/// the planned one, so purely cosmetic differences produce no diff.
pub struct SuppressEquivalent<F>
where
    F: Fn(&str, &str, &DynamicValue) -> bool + Send + Sync,
{
    equivalent: F,
    description: String,
}

impl<F> SuppressEquivalent<F>
where
    F: Fn(&str, &str, &DynamicValue) -> bool + Send + Sync,
{
    /// `equivalent(prior, planned, config)` receives string values only;
    /// other types pass through untouched.
    pub fn new(description: &str, equivalent: F) -> Self {
        Self {
            equivalent,
            description: description.to_string(),
        }
    }
}

impl<F> PlanModifier for SuppressEquivalent<F>
where
    F: Fn(&str, &str, &DynamicValue) -> bool + Send + Sync,
{
    fn description(&self) -> String {
        self.description.clone()
    }

    fn modify(&self, request: PlanModifierRequest) -> PlanModifierResponse {
        let plan_value = match (request.state_value.as_str(), request.plan_value.as_str()) {
            (Some(prior), Some(planned))
                if prior != planned && (self.equivalent)(prior, planned, &request.config) =>
            {
                request.state_value.clone()
            }
            _ => request.plan_value,
        };
        PlanModifierResponse::keep(plan_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(state: Dynamic, plan: Dynamic) -> PlanModifierRequest {
        PlanModifierRequest {
            config_value: plan.clone(),
            creating: state.is_null(),
            state_value: state,
            plan_value: plan,
            path: AttributePath::new("name"),
            config: DynamicValue::object(),
        }
    }

    #[test]
    fn requires_replace_ignores_creation() {
        let response = RequiresReplace.modify(request(Dynamic::Null, Dynamic::from("a")));
        assert!(!response.requires_replace);
    }

    #[test]
    fn requires_replace_flags_changes() {
        let response = RequiresReplace.modify(request(Dynamic::from("a"), Dynamic::from("b")));
        assert!(response.requires_replace);

        let response = RequiresReplace.modify(request(Dynamic::from("a"), Dynamic::from("a")));
        assert!(!response.requires_replace);
    }

    #[test]
    fn use_state_for_unknown_restores_prior() {
        let response = UseStateForUnknown.modify(request(Dynamic::from("id-1"), Dynamic::Unknown));
        assert_eq!(response.plan_value, Dynamic::from("id-1"));

        let response = UseStateForUnknown.modify(request(Dynamic::Null, Dynamic::Unknown));
        assert!(response.plan_value.is_unknown());
    }

    #[test]
    fn suppress_equivalent_keeps_prior_value() {
        let modifier =
            SuppressEquivalent::new("case insensitive", |a, b, _| a.eq_ignore_ascii_case(b));

        let response = modifier.modify(request(Dynamic::from("WWW"), Dynamic::from("www")));
        assert_eq!(response.plan_value, Dynamic::from("WWW"));

        let response = modifier.modify(request(Dynamic::from("www"), Dynamic::from("api")));
        assert_eq!(response.plan_value, Dynamic::from("api"));
    }
}
