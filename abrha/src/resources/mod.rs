//! Resource implementations

pub mod bucket;
pub mod bucket_object;
pub mod bucket_policy;
pub mod container_registry;
pub mod domain;
pub mod record;
pub mod registry_credentials;
pub mod reserved_ip;
pub mod reserved_ip_assignment;
pub mod vpc_peering;

pub use bucket::BucketResource;
pub use bucket_object::BucketObjectResource;
pub use bucket_policy::BucketPolicyResource;
pub use container_registry::ContainerRegistryResource;
pub use domain::DomainResource;
pub use record::RecordResource;
pub use registry_credentials::RegistryCredentialsResource;
pub use reserved_ip::{FloatingIpResource, ReservedIpResource};
pub use reserved_ip_assignment::{FloatingIpAssignmentResource, ReservedIpAssignmentResource};
pub use vpc_peering::VpcPeeringResource;

use std::any::Any;
use std::sync::Arc;
use tfplug::types::{AttributePath, Diagnostic, Dynamic, DynamicValue};

use crate::AbrhaProviderData;

/// Downcasts provider data handed to `configure`
pub(crate) fn provider_data_from(
    data: Option<Arc<dyn Any + Send + Sync>>,
) -> Result<Option<AbrhaProviderData>, Diagnostic> {
    match data {
        None => Ok(None),
        Some(data) => data
            .downcast_ref::<AbrhaProviderData>()
            .cloned()
            .map(Some)
            .ok_or_else(|| {
                Diagnostic::error("Unexpected provider data type", "Expected AbrhaProviderData")
            }),
    }
}

pub(crate) fn not_configured() -> Diagnostic {
    Diagnostic::error(
        "Provider not configured",
        "Provider data was not properly configured",
    )
}

/// Builds an object value from attribute pairs
pub(crate) fn state_of<I>(pairs: I) -> DynamicValue
where
    I: IntoIterator<Item = (&'static str, Dynamic)>,
{
    DynamicValue::from_map(
        pairs
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect(),
    )
}

pub(crate) fn required_string(value: &DynamicValue, name: &str) -> Result<String, Diagnostic> {
    value
        .opt_string(&AttributePath::new(name))
        .ok_or_else(|| {
            Diagnostic::error(
                format!("Missing {}", name),
                format!("The '{}' attribute is required", name),
            )
            .with_attribute(AttributePath::new(name))
        })
}

/// Integer attributes that also accept a numeric string, as ids from
/// import do
pub(crate) fn required_i64(value: &DynamicValue, name: &str) -> Result<i64, Diagnostic> {
    let path = AttributePath::new(name);
    value
        .opt_i64(&path)
        .or_else(|| value.opt_string(&path).and_then(|s| s.parse().ok()))
        .ok_or_else(|| {
            Diagnostic::error(
                format!("Missing {}", name),
                format!("The '{}' attribute must be an integer", name),
            )
            .with_attribute(path)
        })
}

/// Prior value of `name`, so user-only arguments survive a refresh
pub(crate) fn carried(prior: &DynamicValue, name: &str) -> Dynamic {
    prior
        .get(&AttributePath::new(name))
        .cloned()
        .unwrap_or(Dynamic::Null)
}
