//! Generated types for Terraform plugin protocol 6
//!
//! Several message names (`DynamicValue`, `Diagnostic`, `Schema`,
//! `AttributePath`) clash with framework types; refer to these through
//! the `proto::` prefix.

tonic::include_proto!("tfplugin6");

pub use provider_server::{Provider as ProviderService, ProviderServer};
