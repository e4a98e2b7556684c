//! tfplug - Terraform Plugin Framework for Rust
//!
//! Traits and value types for writing Terraform providers in Rust, plus an
//! in-process [`ProviderHost`] that drives a provider the way Terraform core
//! does. [`serve`] exposes the same host to Terraform over gRPC.

// Core modules
pub mod context;
pub mod error;
pub mod schema;
pub mod types;

// Provider API modules
pub mod data_source;
pub mod provider;
pub mod resource;

// Helper modules
pub mod import;
pub mod logging;
pub mod plan_modifier;
pub mod validator;

pub mod host;

// Plugin protocol transport
pub mod grpc;
pub mod proto;
pub mod server;

// Re-exports for convenience
pub use context::Context;
pub use data_source::{DataSource, DataSourceWithConfigure};
pub use error::{Result, TfplugError};
pub use host::ProviderHost;
pub use import::{import_state_passthrough_id, split_import_id};
pub use logging::LogLevel;
pub use provider::{DataSourceFactory, Provider, ResourceFactory};
pub use resource::{Resource, ResourceWithConfigure, ResourceWithImportState};
pub use schema::{AttributeBuilder, AttributeType, PlannedChange, Schema, SchemaBuilder};
pub use server::{serve, ServeConfig};
pub use types::{has_errors, AttributePath, Diagnostic, Dynamic, DynamicValue};
