pub mod actions;
pub mod client;
pub mod common;
pub mod domains;
pub mod error;
pub mod records;
pub mod registry;
pub mod reserved_ips;
pub mod vpc_peerings;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use client::{Client, RetryConfig, DEFAULT_ENDPOINT};
pub use error::ApiError;
