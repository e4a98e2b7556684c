//! Test helpers for the Abrha API

use super::{Client, RetryConfig};

/// Client with near-zero backoff so retry paths stay fast in tests
pub fn create_test_client(url: &str) -> Client {
    Client::with_config(
        url,
        "test-token",
        RetryConfig {
            max_retries: 1,
            initial_backoff_ms: 1,
            max_backoff_ms: 5,
            timeout_seconds: 5,
        },
    )
    .unwrap()
}
