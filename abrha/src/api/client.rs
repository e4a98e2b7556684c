use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::common::{ApiErrorDetails, ApiErrorResponse, ApiQueryParams};
use super::error::ApiError;

pub const DEFAULT_ENDPOINT: &str = "https://api.abrha.net";

const USER_AGENT: &str = concat!("terraform-provider-abrha/", env!("CARGO_PKG_VERSION"));

/// Abrha API client
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http_client: reqwest::Client,
    base_url: String,
    auth_header: String,
    retry_config: RetryConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub timeout_seconds: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 10000,
            timeout_seconds: 30,
        }
    }
}

impl RetryConfig {
    fn backoff(&self, attempt: u32) -> Duration {
        let exp = self
            .initial_backoff_ms
            .saturating_mul(2_u64.saturating_pow(attempt.saturating_sub(1)));
        Duration::from_millis(std::cmp::min(exp, self.max_backoff_ms))
    }
}

impl Client {
    /// Create a new API client with default configuration
    pub fn new(endpoint: &str, token: &str) -> Result<Self, ApiError> {
        Self::with_config(endpoint, token, RetryConfig::default())
    }

    /// Create a new API client with custom retry configuration
    pub fn with_config(
        endpoint: &str,
        token: &str,
        retry_config: RetryConfig,
    ) -> Result<Self, ApiError> {
        url::Url::parse(endpoint).map_err(|e| ApiError::InvalidUrl(format!("{}: {}", endpoint, e)))?;

        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(retry_config.timeout_seconds))
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .tcp_keepalive(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            inner: Arc::new(ClientInner {
                http_client,
                base_url: endpoint.trim_end_matches('/').to_string(),
                auth_header: format!("Bearer {}", token),
                retry_config,
            }),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    pub fn domains(&self) -> super::domains::DomainsApi<'_> {
        super::domains::DomainsApi::new(self)
    }

    pub fn records<'a>(&'a self, domain: &'a str) -> super::records::RecordsApi<'a> {
        super::records::RecordsApi::new(self, domain)
    }

    pub fn registry(&self) -> super::registry::RegistryApi<'_> {
        super::registry::RegistryApi::new(self)
    }

    pub fn reserved_ips(&self) -> super::reserved_ips::ReservedIpsApi<'_> {
        self.reserved_ips_of(super::reserved_ips::IpFlavor::Reserved)
    }

    pub fn floating_ips(&self) -> super::reserved_ips::ReservedIpsApi<'_> {
        self.reserved_ips_of(super::reserved_ips::IpFlavor::Floating)
    }

    pub fn reserved_ips_of(
        &self,
        flavor: super::reserved_ips::IpFlavor,
    ) -> super::reserved_ips::ReservedIpsApi<'_> {
        super::reserved_ips::ReservedIpsApi::new(self, flavor)
    }

    pub fn actions(&self) -> super::actions::ActionsApi<'_> {
        super::actions::ActionsApi::new(self)
    }

    pub fn vpc_peerings(&self) -> super::vpc_peerings::VpcPeeringsApi<'_> {
        super::vpc_peerings::VpcPeeringsApi::new(self)
    }

    /// Execute a GET request with retry logic
    pub async fn get<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T, ApiError> {
        let url = format!("{}{}", self.inner.base_url, path);
        self.execute_with_retry(
            || {
                tracing::debug!("GET request to: {}", url);
                self.inner
                    .http_client
                    .get(&url)
                    .header(AUTHORIZATION, &self.inner.auth_header)
                    .send()
            },
            path,
        )
        .await
    }

    /// Execute a GET request with query parameters
    pub async fn get_with_params<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        params: &ApiQueryParams,
    ) -> Result<T, ApiError> {
        let full_path = format!("{}{}", path, params.to_query_string());
        self.get(&full_path).await
    }

    /// Execute a POST request with retry logic
    pub async fn post<T: for<'de> Deserialize<'de>, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let url = format!("{}{}", self.inner.base_url, path);
        let payload = encode_body(body)?;
        self.execute_with_retry(
            || {
                tracing::debug!("POST request to: {}", url);
                self.inner
                    .http_client
                    .post(&url)
                    .header(AUTHORIZATION, &self.inner.auth_header)
                    .header(CONTENT_TYPE, "application/json")
                    .body(payload.clone())
                    .send()
            },
            path,
        )
        .await
    }

    /// Execute a PUT request with retry logic
    pub async fn put<T: for<'de> Deserialize<'de>, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let url = format!("{}{}", self.inner.base_url, path);
        let payload = encode_body(body)?;
        self.execute_with_retry(
            || {
                tracing::debug!("PUT request to: {}", url);
                self.inner
                    .http_client
                    .put(&url)
                    .header(AUTHORIZATION, &self.inner.auth_header)
                    .header(CONTENT_TYPE, "application/json")
                    .body(payload.clone())
                    .send()
            },
            path,
        )
        .await
    }

    /// Execute a PATCH request with retry logic
    pub async fn patch<T: for<'de> Deserialize<'de>, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let url = format!("{}{}", self.inner.base_url, path);
        let payload = encode_body(body)?;
        self.execute_with_retry(
            || {
                tracing::debug!("PATCH request to: {}", url);
                self.inner
                    .http_client
                    .patch(&url)
                    .header(AUTHORIZATION, &self.inner.auth_header)
                    .header(CONTENT_TYPE, "application/json")
                    .body(payload.clone())
                    .send()
            },
            path,
        )
        .await
    }

    /// Execute a DELETE request with retry logic
    pub async fn delete<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T, ApiError> {
        let url = format!("{}{}", self.inner.base_url, path);
        self.execute_with_retry(
            || {
                tracing::debug!("DELETE request to: {}", url);
                self.inner
                    .http_client
                    .delete(&url)
                    .header(AUTHORIZATION, &self.inner.auth_header)
                    .send()
            },
            path,
        )
        .await
    }

    /// Execute request with retry logic
    async fn execute_with_retry<F, Fut, T>(&self, request_fn: F, path: &str) -> Result<T, ApiError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<reqwest::Response, reqwest::Error>>,
        T: for<'de> Deserialize<'de>,
    {
        let retry = &self.inner.retry_config;
        let mut attempt = 0;
        let mut last_error = None;

        while attempt <= retry.max_retries {
            if attempt > 0 {
                let backoff = retry.backoff(attempt);
                tracing::debug!(
                    "Retrying request to {} after {}ms (attempt {})",
                    path,
                    backoff.as_millis(),
                    attempt
                );
                tokio::time::sleep(backoff).await;
            }

            match request_fn().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return self.parse_success_response(response).await;
                    }

                    if status == reqwest::StatusCode::UNAUTHORIZED {
                        return Err(ApiError::AuthError);
                    }

                    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                        last_error = Some(ApiError::RateLimited);
                    } else if status.is_server_error() {
                        last_error = Some(ApiError::ServiceUnavailable);
                    } else {
                        return self.handle_error_response(response).await;
                    }
                }
                Err(e) => {
                    if e.is_timeout() {
                        last_error = Some(ApiError::Timeout(retry.timeout_seconds));
                    } else if e.is_connect() {
                        last_error = Some(ApiError::ServiceUnavailable);
                    } else {
                        return Err(ApiError::RequestError(e));
                    }
                }
            }

            attempt += 1;
        }

        Err(last_error.unwrap_or(ApiError::ServiceUnavailable))
    }

    /// Parse successful response. Empty bodies (204, 202) decode as JSON null.
    async fn parse_success_response<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let text = response.text().await?;
        tracing::debug!("API response body: {}", text);

        let body = if text.trim().is_empty() { "null" } else { &text };
        serde_json::from_str::<T>(body).map_err(|e| {
            tracing::error!("Failed to deserialize response: {}, body: {}", e, text);
            ApiError::ParseError(format!("Failed to parse response: {}", e))
        })
    }

    /// Handle error response
    async fn handle_error_response<T>(&self, response: reqwest::Response) -> Result<T, ApiError> {
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());

        let (message, details) = match serde_json::from_str::<ApiErrorResponse>(&text) {
            Ok(err_resp) => (
                err_resp.message.unwrap_or_else(|| text.clone()),
                Some(Box::new(ApiErrorDetails {
                    id: err_resp.id,
                    request_id: err_resp.request_id,
                })),
            ),
            Err(_) => (text, None),
        };

        Err(ApiError::ApiError {
            status,
            message,
            details,
        })
    }
}

fn encode_body<B: Serialize>(body: &B) -> Result<Vec<u8>, ApiError> {
    serde_json::to_vec(body)
        .map_err(|e| ApiError::ParseError(format!("Failed to encode request body: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_retries: 2,
            initial_backoff_ms: 1,
            max_backoff_ms: 5,
            timeout_seconds: 5,
        }
    }

    #[derive(Debug, Deserialize)]
    struct Echo {
        ok: bool,
    }

    #[tokio::test]
    async fn sends_bearer_token() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/v2/ping")
            .match_header("authorization", "Bearer secret-token")
            .with_body(r#"{"ok":true}"#)
            .create_async()
            .await;

        let client = Client::new(&server.url(), "secret-token").unwrap();
        let echo: Echo = client.get("/v2/ping").await.unwrap();
        assert!(echo.ok);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn strips_trailing_slash_from_endpoint() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/v2/ping")
            .with_body(r#"{"ok":true}"#)
            .create_async()
            .await;

        let client = Client::new(&format!("{}/", server.url()), "t").unwrap();
        let _: Echo = client.get("/v2/ping").await.unwrap();
        mock.assert_async().await;
    }

    #[test]
    fn rejects_invalid_endpoint() {
        assert!(matches!(
            Client::new("not a url", "t"),
            Err(ApiError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn retries_server_errors_then_gives_up() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/v2/flaky")
            .with_status(503)
            .expect(3)
            .create_async()
            .await;

        let client = Client::with_config(&server.url(), "t", fast_retry()).unwrap();
        let result: Result<Echo, _> = client.get("/v2/flaky").await;
        assert!(matches!(result, Err(ApiError::ServiceUnavailable)));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn retries_rate_limits() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/v2/busy")
            .with_status(429)
            .expect(3)
            .create_async()
            .await;

        let client = Client::with_config(&server.url(), "t", fast_retry()).unwrap();
        let result: Result<Echo, _> = client.get("/v2/busy").await;
        assert!(matches!(result, Err(ApiError::RateLimited)));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn unauthorized_is_not_retried() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/v2/account")
            .with_status(401)
            .expect(1)
            .create_async()
            .await;

        let client = Client::with_config(&server.url(), "bad", fast_retry()).unwrap();
        let result: Result<Echo, _> = client.get("/v2/account").await;
        assert!(matches!(result, Err(ApiError::AuthError)));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn client_errors_carry_api_message() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/v2/domains/missing.com")
            .with_status(404)
            .with_body(r#"{"id":"not_found","message":"The resource you were accessing could not be found.","request_id":"abc"}"#)
            .create_async()
            .await;

        let client = Client::new(&server.url(), "t").unwrap();
        let err = client.get::<Echo>("/v2/domains/missing.com").await.unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("could not be found"));
        match err {
            ApiError::ApiError { details, .. } => {
                assert_eq!(details.unwrap().request_id.as_deref(), Some("abc"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_success_body_decodes_as_unit() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("DELETE", "/v2/domains/example.com")
            .with_status(204)
            .create_async()
            .await;

        let client = Client::new(&server.url(), "t").unwrap();
        client
            .delete::<()>("/v2/domains/example.com")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn post_sends_json_body() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/v2/domains")
            .match_header("content-type", "application/json")
            .match_body(Matcher::Json(serde_json::json!({"name": "example.com"})))
            .with_status(201)
            .with_body(r#"{"ok":true}"#)
            .create_async()
            .await;

        let client = Client::new(&server.url(), "t").unwrap();
        let echo: Echo = client
            .post("/v2/domains", &serde_json::json!({"name": "example.com"}))
            .await
            .unwrap();
        assert!(echo.ok);
        mock.assert_async().await;
    }

    #[test]
    fn retry_config_defaults_and_backoff_cap() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.initial_backoff_ms, 100);
        assert_eq!(config.max_backoff_ms, 10000);
        assert_eq!(config.timeout_seconds, 30);

        assert_eq!(config.backoff(1), Duration::from_millis(100));
        assert_eq!(config.backoff(3), Duration::from_millis(400));
        assert_eq!(config.backoff(20), Duration::from_millis(10000));
    }
}
