//! Common types and utilities for the Abrha API

use serde::{Deserialize, Serialize};
use std::future::Future;

use super::error::ApiError;

/// Default and maximum page size accepted by list endpoints
pub const MAX_PER_PAGE: u32 = 200;

/// Error body returned by the API, e.g.
/// `{"id":"not_found","message":"The resource you requested could not be found.","request_id":"..."}`
#[derive(Debug, Deserialize)]
pub struct ApiErrorResponse {
    pub id: Option<String>,
    pub message: Option<String>,
    pub request_id: Option<String>,
}

#[derive(Debug, thiserror::Error)]
#[error("API error details: id={id:?}, request_id={request_id:?}")]
pub struct ApiErrorDetails {
    pub id: Option<String>,
    pub request_id: Option<String>,
}

/// Region as embedded in API objects
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub slug: String,
    #[serde(default)]
    pub name: String,
}

/// Pagination links of a list response
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Links {
    #[serde(default)]
    pub pages: Option<Pages>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Pages {
    pub first: Option<String>,
    pub prev: Option<String>,
    pub next: Option<String>,
    pub last: Option<String>,
}

impl Links {
    pub fn is_last_page(&self) -> bool {
        self.pages
            .as_ref()
            .map_or(true, |pages| pages.next.is_none())
    }

    /// Page number of the response these links came with. The API only
    /// links to neighbours, so it is derived from the `prev` link.
    pub fn current_page(&self) -> Result<u32, ApiError> {
        let prev = match self.pages.as_ref().and_then(|pages| pages.prev.as_deref()) {
            Some(prev) => prev,
            None => return Ok(1),
        };
        Ok(page_number(prev)? + 1)
    }
}

fn page_number(link: &str) -> Result<u32, ApiError> {
    let url = url::Url::parse(link).map_err(|e| ApiError::InvalidUrl(format!("{}: {}", link, e)))?;
    url.query_pairs()
        .find(|(key, _)| key == "page")
        .map(|(_, value)| value.parse::<u32>())
        .unwrap_or(Ok(1))
        .map_err(|e| ApiError::ParseError(format!("invalid page number in {}: {}", link, e)))
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Meta {
    #[serde(default)]
    pub total: u64,
}

/// One page of a list endpoint
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub links: Links,
    pub meta: Meta,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListOptions {
    pub page: u32,
    pub per_page: u32,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: MAX_PER_PAGE,
        }
    }
}

impl ListOptions {
    pub fn to_query_params(&self) -> ApiQueryParams {
        ApiQueryParams::new()
            .add("page", self.page)
            .add("per_page", self.per_page)
    }
}

/// Follows `links.pages.next` until the last page and returns every item
pub async fn collect_all<T, F, Fut>(mut fetch: F) -> Result<Vec<T>, ApiError>
where
    F: FnMut(ListOptions) -> Fut,
    Fut: Future<Output = Result<Page<T>, ApiError>>,
{
    let mut options = ListOptions::default();
    let mut items = Vec::new();

    loop {
        let page = fetch(options).await?;
        items.extend(page.items);
        if page.links.is_last_page() {
            break;
        }
        options.page = page.links.current_page()? + 1;
        tracing::debug!("Fetching page {}", options.page);
    }

    Ok(items)
}

#[derive(Debug, Clone, Default)]
pub struct ApiQueryParams {
    params: Vec<(String, String)>,
}

impl ApiQueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<K: Into<String>, V: ToString>(mut self, key: K, value: V) -> Self {
        self.params.push((key.into(), value.to_string()));
        self
    }

    pub fn add_optional<K: Into<String>, V: ToString>(mut self, key: K, value: Option<V>) -> Self {
        if let Some(v) = value {
            self.params.push((key.into(), v.to_string()));
        }
        self
    }

    pub fn to_query_string(&self) -> String {
        if self.params.is_empty() {
            String::new()
        } else {
            format!(
                "?{}",
                self.params
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
                    .collect::<Vec<_>>()
                    .join("&")
            )
        }
    }
}
