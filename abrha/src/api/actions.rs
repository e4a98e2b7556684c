//! Asynchronous action API

use serde::Deserialize;

use super::{ApiError, Client};

pub const STATUS_NEW: &str = "new";
pub const STATUS_IN_PROGRESS: &str = "in-progress";
pub const STATUS_COMPLETED: &str = "completed";
pub const STATUS_ERRORED: &str = "errored";

/// A cloud-side operation tracked until it reaches a terminal status
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Action {
    pub id: i64,
    pub status: String,
    #[serde(rename = "type", default)]
    pub action_type: String,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub completed_at: Option<String>,
    #[serde(default)]
    pub resource_id: Option<i64>,
    #[serde(default)]
    pub resource_type: Option<String>,
    #[serde(default)]
    pub region_slug: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ActionRoot {
    pub(crate) action: Action,
}

pub struct ActionsApi<'a> {
    client: &'a Client,
}

impl<'a> ActionsApi<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// GET /v2/actions/{id}
    pub async fn get(&self, id: i64) -> Result<Action, ApiError> {
        let root: ActionRoot = self.client.get(&format!("/v2/actions/{}", id)).await?;
        Ok(root.action)
    }
}
