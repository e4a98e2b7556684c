//! DNS record API implementation

use serde::{Deserialize, Serialize};

use super::common::{collect_all, Links, ListOptions, Meta, Page};
use super::{ApiError, Client};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainRecord {
    pub id: i64,
    #[serde(rename = "type")]
    pub record_type: String,
    pub name: String,
    pub data: String,
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(default)]
    pub port: Option<i64>,
    #[serde(default)]
    pub ttl: i64,
    #[serde(default)]
    pub weight: Option<i64>,
    #[serde(default)]
    pub flags: Option<i64>,
    #[serde(default)]
    pub tag: Option<String>,
}

/// Request body for creating and updating records
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DomainRecordEditRequest {
    #[serde(rename = "type")]
    pub record_type: String,
    pub name: String,
    pub data: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flags: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RecordRoot {
    domain_record: DomainRecord,
}

#[derive(Debug, Deserialize)]
struct RecordsRoot {
    domain_records: Vec<DomainRecord>,
    #[serde(default)]
    links: Links,
    #[serde(default)]
    meta: Meta,
}

/// Records of one domain
pub struct RecordsApi<'a> {
    client: &'a Client,
    domain: &'a str,
}

impl<'a> RecordsApi<'a> {
    pub fn new(client: &'a Client, domain: &'a str) -> Self {
        Self { client, domain }
    }

    fn collection_path(&self) -> String {
        format!("/v2/domains/{}/records", urlencoding::encode(self.domain))
    }

    fn record_path(&self, id: i64) -> String {
        format!("{}/{}", self.collection_path(), id)
    }

    /// GET /v2/domains/{domain}/records
    pub async fn list(&self, options: &ListOptions) -> Result<Page<DomainRecord>, ApiError> {
        let root: RecordsRoot = self
            .client
            .get_with_params(&self.collection_path(), &options.to_query_params())
            .await?;
        Ok(Page {
            items: root.domain_records,
            links: root.links,
            meta: root.meta,
        })
    }

    pub async fn list_all(&self) -> Result<Vec<DomainRecord>, ApiError> {
        collect_all(|options| async move { self.list(&options).await }).await
    }

    /// GET /v2/domains/{domain}/records/{id}
    pub async fn get(&self, id: i64) -> Result<DomainRecord, ApiError> {
        let root: RecordRoot = self.client.get(&self.record_path(id)).await?;
        Ok(root.domain_record)
    }

    /// POST /v2/domains/{domain}/records
    pub async fn create(&self, request: &DomainRecordEditRequest) -> Result<DomainRecord, ApiError> {
        let root: RecordRoot = self.client.post(&self.collection_path(), request).await?;
        Ok(root.domain_record)
    }

    /// PUT /v2/domains/{domain}/records/{id}
    pub async fn update(
        &self,
        id: i64,
        request: &DomainRecordEditRequest,
    ) -> Result<DomainRecord, ApiError> {
        let root: RecordRoot = self.client.put(&self.record_path(id), request).await?;
        Ok(root.domain_record)
    }

    /// DELETE /v2/domains/{domain}/records/{id}
    pub async fn delete(&self, id: i64) -> Result<(), ApiError> {
        self.client.delete::<()>(&self.record_path(id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_helpers::create_test_client;
    use mockito::{Matcher, Server};

    #[test]
    fn null_optional_fields_deserialize() {
        let record: DomainRecord = serde_json::from_str(
            r#"{"id":7,"type":"A","name":"www","data":"192.0.2.1","priority":null,"port":null,"ttl":1800,"weight":null,"flags":null,"tag":null}"#,
        )
        .unwrap();
        assert_eq!(record.priority, None);
        assert_eq!(record.ttl, 1800);
    }

    #[tokio::test]
    async fn create_omits_unset_fields() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/v2/domains/example.com/records")
            .match_body(Matcher::Json(serde_json::json!({
                "type": "MX",
                "name": "@",
                "data": "mail.example.com.",
                "priority": 10,
                "ttl": 3600
            })))
            .with_status(201)
            .with_body(r#"{"domain_record":{"id":42,"type":"MX","name":"@","data":"mail.example.com","priority":10,"ttl":3600}}"#)
            .create_async()
            .await;

        let client = create_test_client(&server.url());
        let record = client
            .records("example.com")
            .create(&DomainRecordEditRequest {
                record_type: "MX".to_string(),
                name: "@".to_string(),
                data: "mail.example.com.".to_string(),
                priority: Some(10),
                ttl: Some(3600),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(record.id, 42);
        mock.assert_async().await;
    }
}
