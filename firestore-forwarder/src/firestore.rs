//! Firestore REST client.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::credentials::TokenSource;
use crate::error::{ForwarderError, Result};
use crate::model::Document;
use crate::value::{decode_fields, encode_value, timestamp_value};

/// Read access to a document collection.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetches one document, `None` when it does not exist.
    async fn get_document(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    /// Evaluates the subscription query once, in query order.
    async fn run_query(&self, query: &SubscriptionQuery) -> Result<Vec<Document>>;
}

/// The standing query behind a live subscription.
///
/// Matches documents added at or after `since` for one webhook, newest first.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionQuery {
    pub collection: String,
    pub since: DateTime<Utc>,
    pub webhook_name: String
}

impl SubscriptionQuery {
    pub fn new(collection: impl Into<String>, since: DateTime<Utc>, webhook_name: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            since,
            webhook_name: webhook_name.into()
        }
    }

    /// The `structuredQuery` body for `documents:runQuery`.
    pub fn to_structured_query(&self) -> Value {
        let filters = [
            json!({
                "fieldFilter": {
                    "field": {"fieldPath": "dateAdded"},
                    "op": "GREATER_THAN_OR_EQUAL",
                    "value": timestamp_value(self.since)
                }
            }),
            json!({
                "fieldFilter": {
                    "field": {"fieldPath": "webhookName"},
                    "op": "EQUAL",
                    "value": encode_value(&Value::String(self.webhook_name.clone()))
                }
            })
        ];

        json!({
            "structuredQuery": {
                "from": [{"collectionId": self.collection}],
                "where": {"compositeFilter": {"op": "AND", "filters": filters}},
                "orderBy": [{
                    "field": {"fieldPath": "dateAdded"},
                    "direction": "DESCENDING"
                }]
            }
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDocument {
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
    update_time: Option<String>
}

impl RawDocument {
    fn decode(self) -> Result<Document> {
        let fields = decode_fields(&self.fields)?;
        Ok(Document::new(self.name, fields, self.update_time))
    }
}

// Entries without a document only report the read time.
#[derive(Debug, Deserialize)]
struct RunQueryEntry {
    document: Option<RawDocument>
}

/// Client for the Firestore v1 REST API.
pub struct FirestoreClient {
    client: Client,
    endpoint: Url,
    project_id: String,
    database: String,
    tokens: Arc<dyn TokenSource>
}

impl FirestoreClient {
    pub fn new(
        endpoint: &str,
        project_id: impl Into<String>,
        database: impl Into<String>,
        tokens: Arc<dyn TokenSource>
    ) -> Result<Self> {
        let endpoint = Url::parse(endpoint).map_err(|e| {
            ForwarderError::Configuration(format!("Invalid Firestore endpoint {endpoint}: {e}"))
        })?;
        if endpoint.cannot_be_a_base() {
            return Err(ForwarderError::Configuration(format!(
                "Invalid Firestore endpoint {endpoint}"
            )));
        }

        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(ForwarderError::Http)?;

        Ok(Self {
            client,
            endpoint,
            project_id: project_id.into(),
            database: database.into(),
            tokens
        })
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// `{endpoint}/v1/projects/{p}/databases/{d}/documents` extended by `tail`.
    fn documents_url(&self, tail: &[&str]) -> Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend([
                "v1",
                "projects",
                self.project_id.as_str(),
                "databases",
                self.database.as_str()
            ]);
            match tail.split_first() {
                Some((first, rest)) if first.starts_with(':') => {
                    segments.push(&format!("documents{first}")).extend(rest);
                }
                _ => {
                    segments.push("documents").extend(tail);
                }
            }
        }
        url
    }

    async fn error_for(response: reqwest::Response) -> ForwarderError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ForwarderError::Authentication(
                format!("Firestore rejected the credentials: {} - {}", status.as_u16(), body)
            ),
            _ => ForwarderError::FirestoreApi {
                status: status.as_u16(),
                message: body
            }
        }
    }
}

#[async_trait]
impl DocumentStore for FirestoreClient {
    async fn get_document(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let url = self.documents_url(&[collection, id]);
        debug!(url = %url, "Fetching Firestore document");

        let token = self.tokens.access_token().await?;
        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .header("Accept", "application/json")
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                let raw: RawDocument = response.json().await?;
                raw.decode().map(Some)
            }
            StatusCode::NOT_FOUND => Ok(None),
            _ => Err(Self::error_for(response).await)
        }
    }

    async fn run_query(&self, query: &SubscriptionQuery) -> Result<Vec<Document>> {
        let url = self.documents_url(&[":runQuery"]);
        debug!(url = %url, collection = %query.collection, "Running Firestore query");

        let token = self.tokens.access_token().await?;
        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(&query.to_structured_query())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_for(response).await);
        }

        let entries: Vec<RunQueryEntry> = response.json().await?;
        Ok(decode_entries(entries))
    }
}

// A document that fails to decode is left out of the result instead of
// failing the whole query.
fn decode_entries(entries: Vec<RunQueryEntry>) -> Vec<Document> {
    entries
        .into_iter()
        .filter_map(|entry| entry.document)
        .filter_map(|raw| {
            let name = raw.name.clone();
            match raw.decode() {
                Ok(document) => Some(document),
                Err(e) => {
                    warn!(name = %name, error = %e, "Skipping undecodable document");
                    None
                }
            }
        })
        .collect()
}
