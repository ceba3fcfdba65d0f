//! Config entries in Firestore, over the REST API.
//!
//! One document per data category in the config collection, found by its
//! `type` field and holding `dataUrl` plus a server-assigned
//! `lastRefreshedAt`.

pub mod auth;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::error::{Result, SyncError};
use auth::ServiceAccount;

const FIRESTORE_API_URL: &str = "https://firestore.googleapis.com/v1";

/// Explicitly constructed database handle. `connect` mints the access token
/// once; every call reuses it.
pub struct Firestore {
    http: reqwest::Client,
    documents_url: String,
    collection: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct QueryResult {
    document: Option<DocumentRef>,
}

#[derive(Debug, Deserialize)]
struct DocumentRef {
    name: String,
}

impl Firestore {
    pub async fn connect(service_account_json: &str, collection: &str) -> Result<Self> {
        let account = ServiceAccount::from_json(service_account_json)?;
        let http = reqwest::Client::new();
        let token = auth::fetch_access_token(&http, &account).await?;
        info!("Connected to Firestore project {}", account.project_id);
        Ok(Self {
            http,
            documents_url: documents_url(&account.project_id),
            collection: collection.to_string(),
            token,
        })
    }

    /// Point the entry for `config_type` at `data_url` and stamp it with the
    /// server time.
    pub async fn upsert_config(&self, config_type: &str, data_url: &str) -> Result<()> {
        upsert_entry(self, config_type, data_url).await
    }

    async fn post(&self, url: &str, payload: &Value) -> Result<String> {
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(payload)
            .send()
            .await
            .map_err(|e| SyncError::Config(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SyncError::Config(e.to_string()))?;
        if !status.is_success() {
            return Err(SyncError::Config(format!(
                "POST {} returned HTTP {}: {}",
                url,
                status.as_u16(),
                body
            )));
        }
        Ok(body)
    }
}

/// The three collection calls an upsert is made of.
pub trait ConfigCollection {
    /// Name of the first entry whose `type` equals `config_type`.
    async fn find_entry(&self, config_type: &str) -> Result<Option<String>>;
    /// New entry holding only the discriminator; returns its name.
    async fn create_entry(&self, config_type: &str) -> Result<String>;
    async fn record_refresh(&self, name: &str, data_url: &str) -> Result<()>;
}

impl ConfigCollection for Firestore {
    async fn find_entry(&self, config_type: &str) -> Result<Option<String>> {
        let url = format!("{}:runQuery", self.documents_url);
        let body = self.post(&url, &run_query_body(&self.collection, config_type)).await?;
        first_document_name(&body)
    }

    async fn create_entry(&self, config_type: &str) -> Result<String> {
        let url = format!("{}/{}", self.documents_url, self.collection);
        let body = self.post(&url, &create_body(config_type)).await?;
        let created: DocumentRef = serde_json::from_str(&body)
            .map_err(|e| SyncError::Config(format!("create response: {}", e)))?;
        Ok(created.name)
    }

    async fn record_refresh(&self, name: &str, data_url: &str) -> Result<()> {
        let url = format!("{}:commit", self.documents_url);
        self.post(&url, &commit_body(name, data_url)).await?;
        Ok(())
    }
}

/// Query, create when absent, then update. The query-then-create is not
/// atomic; concurrent runs can create the entry twice.
pub async fn upsert_entry<C: ConfigCollection>(
    collection: &C,
    config_type: &str,
    data_url: &str,
) -> Result<()> {
    let name = match collection.find_entry(config_type).await? {
        Some(name) => name,
        None => {
            debug!("No {} entry yet, creating one", config_type);
            collection.create_entry(config_type).await?
        }
    };
    collection.record_refresh(&name, data_url).await?;
    info!("Firestore updated for `{}`", config_type);
    Ok(())
}

fn documents_url(project_id: &str) -> String {
    format!(
        "{}/projects/{}/databases/(default)/documents",
        FIRESTORE_API_URL, project_id
    )
}

fn run_query_body(collection: &str, config_type: &str) -> Value {
    json!({
        "structuredQuery": {
            "from": [{ "collectionId": collection }],
            "where": {
                "fieldFilter": {
                    "field": { "fieldPath": "type" },
                    "op": "EQUAL",
                    "value": { "stringValue": config_type }
                }
            },
            "limit": 1
        }
    })
}

fn create_body(config_type: &str) -> Value {
    json!({ "fields": { "type": { "stringValue": config_type } } })
}

/// Sets `dataUrl` only (other fields untouched) and `lastRefreshedAt` to the
/// commit's request time. Fails if the document vanished in between.
fn commit_body(name: &str, data_url: &str) -> Value {
    json!({
        "writes": [{
            "update": {
                "name": name,
                "fields": { "dataUrl": { "stringValue": data_url } }
            },
            "updateMask": { "fieldPaths": ["dataUrl"] },
            "updateTransforms": [{
                "fieldPath": "lastRefreshedAt",
                "setToServerValue": "REQUEST_TIME"
            }],
            "currentDocument": { "exists": true }
        }]
    })
}

/// runQuery streams an array of results; an empty match still yields one
/// element carrying only `readTime`.
fn first_document_name(body: &str) -> Result<Option<String>> {
    let results: Vec<QueryResult> = serde_json::from_str(body)
        .map_err(|e| SyncError::Config(format!("runQuery response: {}", e)))?;
    Ok(results
        .into_iter()
        .find_map(|r| r.document)
        .map(|d| d.name))
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    /// Collection that logs every call and optionally holds one entry.
    #[derive(Default)]
    struct RecordingCollection {
        existing: Option<String>,
        fail_commit: bool,
        calls: RefCell<Vec<String>>,
    }

    impl ConfigCollection for RecordingCollection {
        async fn find_entry(&self, config_type: &str) -> Result<Option<String>> {
            self.calls.borrow_mut().push(format!("find {}", config_type));
            Ok(self.existing.clone())
        }

        async fn create_entry(&self, config_type: &str) -> Result<String> {
            self.calls.borrow_mut().push(format!("create {}", config_type));
            Ok("apiServices/new1".to_string())
        }

        async fn record_refresh(&self, name: &str, data_url: &str) -> Result<()> {
            self.calls
                .borrow_mut()
                .push(format!("update {} {}", name, data_url));
            if self.fail_commit {
                return Err(SyncError::Config("HTTP 503".into()));
            }
            Ok(())
        }
    }

    const URL: &str = "https://o.github.io/r/docs/airports_data.json";

    #[tokio::test]
    async fn missing_entry_created_before_update() {
        let collection = RecordingCollection::default();
        upsert_entry(&collection, "airportsData", URL).await.unwrap();
        assert_eq!(
            *collection.calls.borrow(),
            vec![
                "find airportsData".to_string(),
                "create airportsData".to_string(),
                format!("update apiServices/new1 {}", URL),
            ]
        );
    }

    #[tokio::test]
    async fn existing_entry_updated_without_create() {
        let collection = RecordingCollection {
            existing: Some("apiServices/abc".into()),
            ..Default::default()
        };
        upsert_entry(&collection, "airlinesData", URL).await.unwrap();
        assert_eq!(
            *collection.calls.borrow(),
            vec![
                "find airlinesData".to_string(),
                format!("update apiServices/abc {}", URL),
            ]
        );
    }

    #[tokio::test]
    async fn update_failure_propagates_as_config_error() {
        let collection = RecordingCollection {
            existing: Some("apiServices/abc".into()),
            fail_commit: true,
            ..Default::default()
        };
        let err = upsert_entry(&collection, "airportsData", URL).await.unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
    }

    #[test]
    fn query_filters_on_type_with_limit_one() {
        let body = run_query_body("apiServices", "airportsData");
        let q = &body["structuredQuery"];
        assert_eq!(q["from"][0]["collectionId"], "apiServices");
        assert_eq!(q["where"]["fieldFilter"]["field"]["fieldPath"], "type");
        assert_eq!(q["where"]["fieldFilter"]["op"], "EQUAL");
        assert_eq!(q["where"]["fieldFilter"]["value"]["stringValue"], "airportsData");
        assert_eq!(q["limit"], 1);
    }

    #[test]
    fn create_sets_only_discriminator() {
        let body = create_body("airlinesData");
        let fields = body["fields"].as_object().unwrap();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields["type"]["stringValue"], "airlinesData");
    }

    #[test]
    fn commit_updates_url_and_server_timestamp() {
        let name = "projects/p/databases/(default)/documents/apiServices/abc";
        let body = commit_body(name, "https://o.github.io/r/docs/airports_data.json");
        let write = &body["writes"][0];
        assert_eq!(write["update"]["name"], name);
        assert_eq!(
            write["update"]["fields"]["dataUrl"]["stringValue"],
            "https://o.github.io/r/docs/airports_data.json"
        );
        assert_eq!(write["updateMask"]["fieldPaths"], json!(["dataUrl"]));
        assert_eq!(write["updateTransforms"][0]["fieldPath"], "lastRefreshedAt");
        assert_eq!(write["updateTransforms"][0]["setToServerValue"], "REQUEST_TIME");
    }

    #[test]
    fn query_result_with_match() {
        let body = r#"[{"document":{"name":"projects/p/databases/(default)/documents/apiServices/xyz","fields":{}},"readTime":"2024-01-01T00:00:00Z"}]"#;
        assert_eq!(
            first_document_name(body).unwrap().as_deref(),
            Some("projects/p/databases/(default)/documents/apiServices/xyz")
        );
    }

    #[test]
    fn query_result_without_match() {
        let body = r#"[{"readTime":"2024-01-01T00:00:00Z"}]"#;
        assert_eq!(first_document_name(body).unwrap(), None);
    }

    #[test]
    fn documents_url_for_project() {
        assert_eq!(
            documents_url("wandrr"),
            "https://firestore.googleapis.com/v1/projects/wandrr/databases/(default)/documents"
        );
    }
}
