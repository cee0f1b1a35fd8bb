//! Firestore behind the `DocumentStore` port, spoken over the public REST API.
//!
//! REST has no push channel, so live queries poll `runQuery` and only emit
//! when the result set actually changed.

pub mod structured_query;
pub mod value;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_stream::wrappers::IntervalStream;

use crate::application::ports::document_store::{DocumentStore, SnapshotStream};
use crate::bootstrap::config::Config;
use crate::domain::documents::document::{Document, Fields, merge_patch};
use crate::domain::documents::error::StoreError;
use crate::domain::documents::query::Query;
use crate::domain::documents::reference::{CollectionRef, DocumentRef};
use crate::domain::documents::snapshot::QuerySnapshot;
use crate::infrastructure::store::{ids, watch};

use structured_query::{field_path, run_query_body};
use value::{decode_fields, encode_fields};

#[derive(Debug, Clone)]
pub struct FirestoreSettings {
    pub base_url: String,
    pub project_id: String,
    pub database: String,
    pub api_key: Option<String>,
    pub poll_interval: Duration,
}

impl FirestoreSettings {
    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        let project_id = cfg
            .firebase
            .project_id
            .clone()
            .context("FIREBASE_PROJECT_ID is required for the firestore backend")?;
        Ok(Self {
            base_url: cfg.firestore_base_url.clone(),
            project_id,
            database: cfg.firestore_database.clone(),
            api_key: cfg.firebase.api_key.clone(),
            poll_interval: Duration::from_millis(cfg.snapshot_poll_ms),
        })
    }

    pub fn documents_root(&self) -> String {
        format!(
            "{}/projects/{}/databases/{}/documents",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(&self.project_id),
            urlencoding::encode(&self.database),
        )
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RestDocument {
    name: String,
    #[serde(default)]
    fields: Value,
    create_time: Option<String>,
    update_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RunQueryItem {
    document: Option<RestDocument>,
}

#[derive(Clone)]
pub struct FirestoreRestStore {
    client: reqwest::Client,
    settings: Arc<FirestoreSettings>,
}

impl FirestoreRestStore {
    pub fn new(settings: FirestoreSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            settings: Arc::new(settings),
        }
    }

    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        Ok(Self::new(FirestoreSettings::from_config(cfg)?))
    }

    fn collection_url(&self, collection: &CollectionRef) -> String {
        format!(
            "{}/{}",
            self.settings.documents_root(),
            urlencoding::encode(collection.id())
        )
    }

    fn document_url(&self, doc: &DocumentRef) -> String {
        format!(
            "{}/{}",
            self.collection_url(doc.collection()),
            urlencoding::encode(doc.id())
        )
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.settings.api_key {
            Some(key) => req.query(&[("key", key)]),
            None => req,
        }
    }

    async fn execute(&self, req: reqwest::RequestBuilder) -> anyhow::Result<reqwest::Response> {
        self.authorize(req)
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(format!("request failed: {e}")).into())
    }

    async fn fetch(&self, query: &Query) -> anyhow::Result<Vec<Document>> {
        let url = format!("{}:runQuery", self.settings.documents_root());
        let resp = self
            .execute(self.client.post(url).json(&run_query_body(query)))
            .await?;
        let items: Vec<RunQueryItem> = ensure_success(resp)
            .await?
            .json()
            .await
            .context("firestore_run_query_decode")?;
        items
            .into_iter()
            .filter_map(|item| item.document)
            .map(|raw| to_document(query.collection.id(), raw))
            .collect()
    }
}

async fn ensure_success(resp: reqwest::Response) -> anyhow::Result<reqwest::Response> {
    let status = resp.status().as_u16();
    if (200..300).contains(&status) {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or(body);
    Err(status_error(status, message).into())
}

pub(crate) fn status_error(status: u16, message: String) -> StoreError {
    match status {
        404 => StoreError::NotFound(message),
        400 | 409 | 412 => StoreError::InvalidArgument(message),
        401 | 403 => StoreError::PermissionDenied(message),
        429 | 500..=599 => StoreError::Unavailable(message),
        _ => StoreError::Backend(format!("firestore returned {status}: {message}")),
    }
}

fn parse_time(raw: Option<&str>) -> anyhow::Result<DateTime<Utc>> {
    match raw {
        Some(s) => Ok(DateTime::parse_from_rfc3339(s)
            .with_context(|| format!("invalid firestore timestamp '{s}'"))?
            .with_timezone(&Utc)),
        None => Ok(Utc::now()),
    }
}

fn to_document(collection: &str, raw: RestDocument) -> anyhow::Result<Document> {
    let id = raw
        .name
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string();
    Ok(Document {
        id,
        collection: collection.to_string(),
        data: decode_fields(&raw.fields),
        create_time: parse_time(raw.create_time.as_deref())?,
        update_time: parse_time(raw.update_time.as_deref())?,
    })
}

#[async_trait]
impl DocumentStore for FirestoreRestStore {
    fn backend(&self) -> &'static str {
        "firestore"
    }

    async fn add_doc(&self, collection: &CollectionRef, data: Fields) -> anyhow::Result<Document> {
        let req = self
            .client
            .post(self.collection_url(collection))
            .query(&[("documentId", ids::auto_id())])
            .json(&json!({ "fields": encode_fields(&data) }));
        let raw: RestDocument = ensure_success(self.execute(req).await?)
            .await?
            .json()
            .await
            .context("firestore_create_decode")?;
        to_document(collection.id(), raw)
    }

    async fn get_doc(&self, doc: &DocumentRef) -> anyhow::Result<Option<Document>> {
        let resp = self.execute(self.client.get(self.document_url(doc))).await?;
        if resp.status().as_u16() == 404 {
            return Ok(None);
        }
        let raw: RestDocument = ensure_success(resp)
            .await?
            .json()
            .await
            .context("firestore_get_decode")?;
        Ok(Some(to_document(doc.collection().id(), raw)?))
    }

    async fn update_doc(&self, doc: &DocumentRef, patch: Fields) -> anyhow::Result<Document> {
        // A PATCH without a mask replaces the whole document.
        if patch.is_empty() {
            return self
                .get_doc(doc)
                .await?
                .ok_or_else(|| StoreError::not_found(doc.to_string()).into());
        }
        let mut params: Vec<(&str, String)> = patch
            .keys()
            .map(|k| ("updateMask.fieldPaths", field_path(k)))
            .collect();
        params.push(("currentDocument.exists", "true".to_string()));
        // Dotted keys become nested maps; the mask limits the write to them.
        let mut body = Fields::new();
        merge_patch(&mut body, patch);

        let req = self
            .client
            .patch(self.document_url(doc))
            .query(&params)
            .json(&json!({ "fields": encode_fields(&body) }));
        let resp = self.execute(req).await?;
        if resp.status().as_u16() == 404 {
            return Err(StoreError::not_found(doc.to_string()).into());
        }
        let raw: RestDocument = ensure_success(resp)
            .await?
            .json()
            .await
            .context("firestore_update_decode")?;
        to_document(doc.collection().id(), raw)
    }

    async fn delete_doc(&self, doc: &DocumentRef) -> anyhow::Result<()> {
        let resp = self
            .execute(self.client.delete(self.document_url(doc)))
            .await?;
        if resp.status().as_u16() == 404 {
            return Ok(());
        }
        ensure_success(resp).await?;
        Ok(())
    }

    async fn get_docs(&self, query: &Query) -> anyhow::Result<QuerySnapshot> {
        query.validate()?;
        Ok(QuerySnapshot::initial(self.fetch(query).await?))
    }

    async fn listen(&self, query: Query) -> anyhow::Result<SnapshotStream> {
        query.validate()?;
        let period = self.settings.poll_interval;
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let triggers = IntervalStream::new(interval).map(|_| ()).boxed();

        let store = self.clone();
        let query = Arc::new(query);
        Ok(watch::snapshot_stream(triggers, move || {
            let store = store.clone();
            let query = query.clone();
            async move {
                store.fetch(&query).await.inspect_err(|err| {
                    tracing::warn!(
                        error = ?err,
                        collection = %query.collection,
                        "store_poll_failed"
                    );
                })
            }
        }))
    }

    async fn health(&self) -> anyhow::Result<()> {
        let url = format!("{}:listCollectionIds", self.settings.documents_root());
        let resp = self
            .execute(self.client.post(url).json(&json!({ "pageSize": 1 })))
            .await?;
        ensure_success(resp).await?;
        Ok(())
    }
}
