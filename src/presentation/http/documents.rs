use std::convert::Infallible;
use std::time::Duration;

use axum::response::sse::{Event, KeepAlive, Sse};
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use futures_util::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use utoipa::ToSchema;

use crate::application::client::{self, QueryReference};
use crate::bootstrap::app_context::AppContext;
use crate::domain::documents::document::{Document, Fields};
use crate::domain::documents::error::StoreError;
use crate::domain::documents::query::{Direction, FilterOp, QueryConstraint};
use crate::domain::documents::snapshot::{DocumentChange, QuerySnapshot};
use crate::presentation::http::error::status_for;

pub fn routes(ctx: AppContext) -> Router {
    Router::new()
        .route("/collections/:collection/documents", post(create_document))
        .route(
            "/collections/:collection/documents/:id",
            get(get_document)
                .patch(update_document)
                .delete(delete_document),
        )
        .route("/collections/:collection/query", post(query_documents))
        .route("/collections/:collection/listen", get(listen_documents))
        .with_state(ctx)
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DocumentResponse {
    pub id: String,
    pub collection: String,
    #[schema(value_type = Object)]
    pub data: Fields,
    pub create_time: chrono::DateTime<chrono::Utc>,
    pub update_time: chrono::DateTime<chrono::Utc>,
}

impl From<Document> for DocumentResponse {
    fn from(doc: Document) -> Self {
        Self {
            id: doc.id,
            collection: doc.collection,
            data: doc.data,
            create_time: doc.create_time,
            update_time: doc.update_time,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DocumentChangeResponse {
    /// `added`, `modified` or `removed`.
    pub kind: String,
    pub doc: DocumentResponse,
    pub old_index: Option<usize>,
    pub new_index: Option<usize>,
}

impl From<DocumentChange> for DocumentChangeResponse {
    fn from(change: DocumentChange) -> Self {
        Self {
            kind: change.kind.as_str().to_string(),
            doc: change.doc.into(),
            old_index: change.old_index,
            new_index: change.new_index,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct QueryResponse {
    pub docs: Vec<DocumentResponse>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SnapshotResponse {
    pub docs: Vec<DocumentResponse>,
    pub changes: Vec<DocumentChangeResponse>,
}

impl From<QuerySnapshot> for SnapshotResponse {
    fn from(snapshot: QuerySnapshot) -> Self {
        Self {
            docs: snapshot.docs.into_iter().map(Into::into).collect(),
            changes: snapshot.changes.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateDocumentBody {
    #[schema(value_type = Object)]
    pub data: Fields,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateDocumentBody {
    /// Top-level keys replace fields; dotted keys (`meta.color`) update
    /// nested ones.
    #[schema(value_type = Object)]
    pub patch: Fields,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct WhereClause {
    pub field: String,
    /// One of `==`, `!=`, `<`, `<=`, `>`, `>=`, `array-contains`,
    /// `array-contains-any`, `in`, `not-in`.
    pub op: String,
    pub value: Value,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct OrderClause {
    pub field: String,
    /// `asc` (default) or `desc`.
    pub direction: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueryBody {
    #[serde(default, rename = "where")]
    pub filters: Vec<WhereClause>,
    #[serde(default)]
    pub order_by: Vec<OrderClause>,
    pub limit: Option<usize>,
}

impl QueryBody {
    fn constraints(self) -> Result<Vec<QueryConstraint>, StoreError> {
        let mut out = Vec::with_capacity(self.filters.len() + self.order_by.len() + 1);
        for clause in self.filters {
            let op: FilterOp = clause.op.parse()?;
            out.push(client::r#where(clause.field, op, clause.value));
        }
        for clause in self.order_by {
            let direction = match clause.direction.as_deref() {
                Some(raw) => raw.parse()?,
                None => Direction::default(),
            };
            out.push(client::order_by(clause.field, direction));
        }
        if let Some(limit) = self.limit {
            out.push(QueryConstraint::Limit(limit));
        }
        Ok(out)
    }
}

#[derive(Debug, Deserialize)]
pub struct ListenParams {
    /// JSON-encoded `QueryBody`.
    q: Option<String>,
}

fn build_query(
    ctx: &AppContext,
    collection: &str,
    body: QueryBody,
) -> Result<QueryReference, StatusCode> {
    let coll = client::collection(ctx.db(), collection).map_err(status_for)?;
    let constraints = body.constraints().map_err(|e| status_for(e.into()))?;
    client::query(&coll, constraints).map_err(status_for)
}

#[utoipa::path(
    post,
    path = "/api/collections/{collection}/documents",
    tag = "Documents",
    request_body = CreateDocumentBody,
    params(("collection" = String, Path, description = "Collection id")),
    responses(
        (status = 201, body = DocumentResponse),
        (status = 400, description = "Invalid collection id")
    )
)]
pub async fn create_document(
    State(ctx): State<AppContext>,
    Path(collection): Path<String>,
    Json(body): Json<CreateDocumentBody>,
) -> Result<(StatusCode, Json<DocumentResponse>), StatusCode> {
    let coll = client::collection(ctx.db(), &collection).map_err(status_for)?;
    let doc = client::add_doc(&coll, body.data)
        .await
        .map_err(status_for)?;
    tracing::debug!(collection = %collection, id = %doc.id, "document_created");
    Ok((StatusCode::CREATED, Json(doc.into())))
}

#[utoipa::path(
    get,
    path = "/api/collections/{collection}/documents/{id}",
    tag = "Documents",
    params(
        ("collection" = String, Path, description = "Collection id"),
        ("id" = String, Path, description = "Document id")
    ),
    responses((status = 200, body = DocumentResponse), (status = 404))
)]
pub async fn get_document(
    State(ctx): State<AppContext>,
    Path((collection, id)): Path<(String, String)>,
) -> Result<Json<DocumentResponse>, StatusCode> {
    let coll = client::collection(ctx.db(), &collection).map_err(status_for)?;
    let doc_ref = client::doc(&coll, &id).map_err(status_for)?;
    let doc = doc_ref
        .get()
        .await
        .map_err(status_for)?
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(doc.into()))
}

#[utoipa::path(
    patch,
    path = "/api/collections/{collection}/documents/{id}",
    tag = "Documents",
    request_body = UpdateDocumentBody,
    params(
        ("collection" = String, Path, description = "Collection id"),
        ("id" = String, Path, description = "Document id")
    ),
    responses((status = 200, body = DocumentResponse), (status = 404))
)]
pub async fn update_document(
    State(ctx): State<AppContext>,
    Path((collection, id)): Path<(String, String)>,
    Json(body): Json<UpdateDocumentBody>,
) -> Result<Json<DocumentResponse>, StatusCode> {
    let coll = client::collection(ctx.db(), &collection).map_err(status_for)?;
    let doc_ref = client::doc(&coll, &id).map_err(status_for)?;
    let doc = client::update_doc(&doc_ref, body.patch)
        .await
        .map_err(status_for)?;
    Ok(Json(doc.into()))
}

#[utoipa::path(
    delete,
    path = "/api/collections/{collection}/documents/{id}",
    tag = "Documents",
    params(
        ("collection" = String, Path, description = "Collection id"),
        ("id" = String, Path, description = "Document id")
    ),
    responses((status = 204))
)]
pub async fn delete_document(
    State(ctx): State<AppContext>,
    Path((collection, id)): Path<(String, String)>,
) -> Result<StatusCode, StatusCode> {
    let coll = client::collection(ctx.db(), &collection).map_err(status_for)?;
    let doc_ref = client::doc(&coll, &id).map_err(status_for)?;
    client::delete_doc(&doc_ref).await.map_err(status_for)?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/collections/{collection}/query",
    tag = "Documents",
    request_body = QueryBody,
    params(("collection" = String, Path, description = "Collection id")),
    responses((status = 200, body = QueryResponse), (status = 400))
)]
pub async fn query_documents(
    State(ctx): State<AppContext>,
    Path(collection): Path<String>,
    Json(body): Json<QueryBody>,
) -> Result<Json<QueryResponse>, StatusCode> {
    let query = build_query(&ctx, &collection, body)?;
    let snapshot = client::get_docs(&query).await.map_err(status_for)?;
    Ok(Json(QueryResponse {
        docs: snapshot.docs.into_iter().map(Into::into).collect(),
    }))
}

#[utoipa::path(
    get,
    path = "/api/collections/{collection}/listen",
    tag = "Documents",
    params(
        ("collection" = String, Path, description = "Collection id"),
        ("q" = Option<String>, Query, description = "JSON-encoded query body")
    ),
    responses(
        (status = 200, description = "Snapshot event stream", content_type = "text/event-stream")
    )
)]
pub async fn listen_documents(
    State(ctx): State<AppContext>,
    Path(collection): Path<String>,
    Query(params): Query<ListenParams>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, StatusCode> {
    let body = match params.q.as_deref() {
        Some(raw) => {
            serde_json::from_str::<QueryBody>(raw).map_err(|_| StatusCode::BAD_REQUEST)?
        }
        None => QueryBody::default(),
    };
    let query = build_query(&ctx, &collection, body)?;
    let snapshots = query.snapshots().await.map_err(status_for)?;

    let initial = stream::iter(vec![Ok(Event::default().event("ready").data("{}"))]);
    let updates = snapshots.map(move |item| {
        let event = match item {
            Ok(snapshot) => {
                let payload = serde_json::to_string(&SnapshotResponse::from(snapshot))
                    .unwrap_or_else(|_| "{}".into());
                Event::default().event("snapshot").data(payload)
            }
            Err(err) => {
                tracing::warn!(
                    error = ?err,
                    collection = %collection,
                    "store_listen_refetch_failed"
                );
                Event::default()
                    .event("error")
                    .data(json!({ "message": err.to_string() }).to_string())
            }
        };
        Ok(event)
    });
    let keepalive = KeepAlive::new()
        .interval(Duration::from_secs(25))
        .text("keep-alive");
    Ok(Sse::new(initial.chain(updates)).keep_alive(keepalive))
}
