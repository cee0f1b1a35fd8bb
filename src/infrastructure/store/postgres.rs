use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::Value as JsonValue;
use sqlx::postgres::{PgListener, PgRow};
use sqlx::{Postgres, QueryBuilder, Row};

use crate::application::ports::document_store::{DocumentStore, SnapshotStream};
use crate::domain::documents::document::{Document, Fields, merge_patch};
use crate::domain::documents::error::StoreError;
use crate::domain::documents::query::{Direction, FieldFilter, FilterOp, Query};
use crate::domain::documents::reference::{CollectionRef, DocumentRef};
use crate::domain::documents::snapshot::QuerySnapshot;
use crate::infrastructure::db::PgPool;
use crate::infrastructure::store::{ids, watch};

const COLUMNS: &str = "id, collection, data, created_at, updated_at";

/// Documents as jsonb rows keyed by (collection, id). Writes announce the
/// collection on a NOTIFY channel so listeners can refetch.
#[derive(Clone)]
pub struct SqlxDocumentStore {
    pool: PgPool,
    channel: String,
}

impl SqlxDocumentStore {
    pub fn new(pool: PgPool, channel: impl Into<String>) -> Self {
        Self {
            pool,
            channel: channel.into(),
        }
    }

    async fn fetch(&self, query: &Query) -> anyhow::Result<Vec<Document>> {
        let mut qb = build_select(query);
        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .context("documents_select")?;
        Ok(rows.iter().map(row_to_document).collect())
    }

    async fn notify<'e, E>(&self, executor: E, collection: &str) -> anyhow::Result<()>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(&self.channel)
            .bind(collection)
            .execute(executor)
            .await
            .context("documents_pg_notify")?;
        Ok(())
    }
}

fn row_to_document(row: &PgRow) -> Document {
    let data = match row.get::<JsonValue, _>("data") {
        JsonValue::Object(map) => map,
        _ => Fields::new(),
    };
    Document {
        id: row.get("id"),
        collection: row.get("collection"),
        data,
        create_time: row.get("created_at"),
        update_time: row.get("updated_at"),
    }
}

fn push_path(qb: &mut QueryBuilder<'static, Postgres>, field: &str) {
    let segments: Vec<String> = field.split('.').map(str::to_string).collect();
    qb.push("(data #> ");
    qb.push_bind(segments);
    qb.push("::text[])");
}

fn push_value(qb: &mut QueryBuilder<'static, Postgres>, value: &JsonValue) {
    qb.push("(");
    qb.push_bind(value.clone());
    qb.push("::jsonb)");
}

// jsonb orders across types differently; range filters stay within one type.
fn push_range(qb: &mut QueryBuilder<'static, Postgres>, filter: &FieldFilter, cmp: &str) {
    qb.push("(jsonb_typeof(");
    push_path(qb, &filter.field);
    qb.push(") = jsonb_typeof(");
    push_value(qb, &filter.value);
    qb.push(") AND ");
    push_path(qb, &filter.field);
    qb.push(cmp);
    push_value(qb, &filter.value);
    qb.push(")");
}

fn push_filter(qb: &mut QueryBuilder<'static, Postgres>, filter: &FieldFilter) {
    match filter.op {
        FilterOp::LessThan => push_range(qb, filter, " < "),
        FilterOp::LessThanOrEqual => push_range(qb, filter, " <= "),
        FilterOp::GreaterThan => push_range(qb, filter, " > "),
        FilterOp::GreaterThanOrEqual => push_range(qb, filter, " >= "),
        FilterOp::Equal => {
            push_path(qb, &filter.field);
            qb.push(" = ");
            push_value(qb, &filter.value);
        }
        FilterOp::NotEqual => {
            qb.push("(");
            push_path(qb, &filter.field);
            qb.push(" IS NOT NULL AND jsonb_typeof(");
            push_path(qb, &filter.field);
            qb.push(") <> 'null' AND ");
            push_path(qb, &filter.field);
            qb.push(" <> ");
            push_value(qb, &filter.value);
            qb.push(")");
        }
        FilterOp::In => {
            push_path(qb, &filter.field);
            qb.push(" IN (SELECT jsonb_array_elements(");
            push_value(qb, &filter.value);
            qb.push("))");
        }
        FilterOp::NotIn => {
            qb.push("(");
            push_path(qb, &filter.field);
            qb.push(" IS NOT NULL AND jsonb_typeof(");
            push_path(qb, &filter.field);
            qb.push(") <> 'null' AND ");
            push_path(qb, &filter.field);
            qb.push(" NOT IN (SELECT jsonb_array_elements(");
            push_value(qb, &filter.value);
            qb.push(")))");
        }
        FilterOp::ArrayContains | FilterOp::ArrayContainsAny => {
            qb.push("(CASE WHEN jsonb_typeof(");
            push_path(qb, &filter.field);
            qb.push(") = 'array' THEN EXISTS (SELECT 1 FROM jsonb_array_elements(");
            push_path(qb, &filter.field);
            qb.push(") AS e(v) WHERE e.v ");
            if filter.op == FilterOp::ArrayContains {
                qb.push("= ");
                push_value(qb, &filter.value);
            } else {
                qb.push("IN (SELECT jsonb_array_elements(");
                push_value(qb, &filter.value);
                qb.push("))");
            }
            qb.push(") ELSE false END)");
        }
    }
}

pub(crate) fn build_select(query: &Query) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!(
        "SELECT {COLUMNS} FROM documents WHERE collection = "
    ));
    qb.push_bind(query.collection.id().to_string());
    for filter in &query.filters {
        qb.push(" AND ");
        push_filter(&mut qb, filter);
    }
    // Documents missing an ordered field are not part of the result.
    for order in &query.orders {
        qb.push(" AND ");
        push_path(&mut qb, &order.field);
        qb.push(" IS NOT NULL");
    }
    qb.push(" ORDER BY ");
    for order in &query.orders {
        push_path(&mut qb, &order.field);
        qb.push(match order.direction {
            Direction::Ascending => " ASC, ",
            Direction::Descending => " DESC, ",
        });
    }
    qb.push("id ASC");
    if let Some(limit) = query.limit {
        qb.push(" LIMIT ");
        qb.push_bind(limit as i64);
    }
    qb
}

#[async_trait]
impl DocumentStore for SqlxDocumentStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn add_doc(&self, collection: &CollectionRef, data: Fields) -> anyhow::Result<Document> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(&format!(
            "INSERT INTO documents (collection, id, data) VALUES ($1, $2, $3) RETURNING {COLUMNS}"
        ))
        .bind(collection.id())
        .bind(ids::auto_id())
        .bind(JsonValue::Object(data))
        .fetch_one(&mut *tx)
        .await
        .context("documents_insert")?;
        self.notify(&mut *tx, collection.id()).await?;
        tx.commit().await?;
        Ok(row_to_document(&row))
    }

    async fn get_doc(&self, doc: &DocumentRef) -> anyhow::Result<Option<Document>> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM documents WHERE collection = $1 AND id = $2"
        ))
        .bind(doc.collection().id())
        .bind(doc.id())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(row_to_document))
    }

    async fn update_doc(&self, doc: &DocumentRef, patch: Fields) -> anyhow::Result<Document> {
        if patch.is_empty() {
            return self
                .get_doc(doc)
                .await?
                .ok_or_else(|| StoreError::not_found(doc.to_string()).into());
        }
        let mut tx = self.pool.begin().await?;
        let current = sqlx::query(
            "SELECT data FROM documents WHERE collection = $1 AND id = $2 FOR UPDATE",
        )
        .bind(doc.collection().id())
        .bind(doc.id())
        .fetch_optional(&mut *tx)
        .await?;
        let Some(current) = current else {
            return Err(StoreError::not_found(doc.to_string()).into());
        };
        let mut data = match current.get::<JsonValue, _>("data") {
            JsonValue::Object(map) => map,
            _ => Fields::new(),
        };
        merge_patch(&mut data, patch);

        let row = sqlx::query(&format!(
            "UPDATE documents SET data = $3, updated_at = now()
             WHERE collection = $1 AND id = $2
             RETURNING {COLUMNS}"
        ))
        .bind(doc.collection().id())
        .bind(doc.id())
        .bind(JsonValue::Object(data))
        .fetch_one(&mut *tx)
        .await
        .context("documents_update")?;
        self.notify(&mut *tx, doc.collection().id()).await?;
        tx.commit().await?;
        Ok(row_to_document(&row))
    }

    async fn delete_doc(&self, doc: &DocumentRef) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        let res = sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
            .bind(doc.collection().id())
            .bind(doc.id())
            .execute(&mut *tx)
            .await
            .context("documents_delete")?;
        if res.rows_affected() > 0 {
            self.notify(&mut *tx, doc.collection().id()).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_docs(&self, query: &Query) -> anyhow::Result<QuerySnapshot> {
        query.validate()?;
        Ok(QuerySnapshot::initial(self.fetch(query).await?))
    }

    async fn listen(&self, query: Query) -> anyhow::Result<SnapshotStream> {
        query.validate()?;
        let mut listener = PgListener::connect_with(&self.pool)
            .await
            .context("store_listener_connect")?;
        listener
            .listen(&self.channel)
            .await
            .context("store_listener_listen")?;

        let collection = query.collection.id().to_string();
        let triggers = listener
            .into_stream()
            .filter_map(move |notification| {
                let relevant = match notification {
                    Ok(n) => n.payload() == collection,
                    Err(err) => {
                        tracing::warn!(error = ?err, "store_listener_recv_failed");
                        true
                    }
                };
                async move { relevant.then_some(()) }
            })
            .boxed();

        let store = self.clone();
        let query = Arc::new(query);
        Ok(watch::snapshot_stream(triggers, move || {
            let store = store.clone();
            let query = query.clone();
            async move { store.fetch(&query).await }
        }))
    }

    async fn health(&self) -> anyhow::Result<()> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }
}
