//! The document-store surface the rest of the application programs against.
//!
//! Everything goes through one shared [`Db`] handle; the free functions take
//! references built from it, so there is no global client.

pub mod subscription;

use std::sync::Arc;

use futures_util::StreamExt;
use serde_json::Value;

use crate::application::ports::document_store::{DocumentStore, SnapshotStream};
use crate::domain::documents::document::{Document, Fields};
use crate::domain::documents::query::{
    Direction, FieldFilter, FilterOp, OrderBy, Query, QueryConstraint,
};
use crate::domain::documents::reference::{CollectionRef, DocumentRef};
use crate::domain::documents::snapshot::QuerySnapshot;

pub use subscription::Subscription;

/// Names exported by this module, one per store primitive.
pub const SURFACE: [&str; 11] = [
    "db",
    "collection",
    "doc",
    "add_doc",
    "update_doc",
    "delete_doc",
    "get_docs",
    "where",
    "query",
    "on_snapshot",
    "order_by",
];

/// Shared handle to the document store. Clones share the same store.
#[derive(Clone)]
pub struct Db {
    store: Arc<dyn DocumentStore>,
}

impl Db {
    pub fn from_store(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn backend(&self) -> &'static str {
        self.store.backend()
    }

    pub fn same_handle(&self, other: &Db) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.store) as *const (),
            Arc::as_ptr(&other.store) as *const (),
        )
    }
}

#[derive(Clone)]
pub struct CollectionReference {
    db: Db,
    inner: CollectionRef,
}

impl CollectionReference {
    pub fn id(&self) -> &str {
        self.inner.id()
    }

    pub fn reference(&self) -> &CollectionRef {
        &self.inner
    }

    /// Unfiltered query over the whole collection.
    pub fn as_query(&self) -> QueryReference {
        QueryReference {
            db: self.db.clone(),
            query: Query::new(self.inner.clone()),
        }
    }
}

#[derive(Clone)]
pub struct DocumentReference {
    db: Db,
    inner: DocumentRef,
}

impl DocumentReference {
    pub fn id(&self) -> &str {
        self.inner.id()
    }

    pub fn reference(&self) -> &DocumentRef {
        &self.inner
    }

    pub async fn get(&self) -> anyhow::Result<Option<Document>> {
        self.db.store.get_doc(&self.inner).await
    }
}

#[derive(Clone)]
pub struct QueryReference {
    db: Db,
    query: Query,
}

impl QueryReference {
    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Live results as a stream; used where a callback does not fit (SSE).
    pub async fn snapshots(&self) -> anyhow::Result<SnapshotStream> {
        self.db.store.listen(self.query.clone()).await
    }
}

pub fn collection(db: &Db, id: &str) -> anyhow::Result<CollectionReference> {
    Ok(CollectionReference {
        db: db.clone(),
        inner: CollectionRef::new(id)?,
    })
}

pub fn doc(collection: &CollectionReference, id: &str) -> anyhow::Result<DocumentReference> {
    Ok(DocumentReference {
        db: collection.db.clone(),
        inner: collection.inner.doc(id)?,
    })
}

pub async fn add_doc(collection: &CollectionReference, data: Fields) -> anyhow::Result<Document> {
    collection.db.store.add_doc(&collection.inner, data).await
}

pub async fn update_doc(doc: &DocumentReference, patch: Fields) -> anyhow::Result<Document> {
    doc.db.store.update_doc(&doc.inner, patch).await
}

pub async fn delete_doc(doc: &DocumentReference) -> anyhow::Result<()> {
    doc.db.store.delete_doc(&doc.inner).await
}

pub async fn get_docs(query: &QueryReference) -> anyhow::Result<QuerySnapshot> {
    query.db.store.get_docs(&query.query).await
}

pub fn r#where(field: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> QueryConstraint {
    QueryConstraint::Where(FieldFilter {
        field: field.into(),
        op,
        value: value.into(),
    })
}

pub fn order_by(field: impl Into<String>, direction: Direction) -> QueryConstraint {
    QueryConstraint::OrderBy(OrderBy {
        field: field.into(),
        direction,
    })
}

pub fn query(
    collection: &CollectionReference,
    constraints: impl IntoIterator<Item = QueryConstraint>,
) -> anyhow::Result<QueryReference> {
    Ok(QueryReference {
        db: collection.db.clone(),
        query: Query::with_constraints(collection.inner.clone(), constraints)?,
    })
}

/// Calls `callback` with the initial result set and again after every
/// change, on a background task, until the returned handle is cancelled.
pub fn on_snapshot<F>(query: &QueryReference, mut callback: F) -> Subscription
where
    F: FnMut(anyhow::Result<QuerySnapshot>) + Send + 'static,
{
    let store = query.db.store.clone();
    let q = query.query.clone();
    let task = tokio::spawn(async move {
        let collection = q.collection.clone();
        let mut stream = match store.listen(q).await {
            Ok(stream) => stream,
            Err(err) => {
                tracing::warn!(error = ?err, %collection, "snapshot_listen_failed");
                callback(Err(err));
                return;
            }
        };
        while let Some(item) = stream.next().await {
            callback(item);
        }
        tracing::debug!(%collection, "snapshot_stream_ended");
    });
    Subscription::new(task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::documents::error::StoreError;
    use crate::domain::documents::snapshot::ChangeKind;
    use crate::infrastructure::store::memory::InMemoryDocumentStore;
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    fn memory_db() -> Db {
        Db::from_store(Arc::new(InMemoryDocumentStore::new()))
    }

    fn fields(value: Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn surface_lists_every_primitive_once() {
        let mut names = SURFACE.to_vec();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), 11);
        assert_eq!(
            SURFACE,
            [
                "db",
                "collection",
                "doc",
                "add_doc",
                "update_doc",
                "delete_doc",
                "get_docs",
                "where",
                "query",
                "on_snapshot",
                "order_by"
            ]
        );
    }

    #[test]
    fn clones_share_one_store() {
        let db = memory_db();
        let other = db.clone();
        assert!(db.same_handle(&other));
        assert!(!db.same_handle(&memory_db()));
    }

    #[tokio::test]
    async fn crud_through_references() {
        let db = memory_db();
        let boards = collection(&db, "boards").unwrap();
        let created = add_doc(&boards, fields(json!({"title": "Sprint"})))
            .await
            .unwrap();
        let board = doc(&boards, &created.id).unwrap();

        let updated = update_doc(&board, fields(json!({"title": "Sprint 2"})))
            .await
            .unwrap();
        assert_eq!(updated.data["title"], json!("Sprint 2"));

        delete_doc(&board).await.unwrap();
        assert!(board.get().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn filters_and_orders() {
        let db = memory_db();
        let cards = collection(&db, "cards").unwrap();
        for (board, order) in [("b1", 2), ("b2", 1), ("b1", 1)] {
            add_doc(&cards, fields(json!({"boardId": board, "order": order})))
                .await
                .unwrap();
        }
        let q = query(
            &cards,
            [
                r#where("boardId", FilterOp::Equal, "b1"),
                order_by("order", Direction::Descending),
            ],
        )
        .unwrap();
        let snapshot = get_docs(&q).await.unwrap();
        let orders: Vec<_> = snapshot.docs.iter().map(|d| d.data["order"].clone()).collect();
        assert_eq!(orders, vec![json!(2), json!(1)]);
    }

    #[test]
    fn invalid_query_is_rejected() {
        let db = memory_db();
        let cards = collection(&db, "cards").unwrap();
        let err = query(&cards, [r#where("tags", FilterOp::In, "bug")])
            .err()
            .unwrap();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::InvalidArgument(_))
        ));
    }

    #[test]
    fn invalid_collection_id_is_rejected() {
        assert!(collection(&memory_db(), "boards/b1").is_err());
    }

    #[tokio::test]
    async fn on_snapshot_delivers_initial_then_changes() {
        let db = memory_db();
        let boards = collection(&db, "boards").unwrap();
        add_doc(&boards, fields(json!({"title": "a"}))).await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let sub = on_snapshot(&boards.as_query(), move |snap| {
            let _ = tx.send(snap.map(|s| s.changes));
        });

        let initial = timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(initial.len(), 1);
        assert_eq!(initial[0].kind, ChangeKind::Added);

        add_doc(&boards, fields(json!({"title": "b"}))).await.unwrap();
        let next = timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].doc.data["title"], json!("b"));
        assert!(sub.is_active());
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let db = memory_db();
        let boards = collection(&db, "boards").unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut sub = on_snapshot(&boards.as_query(), move |snap| {
            let _ = tx.send(snap.is_ok());
        });
        assert_eq!(
            timeout(Duration::from_secs(2), rx.recv()).await.unwrap(),
            Some(true)
        );

        sub.unsubscribe();
        assert!(!sub.is_active());
        // The aborted task drops the callback, closing the channel.
        assert_eq!(
            timeout(Duration::from_secs(2), rx.recv()).await.unwrap(),
            None
        );
        add_doc(&boards, fields(json!({"title": "late"}))).await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn dropping_subscription_cancels_it() {
        let db = memory_db();
        let boards = collection(&db, "boards").unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sub = on_snapshot(&boards.as_query(), move |_| {
            let _ = tx.send(());
        });
        timeout(Duration::from_secs(2), rx.recv()).await.unwrap();
        drop(sub);
        assert_eq!(timeout(Duration::from_secs(2), rx.recv()).await.unwrap(), None);
    }
}
