use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures_util::StreamExt;
use tokio::sync::{RwLock, broadcast};
use tokio_stream::wrappers::BroadcastStream;

use crate::application::ports::document_store::{DocumentStore, SnapshotStream};
use crate::domain::documents::document::{Document, Fields, merge_patch};
use crate::domain::documents::error::StoreError;
use crate::domain::documents::query::Query;
use crate::domain::documents::reference::{CollectionRef, DocumentRef};
use crate::domain::documents::snapshot::QuerySnapshot;
use crate::infrastructure::store::{ids, watch};

const CHANGE_BUS_CAPACITY: usize = 256;

type Collections = HashMap<String, BTreeMap<String, Document>>;

/// Process-local store. Useful for development and tests; nothing survives a
/// restart.
#[derive(Clone)]
pub struct InMemoryDocumentStore {
    collections: Arc<RwLock<Collections>>,
    // Carries the id of the collection that was written.
    changes: broadcast::Sender<String>,
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_BUS_CAPACITY);
        Self {
            collections: Arc::new(RwLock::new(HashMap::new())),
            changes,
        }
    }

    fn notify(&self, collection: &str) {
        // No listeners is fine.
        let _ = self.changes.send(collection.to_string());
    }

    async fn run_query(&self, query: &Query) -> Vec<Document> {
        let guard = self.collections.read().await;
        match guard.get(query.collection.id()) {
            Some(docs) => query.apply(docs.values().cloned()),
            None => Vec::new(),
        }
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn add_doc(&self, collection: &CollectionRef, data: Fields) -> anyhow::Result<Document> {
        let now = Utc::now();
        let doc = Document {
            id: ids::auto_id(),
            collection: collection.id().to_string(),
            data,
            create_time: now,
            update_time: now,
        };
        self.collections
            .write()
            .await
            .entry(collection.id().to_string())
            .or_default()
            .insert(doc.id.clone(), doc.clone());
        self.notify(collection.id());
        Ok(doc)
    }

    async fn get_doc(&self, doc: &DocumentRef) -> anyhow::Result<Option<Document>> {
        let guard = self.collections.read().await;
        Ok(guard
            .get(doc.collection().id())
            .and_then(|docs| docs.get(doc.id()))
            .cloned())
    }

    async fn update_doc(&self, doc: &DocumentRef, patch: Fields) -> anyhow::Result<Document> {
        if patch.is_empty() {
            return self
                .get_doc(doc)
                .await?
                .ok_or_else(|| StoreError::not_found(doc.to_string()).into());
        }
        let updated = {
            let mut guard = self.collections.write().await;
            let existing = guard
                .get_mut(doc.collection().id())
                .and_then(|docs| docs.get_mut(doc.id()))
                .ok_or_else(|| StoreError::not_found(doc.to_string()))?;
            merge_patch(&mut existing.data, patch);
            existing.update_time = Utc::now();
            existing.clone()
        };
        self.notify(doc.collection().id());
        Ok(updated)
    }

    async fn delete_doc(&self, doc: &DocumentRef) -> anyhow::Result<()> {
        let removed = self
            .collections
            .write()
            .await
            .get_mut(doc.collection().id())
            .and_then(|docs| docs.remove(doc.id()));
        if removed.is_some() {
            self.notify(doc.collection().id());
        }
        Ok(())
    }

    async fn get_docs(&self, query: &Query) -> anyhow::Result<QuerySnapshot> {
        query.validate()?;
        Ok(QuerySnapshot::initial(self.run_query(query).await))
    }

    async fn listen(&self, query: Query) -> anyhow::Result<SnapshotStream> {
        query.validate()?;
        let collection = query.collection.id().to_string();
        // Subscribe before the initial fetch so no write slips between them.
        let triggers = BroadcastStream::new(self.changes.subscribe())
            .filter_map(move |event| {
                let relevant = match event {
                    Ok(written) => written == collection,
                    // Lagged: we may have missed a relevant write, refetch.
                    Err(_) => true,
                };
                async move { relevant.then_some(()) }
            })
            .boxed();
        let store = self.clone();
        let query = Arc::new(query);
        Ok(watch::snapshot_stream(triggers, move || {
            let store = store.clone();
            let query = query.clone();
            async move { Ok(store.run_query(&query).await) }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::documents::query::{Direction, FieldFilter, FilterOp, OrderBy};
    use crate::domain::documents::snapshot::ChangeKind;
    use serde_json::{Value, json};
    use std::time::Duration;

    fn fields(v: Value) -> Fields {
        v.as_object().cloned().unwrap()
    }

    fn cards() -> CollectionRef {
        CollectionRef::new("cards").unwrap()
    }

    #[tokio::test]
    async fn crud_roundtrip() {
        let store = InMemoryDocumentStore::new();
        let created = store
            .add_doc(&cards(), fields(json!({"title": "Write tests", "order": 1})))
            .await
            .unwrap();
        let doc_ref = cards().doc(created.id.clone()).unwrap();

        let fetched = store.get_doc(&doc_ref).await.unwrap().unwrap();
        assert_eq!(fetched.data["title"], json!("Write tests"));

        let updated = store
            .update_doc(&doc_ref, fields(json!({"title": "Ship it"})))
            .await
            .unwrap();
        assert_eq!(updated.data["title"], json!("Ship it"));
        assert_eq!(updated.data["order"], json!(1));
        assert!(updated.update_time >= created.update_time);

        store.delete_doc(&doc_ref).await.unwrap();
        assert!(store.get_doc(&doc_ref).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_of_missing_document_is_not_found() {
        let store = InMemoryDocumentStore::new();
        let doc_ref = cards().doc("nope").unwrap();
        let err = store
            .update_doc(&doc_ref, fields(json!({"a": 1})))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn empty_patch_leaves_document_untouched() {
        let store = InMemoryDocumentStore::new();
        let created = store
            .add_doc(&cards(), fields(json!({"title": "Backlog"})))
            .await
            .unwrap();
        let doc_ref = cards().doc(&created.id).unwrap();
        let same = store.update_doc(&doc_ref, Fields::new()).await.unwrap();
        assert_eq!(same, created);

        let err = store
            .update_doc(&cards().doc("nope").unwrap(), Fields::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn delete_of_missing_document_succeeds() {
        let store = InMemoryDocumentStore::new();
        store.delete_doc(&cards().doc("nope").unwrap()).await.unwrap();
    }

    #[tokio::test]
    async fn get_docs_filters_and_orders() {
        let store = InMemoryDocumentStore::new();
        for (board, order) in [("b1", 3), ("b2", 1), ("b1", 2)] {
            store
                .add_doc(&cards(), fields(json!({"boardId": board, "order": order})))
                .await
                .unwrap();
        }
        let mut query = Query::new(cards());
        query.filters.push(FieldFilter {
            field: "boardId".into(),
            op: FilterOp::Equal,
            value: json!("b1"),
        });
        query.orders.push(OrderBy {
            field: "order".into(),
            direction: Direction::Ascending,
        });
        let snap = store.get_docs(&query).await.unwrap();
        let orders: Vec<_> = snap.docs.iter().map(|d| d.data["order"].clone()).collect();
        assert_eq!(orders, vec![json!(2), json!(3)]);
    }

    #[tokio::test]
    async fn listen_delivers_initial_snapshot_then_changes() {
        let store = InMemoryDocumentStore::new();
        store
            .add_doc(&cards(), fields(json!({"title": "first"})))
            .await
            .unwrap();
        let mut stream = store.listen(Query::new(cards())).await.unwrap();

        let initial = stream.next().await.unwrap().unwrap();
        assert_eq!(initial.len(), 1);

        // Writes to other collections do not wake the listener.
        store
            .add_doc(&CollectionRef::new("boards").unwrap(), fields(json!({})))
            .await
            .unwrap();
        let added = store
            .add_doc(&cards(), fields(json!({"title": "second"})))
            .await
            .unwrap();

        let next = tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(next.len(), 2);
        assert_eq!(next.changes.len(), 1);
        assert_eq!(next.changes[0].kind, ChangeKind::Added);
        assert_eq!(next.changes[0].doc.id, added.id);
    }
}
