use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::domain::documents::document::{Document, Fields};
use crate::domain::documents::query::Query;
use crate::domain::documents::reference::{CollectionRef, DocumentRef};
use crate::domain::documents::snapshot::QuerySnapshot;

/// Live query results: the initial snapshot first, then one item per change
/// of the result set. Dropping the stream releases the listener.
pub type SnapshotStream = BoxStream<'static, anyhow::Result<QuerySnapshot>>;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Short backend label for logs and health output.
    fn backend(&self) -> &'static str;

    async fn add_doc(&self, collection: &CollectionRef, data: Fields) -> anyhow::Result<Document>;

    async fn get_doc(&self, doc: &DocumentRef) -> anyhow::Result<Option<Document>>;

    // Fails with StoreError::NotFound when the document does not exist.
    async fn update_doc(&self, doc: &DocumentRef, patch: Fields) -> anyhow::Result<Document>;

    // Deleting a missing document succeeds.
    async fn delete_doc(&self, doc: &DocumentRef) -> anyhow::Result<()>;

    async fn get_docs(&self, query: &Query) -> anyhow::Result<QuerySnapshot>;

    async fn listen(&self, query: Query) -> anyhow::Result<SnapshotStream>;

    async fn health(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
