pub mod firestore;
pub mod ids;
pub mod memory;
pub mod postgres;
pub mod watch;

use std::sync::Arc;

use crate::application::ports::document_store::DocumentStore;
use crate::bootstrap::config::{Config, StoreBackend};
use crate::infrastructure::db;

/// Opens the document store selected by `STORE_BACKEND`. No retries: a store
/// that cannot be reached here fails startup.
pub async fn connect(cfg: &Config) -> anyhow::Result<Arc<dyn DocumentStore>> {
    let store: Arc<dyn DocumentStore> = match cfg.store_backend {
        StoreBackend::Memory => Arc::new(memory::InMemoryDocumentStore::new()),
        StoreBackend::Postgres => {
            let pool = db::connect_pool(&cfg.database_url).await?;
            db::migrate(&pool).await?;
            Arc::new(postgres::SqlxDocumentStore::new(
                pool,
                cfg.notify_channel.clone(),
            ))
        }
        StoreBackend::Firestore => Arc::new(firestore::FirestoreRestStore::from_config(cfg)?),
    };
    tracing::info!(backend = store.backend(), "document_store_connected");
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn defaults_to_memory_backend() {
        let store = connect(&Config::default()).await.unwrap();
        assert_eq!(store.backend(), "memory");
    }

    #[tokio::test]
    async fn firestore_without_project_fails() {
        let cfg = Config {
            store_backend: StoreBackend::Firestore,
            ..Config::default()
        };
        assert!(connect(&cfg).await.is_err());
    }
}
