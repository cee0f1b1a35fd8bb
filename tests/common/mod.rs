use std::sync::Arc;

use kanban::bootstrap::app_context::{AppContext, AppServices};
use kanban::bootstrap::config::Config;
use kanban::client::Db;
use kanban::infrastructure::store::memory::InMemoryDocumentStore;

/// Serves the full router over the memory backend on an ephemeral port and
/// returns its base URL.
pub async fn spawn_app() -> String {
    spawn_app_with(Config::default()).await
}

pub async fn spawn_app_with(cfg: Config) -> String {
    let db = Db::from_store(Arc::new(InMemoryDocumentStore::new()));
    let ctx = AppContext::new(cfg, AppServices::new(db));
    let app = kanban::presentation::build_router(ctx);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}
