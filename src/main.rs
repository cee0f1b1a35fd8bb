use std::net::SocketAddr;

use dotenvy::dotenv;
use tokio::task::JoinHandle;
use tracing::{error, info};

use kanban::bootstrap::app_context::{AppContext, AppServices};
use kanban::bootstrap::config::Config;
use kanban::client::Db;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "kanban=debug,axum=info,tower_http=info".into()),
        )
        .init();

    let cfg = Config::from_env()?;
    info!(?cfg, "Starting Kanban backend");

    // The one store handle; everything else gets clones of it.
    let store = kanban::infrastructure::store::connect(&cfg).await?;
    let db = Db::from_store(store);
    let ctx = AppContext::new(cfg.clone(), AppServices::new(db));

    if let Err(e) = tokio::fs::create_dir_all(&cfg.assets_dir).await {
        tracing::warn!(error = ?e, dir = %cfg.assets_dir, "Failed to create assets dir");
    }

    let app = kanban::presentation::build_router(ctx);

    let api_addr = SocketAddr::from(([0, 0, 0, 0], cfg.api_port));
    info!(%api_addr, "HTTP API listening");
    let listener = tokio::net::TcpListener::bind(api_addr).await?;

    let api_handle: JoinHandle<anyhow::Result<()>> = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    });

    match api_handle.await {
        Ok(Ok(())) => info!("HTTP API stopped"),
        Ok(Err(e)) => error!(?e, "API server task failed"),
        Err(e) => error!(?e, "API server task panicked"),
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(?e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
