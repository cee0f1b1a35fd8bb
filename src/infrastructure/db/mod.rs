use std::time::Duration;

use anyhow::Context;
use sqlx::{Pool, Postgres};

pub type PgPool = Pool<Postgres>;

// Each live query holds one extra connection for LISTEN outside the pool.
const MAX_CONNECTIONS: u32 = 10;

pub async fn connect_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
        .context("documents_db_connect")?;
    Ok(pool)
}

/// Applies the embedded `./migrations` (the `documents` table).
pub async fn migrate(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("documents_db_migrate")?;
    tracing::info!("documents_db_migrated");
    Ok(())
}
