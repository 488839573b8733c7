use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use media_relay::config::{Config, ObjectStoreKind};
use media_relay::routes::create_routes;
use media_relay::services::memory_store::MemoryObjectStore;
use media_relay::services::object_store::ObjectStore;
use media_relay::services::s3::S3ObjectStore;
use media_relay::state::AppState;
use migration::{Migrator, MigratorTrait};
use sea_orm::Database;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("media_relay=debug,tower_http=debug")),
        )
        .init();

    let config = Config::parse();

    // --- Database ---
    let db = Database::connect(&config.database_url).await?;
    Migrator::up(&db, None).await?;
    tracing::info!("database migrations applied");

    // --- Object store, shared by every request ---
    let store: Arc<dyn ObjectStore> = match config.object_store {
        ObjectStoreKind::S3 => Arc::new(S3ObjectStore::new()),
        ObjectStoreKind::Memory => {
            tracing::warn!("using the in-memory object store; uploads are lost on restart");
            Arc::new(MemoryObjectStore::new())
        }
    };

    let addr = config.addr();
    tracing::info!(
        object_store = ?config.object_store,
        multipart_threshold = config.multipart_threshold,
        "starting media-relay"
    );

    let app = create_routes(AppState::new(db, store, config));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
