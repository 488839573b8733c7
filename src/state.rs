use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::config::Config;
use crate::services::object_store::ObjectStore;

/// Shared handles injected into every handler. Built once in `main`.
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub store: Arc<dyn ObjectStore>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(db: DatabaseConnection, store: Arc<dyn ObjectStore>, config: Config) -> Self {
        Self {
            db,
            store,
            config: Arc::new(config),
        }
    }
}
