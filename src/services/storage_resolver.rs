use sea_orm::DatabaseConnection;
use uuid::Uuid;

use crate::access::AppGuard;
use crate::entities::storage_configuration;
use crate::error::AppResult;

/// Storage bound to `app_id`, as seen by `acting_user_id`.
///
/// Fails closed: `NotFound` for a missing or deleted app, `Forbidden` when
/// the user does not own the app (checked before anything else about it),
/// `NotConfigured` when no live storage is bound. Never writes.
pub async fn resolve(
    db: &DatabaseConnection,
    app_id: Uuid,
    acting_user_id: &str,
) -> AppResult<storage_configuration::Model> {
    let guard = AppGuard::load(db, app_id, acting_user_id).await?;
    guard.storage().cloned()
}
