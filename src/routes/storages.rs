use axum::{extract::State, response::Json, Extension};
use chrono::NaiveDateTime;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, IntoActiveModel, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};

use crate::access::Identity;
use crate::entities::storage_configuration;
use crate::error::AppError;
use crate::models::storage::{S3StorageConfiguration, StorageSummary};
use crate::pagination::now_millis;
use crate::routes::{validate_length, Ack, RpcJson};
use crate::state::AppState;

#[derive(Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateStorageRequest {
    name: String,
    bucket: String,
    region: String,
    access_key_id: String,
    secret_access_key: String,
    api_endpoint: Option<String>,
}

#[derive(Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeleteStorageRequest {
    storage_id: i32,
}

#[derive(Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StorageResponse {
    id: i32,
    name: String,
    configuration: StorageSummary,
    created_at: NaiveDateTime,
}

impl From<storage_configuration::Model> for StorageResponse {
    fn from(model: storage_configuration::Model) -> Self {
        StorageResponse {
            id: model.id,
            name: model.name,
            configuration: StorageSummary::from(&model.configuration),
            created_at: model.created_at,
        }
    }
}

#[utoipa::path(
    post,
    path = "/rpc/storages.createStorage",
    request_body = CreateStorageRequest,
    responses(
        (status = 200, description = "Storage configuration saved", body = StorageResponse),
        (status = 400, description = "Missing or invalid fields"),
        (status = 403, description = "No signed-in session")
    ),
    security(("session" = [])),
    tag = "Storages"
)]
pub async fn create_storage(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    RpcJson(payload): RpcJson<CreateStorageRequest>,
) -> Result<Json<StorageResponse>, AppError> {
    let name = validate_length("name", &payload.name, 3, 50)?;
    let configuration = S3StorageConfiguration {
        bucket: validate_length("bucket", &payload.bucket, 1, 255)?,
        region: validate_length("region", &payload.region, 1, 64)?,
        access_key_id: validate_length("accessKeyId", &payload.access_key_id, 1, 255)?,
        secret_access_key: validate_length("secretAccessKey", &payload.secret_access_key, 1, 255)?,
        api_endpoint: payload
            .api_endpoint
            .map(|endpoint| endpoint.trim().to_string())
            .filter(|endpoint| !endpoint.is_empty()),
    };
    if let Some(endpoint) = &configuration.api_endpoint {
        url::Url::parse(endpoint)
            .map_err(|e| AppError::BadRequest(format!("invalid apiEndpoint: {e}")))?;
    }

    let created = storage_configuration::ActiveModel {
        name: Set(name),
        user_id: Set(identity.user_id().to_string()),
        configuration: Set(configuration),
        created_at: Set(now_millis()),
        deleted_at: Set(None),
        ..Default::default()
    }
    .insert(&state.db)
    .await?;

    tracing::info!(storage_id = created.id, user_id = identity.user_id(), "storage configuration created");
    Ok(Json(StorageResponse::from(created)))
}

#[utoipa::path(
    post,
    path = "/rpc/storages.listStorages",
    responses(
        (status = 200, description = "The caller's storage configurations, secrets omitted", body = [StorageResponse]),
        (status = 403, description = "No signed-in session")
    ),
    security(("session" = [])),
    tag = "Storages"
)]
pub async fn list_storages(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<Vec<StorageResponse>>, AppError> {
    let storages = storage_configuration::Entity::find()
        .filter(storage_configuration::Column::UserId.eq(identity.user_id()))
        .filter(storage_configuration::Column::DeletedAt.is_null())
        .order_by_desc(storage_configuration::Column::CreatedAt)
        .all(&state.db)
        .await?;

    Ok(Json(storages.into_iter().map(StorageResponse::from).collect()))
}

#[utoipa::path(
    post,
    path = "/rpc/storages.deleteStorage",
    request_body = DeleteStorageRequest,
    responses(
        (status = 200, description = "Storage configuration soft-deleted", body = Ack),
        (status = 403, description = "Storage belongs to another user"),
        (status = 404, description = "Storage not found")
    ),
    security(("session" = [])),
    tag = "Storages"
)]
pub async fn delete_storage(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    RpcJson(payload): RpcJson<DeleteStorageRequest>,
) -> Result<Json<Ack>, AppError> {
    let storage = storage_configuration::Entity::find_by_id(payload.storage_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("storage {} not found", payload.storage_id)))?;

    if storage.user_id != identity.user_id() {
        return Err(AppError::Forbidden(
            "storage configuration belongs to another user".into(),
        ));
    }
    if storage.deleted_at.is_some() {
        return Ok(Json(Ack::ok()));
    }

    let credentials = storage.configuration.clone();
    let mut active = storage.into_active_model();
    active.deleted_at = Set(Some(now_millis()));
    active.update(&state.db).await?;
    state.store.evict(&credentials);

    tracing::info!(storage_id = payload.storage_id, "storage configuration deleted");
    Ok(Json(Ack::ok()))
}
