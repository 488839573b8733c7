use axum::{extract::State, response::Json, Extension};
use chrono::NaiveDateTime;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, IntoActiveModel, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::access::{AppGuard, Identity};
use crate::entities::{app, storage_configuration};
use crate::error::AppError;
use crate::pagination::now_millis;
use crate::routes::{validate_length, RpcJson};
use crate::state::AppState;

#[derive(Deserialize, utoipa::ToSchema)]
pub struct CreateAppRequest {
    name: String,
    description: Option<String>,
}

#[derive(Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChangeStorageRequest {
    app_id: Uuid,
    storage_id: i32,
}

#[derive(Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AppResponse {
    id: Uuid,
    name: String,
    description: Option<String>,
    storage_id: Option<i32>,
    created_at: NaiveDateTime,
}

impl From<app::Model> for AppResponse {
    fn from(app: app::Model) -> Self {
        AppResponse {
            id: app.id,
            name: app.name,
            description: app.description,
            storage_id: app.storage_id,
            created_at: app.created_at,
        }
    }
}

#[utoipa::path(
    post,
    path = "/rpc/apps.createApp",
    request_body = CreateAppRequest,
    responses(
        (status = 200, description = "App created", body = AppResponse),
        (status = 400, description = "Invalid name or description"),
        (status = 403, description = "No signed-in session")
    ),
    security(("session" = [])),
    tag = "Apps"
)]
pub async fn create_app(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    RpcJson(payload): RpcJson<CreateAppRequest>,
) -> Result<Json<AppResponse>, AppError> {
    let name = validate_length("name", &payload.name, 1, 100)?;
    let description = payload
        .description
        .map(|d| validate_length("description", &d, 0, 500))
        .transpose()?;

    let created = app::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name),
        description: Set(description),
        user_id: Set(identity.user_id().to_string()),
        storage_id: Set(None),
        created_at: Set(now_millis()),
        deleted_at: Set(None),
    }
    .insert(&state.db)
    .await?;

    tracing::info!(app_id = %created.id, user_id = identity.user_id(), "app created");
    Ok(Json(AppResponse::from(created)))
}

#[utoipa::path(
    post,
    path = "/rpc/apps.listApps",
    responses(
        (status = 200, description = "The caller's apps, newest first", body = [AppResponse]),
        (status = 403, description = "No signed-in session")
    ),
    security(("session" = [])),
    tag = "Apps"
)]
pub async fn list_apps(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<Vec<AppResponse>>, AppError> {
    let apps = app::Entity::find()
        .filter(app::Column::UserId.eq(identity.user_id()))
        .filter(app::Column::DeletedAt.is_null())
        .order_by_desc(app::Column::CreatedAt)
        .all(&state.db)
        .await?;

    Ok(Json(apps.into_iter().map(AppResponse::from).collect()))
}

#[utoipa::path(
    post,
    path = "/rpc/apps.changeStorage",
    request_body = ChangeStorageRequest,
    responses(
        (status = 200, description = "Storage bound to the app", body = AppResponse),
        (status = 403, description = "App or storage belongs to another user"),
        (status = 404, description = "App or storage not found")
    ),
    security(("session" = [])),
    tag = "Apps"
)]
pub async fn change_storage(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    RpcJson(payload): RpcJson<ChangeStorageRequest>,
) -> Result<Json<AppResponse>, AppError> {
    let guard = AppGuard::load(&state.db, payload.app_id, identity.user_id()).await?;

    let storage = storage_configuration::Entity::find_by_id(payload.storage_id)
        .filter(storage_configuration::Column::DeletedAt.is_null())
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("storage {} not found", payload.storage_id)))?;
    if storage.user_id != identity.user_id() {
        return Err(AppError::Forbidden(
            "storage configuration belongs to another user".into(),
        ));
    }

    let mut active = guard.app().clone().into_active_model();
    active.storage_id = Set(Some(storage.id));
    let updated = active.update(&state.db).await?;

    tracing::info!(app_id = %updated.id, storage_id = storage.id, "app storage changed");
    Ok(Json(AppResponse::from(updated)))
}
