use axum::{extract::State, response::Json, Extension};
use base64::{engine::general_purpose, Engine as _};
use chrono::NaiveDateTime;
use rand::{thread_rng, RngCore};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::access::{AppGuard, Identity};
use crate::entities::api_key;
use crate::error::AppError;
use crate::pagination::now_millis;
use crate::routes::{validate_length, RpcJson};
use crate::state::AppState;

#[derive(Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateApiKeyRequest {
    app_id: Uuid,
    name: String,
}

#[derive(Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListApiKeysRequest {
    app_id: Uuid,
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct RequestKeyRequest {
    id: i32,
}

#[derive(Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyResponse {
    id: i32,
    name: String,
    client_id: String,
    app_id: Uuid,
    created_at: NaiveDateTime,
    // Only returned on creation
    #[serde(skip_serializing_if = "Option::is_none")]
    key: Option<String>,
}

impl From<api_key::Model> for ApiKeyResponse {
    fn from(model: api_key::Model) -> Self {
        ApiKeyResponse {
            id: model.id,
            name: model.name,
            client_id: model.client_id,
            app_id: model.app_id,
            created_at: model.created_at,
            key: None,
        }
    }
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct RevealedKey {
    key: String,
}

fn generate_secret() -> String {
    let mut key_bytes = [0u8; 32];
    thread_rng().fill_bytes(&mut key_bytes);
    format!("mrk_{}", general_purpose::URL_SAFE_NO_PAD.encode(key_bytes))
}

#[utoipa::path(
    post,
    path = "/rpc/apiKeys.createApiKey",
    request_body = CreateApiKeyRequest,
    responses(
        (status = 200, description = "API key created; the secret is included once", body = ApiKeyResponse),
        (status = 400, description = "Name must be 3 to 50 characters"),
        (status = 403, description = "Not the app owner")
    ),
    security(("session" = [])),
    tag = "API Keys"
)]
pub async fn create_api_key(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    RpcJson(payload): RpcJson<CreateApiKeyRequest>,
) -> Result<Json<ApiKeyResponse>, AppError> {
    let name = validate_length("name", &payload.name, 3, 50)?;
    let guard = AppGuard::load(&state.db, payload.app_id, identity.user_id()).await?;

    let secret = generate_secret();
    let created = api_key::ActiveModel {
        name: Set(name),
        client_id: Set(Uuid::new_v4().to_string()),
        key: Set(secret.clone()),
        app_id: Set(guard.app_id()),
        created_at: Set(now_millis()),
        deleted_at: Set(None),
        ..Default::default()
    }
    .insert(&state.db)
    .await?;

    tracing::info!(app_id = %created.app_id, client_id = %created.client_id, "api key created");
    let mut response = ApiKeyResponse::from(created);
    response.key = Some(secret);
    Ok(Json(response))
}

#[utoipa::path(
    post,
    path = "/rpc/apiKeys.listApiKeys",
    request_body = ListApiKeysRequest,
    responses(
        (status = 200, description = "Live keys of the app, secrets omitted", body = [ApiKeyResponse]),
        (status = 403, description = "Not the app owner")
    ),
    security(("session" = [])),
    tag = "API Keys"
)]
pub async fn list_api_keys(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    RpcJson(payload): RpcJson<ListApiKeysRequest>,
) -> Result<Json<Vec<ApiKeyResponse>>, AppError> {
    let guard = AppGuard::load(&state.db, payload.app_id, identity.user_id()).await?;

    let keys = api_key::Entity::find()
        .filter(api_key::Column::AppId.eq(guard.app_id()))
        .filter(api_key::Column::DeletedAt.is_null())
        .order_by_desc(api_key::Column::CreatedAt)
        .all(&state.db)
        .await?;

    Ok(Json(keys.into_iter().map(ApiKeyResponse::from).collect()))
}

#[utoipa::path(
    post,
    path = "/rpc/apiKeys.requestKey",
    request_body = RequestKeyRequest,
    responses(
        (status = 200, description = "The key's secret", body = RevealedKey),
        (status = 403, description = "Not the owner of the key's app"),
        (status = 404, description = "Key not found")
    ),
    security(("session" = [])),
    tag = "API Keys"
)]
pub async fn request_key(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    RpcJson(payload): RpcJson<RequestKeyRequest>,
) -> Result<Json<RevealedKey>, AppError> {
    let key = api_key::Entity::find_by_id(payload.id)
        .filter(api_key::Column::DeletedAt.is_null())
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("api key {} not found", payload.id)))?;

    AppGuard::load(&state.db, key.app_id, identity.user_id()).await?;

    Ok(Json(RevealedKey { key: key.key }))
}
