use axum::{
    extract::{Query, State},
    response::Json,
    Extension,
};
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::access::Identity;
use crate::entities::file;
use crate::error::AppError;
use crate::pagination::{Page, PageQuery};
use crate::routes::{Ack, RpcJson};
use crate::services::ledger::{self, NewFile};
use crate::services::object_store::{CompletedUpload, PartReceipt, UploadedPart};
use crate::services::uploads::{
    self, MultipartUpload, PresignedUpload, UploadStrategy, MAX_PART_NUMBER, PRESIGN_EXPIRY,
};
use crate::state::AppState;

#[derive(Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    pub app_id: Uuid,
    pub filename: String,
    pub content_type: String,
    pub size: i64,
}

#[derive(Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MultipartTarget {
    pub app_id: Uuid,
    pub upload_id: String,
    pub key: String,
}

#[derive(Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SignPartRequest {
    pub app_id: Uuid,
    pub upload_id: String,
    pub key: String,
    pub part_number: i32,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct SignedPartUrl {
    pub url: String,
}

#[derive(Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompleteRequest {
    pub app_id: Uuid,
    pub upload_id: String,
    pub key: String,
    pub parts: Vec<PartReceipt>,
}

#[derive(Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SaveFileRequest {
    pub app_id: Uuid,
    pub name: String,
    /// The URL the file was uploaded to.
    pub path: String,
    #[serde(rename = "type")]
    pub file_type: String,
}

#[derive(Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AppScoped {
    pub app_id: Uuid,
}

#[derive(Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaginateRequest {
    pub app_id: Uuid,
    #[serde(flatten)]
    pub page: PageQuery,
}

#[derive(Deserialize, utoipa::ToSchema)]
pub struct DeleteFileRequest {
    pub id: Uuid,
}

#[derive(Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UploadPolicyQuery {
    /// Size of a file about to be uploaded, in bytes.
    pub size: Option<u64>,
}

#[derive(Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadPolicy {
    pub multipart_threshold: u64,
    pub presign_expiry_seconds: u64,
    pub max_part_number: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<UploadStrategy>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FileResponse {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub file_type: String,
    pub content_type: String,
    pub path: String,
    pub url: String,
    pub user_id: String,
    pub app_id: Uuid,
    pub created_at: String,
}

impl From<file::Model> for FileResponse {
    fn from(model: file::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            file_type: model.file_type,
            content_type: model.content_type,
            path: model.path,
            url: model.url,
            user_id: model.user_id,
            app_id: model.app_id,
            created_at: model
                .created_at
                .and_utc()
                .to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

#[utoipa::path(
    post,
    path = "/rpc/file.createPresignedUrl",
    request_body = UploadRequest,
    responses(
        (status = 200, description = "Presigned PUT for a single-shot upload", body = PresignedUpload),
        (status = 400, description = "Invalid filename or no storage configured"),
        (status = 403, description = "Not the app owner")
    ),
    security(("session" = []), ("api_key" = []), ("signed_token" = [])),
    tag = "Files"
)]
pub async fn create_presigned_url(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    RpcJson(payload): RpcJson<UploadRequest>,
) -> Result<Json<PresignedUpload>, AppError> {
    let guard = identity.authorize(&state.db, payload.app_id).await?;
    let upload = uploads::create_presigned_url(
        state.store.as_ref(),
        &guard,
        &payload.filename,
        &payload.content_type,
        payload.size,
    )
    .await?;
    Ok(Json(upload))
}

#[utoipa::path(
    post,
    path = "/rpc/file.createMultipartUpload",
    request_body = UploadRequest,
    responses(
        (status = 200, description = "Multipart upload started", body = MultipartUpload),
        (status = 400, description = "Invalid filename or no storage configured"),
        (status = 403, description = "Not the app owner")
    ),
    security(("session" = []), ("api_key" = []), ("signed_token" = [])),
    tag = "Files"
)]
pub async fn create_multipart_upload(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    RpcJson(payload): RpcJson<UploadRequest>,
) -> Result<Json<MultipartUpload>, AppError> {
    let guard = identity.authorize(&state.db, payload.app_id).await?;
    let upload = uploads::create_multipart_upload(
        state.store.as_ref(),
        &guard,
        &payload.filename,
        &payload.content_type,
        payload.size,
    )
    .await?;
    Ok(Json(upload))
}

#[utoipa::path(
    post,
    path = "/rpc/file.listMultipartParts",
    request_body = MultipartTarget,
    responses(
        (status = 200, description = "Parts received so far", body = [UploadedPart]),
        (status = 403, description = "Not the app owner"),
        (status = 404, description = "Upload not found")
    ),
    security(("session" = []), ("api_key" = []), ("signed_token" = [])),
    tag = "Files"
)]
pub async fn list_multipart_parts(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    RpcJson(payload): RpcJson<MultipartTarget>,
) -> Result<Json<Vec<UploadedPart>>, AppError> {
    let guard = identity.authorize(&state.db, payload.app_id).await?;
    let parts =
        uploads::list_parts(state.store.as_ref(), &guard, &payload.upload_id, &payload.key).await?;
    Ok(Json(parts))
}

#[utoipa::path(
    post,
    path = "/rpc/file.signMultipartPartUrl",
    request_body = SignPartRequest,
    responses(
        (status = 200, description = "Presigned URL for one part", body = SignedPartUrl),
        (status = 400, description = "Part number out of range"),
        (status = 403, description = "Not the app owner")
    ),
    security(("session" = []), ("api_key" = []), ("signed_token" = [])),
    tag = "Files"
)]
pub async fn sign_multipart_part_url(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    RpcJson(payload): RpcJson<SignPartRequest>,
) -> Result<Json<SignedPartUrl>, AppError> {
    let guard = identity.authorize(&state.db, payload.app_id).await?;
    let url = uploads::sign_part_url(
        state.store.as_ref(),
        &guard,
        &payload.upload_id,
        &payload.key,
        payload.part_number,
    )
    .await?;
    Ok(Json(SignedPartUrl { url }))
}

#[utoipa::path(
    post,
    path = "/rpc/file.completeMultipartUpload",
    request_body = CompleteRequest,
    responses(
        (status = 200, description = "Upload assembled", body = CompletedUpload),
        (status = 400, description = "A part does not match what the store recorded"),
        (status = 403, description = "Not the app owner"),
        (status = 404, description = "Upload not found")
    ),
    security(("session" = []), ("api_key" = []), ("signed_token" = [])),
    tag = "Files"
)]
pub async fn complete_multipart_upload(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    RpcJson(payload): RpcJson<CompleteRequest>,
) -> Result<Json<CompletedUpload>, AppError> {
    let guard = identity.authorize(&state.db, payload.app_id).await?;
    let completed = uploads::complete_multipart_upload(
        state.store.as_ref(),
        &guard,
        &payload.upload_id,
        &payload.key,
        &payload.parts,
    )
    .await?;
    Ok(Json(completed))
}

#[utoipa::path(
    post,
    path = "/rpc/file.abortMultipartUpload",
    request_body = MultipartTarget,
    responses(
        (status = 200, description = "Abort requested; store failures are ignored", body = Ack),
        (status = 403, description = "Not the app owner")
    ),
    security(("session" = []), ("api_key" = []), ("signed_token" = [])),
    tag = "Files"
)]
pub async fn abort_multipart_upload(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    RpcJson(payload): RpcJson<MultipartTarget>,
) -> Result<Json<Ack>, AppError> {
    let guard = identity.authorize(&state.db, payload.app_id).await?;
    uploads::abort_multipart_upload(state.store.as_ref(), &guard, &payload.upload_id, &payload.key)
        .await?;
    Ok(Json(Ack::ok()))
}

#[utoipa::path(
    post,
    path = "/rpc/file.saveFile",
    request_body = SaveFileRequest,
    responses(
        (status = 200, description = "File recorded", body = FileResponse),
        (status = 400, description = "Unparseable upload URL or no storage configured"),
        (status = 403, description = "Not the app owner")
    ),
    security(("session" = []), ("api_key" = []), ("signed_token" = [])),
    tag = "Files"
)]
pub async fn save_file(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    RpcJson(payload): RpcJson<SaveFileRequest>,
) -> Result<Json<FileResponse>, AppError> {
    let guard = identity.authorize(&state.db, payload.app_id).await?;
    let record = ledger::save_file(
        &state.db,
        &guard,
        NewFile {
            name: payload.name,
            path: payload.path,
            file_type: payload.file_type,
        },
    )
    .await?;
    Ok(Json(FileResponse::from(record)))
}

#[utoipa::path(
    post,
    path = "/rpc/file.listFiles",
    request_body = AppScoped,
    responses(
        (status = 200, description = "Live files, newest first", body = [FileResponse]),
        (status = 403, description = "Not the app owner")
    ),
    security(("session" = []), ("api_key" = []), ("signed_token" = [])),
    tag = "Files"
)]
pub async fn list_files(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    RpcJson(payload): RpcJson<AppScoped>,
) -> Result<Json<Vec<FileResponse>>, AppError> {
    let guard = identity.authorize(&state.db, payload.app_id).await?;
    let files = ledger::list_files(&state.db, &guard).await?;
    Ok(Json(files.into_iter().map(FileResponse::from).collect()))
}

#[utoipa::path(
    post,
    path = "/rpc/file.infinityQueryFiles",
    request_body = PaginateRequest,
    responses(
        (status = 200, description = "One page of live files", body = Page<FileResponse>),
        (status = 400, description = "Invalid limit or cursor"),
        (status = 403, description = "Not the app owner")
    ),
    security(("session" = []), ("api_key" = []), ("signed_token" = [])),
    tag = "Files"
)]
pub async fn infinity_query_files(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    RpcJson(payload): RpcJson<PaginateRequest>,
) -> Result<Json<Page<FileResponse>>, AppError> {
    let guard = identity.authorize(&state.db, payload.app_id).await?;
    let page = ledger::paginate(&state.db, &guard, &payload.page).await?;
    Ok(Json(Page {
        items: page.items.into_iter().map(FileResponse::from).collect(),
        next_cursor: page.next_cursor,
    }))
}

#[utoipa::path(
    post,
    path = "/rpc/file.deleteFile",
    request_body = DeleteFileRequest,
    responses(
        (status = 200, description = "File soft-deleted", body = Ack),
        (status = 403, description = "Not the owner of the file's app"),
        (status = 404, description = "File not found")
    ),
    security(("session" = []), ("api_key" = []), ("signed_token" = [])),
    tag = "Files"
)]
pub async fn delete_file(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    RpcJson(payload): RpcJson<DeleteFileRequest>,
) -> Result<Json<Ack>, AppError> {
    ledger::delete_file(&state.db, &identity, payload.id).await?;
    Ok(Json(Ack::ok()))
}

#[utoipa::path(
    get,
    path = "/rpc/file.uploadPolicy",
    params(UploadPolicyQuery),
    responses(
        (status = 200, description = "Thresholds for choosing an upload strategy", body = UploadPolicy)
    ),
    security(("session" = []), ("api_key" = []), ("signed_token" = [])),
    tag = "Files"
)]
pub async fn upload_policy(
    State(state): State<AppState>,
    Query(query): Query<UploadPolicyQuery>,
) -> Json<UploadPolicy> {
    let threshold = state.config.multipart_threshold;
    Json(UploadPolicy {
        multipart_threshold: threshold,
        presign_expiry_seconds: PRESIGN_EXPIRY.as_secs(),
        max_part_number: MAX_PART_NUMBER,
        strategy: query
            .size
            .map(|size| UploadStrategy::for_size(size, threshold)),
    })
}
