use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::services::transform::{self, TransformParams, TransformQuery};
use crate::state::AppState;

async fn render(state: &AppState, id: &str, query: Result<Query<TransformQuery>, QueryRejection>) -> AppResult<Vec<u8>> {
    let file_id = Uuid::parse_str(id).map_err(|_| AppError::BadRequest(format!("invalid file id: {id}")))?;
    let Query(query) = query.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let params = TransformParams::from_query(&query)?;
    transform::transform(&state.db, state.store.as_ref(), file_id, params).await
}

#[utoipa::path(
    get,
    path = "/image/{id}",
    params(
        ("id" = Uuid, Path, description = "File ID"),
        TransformQuery
    ),
    responses(
        (status = 200, description = "Resized, rotated webp rendition", content_type = "image/webp", body = Vec<u8>),
        (status = 400, description = "File missing, not an image, or invalid parameters; empty body")
    ),
    tag = "Images"
)]
pub async fn get_image(
    State(state): State<AppState>,
    Path(id): Path<String>,
    query: Result<Query<TransformQuery>, QueryRejection>,
) -> Response {
    match render(&state, &id, query).await {
        Ok(bytes) => (
            [
                (header::CONTENT_TYPE, "image/webp"),
                (header::CACHE_CONTROL, transform::CACHE_CONTROL),
            ],
            bytes,
        )
            .into_response(),
        Err(e) => {
            tracing::info!(file_id = %id, error = %e, "image request rejected");
            StatusCode::BAD_REQUEST.into_response()
        }
    }
}
