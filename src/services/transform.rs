use sea_orm::{DatabaseConnection, EntityTrait};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::entities::{app, file, storage_configuration};
use crate::error::{AppError, AppResult};
use crate::services::object_store::ObjectStore;
use crate::utils::image_processor;

pub const CACHE_CONTROL: &str = "public, max-age=31536000, immutable";
pub const DEFAULT_WIDTH: u32 = 250;
pub const MIN_WIDTH: u32 = 100;
pub const MAX_WIDTH: u32 = 2000;
pub const MAX_ROTATION: i32 = 180;

/// Raw query string values; parsed by [`TransformParams::from_query`].
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TransformQuery {
    /// Target width in pixels, 100 to 2000. Defaults to 250.
    pub width: Option<String>,
    /// Clockwise rotation in whole degrees, -180 to 180. Only the leading
    /// integer counts; non-numeric values mean 0.
    pub rotate: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformParams {
    pub width: u32,
    pub rotate: i32,
}

impl Default for TransformParams {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            rotate: 0,
        }
    }
}

fn present(raw: &Option<String>) -> Option<&str> {
    raw.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// An optional sign followed by digits; whatever trails the digits is
/// ignored, so `"45.5"` is 45 and `"90deg"` is 90. `None` without digits.
fn leading_integer(raw: &str) -> Option<i64> {
    let (negative, rest) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, raw.strip_prefix('+').unwrap_or(raw)),
    };
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    let digits = &rest[..end];
    if digits.is_empty() {
        return None;
    }
    // Too many digits for i64 is still a number, just out of range.
    let magnitude = digits.parse::<i64>().unwrap_or(i64::MAX);
    Some(if negative { -magnitude } else { magnitude })
}

impl TransformParams {
    pub fn from_query(query: &TransformQuery) -> AppResult<Self> {
        let width = match present(&query.width) {
            None => DEFAULT_WIDTH,
            Some(raw) => raw
                .parse::<u32>()
                .ok()
                .filter(|w| (MIN_WIDTH..=MAX_WIDTH).contains(w))
                .ok_or_else(|| {
                    AppError::BadRequest(format!(
                        "width must be an integer between {MIN_WIDTH} and {MAX_WIDTH}"
                    ))
                })?,
        };

        let rotate = match present(&query.rotate).and_then(leading_integer) {
            None => 0,
            Some(degrees) => i32::try_from(degrees)
                .ok()
                .filter(|d| (-MAX_ROTATION..=MAX_ROTATION).contains(d))
                .ok_or_else(|| {
                    AppError::BadRequest(format!(
                        "rotate must be between -{MAX_ROTATION} and {MAX_ROTATION}"
                    ))
                })?,
        };

        Ok(Self { width, rotate })
    }
}

fn unavailable(file_id: Uuid, reason: &str) -> AppError {
    tracing::debug!(file_id = %file_id, reason, "image not transformable");
    AppError::BadRequest(format!("image {file_id} is not available"))
}

/// Fetches the file's bytes from its app's storage and renders webp.
pub async fn transform(
    db: &DatabaseConnection,
    store: &dyn ObjectStore,
    file_id: Uuid,
    params: TransformParams,
) -> AppResult<Vec<u8>> {
    let (record, owner_app) = file::Entity::find_by_id(file_id)
        .find_also_related(app::Entity)
        .one(db)
        .await?
        .ok_or_else(|| unavailable(file_id, "missing"))?;

    if record.deleted_at.is_some() {
        return Err(unavailable(file_id, "deleted"));
    }
    let owner_app = owner_app
        .filter(|a| a.deleted_at.is_none())
        .ok_or_else(|| unavailable(file_id, "app missing"))?;
    if !record.content_type.starts_with("image/") {
        return Err(unavailable(file_id, "not an image"));
    }

    let storage_id = owner_app
        .storage_id
        .ok_or_else(|| unavailable(file_id, "no storage bound"))?;
    let storage = storage_configuration::Entity::find_by_id(storage_id)
        .one(db)
        .await?
        .filter(|s| s.deleted_at.is_none() && s.user_id == owner_app.user_id)
        .ok_or_else(|| unavailable(file_id, "storage unavailable"))?;

    let bytes = store.get_object(&storage.configuration, &record.path).await?;

    let rendered = tokio::task::spawn_blocking(move || {
        image_processor::render_webp(&bytes, params.width, params.rotate as f32)
    })
    .await
    .map_err(|e| AppError::InternalServerError(format!("image task failed: {e}")))??;

    tracing::debug!(file_id = %file_id, width = params.width, rotate = params.rotate, bytes = rendered.len(), "image rendered");
    Ok(rendered)
}
