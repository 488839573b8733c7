//! Upload orchestration.
//!
//! Bytes never pass through this service. Clients ask for a presigned URL
//! (or a multipart upload plus per-part URLs), send the data straight to the
//! app's bucket, and confirm through the ledger afterwards. Every call takes
//! an [`AppGuard`], so ownership and storage binding are settled before the
//! object store is contacted.

use std::collections::HashSet;
use std::time::Duration;

use chrono::NaiveDate;
use serde::Serialize;
use utoipa::ToSchema;

use crate::access::AppGuard;
use crate::error::{AppError, AppResult};
use crate::routes::validate_length;
use crate::services::ledger::MAX_NAME_LEN;
use crate::services::object_store::{
    normalize_etag, CompletedUpload, ObjectStore, PartReceipt, UploadedPart,
};

pub const PRESIGN_EXPIRY: Duration = Duration::from_secs(60);
pub const MAX_PART_NUMBER: i32 = 10_000;
/// Filenames are later saved as file names, so they share that limit.
pub const MAX_FILENAME_LEN: usize = MAX_NAME_LEN;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum UploadStrategy {
    Single,
    Multipart,
}

impl UploadStrategy {
    pub fn for_size(size: u64, threshold: u64) -> Self {
        if size > threshold {
            UploadStrategy::Multipart
        } else {
            UploadStrategy::Single
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PresignedUpload {
    pub url: String,
    pub method: String,
    pub key: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MultipartUpload {
    pub upload_id: String,
    pub key: String,
}

/// `{YYYY-MM-DD}/{filename}` with spaces turned into underscores.
pub fn object_key(date: NaiveDate, filename: &str) -> AppResult<String> {
    let filename = validate_length("filename", filename, 1, MAX_FILENAME_LEN)?;
    if filename.contains(['/', '\\']) {
        return Err(AppError::BadRequest(
            "filename must not contain path separators".into(),
        ));
    }
    Ok(format!("{}/{}", date.format("%Y-%m-%d"), filename.replace(' ', "_")))
}

fn today() -> NaiveDate {
    chrono::Utc::now().date_naive()
}

fn require(value: &str, what: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::BadRequest(format!("{what} must not be empty")));
    }
    Ok(())
}

pub async fn create_presigned_url(
    store: &dyn ObjectStore,
    guard: &AppGuard,
    filename: &str,
    content_type: &str,
    size: i64,
) -> AppResult<PresignedUpload> {
    let storage = guard.storage_settings()?;
    if size < 0 {
        return Err(AppError::BadRequest("size must not be negative".into()));
    }
    require(content_type, "contentType")?;
    let key = object_key(today(), filename)?;

    let url = store
        .presign_put(storage, &key, content_type, Some(size), PRESIGN_EXPIRY)
        .await?;

    tracing::info!(app_id = %guard.app_id(), key = %key, size, "presigned single upload");
    Ok(PresignedUpload {
        url,
        method: "PUT".into(),
        key,
    })
}

pub async fn create_multipart_upload(
    store: &dyn ObjectStore,
    guard: &AppGuard,
    filename: &str,
    content_type: &str,
    size: i64,
) -> AppResult<MultipartUpload> {
    let storage = guard.storage_settings()?;
    if size < 0 {
        return Err(AppError::BadRequest("size must not be negative".into()));
    }
    require(content_type, "contentType")?;
    let key = object_key(today(), filename)?;

    let upload_id = store
        .create_multipart_upload(storage, &key, content_type)
        .await?;

    tracing::info!(app_id = %guard.app_id(), key = %key, upload_id = %upload_id, size, "multipart upload started");
    Ok(MultipartUpload { upload_id, key })
}

pub async fn list_parts(
    store: &dyn ObjectStore,
    guard: &AppGuard,
    upload_id: &str,
    key: &str,
) -> AppResult<Vec<UploadedPart>> {
    let storage = guard.storage_settings()?;
    require(upload_id, "uploadId")?;
    require(key, "key")?;

    Ok(store.list_parts(storage, key, upload_id).await?)
}

pub async fn sign_part_url(
    store: &dyn ObjectStore,
    guard: &AppGuard,
    upload_id: &str,
    key: &str,
    part_number: i32,
) -> AppResult<String> {
    let storage = guard.storage_settings()?;
    require(upload_id, "uploadId")?;
    require(key, "key")?;
    if !(1..=MAX_PART_NUMBER).contains(&part_number) {
        return Err(AppError::BadRequest(format!(
            "partNumber must be between 1 and {MAX_PART_NUMBER}"
        )));
    }

    Ok(store
        .presign_upload_part(storage, key, upload_id, part_number, PRESIGN_EXPIRY)
        .await?)
}

/// Every submitted part must match what the store recorded for it.
fn check_receipts(recorded: &[UploadedPart], parts: &[PartReceipt]) -> AppResult<()> {
    if parts.is_empty() {
        return Err(AppError::BadRequest("parts must not be empty".into()));
    }

    let mut seen = HashSet::new();
    for receipt in parts {
        if !seen.insert(receipt.part_number) {
            return Err(AppError::BadRequest(format!(
                "part {} listed more than once",
                receipt.part_number
            )));
        }

        let stored = recorded
            .iter()
            .find(|part| part.part_number == receipt.part_number)
            .ok_or_else(|| {
                AppError::BadRequest(format!("part {} was never uploaded", receipt.part_number))
            })?;

        if normalize_etag(&stored.e_tag) != normalize_etag(&receipt.e_tag) {
            return Err(AppError::BadRequest(format!(
                "eTag mismatch for part {}",
                receipt.part_number
            )));
        }
        if receipt.size.is_some_and(|size| size != stored.size) {
            return Err(AppError::BadRequest(format!(
                "size mismatch for part {}",
                receipt.part_number
            )));
        }
    }
    Ok(())
}

pub async fn complete_multipart_upload(
    store: &dyn ObjectStore,
    guard: &AppGuard,
    upload_id: &str,
    key: &str,
    parts: &[PartReceipt],
) -> AppResult<CompletedUpload> {
    let storage = guard.storage_settings()?;
    require(upload_id, "uploadId")?;
    require(key, "key")?;

    let recorded = store.list_parts(storage, key, upload_id).await?;
    check_receipts(&recorded, parts)?;

    let mut ordered = parts.to_vec();
    ordered.sort_by_key(|part| part.part_number);

    let completed = store
        .complete_multipart_upload(storage, key, upload_id, &ordered)
        .await?;

    tracing::info!(
        app_id = %guard.app_id(),
        key = %key,
        upload_id = %upload_id,
        parts = ordered.len(),
        "multipart upload completed"
    );
    Ok(completed)
}

/// Best effort: once authorization passes, store failures are only logged.
pub async fn abort_multipart_upload(
    store: &dyn ObjectStore,
    guard: &AppGuard,
    upload_id: &str,
    key: &str,
) -> AppResult<()> {
    let storage = guard.storage_settings()?;

    if let Err(e) = store.abort_multipart_upload(storage, key, upload_id).await {
        tracing::warn!(
            app_id = %guard.app_id(),
            key = %key,
            upload_id = %upload_id,
            error = %e,
            "abort multipart upload failed"
        );
    }
    Ok(())
}
