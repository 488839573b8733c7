//! The object-store boundary.
//!
//! Everything the pipeline needs from S3 goes through [`ObjectStore`]; the
//! server builds one implementation at startup and shares it through
//! `AppState`. Calls are addressed with the tenant's own
//! [`S3StorageConfiguration`], so a single store instance serves every app.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::storage::S3StorageConfiguration;

#[derive(Debug, Error)]
pub enum StorageError {
    /// The object or upload does not exist (or no longer exists).
    #[error("not found in object store: {0}")]
    NotFound(String),
    /// The store refused the request, e.g. an unknown part or bad ETag.
    #[error("rejected by object store: {0}")]
    Rejected(String),
    #[error("object store operation failed: {0}")]
    Operation(String),
}

/// A part the store has durably received for an in-flight multipart upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadedPart {
    pub part_number: i32,
    pub e_tag: String,
    pub size: i64,
}

/// A part the client claims to have uploaded, submitted on completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PartReceipt {
    pub part_number: i32,
    pub e_tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompletedUpload {
    pub location: Option<String>,
    pub key: String,
    pub bucket: String,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Presigned single-shot PUT for `key`.
    async fn presign_put(
        &self,
        storage: &S3StorageConfiguration,
        key: &str,
        content_type: &str,
        content_length: Option<i64>,
        expires_in: Duration,
    ) -> Result<String, StorageError>;

    /// Starts a multipart upload and returns its upload id.
    async fn create_multipart_upload(
        &self,
        storage: &S3StorageConfiguration,
        key: &str,
        content_type: &str,
    ) -> Result<String, StorageError>;

    async fn list_parts(
        &self,
        storage: &S3StorageConfiguration,
        key: &str,
        upload_id: &str,
    ) -> Result<Vec<UploadedPart>, StorageError>;

    async fn presign_upload_part(
        &self,
        storage: &S3StorageConfiguration,
        key: &str,
        upload_id: &str,
        part_number: i32,
        expires_in: Duration,
    ) -> Result<String, StorageError>;

    async fn complete_multipart_upload(
        &self,
        storage: &S3StorageConfiguration,
        key: &str,
        upload_id: &str,
        parts: &[PartReceipt],
    ) -> Result<CompletedUpload, StorageError>;

    async fn abort_multipart_upload(
        &self,
        storage: &S3StorageConfiguration,
        key: &str,
        upload_id: &str,
    ) -> Result<(), StorageError>;

    async fn get_object(
        &self,
        storage: &S3StorageConfiguration,
        key: &str,
    ) -> Result<Vec<u8>, StorageError>;

    /// Drops whatever is cached for these credentials. Called once the
    /// storage configuration holding them is deleted.
    fn evict(&self, _storage: &S3StorageConfiguration) {}
}

/// ETags come back quoted from S3 and unquoted from some clients.
pub fn normalize_etag(etag: &str) -> &str {
    etag.trim().trim_matches('"')
}
