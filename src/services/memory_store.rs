//! Process-local [`ObjectStore`] used for development (`OBJECT_STORE=memory`)
//! and by the test-suite.
//!
//! Presigned URLs are path-style URLs under [`MEMORY_ENDPOINT`]; nothing
//! listens there, so callers that want to play the client's side of an
//! upload use [`MemoryObjectStore::put_object`] and
//! [`MemoryObjectStore::upload_part`] directly.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use sha2::{Digest, Sha256};

use crate::models::storage::S3StorageConfiguration;
use crate::services::object_store::{
    normalize_etag, CompletedUpload, ObjectStore, PartReceipt, StorageError, UploadedPart,
};

pub const MEMORY_ENDPOINT: &str = "http://memory.local";

const KEY_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

#[derive(Default)]
pub struct MemoryObjectStore {
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    objects: HashMap<(String, String), Vec<u8>>,
    uploads: HashMap<String, PendingUpload>,
    next_upload: u64,
}

struct PendingUpload {
    bucket: String,
    key: String,
    parts: BTreeMap<i32, StoredPart>,
}

struct StoredPart {
    e_tag: String,
    data: Vec<u8>,
}

fn e_tag_for(data: &[u8]) -> String {
    format!("\"{:x}\"", Sha256::digest(data))
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn object_url(bucket: &str, key: &str) -> String {
        format!(
            "{}/{}/{}",
            MEMORY_ENDPOINT,
            bucket,
            utf8_percent_encode(key, KEY_SEGMENT)
        )
    }

    /// Writes an object the way a client holding a presigned PUT would.
    pub fn put_object(&self, bucket: &str, key: &str, data: Vec<u8>) {
        self.state()
            .objects
            .insert((bucket.to_string(), key.to_string()), data);
    }

    /// Uploads one part the way a client holding a presigned part URL would.
    /// Re-uploading a part number replaces it. Returns the part's ETag.
    pub fn upload_part(
        &self,
        upload_id: &str,
        part_number: i32,
        data: Vec<u8>,
    ) -> Result<String, StorageError> {
        let mut state = self.state();
        let upload = state
            .uploads
            .get_mut(upload_id)
            .ok_or_else(|| StorageError::NotFound(format!("upload {upload_id}")))?;
        let e_tag = e_tag_for(&data);
        upload.parts.insert(
            part_number,
            StoredPart {
                e_tag: e_tag.clone(),
                data,
            },
        );
        Ok(e_tag)
    }

    pub fn contains(&self, bucket: &str, key: &str) -> bool {
        self.state()
            .objects
            .contains_key(&(bucket.to_string(), key.to_string()))
    }

    fn pending<'a>(
        state: &'a mut MemoryState,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<&'a mut PendingUpload, StorageError> {
        match state.uploads.get_mut(upload_id) {
            Some(upload) if upload.bucket == bucket && upload.key == key => Ok(upload),
            _ => Err(StorageError::NotFound(format!("upload {upload_id}"))),
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn presign_put(
        &self,
        storage: &S3StorageConfiguration,
        key: &str,
        _content_type: &str,
        _content_length: Option<i64>,
        expires_in: Duration,
    ) -> Result<String, StorageError> {
        Ok(format!(
            "{}?X-Amz-Expires={}",
            Self::object_url(&storage.bucket, key),
            expires_in.as_secs()
        ))
    }

    async fn create_multipart_upload(
        &self,
        storage: &S3StorageConfiguration,
        key: &str,
        _content_type: &str,
    ) -> Result<String, StorageError> {
        let mut state = self.state();
        state.next_upload += 1;
        let upload_id = format!("mem-upload-{}", state.next_upload);
        state.uploads.insert(
            upload_id.clone(),
            PendingUpload {
                bucket: storage.bucket.clone(),
                key: key.to_string(),
                parts: BTreeMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn list_parts(
        &self,
        storage: &S3StorageConfiguration,
        key: &str,
        upload_id: &str,
    ) -> Result<Vec<UploadedPart>, StorageError> {
        let mut state = self.state();
        let upload = Self::pending(&mut state, &storage.bucket, key, upload_id)?;
        Ok(upload
            .parts
            .iter()
            .map(|(number, part)| UploadedPart {
                part_number: *number,
                e_tag: part.e_tag.clone(),
                size: part.data.len() as i64,
            })
            .collect())
    }

    async fn presign_upload_part(
        &self,
        storage: &S3StorageConfiguration,
        key: &str,
        upload_id: &str,
        part_number: i32,
        expires_in: Duration,
    ) -> Result<String, StorageError> {
        Ok(format!(
            "{}?partNumber={}&uploadId={}&X-Amz-Expires={}",
            Self::object_url(&storage.bucket, key),
            part_number,
            upload_id,
            expires_in.as_secs()
        ))
    }

    async fn complete_multipart_upload(
        &self,
        storage: &S3StorageConfiguration,
        key: &str,
        upload_id: &str,
        parts: &[PartReceipt],
    ) -> Result<CompletedUpload, StorageError> {
        let mut state = self.state();
        let upload = Self::pending(&mut state, &storage.bucket, key, upload_id)?;

        if parts.is_empty() {
            return Err(StorageError::Rejected("no parts to complete".into()));
        }
        if parts.windows(2).any(|w| w[0].part_number >= w[1].part_number) {
            return Err(StorageError::Rejected("parts must be in ascending order".into()));
        }

        let mut body = Vec::new();
        for receipt in parts {
            let stored = upload.parts.get(&receipt.part_number).ok_or_else(|| {
                StorageError::Rejected(format!("part {} was never uploaded", receipt.part_number))
            })?;
            if normalize_etag(&stored.e_tag) != normalize_etag(&receipt.e_tag) {
                return Err(StorageError::Rejected(format!(
                    "part {} etag mismatch",
                    receipt.part_number
                )));
            }
            body.extend_from_slice(&stored.data);
        }

        state.uploads.remove(upload_id);
        state
            .objects
            .insert((storage.bucket.clone(), key.to_string()), body);

        Ok(CompletedUpload {
            location: Some(Self::object_url(&storage.bucket, key)),
            key: key.to_string(),
            bucket: storage.bucket.clone(),
        })
    }

    async fn abort_multipart_upload(
        &self,
        storage: &S3StorageConfiguration,
        key: &str,
        upload_id: &str,
    ) -> Result<(), StorageError> {
        let mut state = self.state();
        Self::pending(&mut state, &storage.bucket, key, upload_id)?;
        state.uploads.remove(upload_id);
        Ok(())
    }

    async fn get_object(
        &self,
        storage: &S3StorageConfiguration,
        key: &str,
    ) -> Result<Vec<u8>, StorageError> {
        self.state()
            .objects
            .get(&(storage.bucket.clone(), key.to_string()))
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }
}
