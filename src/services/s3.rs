use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use sha2::{Digest, Sha256};

use crate::models::storage::S3StorageConfiguration;
use crate::services::object_store::{
    CompletedUpload, ObjectStore, PartReceipt, StorageError, UploadedPart,
};

/// Identifies one credential set. The secret is hashed so the cache key can
/// be logged or compared without holding the plaintext twice.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct ClientKey {
    endpoint: Option<String>,
    region: String,
    access_key_id: String,
    secret_digest: String,
}

impl From<&S3StorageConfiguration> for ClientKey {
    fn from(config: &S3StorageConfiguration) -> Self {
        Self {
            endpoint: config.api_endpoint.clone(),
            region: config.region.clone(),
            access_key_id: config.access_key_id.clone(),
            secret_digest: format!("{:x}", Sha256::digest(config.secret_access_key.as_bytes())),
        }
    }
}

/// S3-backed [`ObjectStore`]. One instance lives for the whole process and
/// keeps an SDK client per tenant credential set, so connections are reused
/// across requests. Entries leave the cache through [`ObjectStore::evict`].
#[derive(Default)]
pub struct S3ObjectStore {
    clients: RwLock<HashMap<ClientKey, Client>>,
}

impl S3ObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn client(&self, config: &S3StorageConfiguration) -> Client {
        let key = ClientKey::from(config);
        let cached = self
            .clients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned();
        if let Some(client) = cached {
            return client;
        }

        let client = Self::build_client(config).await;
        tracing::debug!(
            region = %config.region,
            endpoint = ?config.api_endpoint,
            "created object store client"
        );
        self.clients
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_insert(client)
            .clone()
    }

    async fn build_client(config: &S3StorageConfiguration) -> Client {
        let credentials = Credentials::new(
            config.access_key_id.clone(),
            config.secret_access_key.clone(),
            None,
            None,
            "storage_configuration",
        );

        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .load()
            .await;

        let mut s3_config_builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = &config.api_endpoint {
            s3_config_builder = s3_config_builder
                .endpoint_url(endpoint)
                .force_path_style(true);
        }

        Client::from_conf(s3_config_builder.build())
    }

    fn presigning(expires_in: Duration) -> Result<PresigningConfig, StorageError> {
        PresigningConfig::expires_in(expires_in)
            .map_err(|e| StorageError::Operation(format!("invalid presign expiry: {e}")))
    }
}

fn map_sdk_error<E, R>(operation: &str, err: SdkError<E, R>) -> StorageError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let code = err
        .as_service_error()
        .and_then(|e| e.code())
        .map(str::to_owned);
    let detail = format!("{operation}: {}", DisplayErrorContext(&err));
    match code.as_deref() {
        Some("NoSuchUpload") | Some("NoSuchKey") | Some("NotFound") | Some("NoSuchBucket") => {
            StorageError::NotFound(detail)
        }
        Some("InvalidPart") | Some("InvalidPartOrder") | Some("EntityTooSmall") => {
            StorageError::Rejected(detail)
        }
        _ => StorageError::Operation(detail),
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn presign_put(
        &self,
        storage: &S3StorageConfiguration,
        key: &str,
        content_type: &str,
        content_length: Option<i64>,
        expires_in: Duration,
    ) -> Result<String, StorageError> {
        let presigned_req = self
            .client(storage)
            .await
            .put_object()
            .bucket(&storage.bucket)
            .key(key)
            .content_type(content_type)
            .set_content_length(content_length)
            .presigned(Self::presigning(expires_in)?)
            .await
            .map_err(|e| map_sdk_error("presign put_object", e))?;

        Ok(presigned_req.uri().to_string())
    }

    async fn create_multipart_upload(
        &self,
        storage: &S3StorageConfiguration,
        key: &str,
        content_type: &str,
    ) -> Result<String, StorageError> {
        let resp = self
            .client(storage)
            .await
            .create_multipart_upload()
            .bucket(&storage.bucket)
            .key(key)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| map_sdk_error("create_multipart_upload", e))?;

        resp.upload_id()
            .map(str::to_owned)
            .ok_or_else(|| StorageError::Operation("create_multipart_upload returned no upload id".into()))
    }

    async fn list_parts(
        &self,
        storage: &S3StorageConfiguration,
        key: &str,
        upload_id: &str,
    ) -> Result<Vec<UploadedPart>, StorageError> {
        let client = self.client(storage).await;
        let mut parts = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let resp = client
                .list_parts()
                .bucket(&storage.bucket)
                .key(key)
                .upload_id(upload_id)
                .set_part_number_marker(marker.take())
                .send()
                .await
                .map_err(|e| map_sdk_error("list_parts", e))?;

            parts.extend(resp.parts().iter().filter_map(|part| {
                Some(UploadedPart {
                    part_number: part.part_number()?,
                    e_tag: part.e_tag()?.to_string(),
                    size: part.size().unwrap_or_default(),
                })
            }));

            match (resp.is_truncated(), resp.next_part_number_marker()) {
                (Some(true), Some(next)) => marker = Some(next.to_string()),
                _ => break,
            }
        }

        Ok(parts)
    }

    async fn presign_upload_part(
        &self,
        storage: &S3StorageConfiguration,
        key: &str,
        upload_id: &str,
        part_number: i32,
        expires_in: Duration,
    ) -> Result<String, StorageError> {
        let presigned_req = self
            .client(storage)
            .await
            .upload_part()
            .bucket(&storage.bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .presigned(Self::presigning(expires_in)?)
            .await
            .map_err(|e| map_sdk_error("presign upload_part", e))?;

        Ok(presigned_req.uri().to_string())
    }

    async fn complete_multipart_upload(
        &self,
        storage: &S3StorageConfiguration,
        key: &str,
        upload_id: &str,
        parts: &[PartReceipt],
    ) -> Result<CompletedUpload, StorageError> {
        let completed_parts = parts
            .iter()
            .map(|part| {
                CompletedPart::builder()
                    .part_number(part.part_number)
                    .e_tag(&part.e_tag)
                    .build()
            })
            .collect::<Vec<_>>();

        let resp = self
            .client(storage)
            .await
            .complete_multipart_upload()
            .bucket(&storage.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(completed_parts))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| map_sdk_error("complete_multipart_upload", e))?;

        Ok(CompletedUpload {
            location: resp.location().map(str::to_owned),
            key: resp.key().unwrap_or(key).to_string(),
            bucket: resp.bucket().unwrap_or(&storage.bucket).to_string(),
        })
    }

    async fn abort_multipart_upload(
        &self,
        storage: &S3StorageConfiguration,
        key: &str,
        upload_id: &str,
    ) -> Result<(), StorageError> {
        self.client(storage)
            .await
            .abort_multipart_upload()
            .bucket(&storage.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|e| map_sdk_error("abort_multipart_upload", e))?;

        Ok(())
    }

    async fn get_object(
        &self,
        storage: &S3StorageConfiguration,
        key: &str,
    ) -> Result<Vec<u8>, StorageError> {
        let resp = self
            .client(storage)
            .await
            .get_object()
            .bucket(&storage.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| map_sdk_error("get_object", e))?;

        let data = resp
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Operation(format!("failed to read object body: {e}")))?;

        Ok(data.into_bytes().to_vec())
    }

    fn evict(&self, storage: &S3StorageConfiguration) {
        let removed = self
            .clients
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&ClientKey::from(storage))
            .is_some();
        if removed {
            tracing::debug!(region = %storage.region, endpoint = ?storage.api_endpoint, "evicted object store client");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(secret: &str) -> S3StorageConfiguration {
        S3StorageConfiguration {
            bucket: "bucket".into(),
            region: "us-east-1".into(),
            access_key_id: "AKIA".into(),
            secret_access_key: secret.into(),
            api_endpoint: Some("http://localhost:9000".into()),
        }
    }

    #[test]
    fn client_key_distinguishes_secrets_without_storing_them() {
        let a = ClientKey::from(&config("one"));
        let b = ClientKey::from(&config("two"));
        assert_ne!(a, b);
        assert!(!a.secret_digest.contains("one"));
        assert_eq!(a, ClientKey::from(&config("one")));
    }

    #[tokio::test]
    async fn clients_are_reused_per_credential_set() {
        let store = S3ObjectStore::new();
        store.client(&config("one")).await;
        store.client(&config("one")).await;
        store.client(&config("two")).await;
        assert_eq!(store.clients.read().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn evicted_credentials_get_a_fresh_client() {
        let store = S3ObjectStore::new();
        store.client(&config("one")).await;
        store.client(&config("two")).await;

        store.evict(&config("one"));
        store.evict(&config("never-used"));
        {
            let clients = store.clients.read().unwrap();
            assert_eq!(clients.len(), 1);
            assert!(clients.contains_key(&ClientKey::from(&config("two"))));
        }

        store.client(&config("one")).await;
        assert_eq!(store.clients.read().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn presigned_put_is_path_style_with_expiry() {
        let store = S3ObjectStore::new();
        let url = store
            .presign_put(
                &config("one"),
                "2024-05-01/cat.jpg",
                "image/jpeg",
                Some(42),
                Duration::from_secs(60),
            )
            .await
            .unwrap();
        assert!(url.starts_with("http://localhost:9000/bucket/2024-05-01/cat.jpg?"));
        assert!(url.contains("X-Amz-Expires=60"));
    }
}
