//! File records: written once the client has confirmed an upload, removed
//! only by soft deletion.

use percent_encoding::percent_decode_str;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QuerySelect, Set,
};
use url::Url;
use uuid::Uuid;

use crate::access::{AppGuard, Identity};
use crate::entities::file;
use crate::error::{AppError, AppResult};
use crate::pagination::{now_millis, KeysetOrder, OrderBy, Page, PageQuery};
use crate::routes::validate_length;

/// Column widths of the `files` table.
pub const MAX_NAME_LEN: usize = 100;
pub const MAX_TYPE_LEN: usize = 100;
pub const MAX_LOCATION_LEN: usize = 1024;

#[derive(Debug, Clone)]
pub struct NewFile {
    pub name: String,
    /// The URL the bytes were uploaded to, presign query included.
    pub path: String,
    pub file_type: String,
}

/// Where an uploaded object lives: its canonical URL and bucket-relative key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectLocation {
    pub url: String,
    pub key: String,
}

pub fn locate_upload(raw: &str, bucket: &str) -> AppResult<ObjectLocation> {
    let mut url =
        Url::parse(raw).map_err(|e| AppError::BadRequest(format!("invalid upload url: {e}")))?;
    url.set_query(None);
    url.set_fragment(None);

    let decoded = percent_decode_str(url.path())
        .decode_utf8()
        .map_err(|_| AppError::BadRequest("upload url path is not valid UTF-8".into()))?;
    let path = decoded.strip_prefix('/').unwrap_or(&decoded);

    let virtual_hosted = url
        .host_str()
        .is_some_and(|host| host.starts_with(&format!("{bucket}.")));
    let key = if virtual_hosted {
        path
    } else {
        path.strip_prefix(&format!("{bucket}/")).unwrap_or(path)
    };

    if key.is_empty() {
        return Err(AppError::BadRequest("upload url has no object key".into()));
    }

    Ok(ObjectLocation {
        url: url.to_string(),
        key: key.to_string(),
    })
}

pub async fn save_file(
    db: &DatabaseConnection,
    guard: &AppGuard,
    new_file: NewFile,
) -> AppResult<file::Model> {
    let storage = guard.storage_settings()?;
    let name = validate_length("name", &new_file.name, 1, MAX_NAME_LEN)?;
    let file_type = validate_length("type", &new_file.file_type, 1, MAX_TYPE_LEN)?;
    let location = locate_upload(&new_file.path, &storage.bucket)?;
    validate_length("url", &location.url, 1, MAX_LOCATION_LEN)?;
    validate_length("path", &location.key, 1, MAX_LOCATION_LEN)?;

    let record = file::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name),
        file_type: Set(file_type.clone()),
        content_type: Set(file_type),
        path: Set(location.key),
        url: Set(location.url),
        user_id: Set(guard.user_id().to_string()),
        app_id: Set(guard.app_id()),
        created_at: Set(now_millis()),
        deleted_at: Set(None),
    }
    .insert(db)
    .await?;

    tracing::info!(app_id = %record.app_id, file_id = %record.id, key = %record.path, "file recorded");
    Ok(record)
}

/// Soft-deletes a file. Deleting an already deleted file succeeds and
/// changes nothing.
pub async fn delete_file(db: &DatabaseConnection, identity: &Identity, file_id: Uuid) -> AppResult<()> {
    let record = file::Entity::find_by_id(file_id)
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("file {file_id} not found")))?;

    identity.authorize(db, record.app_id).await?;

    if record.deleted_at.is_some() {
        return Ok(());
    }

    let mut active: file::ActiveModel = record.into();
    active.deleted_at = Set(Some(now_millis()));
    active.update(db).await?;

    tracing::info!(file_id = %file_id, "file deleted");
    Ok(())
}

fn live_files(app_id: Uuid) -> sea_orm::Select<file::Entity> {
    file::Entity::find()
        .filter(file::Column::AppId.eq(app_id))
        .filter(file::Column::DeletedAt.is_null())
}

/// Every live file of the app, newest first.
pub async fn list_files(db: &DatabaseConnection, guard: &AppGuard) -> AppResult<Vec<file::Model>> {
    let order = KeysetOrder::from(OrderBy::default());
    Ok(order.apply(live_files(guard.app_id())).all(db).await?)
}

pub async fn paginate(
    db: &DatabaseConnection,
    guard: &AppGuard,
    query: &PageQuery,
) -> AppResult<Page<file::Model>> {
    let limit = query.limit()?;
    let order = KeysetOrder::from(query.order_by);

    let mut select = live_files(guard.app_id());
    if let Some(cursor) = &query.cursor {
        select = select.filter(order.after(cursor)?);
    }

    let rows = order.apply(select).limit(limit).all(db).await?;
    Ok(order.page(rows, |row| row))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_style_urls_drop_bucket_and_signature() {
        let location = locate_upload(
            "http://localhost:9000/photos/2024-05-01/my_cat.jpg?X-Amz-Signature=abc#frag",
            "photos",
        )
        .unwrap();
        assert_eq!(location.url, "http://localhost:9000/photos/2024-05-01/my_cat.jpg");
        assert_eq!(location.key, "2024-05-01/my_cat.jpg");
    }

    #[test]
    fn virtual_hosted_urls_keep_full_path() {
        let location = locate_upload(
            "https://photos.s3.eu-west-1.amazonaws.com/photos/2024-05-01/a%20b.png?x=1",
            "photos",
        )
        .unwrap();
        assert_eq!(location.key, "photos/2024-05-01/a b.png");
        assert_eq!(
            location.url,
            "https://photos.s3.eu-west-1.amazonaws.com/photos/2024-05-01/a%20b.png"
        );
    }

    #[test]
    fn unusable_urls_are_bad_request() {
        assert!(matches!(locate_upload("not a url", "b"), Err(AppError::BadRequest(_))));
        assert!(matches!(locate_upload("http://host/b/", "b"), Err(AppError::BadRequest(_))));
    }
}
