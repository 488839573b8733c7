mod common;

use common::{jpeg, setup};
use image::GenericImageView;
use media_relay::access::{AppGuard, Identity};
use media_relay::config::DEFAULT_MULTIPART_THRESHOLD;
use media_relay::error::AppError;
use media_relay::services::ledger::{self, NewFile};
use media_relay::services::object_store::{PartReceipt, StorageError};
use media_relay::services::storage_resolver;
use media_relay::services::transform::{self, TransformParams};
use media_relay::services::uploads::{self, UploadStrategy};
use uuid::Uuid;

#[tokio::test]
async fn single_upload_is_recorded_and_served_narrower() {
    let t = setup().await;
    let (_, storage, app) = t.tenant("alice").await;
    let guard = AppGuard::load(&t.db, app.id, "alice").await.unwrap();
    let bucket = storage.configuration.bucket.clone();

    let data = jpeg(1600, 1200);
    assert_eq!(
        UploadStrategy::for_size(data.len() as u64, DEFAULT_MULTIPART_THRESHOLD),
        UploadStrategy::Single
    );

    let presigned = uploads::create_presigned_url(
        t.store.as_ref(),
        &guard,
        "summer holiday.jpg",
        "image/jpeg",
        data.len() as i64,
    )
    .await
    .unwrap();
    assert_eq!(presigned.method, "PUT");
    assert!(presigned.key.ends_with("/summer_holiday.jpg"));
    assert!(presigned.url.contains("X-Amz-Expires=60"));

    // the client PUTs straight to the bucket
    t.store.put_object(&bucket, &presigned.key, data);

    let record = ledger::save_file(
        &t.db,
        &guard,
        NewFile {
            name: "summer holiday.jpg".into(),
            path: presigned.url.clone(),
            file_type: "image/jpeg".into(),
        },
    )
    .await
    .unwrap();
    assert_eq!(record.path, presigned.key);
    assert!(!record.url.contains('?'));

    let listed = ledger::list_files(&t.db, &guard).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].content_type, "image/jpeg");

    let webp = transform::transform(
        &t.db,
        t.store.as_ref(),
        record.id,
        TransformParams {
            width: 100,
            rotate: 0,
        },
    )
    .await
    .unwrap();
    let decoded = image::load_from_memory(&webp).unwrap();
    assert_eq!(decoded.width(), 100);
    assert_eq!(decoded.dimensions(), (100, 75));
}

#[tokio::test]
async fn transform_is_deterministic() {
    let t = setup().await;
    let (_, storage, app) = t.tenant("alice").await;
    let guard = AppGuard::load(&t.db, app.id, "alice").await.unwrap();
    t.store
        .put_object(&storage.configuration.bucket, "2024-05-01/a.jpg", jpeg(640, 480));
    let record = ledger::save_file(
        &t.db,
        &guard,
        NewFile {
            name: "a.jpg".into(),
            path: format!("http://memory.local/{}/2024-05-01/a.jpg", storage.configuration.bucket),
            file_type: "image/jpeg".into(),
        },
    )
    .await
    .unwrap();

    let params = TransformParams {
        width: 200,
        rotate: 90,
    };
    let first = transform::transform(&t.db, t.store.as_ref(), record.id, params).await.unwrap();
    let second = transform::transform(&t.db, t.store.as_ref(), record.id, params).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn multipart_upload_lists_parts_then_closes() {
    let t = setup().await;
    let (_, storage, app) = t.tenant("alice").await;
    let guard = AppGuard::load(&t.db, app.id, "alice").await.unwrap();
    let store = t.store.as_ref();

    let size = 50 * 1024 * 1024;
    assert_eq!(
        UploadStrategy::for_size(size as u64, DEFAULT_MULTIPART_THRESHOLD),
        UploadStrategy::Multipart
    );
    let upload = uploads::create_multipart_upload(store, &guard, "big film.mp4", "video/mp4", size)
        .await
        .unwrap();
    assert!(upload.key.ends_with("/big_film.mp4"));

    let mut receipts = Vec::new();
    for n in 1..=5 {
        let url = uploads::sign_part_url(store, &guard, &upload.upload_id, &upload.key, n)
            .await
            .unwrap();
        assert!(url.contains(&format!("partNumber={n}")));

        let chunk = vec![n as u8; 2048];
        let e_tag = t.store.upload_part(&upload.upload_id, n, chunk).unwrap();
        receipts.push(PartReceipt {
            part_number: n,
            e_tag,
            size: Some(2048),
        });

        if n == 3 {
            let listed = uploads::list_parts(store, &guard, &upload.upload_id, &upload.key)
                .await
                .unwrap();
            let numbers: Vec<i32> = listed.iter().map(|p| p.part_number).collect();
            assert_eq!(numbers, vec![1, 2, 3]);
        }
    }

    // receipts may arrive in any order
    receipts.reverse();
    let completed =
        uploads::complete_multipart_upload(store, &guard, &upload.upload_id, &upload.key, &receipts)
            .await
            .unwrap();
    assert_eq!(completed.key, upload.key);
    assert_eq!(completed.bucket, storage.configuration.bucket);
    assert!(t.store.contains(&storage.configuration.bucket, &upload.key));

    let closed = uploads::list_parts(store, &guard, &upload.upload_id, &upload.key).await;
    assert!(matches!(closed, Err(AppError::Storage(StorageError::NotFound(_)))));

    // aborting a finished upload is harmless
    uploads::abort_multipart_upload(store, &guard, &upload.upload_id, &upload.key)
        .await
        .unwrap();
}

#[tokio::test]
async fn completion_with_a_mismatched_etag_fails_and_keeps_the_upload_open() {
    let t = setup().await;
    let (_, _, app) = t.tenant("alice").await;
    let guard = AppGuard::load(&t.db, app.id, "alice").await.unwrap();
    let store = t.store.as_ref();

    let upload = uploads::create_multipart_upload(store, &guard, "clip.mov", "video/quicktime", 100)
        .await
        .unwrap();
    let first = t.store.upload_part(&upload.upload_id, 1, vec![1; 64]).unwrap();
    t.store.upload_part(&upload.upload_id, 2, vec![2; 64]).unwrap();

    let receipts = vec![
        PartReceipt {
            part_number: 1,
            e_tag: first,
            size: None,
        },
        PartReceipt {
            part_number: 2,
            e_tag: "\"deadbeef\"".into(),
            size: None,
        },
    ];
    let result =
        uploads::complete_multipart_upload(store, &guard, &upload.upload_id, &upload.key, &receipts).await;
    assert!(matches!(result, Err(AppError::BadRequest(_))));

    let still_open = uploads::list_parts(store, &guard, &upload.upload_id, &upload.key)
        .await
        .unwrap();
    assert_eq!(still_open.len(), 2);
}

#[tokio::test]
async fn part_numbers_and_filenames_are_validated() {
    let t = setup().await;
    let (_, _, app) = t.tenant("alice").await;
    let guard = AppGuard::load(&t.db, app.id, "alice").await.unwrap();
    let store = t.store.as_ref();

    for n in [0, 10_001] {
        assert!(matches!(
            uploads::sign_part_url(store, &guard, "mem-upload-1", "k", n).await,
            Err(AppError::BadRequest(_))
        ));
    }
    assert!(matches!(
        uploads::create_presigned_url(store, &guard, "a/b.png", "image/png", 1).await,
        Err(AppError::BadRequest(_))
    ));
    assert!(matches!(
        uploads::create_presigned_url(store, &guard, "", "image/png", 1).await,
        Err(AppError::BadRequest(_))
    ));
}

#[tokio::test]
async fn resolve_fails_closed_for_every_mismatch() {
    let t = setup().await;
    let (_, alice_storage, alice_app) = t.tenant("alice").await;
    t.user("bob").await;
    let bob_unbound = t.app("bob", None).await;
    let bob_storage = t.storage("bob", "bob-bucket").await;
    // alice's app pointed at storage bob owns
    let crossed = t.app("alice", Some(bob_storage.id)).await;

    let resolved = storage_resolver::resolve(&t.db, alice_app.id, "alice").await.unwrap();
    assert_eq!(resolved.id, alice_storage.id);

    for (app_id, user) in [
        (alice_app.id, "bob"),
        (bob_unbound.id, "alice"),
        (crossed.id, "bob"),
        (crossed.id, "alice"),
    ] {
        assert!(
            matches!(
                storage_resolver::resolve(&t.db, app_id, user).await,
                Err(AppError::Forbidden(_))
            ),
            "{app_id} as {user}"
        );
    }

    assert!(matches!(
        storage_resolver::resolve(&t.db, bob_unbound.id, "bob").await,
        Err(AppError::NotConfigured)
    ));
    assert!(matches!(
        storage_resolver::resolve(&t.db, Uuid::new_v4(), "bob").await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn key_identities_are_pinned_to_their_app() {
    let t = setup().await;
    let (user, storage, app) = t.tenant("alice").await;
    let second = t.app("alice", Some(storage.id)).await;

    let identity = Identity::AppKey {
        user,
        app: app.clone(),
        storage: Some(storage),
    };
    assert!(identity.authorize(&t.db, app.id).await.is_ok());
    assert!(matches!(
        identity.authorize(&t.db, second.id).await,
        Err(AppError::Forbidden(_))
    ));
}

#[tokio::test]
async fn unbound_apps_cannot_upload_or_record() {
    let t = setup().await;
    t.user("alice").await;
    let app = t.app("alice", None).await;
    let guard = AppGuard::load(&t.db, app.id, "alice").await.unwrap();

    assert!(matches!(
        uploads::create_presigned_url(t.store.as_ref(), &guard, "a.png", "image/png", 1).await,
        Err(AppError::NotConfigured)
    ));
    assert!(matches!(
        ledger::save_file(
            &t.db,
            &guard,
            NewFile {
                name: "a.png".into(),
                path: "http://memory.local/b/a.png".into(),
                file_type: "image/png".into(),
            }
        )
        .await,
        Err(AppError::NotConfigured)
    ));
}

#[tokio::test]
async fn oversized_file_metadata_is_rejected_before_insert() {
    let t = setup().await;
    let (_, storage, app) = t.tenant("alice").await;
    let guard = AppGuard::load(&t.db, app.id, "alice").await.unwrap();
    let base = format!("http://memory.local/{}", storage.configuration.bucket);

    let cases = [
        NewFile {
            name: "n".repeat(ledger::MAX_NAME_LEN + 1),
            path: format!("{base}/2024-05-01/a.png"),
            file_type: "image/png".into(),
        },
        NewFile {
            name: "a.png".into(),
            path: format!("{base}/2024-05-01/a.png"),
            file_type: format!("image/{}", "x".repeat(ledger::MAX_TYPE_LEN)),
        },
        NewFile {
            name: "a.png".into(),
            path: format!("{base}/2024-05-01/{}.png", "k".repeat(ledger::MAX_LOCATION_LEN)),
            file_type: "image/png".into(),
        },
        NewFile {
            name: "   ".into(),
            path: format!("{base}/2024-05-01/a.png"),
            file_type: "image/png".into(),
        },
    ];
    for new_file in cases {
        assert!(matches!(
            ledger::save_file(&t.db, &guard, new_file).await,
            Err(AppError::BadRequest(_))
        ));
    }
    assert!(ledger::list_files(&t.db, &guard).await.unwrap().is_empty());

    let longest = "n".repeat(ledger::MAX_NAME_LEN);
    let record = ledger::save_file(
        &t.db,
        &guard,
        NewFile {
            name: longest.clone(),
            path: format!("{base}/2024-05-01/a.png"),
            file_type: "image/png".into(),
        },
    )
    .await
    .unwrap();
    assert_eq!(record.name, longest);

    let too_long = format!("{}.png", "f".repeat(uploads::MAX_FILENAME_LEN));
    assert!(matches!(
        uploads::create_presigned_url(t.store.as_ref(), &guard, &too_long, "image/png", 1).await,
        Err(AppError::BadRequest(_))
    ));
}
