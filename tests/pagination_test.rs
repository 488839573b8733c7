mod common;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use common::setup;
use media_relay::access::{AppGuard, Identity};
use media_relay::entities::file;
use media_relay::error::AppError;
use media_relay::pagination::{KeysetOrder, OrderBy, PageQuery, SortDirection, SortField};
use media_relay::services::ledger;
use uuid::Uuid;

fn base() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 5, 1)
        .unwrap()
        .and_hms_milli_opt(9, 30, 0, 0)
        .unwrap()
}

const NAMES: [&str; 6] = ["zebra.png", "apple.jpg", "mango.gif", "apple.jpg", "kiwi.webp", "Banana.png"];
const TYPES: [&str; 3] = ["image/png", "image/jpeg", "application/pdf"];

/// 18 live rows with repeated names, types and timestamps.
async fn seed(t: &common::TestApp, app: &media_relay::entities::app::Model) -> Vec<file::Model> {
    let mut rows = Vec::new();
    for i in 0..18u32 {
        // three rows per millisecond bucket, so ties are common
        let created_at = base() + Duration::milliseconds(i64::from(i / 3) * 7);
        let row = t
            .file_row(app, NAMES[i as usize % NAMES.len()], TYPES[i as usize % TYPES.len()], created_at)
            .await;
        rows.push(row);
    }
    rows
}

async fn walk(t: &common::TestApp, guard: &AppGuard, order_by: OrderBy, limit: u64) -> Vec<Uuid> {
    let mut seen = Vec::new();
    let mut cursor = None;
    loop {
        let page = ledger::paginate(
            &t.db,
            guard,
            &PageQuery {
                cursor: cursor.clone(),
                limit: Some(limit),
                order_by,
            },
        )
        .await
        .unwrap();

        if page.items.is_empty() {
            assert!(page.next_cursor.is_none());
            return seen;
        }
        assert!(page.items.len() as u64 <= limit);
        seen.extend(page.items.iter().map(|f| f.id));
        cursor = page.next_cursor;
        assert!(cursor.is_some());
    }
}

#[tokio::test]
async fn every_field_and_direction_yields_each_row_once_in_order() {
    let t = setup().await;
    let (_, _, app) = t.tenant("alice").await;
    let guard = AppGuard::load(&t.db, app.id, "alice").await.unwrap();
    let rows = seed(&t, &app).await;

    for field in [SortField::CreatedAt, SortField::Name, SortField::Type] {
        for order in [SortDirection::Asc, SortDirection::Desc] {
            let order_by = OrderBy { field, order };
            let keyset = KeysetOrder::from(order_by);

            let mut expected = rows.clone();
            expected.sort_by(|a, b| keyset.compare(a, b));
            let expected: Vec<Uuid> = expected.iter().map(|f| f.id).collect();

            for limit in [1, 4, 7, 100] {
                assert_eq!(
                    walk(&t, &guard, order_by, limit).await,
                    expected,
                    "{field:?} {order:?} limit {limit}"
                );
            }
        }
    }
}

#[tokio::test]
async fn soft_deleted_rows_are_skipped_and_deleting_twice_is_a_no_op() {
    let t = setup().await;
    let (user, _, app) = t.tenant("alice").await;
    let guard = AppGuard::load(&t.db, app.id, "alice").await.unwrap();
    let rows = seed(&t, &app).await;
    let identity = Identity::Session { user };

    for row in rows.iter().step_by(4) {
        ledger::delete_file(&t.db, &identity, row.id).await.unwrap();
        ledger::delete_file(&t.db, &identity, row.id).await.unwrap();
    }
    let deleted: Vec<Uuid> = rows.iter().step_by(4).map(|f| f.id).collect();

    let listed = ledger::list_files(&t.db, &guard).await.unwrap();
    assert_eq!(listed.len(), rows.len() - deleted.len());
    assert!(listed.iter().all(|f| !deleted.contains(&f.id)));
    assert!(listed
        .windows(2)
        .all(|w| (w[0].created_at, w[0].id) > (w[1].created_at, w[1].id)));

    let walked = walk(&t, &guard, OrderBy::default(), 5).await;
    assert_eq!(walked, listed.iter().map(|f| f.id).collect::<Vec<_>>());
}

#[tokio::test]
async fn inserts_and_deletes_between_pages_do_not_shift_the_walk() {
    let t = setup().await;
    let (user, _, app) = t.tenant("alice").await;
    let guard = AppGuard::load(&t.db, app.id, "alice").await.unwrap();
    let rows = seed(&t, &app).await;
    let identity = Identity::Session { user };

    let order = KeysetOrder::from(OrderBy::default());
    let mut expected = rows.clone();
    expected.sort_by(|a, b| order.compare(a, b));

    let first = ledger::paginate(
        &t.db,
        &guard,
        &PageQuery {
            limit: Some(5),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    let mut seen: Vec<Uuid> = first.items.iter().map(|f| f.id).collect();

    // a newer upload lands before the cursor, an unseen row is deleted
    t.file_row(&app, "late.png", "image/png", base() + Duration::days(1)).await;
    let victim = expected[9].id;
    ledger::delete_file(&t.db, &identity, victim).await.unwrap();

    let mut cursor = first.next_cursor;
    while let Some(current) = cursor {
        let page = ledger::paginate(
            &t.db,
            &guard,
            &PageQuery {
                cursor: Some(current),
                limit: Some(5),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        seen.extend(page.items.iter().map(|f| f.id));
        cursor = page.next_cursor;
    }

    let wanted: Vec<Uuid> = expected.iter().map(|f| f.id).filter(|id| *id != victim).collect();
    assert_eq!(seen, wanted);
}

#[tokio::test]
async fn rows_of_other_apps_never_leak_into_a_page() {
    let t = setup().await;
    let (_, _, app) = t.tenant("alice").await;
    let (_, _, other) = t.tenant("bob").await;
    seed(&t, &other).await;
    t.file_row(&app, "mine.png", "image/png", base()).await;

    let guard = AppGuard::load(&t.db, app.id, "alice").await.unwrap();
    let walked = walk(&t, &guard, OrderBy::default(), 3).await;
    assert_eq!(walked.len(), 1);
}

#[tokio::test]
async fn invalid_limits_and_cursors_are_bad_requests() {
    let t = setup().await;
    let (_, _, app) = t.tenant("alice").await;
    let guard = AppGuard::load(&t.db, app.id, "alice").await.unwrap();

    for limit in [0, 101] {
        let query = PageQuery {
            limit: Some(limit),
            ..Default::default()
        };
        assert!(matches!(
            ledger::paginate(&t.db, &guard, &query).await,
            Err(AppError::BadRequest(_))
        ));
    }

    let query: PageQuery = serde_json::from_value(serde_json::json!({
        "cursor": { "value": "not a time", "id": Uuid::new_v4() }
    }))
    .unwrap();
    assert!(matches!(
        ledger::paginate(&t.db, &guard, &query).await,
        Err(AppError::BadRequest(_))
    ));
}

#[tokio::test]
async fn deleting_requires_the_owning_identity() {
    let t = setup().await;
    let (_, _, app) = t.tenant("alice").await;
    let (mallory, _, _) = t.tenant("mallory").await;
    let row = t.file_row(&app, "a.png", "image/png", base()).await;

    let intruder = Identity::Session { user: mallory };
    assert!(matches!(
        ledger::delete_file(&t.db, &intruder, row.id).await,
        Err(AppError::Forbidden(_))
    ));
    assert!(matches!(
        ledger::delete_file(&t.db, &intruder, Uuid::new_v4()).await,
        Err(AppError::NotFound(_))
    ));
}
