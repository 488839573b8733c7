#![allow(dead_code)]

use std::io::Cursor;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use clap::Parser;
use http_body_util::BodyExt;
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use media_relay::config::Config;
use media_relay::entities::{api_key, app, file, storage_configuration, user};
use media_relay::middleware::auth::issue_session_token;
use media_relay::models::storage::S3StorageConfiguration;
use media_relay::pagination::now_millis;
use media_relay::routes::create_routes;
use media_relay::services::memory_store::{MemoryObjectStore, MEMORY_ENDPOINT};
use media_relay::state::AppState;
use migration::{Migrator, MigratorTrait};
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, Set};
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

pub const SESSION_SECRET: &str = "test-session-secret";

pub struct TestApp {
    pub db: DatabaseConnection,
    pub store: Arc<MemoryObjectStore>,
    pub state: AppState,
}

pub async fn setup() -> TestApp {
    let mut opts = ConnectOptions::new("sqlite::memory:");
    opts.max_connections(1).sqlx_logging(false);
    let db = Database::connect(opts).await.unwrap();
    Migrator::up(&db, None).await.unwrap();

    let config = Config::try_parse_from([
        "media-relay",
        "--database-url",
        "sqlite::memory:",
        "--session-secret",
        SESSION_SECRET,
        "--object-store",
        "memory",
    ])
    .unwrap();

    let store = Arc::new(MemoryObjectStore::new());
    let state = AppState::new(db.clone(), store.clone(), config);
    TestApp { db, store, state }
}

impl TestApp {
    pub fn router(&self) -> Router {
        create_routes(self.state.clone())
    }

    pub async fn user(&self, id: &str) -> user::Model {
        user::ActiveModel {
            id: Set(id.to_string()),
            name: Set(Some(id.to_string())),
            email: Set(Some(format!("{id}@example.com"))),
            image: Set(None),
            created_at: Set(now_millis()),
        }
        .insert(&self.db)
        .await
        .unwrap()
    }

    pub async fn storage(&self, user_id: &str, bucket: &str) -> storage_configuration::Model {
        storage_configuration::ActiveModel {
            name: Set(format!("{bucket} storage")),
            user_id: Set(user_id.to_string()),
            configuration: Set(S3StorageConfiguration {
                bucket: bucket.to_string(),
                region: "auto".into(),
                access_key_id: "test-access".into(),
                secret_access_key: "test-secret".into(),
                api_endpoint: Some(MEMORY_ENDPOINT.into()),
            }),
            created_at: Set(now_millis()),
            deleted_at: Set(None),
            ..Default::default()
        }
        .insert(&self.db)
        .await
        .unwrap()
    }

    pub async fn app(&self, user_id: &str, storage_id: Option<i32>) -> app::Model {
        app::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set("gallery".into()),
            description: Set(None),
            user_id: Set(user_id.to_string()),
            storage_id: Set(storage_id),
            created_at: Set(now_millis()),
            deleted_at: Set(None),
        }
        .insert(&self.db)
        .await
        .unwrap()
    }

    /// A user with a storage configuration and an app bound to it.
    pub async fn tenant(&self, user_id: &str) -> (user::Model, storage_configuration::Model, app::Model) {
        let user = self.user(user_id).await;
        let storage = self.storage(user_id, &format!("{user_id}-bucket")).await;
        let app = self.app(user_id, Some(storage.id)).await;
        (user, storage, app)
    }

    pub async fn api_key(&self, app_id: Uuid) -> api_key::Model {
        api_key::ActiveModel {
            name: Set("ci".into()),
            client_id: Set(Uuid::new_v4().to_string()),
            key: Set(format!("mrk_{}", Uuid::new_v4().simple())),
            app_id: Set(app_id),
            created_at: Set(now_millis()),
            deleted_at: Set(None),
            ..Default::default()
        }
        .insert(&self.db)
        .await
        .unwrap()
    }

    /// Inserts a file row directly, for tests that care about ordering.
    pub async fn file_row(
        &self,
        app: &app::Model,
        name: &str,
        file_type: &str,
        created_at: chrono::NaiveDateTime,
    ) -> file::Model {
        file::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            file_type: Set(file_type.to_string()),
            content_type: Set(file_type.to_string()),
            path: Set(format!("2024-05-01/{name}")),
            url: Set(format!("{MEMORY_ENDPOINT}/bucket/2024-05-01/{name}")),
            user_id: Set(app.user_id.clone()),
            app_id: Set(app.id),
            created_at: Set(created_at),
            deleted_at: Set(None),
        }
        .insert(&self.db)
        .await
        .unwrap()
    }
}

pub fn session_cookie(user_id: &str) -> String {
    let token = issue_session_token(user_id, SESSION_SECRET, chrono::Duration::hours(1)).unwrap();
    format!("session={token}")
}

pub fn jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = ImageBuffer::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    });
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut buffer, ImageFormat::Jpeg)
        .unwrap();
    buffer.into_inner()
}

pub fn rpc(path: &str, auth: (&str, &str), body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .header(auth.0, auth.1)
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}
