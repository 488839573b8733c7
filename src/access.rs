//! Request identity and the app-ownership capability.
//!
//! A request is authenticated exactly once, by [`authenticate`], into an
//! [`Identity`]. Anything that touches an app's files or storage needs an
//! [`AppGuard`], and the only way to get one is through the ownership-chain
//! check in [`Identity::authorize`] / [`AppGuard::load`].

use axum::http::HeaderMap;
use axum_extra::extract::CookieJar;
use sea_orm::{DatabaseConnection, EntityTrait};
use uuid::Uuid;

use crate::entities::{app, storage_configuration, user};
use crate::error::{AppError, AppResult};
use crate::middleware::{api_key, auth};
use crate::models::storage::S3StorageConfiguration;

pub const API_KEY_HEADER: &str = "api-key";
pub const SIGNED_TOKEN_HEADER: &str = "signed-token";
pub const SESSION_COOKIE: &str = "session";

#[derive(Debug, Clone)]
pub enum Identity {
    /// A signed-in user; may act on any app they own.
    Session { user: user::Model },
    /// An API key or signed token; pinned to the key's app, acting as its owner.
    AppKey {
        user: user::Model,
        app: app::Model,
        storage: Option<storage_configuration::Model>,
    },
}

impl Identity {
    pub fn user(&self) -> &user::Model {
        match self {
            Identity::Session { user } | Identity::AppKey { user, .. } => user,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user().id
    }

    /// Checks that this identity may act on `app_id` and returns the guard.
    pub async fn authorize(&self, db: &DatabaseConnection, app_id: Uuid) -> AppResult<AppGuard> {
        match self {
            Identity::Session { user } => AppGuard::load(db, app_id, &user.id).await,
            Identity::AppKey { user, app, storage } => {
                if app.id != app_id {
                    return Err(AppError::Forbidden(
                        "credential is scoped to a different app".into(),
                    ));
                }
                AppGuard::verify(&user.id, app.clone(), storage.clone())
            }
        }
    }
}

/// Proof that `user_id` owns `app` and, if bound, its storage configuration.
#[derive(Debug, Clone)]
pub struct AppGuard {
    user_id: String,
    app: app::Model,
    storage: Option<storage_configuration::Model>,
}

impl AppGuard {
    pub async fn load(db: &DatabaseConnection, app_id: Uuid, user_id: &str) -> AppResult<Self> {
        let (app, storage) = app::Entity::find_by_id(app_id)
            .find_also_related(storage_configuration::Entity)
            .one(db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("app {app_id} not found")))?;

        Self::verify(user_id, app, storage)
    }

    pub(crate) fn verify(
        user_id: &str,
        app: app::Model,
        storage: Option<storage_configuration::Model>,
    ) -> AppResult<Self> {
        if app.deleted_at.is_some() {
            return Err(AppError::NotFound(format!("app {} not found", app.id)));
        }
        if app.user_id != user_id {
            tracing::warn!(app_id = %app.id, user_id, "app ownership check failed");
            return Err(AppError::Forbidden("app belongs to another user".into()));
        }

        let storage = match storage {
            Some(s) if s.deleted_at.is_some() => None,
            Some(s) if s.user_id != user_id => {
                tracing::warn!(app_id = %app.id, storage_id = s.id, "storage ownership check failed");
                return Err(AppError::Forbidden(
                    "storage configuration belongs to another user".into(),
                ));
            }
            other => other,
        };

        Ok(Self {
            user_id: user_id.to_string(),
            app,
            storage,
        })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn app(&self) -> &app::Model {
        &self.app
    }

    pub fn app_id(&self) -> Uuid {
        self.app.id
    }

    /// The bound storage configuration, or `NotConfigured`.
    pub fn storage(&self) -> AppResult<&storage_configuration::Model> {
        self.storage.as_ref().ok_or(AppError::NotConfigured)
    }

    pub fn storage_settings(&self) -> AppResult<&S3StorageConfiguration> {
        Ok(&self.storage()?.configuration)
    }
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> AppResult<Option<&'a str>> {
    headers
        .get(name)
        .map(|value| {
            value
                .to_str()
                .map_err(|_| AppError::BadRequest(format!("invalid {name} header")))
        })
        .transpose()
}

/// Classifies a request. Precedence: `api-key`, then `signed-token`, then
/// the `session` cookie. No credential at all is `Forbidden`.
pub async fn authenticate(
    db: &DatabaseConnection,
    headers: &HeaderMap,
    session_secret: &str,
) -> AppResult<Identity> {
    if let Some(key) = header_value(headers, API_KEY_HEADER)? {
        return api_key::identity_from_api_key(db, key).await;
    }
    if let Some(token) = header_value(headers, SIGNED_TOKEN_HEADER)? {
        return api_key::identity_from_signed_token(db, token).await;
    }

    let jar = CookieJar::from_headers(headers);
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        return auth::identity_from_session(db, cookie.value(), session_secret).await;
    }

    Err(AppError::Forbidden("authentication required".into()))
}
