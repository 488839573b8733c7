pub mod api_keys;
pub mod apps;
pub mod files;
pub mod image;
pub mod storages;

use axum::{
    extract::FromRequest,
    middleware,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::access::{API_KEY_HEADER, SESSION_COOKIE, SIGNED_TOKEN_HEADER};
use crate::error::{AppError, AppResult};
use crate::middleware::auth::{identity_middleware, require_session};
use crate::state::AppState;

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct Ack {
    pub success: bool,
}

impl Ack {
    pub fn ok() -> Self {
        Self { success: true }
    }
}

/// JSON request body. Malformed or incomplete bodies are a
/// [`AppError::BadRequest`] rendered like every other error.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct RpcJson<T>(pub T);

/// Trims `value` and checks its length in characters.
pub(crate) fn validate_length(field: &str, value: &str, min: usize, max: usize) -> AppResult<String> {
    let trimmed = value.trim();
    let len = trimmed.chars().count();
    if len < min || len > max {
        return Err(AppError::BadRequest(format!(
            "{field} must be between {min} and {max} characters"
        )));
    }
    Ok(trimmed.to_string())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        files::create_presigned_url,
        files::create_multipart_upload,
        files::list_multipart_parts,
        files::sign_multipart_part_url,
        files::complete_multipart_upload,
        files::abort_multipart_upload,
        files::save_file,
        files::list_files,
        files::infinity_query_files,
        files::delete_file,
        files::upload_policy,
        image::get_image,
        apps::create_app,
        apps::list_apps,
        apps::change_storage,
        storages::create_storage,
        storages::list_storages,
        storages::delete_storage,
        api_keys::create_api_key,
        api_keys::list_api_keys,
        api_keys::request_key,
    ),
    components(
        schemas(
            Ack,
            files::FileResponse,
            files::UploadPolicy,
            crate::pagination::Cursor,
            crate::pagination::OrderBy,
            crate::pagination::SortField,
            crate::pagination::SortDirection,
            crate::services::object_store::UploadedPart,
            crate::services::object_store::PartReceipt,
            crate::services::object_store::CompletedUpload,
            crate::services::uploads::UploadStrategy,
            crate::models::storage::StorageSummary,
        )
    ),
    tags(
        (name = "Files", description = "Upload orchestration and the file ledger"),
        (name = "Images", description = "On-the-fly image renditions"),
        (name = "Apps", description = "App management (session only)"),
        (name = "Storages", description = "Storage configurations (session only)"),
        (name = "API Keys", description = "Programmatic credentials for an app (session only)")
    ),
    info(
        title = "media-relay API",
        version = "0.1.0",
        description = "Multi-tenant upload orchestration and image delivery over S3-compatible storage",
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};

        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "session",
            SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::new(SESSION_COOKIE))),
        );
        components.add_security_scheme(
            "api_key",
            SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new(API_KEY_HEADER))),
        );
        components.add_security_scheme(
            "signed_token",
            SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new(SIGNED_TOKEN_HEADER))),
        );
    }
}

pub fn create_routes(state: AppState) -> Router {
    // Swagger UI (stateless)
    let swagger_router: Router = SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDoc::openapi())
        .into();

    // Session or app credentials
    let file_routes = Router::new()
        .route("/rpc/file.createPresignedUrl", post(files::create_presigned_url))
        .route("/rpc/file.createMultipartUpload", post(files::create_multipart_upload))
        .route("/rpc/file.listMultipartParts", post(files::list_multipart_parts))
        .route("/rpc/file.signMultipartPartUrl", post(files::sign_multipart_part_url))
        .route("/rpc/file.completeMultipartUpload", post(files::complete_multipart_upload))
        .route("/rpc/file.abortMultipartUpload", post(files::abort_multipart_upload))
        .route("/rpc/file.saveFile", post(files::save_file))
        .route("/rpc/file.listFiles", post(files::list_files))
        .route("/rpc/file.infinityQueryFiles", post(files::infinity_query_files))
        .route("/rpc/file.deleteFile", post(files::delete_file))
        .route("/rpc/file.uploadPolicy", get(files::upload_policy));

    // Session only
    let management_routes = Router::new()
        .route("/rpc/apps.createApp", post(apps::create_app))
        .route("/rpc/apps.listApps", post(apps::list_apps))
        .route("/rpc/apps.changeStorage", post(apps::change_storage))
        .route("/rpc/storages.createStorage", post(storages::create_storage))
        .route("/rpc/storages.listStorages", post(storages::list_storages))
        .route("/rpc/storages.deleteStorage", post(storages::delete_storage))
        .route("/rpc/apiKeys.createApiKey", post(api_keys::create_api_key))
        .route("/rpc/apiKeys.listApiKeys", post(api_keys::list_api_keys))
        .route("/rpc/apiKeys.requestKey", post(api_keys::request_key))
        .layer(middleware::from_fn(require_session));

    let authenticated_routes = Router::new()
        .merge(file_routes)
        .merge(management_routes)
        .layer(middleware::from_fn_with_state(state.clone(), identity_middleware));

    // Public
    let app_routes = Router::new()
        .route("/image/{id}", get(image::get_image))
        .merge(authenticated_routes)
        .with_state(state);

    Router::new()
        .merge(swagger_router)
        .merge(app_routes)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lengths_are_counted_after_trimming() {
        assert_eq!(validate_length("name", "  abc  ", 3, 50).unwrap(), "abc");
        assert!(validate_length("name", " ab ", 3, 50).is_err());
        assert!(validate_length("name", &"x".repeat(51), 3, 50).is_err());
    }

    #[test]
    fn openapi_lists_rpc_paths_and_schemes() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/rpc/file.infinityQueryFiles"));
        assert!(doc.paths.paths.contains_key("/image/{id}"));
        let schemes = &doc.components.unwrap().security_schemes;
        assert!(schemes.contains_key("session"));
        assert!(schemes.contains_key("signed_token"));
    }
}
