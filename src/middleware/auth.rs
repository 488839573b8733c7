use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use sea_orm::{DatabaseConnection, EntityTrait};
use serde::{Deserialize, Serialize};

use crate::access::{self, Identity};
use crate::entities::user;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    pub exp: usize,
}

/// Signs a session cookie value for `user_id`.
pub fn issue_session_token(user_id: &str, secret: &str, ttl: Duration) -> AppResult<String> {
    let claims = SessionClaims {
        sub: user_id.to_string(),
        exp: (Utc::now() + ttl).timestamp().max(0) as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::InternalServerError(format!("failed to sign session: {e}")))
}

pub async fn identity_from_session(
    db: &DatabaseConnection,
    token: &str,
    secret: &str,
) -> AppResult<Identity> {
    let token_data = decode::<SessionClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        tracing::debug!(error = %e, "rejected session cookie");
        AppError::Forbidden("invalid session".to_string())
    })?;

    let user = user::Entity::find_by_id(token_data.claims.sub)
        .one(db)
        .await?
        .ok_or_else(|| AppError::Forbidden("unknown session user".to_string()))?;

    Ok(Identity::Session { user })
}

/// Resolves the caller once and stores the [`Identity`] in the request
/// extensions for the handlers behind it.
pub async fn identity_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let identity =
        access::authenticate(&state.db, req.headers(), &state.config.session_secret).await?;

    tracing::debug!(
        user_id = identity.user_id(),
        key_path = matches!(identity, Identity::AppKey { .. }),
        "request authenticated"
    );

    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}

/// Management operations are only open to signed-in users, never to app keys.
pub async fn require_session(req: Request, next: Next) -> Result<Response, AppError> {
    match req.extensions().get::<Identity>() {
        Some(Identity::Session { .. }) => Ok(next.run(req).await),
        Some(Identity::AppKey { app, .. }) => {
            tracing::warn!(app_id = %app.id, "app credential used on a session-only route");
            Err(AppError::Forbidden(
                "this operation requires a signed-in session".to_string(),
            ))
        }
        None => Err(AppError::Forbidden("authentication required".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_tokens_decode_with_the_same_secret() {
        let token = issue_session_token("user-1", "s3cret", Duration::hours(1)).unwrap();
        let data = decode::<SessionClaims>(
            &token,
            &DecodingKey::from_secret(b"s3cret"),
            &Validation::default(),
        )
        .unwrap();
        assert_eq!(data.claims.sub, "user-1");
    }

    #[test]
    fn expired_tokens_fail_validation() {
        let token = issue_session_token("user-1", "s3cret", Duration::hours(-2)).unwrap();
        let result = decode::<SessionClaims>(
            &token,
            &DecodingKey::from_secret(b"s3cret"),
            &Validation::default(),
        );
        assert!(result.is_err());
    }
}
