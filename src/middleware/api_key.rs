use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};

use crate::access::Identity;
use crate::entities::{api_key, app, storage_configuration, user};
use crate::error::{AppError, AppResult};

#[derive(Debug, Serialize, Deserialize)]
pub struct SignedTokenClaims {
    #[serde(rename = "clientId", default)]
    pub client_id: Option<String>,
}

/// Reads `clientId` without checking the signature; the key it names holds
/// the secret needed for the real check.
fn unverified_client_id(token: &str) -> AppResult<String> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.required_spec_claims.clear();
    validation.validate_exp = false;
    validation.validate_aud = false;

    let data = decode::<SignedTokenClaims>(token, &DecodingKey::from_secret(&[]), &validation)
        .map_err(|e| {
            tracing::debug!(error = %e, "malformed signed token");
            AppError::BadRequest("malformed signed token".to_string())
        })?;

    data.claims
        .client_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::BadRequest("clientId not found in token".to_string()))
}

fn verify_signature(token: &str, secret: &str) -> AppResult<()> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.required_spec_claims.clear();
    // Clients may stamp their own audience; only the key's signature matters.
    validation.validate_aud = false;

    decode::<SignedTokenClaims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map(|_| ())
        .map_err(|e| {
            tracing::debug!(error = %e, "signed token verification failed");
            AppError::BadRequest("invalid token signature".to_string())
        })
}

async fn identity_for_key(db: &DatabaseConnection, key: api_key::Model) -> AppResult<Identity> {
    let (app, storage) = app::Entity::find_by_id(key.app_id)
        .find_also_related(storage_configuration::Entity)
        .one(db)
        .await?
        .filter(|(app, _)| app.deleted_at.is_none())
        .ok_or_else(|| AppError::NotFound("app for api key not found".to_string()))?;

    let user = user::Entity::find_by_id(app.user_id.clone())
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("app owner not found".to_string()))?;

    Ok(Identity::AppKey { user, app, storage })
}

pub async fn identity_from_api_key(db: &DatabaseConnection, key: &str) -> AppResult<Identity> {
    let api_key = api_key::Entity::find()
        .filter(api_key::Column::Key.eq(key))
        .filter(api_key::Column::DeletedAt.is_null())
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("api key not found".to_string()))?;

    identity_for_key(db, api_key).await
}

pub async fn identity_from_signed_token(db: &DatabaseConnection, token: &str) -> AppResult<Identity> {
    let client_id = unverified_client_id(token)?;

    let api_key = api_key::Entity::find()
        .filter(api_key::Column::ClientId.eq(client_id.as_str()))
        .filter(api_key::Column::DeletedAt.is_null())
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("api key not found".to_string()))?;

    verify_signature(token, &api_key.key)?;
    identity_for_key(db, api_key).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    fn sign(claims: serde_json::Value, secret: &str) -> String {
        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    #[test]
    fn client_id_is_read_without_the_secret() {
        let token = sign(json!({ "clientId": "client-1" }), "whatever");
        assert_eq!(unverified_client_id(&token).unwrap(), "client-1");
    }

    #[test]
    fn missing_client_id_is_bad_request() {
        let token = sign(json!({ "foo": "bar" }), "k");
        assert!(matches!(unverified_client_id(&token), Err(AppError::BadRequest(_))));
        assert!(matches!(unverified_client_id("not-a-jwt"), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn signature_must_match_key_secret() {
        let token = sign(json!({ "clientId": "c" }), "right");
        assert!(verify_signature(&token, "right").is_ok());
        assert!(matches!(verify_signature(&token, "wrong"), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn audience_claims_are_accepted() {
        let token = sign(json!({ "clientId": "c", "aud": ["uploads", "cdn"] }), "right");
        assert_eq!(unverified_client_id(&token).unwrap(), "c");
        assert!(verify_signature(&token, "right").is_ok());
    }
}
