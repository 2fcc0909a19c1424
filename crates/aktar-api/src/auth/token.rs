//! Session JWTs (HS256).

use aktar_common::AktarError;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

/// Claims carried by every session token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    pub nickname: String,
    pub is_admin: bool,
    pub iat: u64,
    pub exp: u64,
}

pub fn issue(
    user_id: u64,
    nickname: &str,
    is_admin: bool,
    secret: &str,
    ttl_secs: u64,
) -> Result<String, AktarError> {
    let now = chrono::Utc::now().timestamp() as u64;
    let claims = Claims {
        sub: user_id.to_string(),
        nickname: nickname.to_string(),
        is_admin,
        iat: now,
        exp: now + ttl_secs,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AktarError::Internal(format!("token encoding failed: {e}")))
}

/// Decode and check signature and expiry; every failure is `Auth`
pub fn validate(token: &str, secret: &str) -> Result<Claims, AktarError> {
    let mut validation = Validation::new(jsonwebtoken::Algorithm::HS256);
    validation.set_required_spec_claims(&["exp", "sub"]);

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| {
        tracing::debug!(error = %e, "Rejected session token");
        AktarError::Auth
    })
}
