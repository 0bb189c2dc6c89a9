//! Identity tokens issued by the external auth service
//!
//! The server never issues tokens in production; `create_token` exists for the
//! auth service's side of the contract and for tests.

use crate::error::{AppError, Result};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use livelab_protocol::Role;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IdentityClaims {
    pub sub: String, // Identity ID
    pub name: String,
    pub role: Role,
    pub exp: i64, // Expiration time
    pub iat: i64, // Issued at
}

impl IdentityClaims {
    pub fn new(identity_id: &str, name: &str, role: Role, expires_in_hours: i64) -> Self {
        let now = Utc::now();
        Self {
            sub: identity_id.to_string(),
            name: name.to_string(),
            role,
            exp: (now + Duration::hours(expires_in_hours)).timestamp(),
            iat: now.timestamp(),
        }
    }
}

pub fn create_token(identity_id: &str, name: &str, role: Role, secret: &str) -> Result<String> {
    let claims = IdentityClaims::new(identity_id, name, role, 12);

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

pub fn verify_token(token: &str, secret: &str) -> Result<IdentityClaims> {
    let token_data = decode::<IdentityClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;

    Ok(token_data.claims)
}

/// Check that a token backs the identity a client claims in `identify`
pub fn verify_identity(
    token: Option<&str>,
    secret: &str,
    identity_id: &str,
    role: Role,
) -> Result<IdentityClaims> {
    let token = token.ok_or(AppError::Unauthorized)?;
    let claims = verify_token(token, secret)?;

    if claims.sub != identity_id || claims.role != role {
        tracing::warn!(
            "Identity mismatch: token for {} ({}) used to claim {} ({})",
            claims.sub,
            claims.role,
            identity_id,
            role
        );
        return Err(AppError::Unauthorized);
    }
    Ok(claims)
}
