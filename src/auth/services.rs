use std::time::Duration;

use argon2::{
    password_hash::{self, SaltString},
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use lazy_static::lazy_static;
use rand::rngs::OsRng;
use regex::Regex;
use serde_json::json;
use time::OffsetDateTime;
use tracing::{debug, warn};
use uuid::Uuid;

pub(crate) use crate::auth::dto::{Claims, JwtKeys, TokenKind};
use crate::auth::repo_types::ProfileFields;
use crate::config::JwtConfig;
use crate::state::AppState;

pub(crate) const MIN_PASSWORD_LEN: usize = 8;

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Rejects physically meaningless profile values.
pub(crate) fn validate_profile(profile: &ProfileFields) -> Result<(), String> {
    if let Some(age) = profile.age {
        if !(0..=150).contains(&age) {
            return Err("Age must be between 0 and 150".into());
        }
    }
    if profile.weight.is_some_and(|w| !w.is_finite() || w <= 0.0) {
        return Err("Weight must be a positive number of kilograms".into());
    }
    if profile.height.is_some_and(|h| !h.is_finite() || h <= 0.0) {
        return Err("Height must be a positive number of centimetres".into());
    }
    Ok(())
}

/// Argon2 PHC string for `plain` with a fresh random salt.
pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| anyhow::anyhow!("password hashing failed: {e}"))
}

/// `Ok(false)` on a wrong password; `Err` only when the stored hash is unusable.
pub fn verify_password(plain: &str, stored: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(stored)
        .map_err(|e| anyhow::anyhow!("stored password hash is malformed: {e}"))?;
    match Argon2::default().verify_password(plain.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(password_hash::Error::Password) => Ok(false),
        Err(e) => Err(anyhow::anyhow!("password verification failed: {e}")),
    }
}

/// Why a request could not be attributed to a user.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum AuthRejection {
    #[error("Missing Authorization header")]
    MissingHeader,
    #[error("Authorization header must be `Bearer <token>`")]
    NotBearer,
    #[error("Invalid or expired token")]
    InvalidToken,
    #[error("Access token required")]
    AccessRequired,
    #[error("Refresh token required")]
    RefreshRequired,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let body = json!({ "status": "error", "message": self.to_string() });
        (StatusCode::UNAUTHORIZED, Json(body)).into_response()
    }
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        JwtKeys::from_config(&state.config.jwt)
    }
}

impl JwtKeys {
    pub fn from_config(cfg: &JwtConfig) -> Self {
        let minutes = |m: i64| Duration::from_secs(m.max(0) as u64 * 60);
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            access_ttl: minutes(cfg.ttl_minutes),
            refresh_ttl: minutes(cfg.refresh_ttl_minutes),
        }
    }

    pub fn issue(&self, user_id: Uuid, kind: TokenKind) -> anyhow::Result<String> {
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let iat = OffsetDateTime::now_utc().unix_timestamp();
        let claims = Claims {
            sub: user_id,
            iat: iat as usize,
            exp: (iat + ttl.as_secs() as i64) as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            kind,
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| anyhow::anyhow!("token signing failed: {e}"))
    }

    /// Checks signature, expiry, issuer and audience, then that the token is
    /// of the `expected` kind.
    pub fn decode(&self, token: &str, expected: TokenKind) -> Result<Claims, AuthRejection> {
        let mut validation = Validation::default();
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        let claims = decode::<Claims>(token, &self.decoding, &validation)
            .map_err(|e| {
                debug!(error = %e, "token rejected");
                AuthRejection::InvalidToken
            })?
            .claims;
        if claims.kind != expected {
            return Err(match expected {
                TokenKind::Access => AuthRejection::AccessRequired,
                TokenKind::Refresh => AuthRejection::RefreshRequired,
            });
        }
        Ok(claims)
    }
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthRejection> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthRejection::MissingHeader)?
        .to_str()
        .map_err(|_| AuthRejection::NotBearer)?;
    let (scheme, token) = value.split_once(' ').ok_or(AuthRejection::NotBearer)?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(AuthRejection::NotBearer);
    }
    Ok(token)
}

/// Subject of a valid access token. Every piece of per-user scan state is
/// keyed by this ID.
pub struct AuthUser(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let claims = bearer_token(&parts.headers)
            .and_then(|token| JwtKeys::from_ref(state).decode(token, TokenKind::Access))
            .map_err(|e| {
                warn!(reason = %e, path = %parts.uri.path(), "unauthenticated request");
                e
            })?;
        Ok(AuthUser(claims.sub))
    }
}
