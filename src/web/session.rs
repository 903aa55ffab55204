//! HMAC-SHA256 signed bearer tokens, 24-hour expiry.
//!
//! Token shape: `base64(payload).base64(signature)` where the payload
//! is `user_id|role|base64(name)|exp`. The name travels base64-encoded
//! so display names cannot break the field separator.

use crate::db;
use crate::domain::models::UserRole;
use crate::state::SharedState;
use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, HeaderMap, StatusCode},
};
use base64::{engine::general_purpose, Engine as _};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone)]
pub struct SessionClaims {
    pub user_id: Uuid,
    pub role: UserRole,
    pub name: String,
    pub exp: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("invalid token format")]
    Invalid,
    #[error("signature mismatch")]
    Signature,
    #[error("expired")]
    Expired,
    #[error("bad role")]
    Role,
}

pub fn sign_session(
    user_id: Uuid,
    role: &UserRole,
    name: &str,
    key: &[u8],
) -> Result<String, SessionError> {
    let exp = Utc::now() + Duration::hours(24);
    let payload = format!(
        "{}|{}|{}|{}",
        user_id,
        role_string(role),
        general_purpose::STANDARD.encode(name.as_bytes()),
        exp.timestamp()
    );
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| SessionError::Invalid)?;
    mac.update(payload.as_bytes());
    let sig = mac.finalize().into_bytes();
    Ok(format!(
        "{}.{}",
        general_purpose::STANDARD.encode(payload.as_bytes()),
        general_purpose::STANDARD.encode(sig)
    ))
}

pub fn verify_session(token: &str, key: &[u8]) -> Result<SessionClaims, SessionError> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 2 {
        return Err(SessionError::Invalid);
    }
    let payload_bytes = general_purpose::STANDARD
        .decode(parts[0])
        .map_err(|_| SessionError::Invalid)?;
    let sig_bytes = general_purpose::STANDARD
        .decode(parts[1])
        .map_err(|_| SessionError::Invalid)?;

    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| SessionError::Invalid)?;
    mac.update(&payload_bytes);
    mac.verify_slice(&sig_bytes)
        .map_err(|_| SessionError::Signature)?;

    let payload = String::from_utf8(payload_bytes).map_err(|_| SessionError::Invalid)?;
    let pieces: Vec<&str> = payload.split('|').collect();
    if pieces.len() != 4 {
        return Err(SessionError::Invalid);
    }
    let user_id = Uuid::parse_str(pieces[0]).map_err(|_| SessionError::Invalid)?;
    let role = parse_role(pieces[1])?;
    let name_bytes = general_purpose::STANDARD
        .decode(pieces[2])
        .map_err(|_| SessionError::Invalid)?;
    let name = String::from_utf8(name_bytes).map_err(|_| SessionError::Invalid)?;
    let exp: i64 = pieces[3].parse().map_err(|_| SessionError::Invalid)?;
    if Utc::now().timestamp() > exp {
        return Err(SessionError::Expired);
    }
    Ok(SessionClaims {
        user_id,
        role,
        name,
        exp,
    })
}

pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(auth) = headers.get(axum::http::header::AUTHORIZATION) {
        if let Ok(val) = auth.to_str() {
            if let Some(bearer) = val.strip_prefix("Bearer ") {
                return Some(bearer.trim().to_string());
            }
        }
    }
    if let Some(cookie) = headers.get(axum::http::header::COOKIE) {
        if let Ok(val) = cookie.to_str() {
            for pair in val.split(';') {
                if let Some(rest) = pair.trim().strip_prefix("session=") {
                    return Some(rest.to_string());
                }
            }
        }
    }
    None
}

fn role_string(role: &UserRole) -> &'static str {
    match role {
        UserRole::Admin => "ADMIN",
        UserRole::Salesman => "SALESMAN",
    }
}

fn parse_role(raw: &str) -> Result<UserRole, SessionError> {
    match raw {
        "ADMIN" => Ok(UserRole::Admin),
        "SALESMAN" => Ok(UserRole::Salesman),
        _ => Err(SessionError::Role),
    }
}

/// Axum extractor: validates the token and confirms the user still
/// exists before the handler runs.
pub struct UserSession(pub SessionClaims);

#[async_trait]
impl<S> FromRequestParts<S> for UserSession
where
    S: Send + Sync,
    SharedState: FromRef<S>,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let shared = SharedState::from_ref(state);

        let token = extract_token(&parts.headers).ok_or(StatusCode::UNAUTHORIZED)?;
        let claims = verify_session(&token, &shared.session_key).map_err(|e| {
            tracing::warn!("session verification failed: {}", e);
            StatusCode::UNAUTHORIZED
        })?;

        let user = db::find_user_by_id(&shared.pool, claims.user_id)
            .await
            .map_err(|e| {
                tracing::warn!("user lookup failed for session: {}", e);
                StatusCode::UNAUTHORIZED
            })?;
        if user.is_none() {
            return Err(StatusCode::UNAUTHORIZED);
        }

        Ok(UserSession(claims))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &[u8] = b"test-session-key-32-bytes-long!!";

    #[test]
    fn round_trip_preserves_claims() {
        let id = Uuid::new_v4();
        let token = sign_session(id, &UserRole::Salesman, "Ravi Kumar", KEY).unwrap();
        let claims = verify_session(&token, KEY).unwrap();
        assert_eq!(claims.user_id, id);
        assert_eq!(claims.role, UserRole::Salesman);
        assert_eq!(claims.name, "Ravi Kumar");
        assert!(claims.exp > Utc::now().timestamp());
    }

    #[test]
    fn name_with_separator_survives() {
        let token = sign_session(Uuid::new_v4(), &UserRole::Admin, "a|b.c", KEY).unwrap();
        assert_eq!(verify_session(&token, KEY).unwrap().name, "a|b.c");
    }

    #[test]
    fn wrong_key_is_rejected() {
        let token = sign_session(Uuid::new_v4(), &UserRole::Admin, "x", KEY).unwrap();
        let err = verify_session(&token, b"another-key-entirely-0123456789!").unwrap_err();
        assert!(matches!(err, SessionError::Signature));
    }

    #[test]
    fn mangled_token_is_invalid() {
        assert!(matches!(
            verify_session("not-a-token", KEY),
            Err(SessionError::Invalid)
        ));
    }

    #[test]
    fn bearer_header_is_extracted() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            "Bearer abc.def".parse().unwrap(),
        );
        assert_eq!(extract_token(&headers).as_deref(), Some("abc.def"));
    }
}
