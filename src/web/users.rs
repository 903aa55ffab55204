use crate::db;
use crate::domain::models::{User, UserRole};
use crate::state::SharedState;
use crate::web::session::{sign_session, SessionClaims, UserSession};
use crate::web::{api_error, internal_error, ApiError};
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, SaltString},
    Argon2, PasswordVerifier,
};
use axum::{
    extract::{ConnectInfo, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Option<UserRole>,
}

#[derive(Debug, Serialize)]
pub struct Profile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: UserRole,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: Profile,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/login", post(login))
        .route("/register", post(register))
        .route("/salesmen", get(list_salesmen))
        .with_state(state)
}

pub fn require_admin(claims: &SessionClaims) -> Result<(), ApiError> {
    if claims.role == UserRole::Admin {
        Ok(())
    } else {
        Err(api_error(StatusCode::FORBIDDEN, "admin access required"))
    }
}

fn profile(user: &User) -> Profile {
    Profile {
        id: user.id,
        name: user.name.clone(),
        email: user.email.clone(),
        role: user.role,
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

async fn login(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<SharedState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let ip = addr.ip().to_string();
    if !state.login_limiter.allow(&ip).await {
        tracing::warn!(%ip, "login rate limit exceeded");
        return Err(api_error(
            StatusCode::TOO_MANY_REQUESTS,
            "too many login attempts, try again later",
        ));
    }

    let email = normalize_email(&payload.email);
    let user = db::find_user_by_email(&state.pool, &email)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| api_error(StatusCode::UNAUTHORIZED, "invalid credentials"))?;

    let parsed_hash = PasswordHash::new(&user.hash)
        .map_err(|_| api_error(StatusCode::UNAUTHORIZED, "invalid credentials"))?;
    Argon2::default()
        .verify_password(payload.password.as_bytes(), &parsed_hash)
        .map_err(|_| api_error(StatusCode::UNAUTHORIZED, "invalid credentials"))?;

    let token = sign_session(user.id, &user.role, &user.name, &state.session_key)
        .map_err(internal_error)?;

    tracing::info!(user_id = %user.id, "user logged in");
    Ok(Json(LoginResponse {
        token,
        user: profile(&user),
    }))
}

async fn register(
    UserSession(claims): UserSession,
    State(state): State<SharedState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<Profile>, ApiError> {
    require_admin(&claims)?;

    let name = payload.name.trim();
    if name.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "name is required"));
    }
    let email = normalize_email(&payload.email);
    if email.is_empty() || !email.contains('@') {
        return Err(api_error(StatusCode::BAD_REQUEST, "a valid email is required"));
    }
    if payload.password.len() < 8 {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "password must be at least 8 characters",
        ));
    }

    if db::find_user_by_email(&state.pool, &email)
        .await
        .map_err(internal_error)?
        .is_some()
    {
        return Err(api_error(StatusCode::CONFLICT, "email already registered"));
    }

    let salt = SaltString::generate(OsRng);
    let hash = Argon2::default()
        .hash_password(payload.password.as_bytes(), &salt)
        .map_err(internal_error)?
        .to_string();

    let role = payload.role.unwrap_or(UserRole::Salesman);
    let user = db::create_user(&state.pool, name, &email, &hash, role)
        .await
        .map_err(internal_error)?;

    tracing::info!(user_id = %user.id, ?role, "user registered");
    Ok(Json(profile(&user)))
}

async fn list_salesmen(
    UserSession(claims): UserSession,
    State(state): State<SharedState>,
) -> Result<Json<Vec<Profile>>, ApiError> {
    require_admin(&claims)?;

    let salesmen = db::list_salesmen(&state.pool)
        .await
        .map_err(internal_error)?;
    Ok(Json(salesmen.iter().map(profile).collect()))
}
