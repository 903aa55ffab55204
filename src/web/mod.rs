pub mod leads;
pub mod session;
pub mod users;

use crate::state::SharedState;
use axum::{http::StatusCode, routing::get, Json, Router};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

pub type ApiError = (StatusCode, Json<ErrorBody>);

pub fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
}

pub fn internal_error<E: std::fmt::Display>(e: E) -> ApiError {
    tracing::error!("internal error: {}", e);
    api_error(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
}

async fn health() -> &'static str {
    "OK"
}

pub fn routes(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/users", users::router(state.clone()))
        .nest("/api/leads", leads::router(state))
}
