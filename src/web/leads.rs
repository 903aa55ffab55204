use crate::db;
use crate::domain::lifecycle::{plan_transition, StatusUpdate};
use crate::domain::models::{Booking, Followup, Lead, UserRole};
use crate::state::SharedState;
use crate::web::users::require_admin;
use crate::web::{api_error, internal_error, ApiError};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::web::session::UserSession;

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/all", get(list_all))
        .route("/assign", post(assign))
        .route("/my-leads", get(my_leads))
        .route("/update-status", post(update_status))
        .route("/today-followups", get(today_followups))
        .route("/bookings", get(list_bookings))
        .route("/admin-reports", get(admin_reports))
        .route("/kpi", get(own_kpi))
        .route("/kpi/:salesman_id", get(salesman_kpi))
        .route("/reset-missed-flag/:lead_id", post(reset_missed_flag))
        .route("/:lead_id/followups", get(lead_followups))
        .with_state(state)
}

async fn list_all(
    UserSession(claims): UserSession,
    State(state): State<SharedState>,
) -> Result<Json<Vec<db::LeadListing>>, ApiError> {
    require_admin(&claims)?;
    let leads = db::list_leads(&state.pool).await.map_err(internal_error)?;
    Ok(Json(leads))
}

#[derive(Debug, Deserialize)]
struct AssignRequest {
    lead_id: Uuid,
    salesman_id: Uuid,
}

async fn assign(
    UserSession(claims): UserSession,
    State(state): State<SharedState>,
    Json(payload): Json<AssignRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_admin(&claims)?;

    let salesman = db::find_user_by_id(&state.pool, payload.salesman_id)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "salesman not found"))?;
    if salesman.role != UserRole::Salesman {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "leads can only be assigned to salesmen",
        ));
    }

    let updated = db::assign_lead(&state.pool, payload.lead_id, payload.salesman_id)
        .await
        .map_err(internal_error)?;
    if !updated {
        return Err(api_error(StatusCode::NOT_FOUND, "lead not found"));
    }

    tracing::info!(lead_id = %payload.lead_id, salesman_id = %payload.salesman_id, "lead assigned");
    Ok(Json(json!({ "message": "Lead assigned" })))
}

async fn my_leads(
    UserSession(claims): UserSession,
    State(state): State<SharedState>,
) -> Result<Json<Vec<Lead>>, ApiError> {
    let leads = db::list_leads_for_salesman(&state.pool, claims.user_id)
        .await
        .map_err(internal_error)?;
    Ok(Json(leads))
}

#[derive(Debug, Deserialize)]
struct UpdateStatusRequest {
    lead_id: Uuid,
    #[serde(flatten)]
    update: StatusUpdate,
}

async fn update_status(
    UserSession(claims): UserSession,
    State(state): State<SharedState>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let lead = db::find_lead(&state.pool, payload.lead_id)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "lead not found"))?;

    // Salesmen only touch their own leads; admins may touch any.
    if claims.role != UserRole::Admin && lead.assigned_to != Some(claims.user_id) {
        return Err(api_error(
            StatusCode::FORBIDDEN,
            "lead is not assigned to you",
        ));
    }

    let plan = plan_transition(&payload.update)
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?;

    db::update_lead_status(&state.pool, lead.id, claims.user_id, &plan)
        .await
        .map_err(internal_error)?;

    tracing::info!(lead_id = %lead.id, status = plan.status.as_str(), "lead status updated");
    Ok(Json(json!({
        "message": format!("Lead status updated to {}", plan.status.as_str())
    })))
}

async fn today_followups(
    UserSession(claims): UserSession,
    State(state): State<SharedState>,
) -> Result<Json<Vec<db::DueFollowup>>, ApiError> {
    let scope = match claims.role {
        UserRole::Admin => None,
        UserRole::Salesman => Some(claims.user_id),
    };
    let followups = db::today_followups(&state.pool, scope)
        .await
        .map_err(internal_error)?;
    Ok(Json(followups))
}

async fn lead_followups(
    UserSession(claims): UserSession,
    State(state): State<SharedState>,
    Path(lead_id): Path<Uuid>,
) -> Result<Json<Vec<Followup>>, ApiError> {
    let lead = db::find_lead(&state.pool, lead_id)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "lead not found"))?;

    if claims.role != UserRole::Admin && lead.assigned_to != Some(claims.user_id) {
        return Err(api_error(
            StatusCode::FORBIDDEN,
            "lead is not assigned to you",
        ));
    }

    let followups = db::followups_for_lead(&state.pool, lead_id)
        .await
        .map_err(internal_error)?;
    Ok(Json(followups))
}

async fn list_bookings(
    UserSession(claims): UserSession,
    State(state): State<SharedState>,
) -> Result<Json<Vec<Booking>>, ApiError> {
    require_admin(&claims)?;
    let bookings = db::list_bookings(&state.pool)
        .await
        .map_err(internal_error)?;
    Ok(Json(bookings))
}

async fn admin_reports(
    UserSession(claims): UserSession,
    State(state): State<SharedState>,
) -> Result<Json<db::AdminReport>, ApiError> {
    require_admin(&claims)?;
    let report = db::admin_report(&state.pool)
        .await
        .map_err(internal_error)?;
    Ok(Json(report))
}

#[derive(Debug, Serialize)]
pub struct Kpi {
    pub total: i64,
    pub won: i64,
    pub missed: i64,
    pub success_rate: f64,
}

/// Win percentage over all leads in scope; zero leads means a zero
/// rate rather than a division error.
pub fn success_rate(total: i64, won: i64) -> f64 {
    if total == 0 {
        0.0
    } else {
        won as f64 * 100.0 / total as f64
    }
}

fn build_kpi(counts: db::KpiCounts) -> Kpi {
    Kpi {
        total: counts.total,
        won: counts.won,
        missed: counts.missed,
        success_rate: success_rate(counts.total, counts.won),
    }
}

/// Own KPI for a salesman; the global picture for an admin.
async fn own_kpi(
    UserSession(claims): UserSession,
    State(state): State<SharedState>,
) -> Result<Json<Kpi>, ApiError> {
    let scope = match claims.role {
        UserRole::Admin => None,
        UserRole::Salesman => Some(claims.user_id),
    };
    let counts = db::kpi_counts(&state.pool, scope)
        .await
        .map_err(internal_error)?;
    Ok(Json(build_kpi(counts)))
}

async fn salesman_kpi(
    UserSession(claims): UserSession,
    State(state): State<SharedState>,
    Path(salesman_id): Path<Uuid>,
) -> Result<Json<Kpi>, ApiError> {
    require_admin(&claims)?;

    db::find_user_by_id(&state.pool, salesman_id)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "salesman not found"))?;

    let counts = db::kpi_counts(&state.pool, Some(salesman_id))
        .await
        .map_err(internal_error)?;
    Ok(Json(build_kpi(counts)))
}

async fn reset_missed_flag(
    UserSession(claims): UserSession,
    State(state): State<SharedState>,
    Path(lead_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_admin(&claims)?;

    let updated = db::reset_missed_flag(&state.pool, lead_id)
        .await
        .map_err(internal_error)?;
    if !updated {
        return Err(api_error(StatusCode::NOT_FOUND, "lead not found"));
    }

    tracing::info!(%lead_id, "missed-followup flag reset");
    Ok(Json(json!({ "message": "Missed follow-up flag reset" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_rate_handles_zero_leads() {
        assert_eq!(success_rate(0, 0), 0.0);
    }

    #[test]
    fn success_rate_is_a_percentage() {
        assert_eq!(success_rate(4, 1), 25.0);
        assert_eq!(success_rate(3, 3), 100.0);
    }
}
