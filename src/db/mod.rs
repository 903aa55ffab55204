use crate::domain::lifecycle::{SideEffect, TransitionPlan};
use crate::domain::models::{Booking, Followup, FollowupStatus, Lead, LeadStatus, User, UserRole};
use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

pub const MISSED_NOTE: &str = "Automatically marked as missed - due date passed";

/// Hours of follow-up silence after which an assigned lead counts as stale.
pub const STALE_LEAD_SLA_HOURS: i64 = 48;

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

pub async fn create_user(
    pool: &PgPool,
    name: &str,
    email: &str,
    hash: &str,
    role: UserRole,
) -> Result<User> {
    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (name, email, hash, role)
        VALUES ($1, $2, $3, $4)
        RETURNING id, name, email, hash, role, created_at
        "#,
    )
    .bind(name)
    .bind(email)
    .bind(hash)
    .bind(role)
    .fetch_one(pool)
    .await?;
    Ok(user)
}

pub async fn find_user_by_email(pool: &PgPool, email: &str) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>(
        "SELECT id, name, email, hash, role, created_at FROM users WHERE email = $1",
    )
    .bind(email)
    .fetch_optional(pool)
    .await?;
    Ok(user)
}

pub async fn find_user_by_id(pool: &PgPool, id: Uuid) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>(
        "SELECT id, name, email, hash, role, created_at FROM users WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(user)
}

pub async fn list_salesmen(pool: &PgPool) -> Result<Vec<User>> {
    let users = sqlx::query_as::<_, User>(
        r#"
        SELECT id, name, email, hash, role, created_at
        FROM users
        WHERE role = 'SALESMAN'
        ORDER BY name
        "#,
    )
    .fetch_all(pool)
    .await?;
    Ok(users)
}

// ---------------------------------------------------------------------------
// Leads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct NewLead {
    pub sender_name: String,
    pub sender_email: String,
    pub phone: Option<String>,
    pub subject: String,
    pub body: String,
    pub source: String,
}

/// Inserts a lead unless one already exists for the same
/// `(sender_email, subject)` pair. Returns `None` on the duplicate path.
pub async fn insert_lead(pool: &PgPool, draft: &NewLead) -> Result<Option<Lead>> {
    let lead = sqlx::query_as::<_, Lead>(
        r#"
        INSERT INTO leads (sender_name, sender_email, phone, subject, body, source)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (sender_email, subject) DO NOTHING
        RETURNING *
        "#,
    )
    .bind(&draft.sender_name)
    .bind(&draft.sender_email)
    .bind(&draft.phone)
    .bind(&draft.subject)
    .bind(&draft.body)
    .bind(&draft.source)
    .fetch_optional(pool)
    .await?;
    Ok(lead)
}

pub async fn find_lead(pool: &PgPool, id: Uuid) -> Result<Option<Lead>> {
    let lead = sqlx::query_as::<_, Lead>("SELECT * FROM leads WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(lead)
}

/// Admin listing: every lead with its booking, if one was recorded.
#[derive(Debug, Serialize, FromRow)]
pub struct LeadListing {
    pub id: Uuid,
    pub sender_name: String,
    pub sender_email: String,
    pub phone: Option<String>,
    pub subject: String,
    pub status: LeadStatus,
    pub assigned_to: Option<Uuid>,
    pub salesman_name: Option<String>,
    pub source: String,
    pub missed_followup_sent: bool,
    pub last_followup_at: Option<DateTime<Utc>>,
    pub not_interested_main_reason: Option<String>,
    pub not_interested_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub booking_date: Option<NaiveDate>,
    pub booking_amount: Option<f64>,
    pub booking_project: Option<String>,
}

pub async fn list_leads(pool: &PgPool) -> Result<Vec<LeadListing>> {
    let leads = sqlx::query_as::<_, LeadListing>(
        r#"
        SELECT
            l.id, l.sender_name, l.sender_email, l.phone, l.subject, l.status,
            l.assigned_to, u.name AS salesman_name, l.source,
            l.missed_followup_sent, l.last_followup_at,
            l.not_interested_main_reason, l.not_interested_reason, l.created_at,
            b.booking_date, b.amount AS booking_amount, b.project AS booking_project
        FROM leads l
        LEFT JOIN users u ON u.id = l.assigned_to
        LEFT JOIN LATERAL (
            SELECT booking_date, amount, project
            FROM bookings
            WHERE lead_id = l.id
            ORDER BY created_at DESC
            LIMIT 1
        ) b ON TRUE
        ORDER BY l.created_at DESC
        "#,
    )
    .fetch_all(pool)
    .await?;
    Ok(leads)
}

pub async fn list_leads_for_salesman(pool: &PgPool, salesman_id: Uuid) -> Result<Vec<Lead>> {
    let leads = sqlx::query_as::<_, Lead>(
        "SELECT * FROM leads WHERE assigned_to = $1 ORDER BY created_at DESC",
    )
    .bind(salesman_id)
    .fetch_all(pool)
    .await?;
    Ok(leads)
}

/// Single-statement assignment. Re-assignment silently overwrites.
pub async fn assign_lead(pool: &PgPool, lead_id: Uuid, salesman_id: Uuid) -> Result<bool> {
    let result = sqlx::query("UPDATE leads SET assigned_to = $1, status = 'ASSIGNED' WHERE id = $2")
        .bind(salesman_id)
        .bind(lead_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() == 1)
}

/// Applies a planned status transition atomically: the status (and
/// not-interested reasons) change, all open follow-ups are superseded,
/// and any new follow-up or booking row lands in the same transaction.
pub async fn update_lead_status(
    pool: &PgPool,
    lead_id: Uuid,
    salesman_id: Uuid,
    plan: &TransitionPlan,
) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        UPDATE leads
        SET status = $1,
            not_interested_main_reason = $2,
            not_interested_reason = $3
        WHERE id = $4
        "#,
    )
    .bind(plan.status)
    .bind(&plan.main_reason)
    .bind(&plan.reason)
    .bind(lead_id)
    .execute(&mut *tx)
    .await?;

    // Any status change closes the lead's open follow-up loop.
    sqlx::query(
        r#"
        UPDATE followups
        SET status = 'COMPLETED', updated_at = now()
        WHERE lead_id = $1 AND status IN ('PENDING', 'MISSED')
        "#,
    )
    .bind(lead_id)
    .execute(&mut *tx)
    .await?;

    match &plan.side_effect {
        Some(SideEffect::OpenFollowup {
            followup_date,
            remarks,
        }) => {
            sqlx::query(
                r#"
                INSERT INTO followups (lead_id, salesman_id, followup_date, remarks, status)
                VALUES ($1, $2, $3, $4, 'PENDING')
                "#,
            )
            .bind(lead_id)
            .bind(salesman_id)
            .bind(followup_date)
            .bind(remarks)
            .execute(&mut *tx)
            .await?;
        }
        Some(SideEffect::RecordBooking {
            booking_date,
            amount,
            project,
        }) => {
            sqlx::query(
                r#"
                INSERT INTO bookings (lead_id, salesman_id, booking_date, amount, project)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(lead_id)
            .bind(salesman_id)
            .bind(booking_date)
            .bind(amount)
            .bind(project)
            .execute(&mut *tx)
            .await?;
        }
        None => {}
    }

    tx.commit().await?;
    Ok(())
}

/// Manual reset of the sticky nudge flag (admin/testing escape hatch).
pub async fn reset_missed_flag(pool: &PgPool, lead_id: Uuid) -> Result<bool> {
    let result = sqlx::query("UPDATE leads SET missed_followup_sent = FALSE WHERE id = $1")
        .bind(lead_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() == 1)
}

// ---------------------------------------------------------------------------
// Follow-ups
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, FromRow)]
pub struct DueFollowup {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub sender_name: String,
    pub phone: Option<String>,
    pub followup_date: NaiveDate,
    pub remarks: String,
    pub status: FollowupStatus,
}

/// Pending follow-ups due today, optionally restricted to one salesman.
pub async fn today_followups(pool: &PgPool, salesman_id: Option<Uuid>) -> Result<Vec<DueFollowup>> {
    let followups = sqlx::query_as::<_, DueFollowup>(
        r#"
        SELECT f.id, f.lead_id, l.sender_name, l.phone,
               f.followup_date, f.remarks, f.status
        FROM followups f
        JOIN leads l ON l.id = f.lead_id
        WHERE f.status = 'PENDING'
          AND f.followup_date = CURRENT_DATE
          AND ($1::uuid IS NULL OR f.salesman_id = $1)
        ORDER BY f.created_at
        "#,
    )
    .bind(salesman_id)
    .fetch_all(pool)
    .await?;
    Ok(followups)
}

pub async fn followups_for_lead(pool: &PgPool, lead_id: Uuid) -> Result<Vec<Followup>> {
    let followups = sqlx::query_as::<_, Followup>(
        "SELECT * FROM followups WHERE lead_id = $1 ORDER BY created_at DESC",
    )
    .bind(lead_id)
    .fetch_all(pool)
    .await?;
    Ok(followups)
}

// ---------------------------------------------------------------------------
// Bookings
// ---------------------------------------------------------------------------

pub async fn list_bookings(pool: &PgPool) -> Result<Vec<Booking>> {
    let bookings =
        sqlx::query_as::<_, Booking>("SELECT * FROM bookings ORDER BY created_at DESC")
            .fetch_all(pool)
            .await?;
    Ok(bookings)
}

// ---------------------------------------------------------------------------
// Scheduler sweeps
// ---------------------------------------------------------------------------

/// Sweep A: one set-based update, idempotent by construction. Only rows
/// still PENDING with a due date in the past are touched.
pub async fn promote_overdue_followups(pool: &PgPool) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE followups
        SET status = 'MISSED',
            completion_date = now(),
            completion_notes = $1,
            updated_at = now()
        WHERE status = 'PENDING' AND followup_date < CURRENT_DATE
        "#,
    )
    .bind(MISSED_NOTE)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

#[derive(Debug, Clone, FromRow)]
pub struct StaleLead {
    pub id: Uuid,
    pub sender_name: String,
    pub phone: Option<String>,
    pub salesman_email: String,
}

/// Sweep B candidates: assigned, reachable, not in a terminal status,
/// not yet nudged, and silent past the SLA window. "Silent" means the
/// newest follow-up (falling back to `last_followup_at`, then to the
/// lead's creation) is older than [`STALE_LEAD_SLA_HOURS`].
pub async fn stale_leads(pool: &PgPool) -> Result<Vec<StaleLead>> {
    let leads = sqlx::query_as::<_, StaleLead>(
        r#"
        SELECT l.id, l.sender_name, l.phone, u.email AS salesman_email
        FROM leads l
        JOIN users u ON u.id = l.assigned_to
        WHERE l.phone IS NOT NULL AND l.phone <> ''
          AND l.status NOT IN ('DEAL_WON', 'NOT_INTERESTED')
          AND l.missed_followup_sent = FALSE
          AND COALESCE(
                (SELECT MAX(f.created_at) FROM followups f WHERE f.lead_id = l.id),
                l.last_followup_at,
                l.created_at
              ) < now() - make_interval(hours => $1)
        ORDER BY l.created_at
        "#,
    )
    .bind(STALE_LEAD_SLA_HOURS as i32)
    .fetch_all(pool)
    .await?;
    Ok(leads)
}

/// Records a successful nudge. The flag is sticky: nothing resets it
/// automatically.
pub async fn mark_lead_nudged(pool: &PgPool, lead_id: Uuid) -> Result<()> {
    sqlx::query(
        "UPDATE leads SET missed_followup_sent = TRUE, last_followup_at = now() WHERE id = $1",
    )
    .bind(lead_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Fresh leads with a phone number that never got the welcome message.
pub async fn greeting_candidates(pool: &PgPool) -> Result<Vec<Lead>> {
    let leads = sqlx::query_as::<_, Lead>(
        r#"
        SELECT * FROM leads
        WHERE whatsapp_greeting_sent = FALSE
          AND phone IS NOT NULL AND phone <> ''
        ORDER BY created_at
        "#,
    )
    .fetch_all(pool)
    .await?;
    Ok(leads)
}

pub async fn mark_greeting_sent(pool: &PgPool, lead_id: Uuid) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE leads
        SET whatsapp_greeting_sent = TRUE, whatsapp_greeting_sent_at = now()
        WHERE id = $1
        "#,
    )
    .bind(lead_id)
    .execute(pool)
    .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, FromRow)]
pub struct AdminReport {
    pub total_leads: i64,
    pub new_leads: i64,
    pub assigned_leads: i64,
    pub follow_up_leads: i64,
    pub won_leads: i64,
    pub not_interested_leads: i64,
    pub total_bookings: i64,
    pub booking_amount: f64,
    pub pending_followups: i64,
    pub missed_followups: i64,
}

pub async fn admin_report(pool: &PgPool) -> Result<AdminReport> {
    let report = sqlx::query_as::<_, AdminReport>(
        r#"
        SELECT
            (SELECT COUNT(*) FROM leads) AS total_leads,
            (SELECT COUNT(*) FROM leads WHERE status = 'NEW') AS new_leads,
            (SELECT COUNT(*) FROM leads WHERE status = 'ASSIGNED') AS assigned_leads,
            (SELECT COUNT(*) FROM leads WHERE status = 'FOLLOW_UP') AS follow_up_leads,
            (SELECT COUNT(*) FROM leads WHERE status = 'DEAL_WON') AS won_leads,
            (SELECT COUNT(*) FROM leads WHERE status = 'NOT_INTERESTED') AS not_interested_leads,
            (SELECT COUNT(*) FROM bookings) AS total_bookings,
            (SELECT COALESCE(SUM(amount), 0) FROM bookings) AS booking_amount,
            (SELECT COUNT(*) FROM followups WHERE status = 'PENDING') AS pending_followups,
            (SELECT COUNT(*) FROM followups WHERE status = 'MISSED') AS missed_followups
        "#,
    )
    .fetch_one(pool)
    .await?;
    Ok(report)
}

#[derive(Debug, FromRow)]
pub struct KpiCounts {
    pub total: i64,
    pub won: i64,
    pub missed: i64,
}

/// Raw KPI counts, globally or per salesman.
pub async fn kpi_counts(pool: &PgPool, salesman_id: Option<Uuid>) -> Result<KpiCounts> {
    let counts = sqlx::query_as::<_, KpiCounts>(
        r#"
        SELECT
            (SELECT COUNT(*) FROM leads
             WHERE $1::uuid IS NULL OR assigned_to = $1) AS total,
            (SELECT COUNT(*) FROM leads
             WHERE status = 'DEAL_WON' AND ($1::uuid IS NULL OR assigned_to = $1)) AS won,
            (SELECT COUNT(*) FROM followups
             WHERE status = 'MISSED' AND ($1::uuid IS NULL OR salesman_id = $1)) AS missed
        "#,
    )
    .bind(salesman_id)
    .fetch_one(pool)
    .await?;
    Ok(counts)
}
