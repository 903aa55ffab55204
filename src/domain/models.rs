use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "user_role", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum UserRole {
    Admin,
    Salesman,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "lead_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeadStatus {
    New,
    Assigned,
    FollowUp,
    DealWon,
    NotInterested,
}

impl LeadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::New => "New",
            LeadStatus::Assigned => "Assigned",
            LeadStatus::FollowUp => "Follow-up",
            LeadStatus::DealWon => "Deal Won",
            LeadStatus::NotInterested => "Not Interested",
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "followup_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum FollowupStatus {
    Pending,
    Completed,
    Missed,
}

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub hash: String,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Lead {
    pub id: Uuid,
    pub sender_name: String,
    pub sender_email: String,
    pub phone: Option<String>,
    pub subject: String,
    pub body: String,
    pub status: LeadStatus,
    pub assigned_to: Option<Uuid>,
    pub source: String,
    pub whatsapp_greeting_sent: bool,
    pub whatsapp_greeting_sent_at: Option<DateTime<Utc>>,
    pub missed_followup_sent: bool,
    pub last_followup_at: Option<DateTime<Utc>>,
    pub not_interested_main_reason: Option<String>,
    pub not_interested_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Followup {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub salesman_id: Uuid,
    pub followup_date: NaiveDate,
    pub remarks: String,
    pub status: FollowupStatus,
    pub completion_date: Option<DateTime<Utc>>,
    pub completion_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Booking {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub salesman_id: Uuid,
    pub booking_date: NaiveDate,
    pub amount: f64,
    pub project: String,
    pub created_at: DateTime<Utc>,
}
