//! Lead status transition rules.
//!
//! Every status change supersedes the lead's open follow-up loop: all
//! PENDING/MISSED follow-up rows are force-completed before the new
//! status takes effect. What else happens depends on the target status
//! and is captured here as a [`TransitionPlan`] so the persistence layer
//! only has to execute it inside one transaction.

use crate::domain::models::LeadStatus;
use chrono::NaiveDate;
use serde::Deserialize;

/// Client payload for a status update. Optional fields matter only for
/// the statuses that consume them.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusUpdate {
    pub status: LeadStatus,
    pub followup_date: Option<NaiveDate>,
    pub remarks: Option<String>,
    pub amount: Option<f64>,
    pub project: Option<String>,
    pub booking_date: Option<NaiveDate>,
    pub main_reason: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SideEffect {
    OpenFollowup {
        followup_date: NaiveDate,
        remarks: String,
    },
    RecordBooking {
        booking_date: NaiveDate,
        amount: f64,
        project: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransitionPlan {
    pub status: LeadStatus,
    /// Persisted as-is for Not Interested, cleared for everything else.
    pub main_reason: Option<String>,
    pub reason: Option<String>,
    pub side_effect: Option<SideEffect>,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum LifecycleError {
    #[error("follow-up date is required for Follow-up status")]
    MissingFollowupDate,
    #[error("amount, project and booking date are required for Deal Won status")]
    MissingBookingFields,
}

/// Builds the transition plan for a requested status change.
///
/// The detailed `reason` survives only when the main reason is "Other";
/// structured reasons carry enough information on their own.
pub fn plan_transition(update: &StatusUpdate) -> Result<TransitionPlan, LifecycleError> {
    let (main_reason, reason) = match update.status {
        LeadStatus::NotInterested => {
            let main = update.main_reason.clone();
            let detail = match main.as_deref() {
                Some("Other") => update.reason.clone(),
                _ => None,
            };
            (main, detail)
        }
        _ => (None, None),
    };

    let side_effect = match update.status {
        LeadStatus::FollowUp => {
            let followup_date = update
                .followup_date
                .ok_or(LifecycleError::MissingFollowupDate)?;
            Some(SideEffect::OpenFollowup {
                followup_date,
                remarks: update.remarks.clone().unwrap_or_default(),
            })
        }
        LeadStatus::DealWon => {
            let (amount, project, booking_date) = match (
                update.amount,
                update.project.as_deref(),
                update.booking_date,
            ) {
                (Some(a), Some(p), Some(d)) if !p.trim().is_empty() => (a, p.to_string(), d),
                _ => return Err(LifecycleError::MissingBookingFields),
            };
            Some(SideEffect::RecordBooking {
                booking_date,
                amount,
                project,
            })
        }
        LeadStatus::New | LeadStatus::Assigned | LeadStatus::NotInterested => None,
    };

    Ok(TransitionPlan {
        status: update.status,
        main_reason,
        reason,
        side_effect,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(status: LeadStatus) -> StatusUpdate {
        StatusUpdate {
            status,
            followup_date: None,
            remarks: None,
            amount: None,
            project: None,
            booking_date: None,
            main_reason: None,
            reason: None,
        }
    }

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn follow_up_requires_a_date() {
        assert_eq!(
            plan_transition(&update(LeadStatus::FollowUp)),
            Err(LifecycleError::MissingFollowupDate)
        );
    }

    #[test]
    fn follow_up_opens_a_pending_followup() {
        let mut u = update(LeadStatus::FollowUp);
        u.followup_date = Some(date("2026-09-01"));
        u.remarks = Some("call after lunch".into());

        let plan = plan_transition(&u).unwrap();
        assert_eq!(
            plan.side_effect,
            Some(SideEffect::OpenFollowup {
                followup_date: date("2026-09-01"),
                remarks: "call after lunch".into(),
            })
        );
        assert_eq!(plan.main_reason, None);
        assert_eq!(plan.reason, None);
    }

    #[test]
    fn deal_won_requires_booking_fields() {
        let mut u = update(LeadStatus::DealWon);
        u.amount = Some(250_000.0);
        assert_eq!(
            plan_transition(&u),
            Err(LifecycleError::MissingBookingFields)
        );
    }

    #[test]
    fn deal_won_records_a_booking() {
        let mut u = update(LeadStatus::DealWon);
        u.amount = Some(250_000.0);
        u.project = Some("Sunrise Meadows".into());
        u.booking_date = Some(date("2026-08-30"));

        let plan = plan_transition(&u).unwrap();
        assert_eq!(
            plan.side_effect,
            Some(SideEffect::RecordBooking {
                booking_date: date("2026-08-30"),
                amount: 250_000.0,
                project: "Sunrise Meadows".into(),
            })
        );
    }

    #[test]
    fn other_reason_detail_is_kept_verbatim() {
        let mut u = update(LeadStatus::NotInterested);
        u.main_reason = Some("Other".into());
        u.reason = Some("moving abroad next month".into());

        let plan = plan_transition(&u).unwrap();
        assert_eq!(plan.main_reason.as_deref(), Some("Other"));
        assert_eq!(plan.reason.as_deref(), Some("moving abroad next month"));
        assert_eq!(plan.side_effect, None);
    }

    #[test]
    fn structured_reason_drops_the_detail() {
        let mut u = update(LeadStatus::NotInterested);
        u.main_reason = Some("Budget".into());
        u.reason = Some("should be ignored".into());

        let plan = plan_transition(&u).unwrap();
        assert_eq!(plan.main_reason.as_deref(), Some("Budget"));
        assert_eq!(plan.reason, None);
    }

    #[test]
    fn other_statuses_clear_stale_reasons() {
        let mut u = update(LeadStatus::Assigned);
        u.main_reason = Some("Budget".into());
        u.reason = Some("stale".into());

        let plan = plan_transition(&u).unwrap();
        assert_eq!(plan.main_reason, None);
        assert_eq!(plan.reason, None);
        assert_eq!(plan.side_effect, None);
    }
}
