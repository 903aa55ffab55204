//! The two periodic follow-up sweeps. Both are idempotent: each run
//! only touches rows still matching its precondition, so overlapping
//! runs converge.

use crate::db::{self, StaleLead};
use crate::services::whatsapp::{render_template, Dispatcher, RetryPolicy, NUDGE_TEMPLATE};
use crate::state::SharedState;
use anyhow::Result;
use serde::Serialize;
use uuid::Uuid;

/// Sweep A: pending follow-ups whose due date has passed become MISSED.
pub async fn promote_missed_followups(state: &SharedState) -> Result<u64> {
    let promoted = db::promote_overdue_followups(&state.pool).await?;
    if promoted > 0 {
        tracing::info!(promoted, "overdue follow-ups marked as missed");
    }
    Ok(promoted)
}

/// Outcome of one Sweep B pass. For logging only, never persisted.
#[derive(Debug, Default, Serialize)]
pub struct SweepReport {
    pub total: usize,
    pub processed: usize,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
}

/// Sweep B: nudge leads whose salesman has gone quiet past the 48-hour
/// SLA. Success sets the sticky `missed_followup_sent` flag; failures
/// leave the lead eligible for the next pass.
pub async fn nudge_stale_leads(state: &SharedState) -> Result<SweepReport> {
    let candidates = db::stale_leads(&state.pool).await?;
    let (report, nudged) = run_nudges(state.whatsapp.as_ref(), &candidates).await;

    for lead_id in nudged {
        db::mark_lead_nudged(&state.pool, lead_id).await?;
    }

    if report.total > 0 {
        tracing::info!(
            total = report.total,
            successful = report.successful,
            failed = report.failed,
            skipped = report.skipped,
            "stale-lead nudge sweep finished"
        );
    }

    Ok(report)
}

/// Dispatches the re-engagement message to each candidate, sequentially
/// to bound load on the WhatsApp API. Returns the pass report and the
/// ids whose sticky flag should be set (successful sends only).
async fn run_nudges(
    dispatcher: &dyn Dispatcher,
    candidates: &[StaleLead],
) -> (SweepReport, Vec<Uuid>) {
    let mut report = SweepReport {
        total: candidates.len(),
        ..Default::default()
    };
    let mut nudged = Vec::new();

    for lead in candidates {
        let Some(phone) = lead.phone.as_deref().filter(|p| !p.is_empty()) else {
            report.skipped += 1;
            continue;
        };
        report.processed += 1;

        let message = render_template(
            NUDGE_TEMPLATE,
            &lead.sender_name,
            Some(&lead.salesman_email),
        );
        let outcome = dispatcher
            .send(phone, &message, lead.id, RetryPolicy::once())
            .await;

        if outcome.is_sent() {
            nudged.push(lead.id);
            report.successful += 1;
        } else {
            report.failed += 1;
            report.errors.push(format!(
                "lead {}: {}",
                lead.id,
                outcome.error_message().unwrap_or("unknown dispatch error")
            ));
        }
    }

    (report, nudged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::whatsapp::DispatchOutcome;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;

    /// Records sends; rejects one configured phone number.
    struct FakeDispatcher {
        reject_phone: Option<String>,
        sent: Mutex<Vec<(String, String)>>,
    }

    impl FakeDispatcher {
        fn new(reject_phone: Option<&str>) -> Self {
            Self {
                reject_phone: reject_phone.map(String::from),
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Dispatcher for FakeDispatcher {
        async fn send(
            &self,
            phone: &str,
            message: &str,
            _lead_id: Uuid,
            _policy: RetryPolicy,
        ) -> DispatchOutcome {
            if self.reject_phone.as_deref() == Some(phone) {
                return DispatchOutcome::Failed {
                    error: "upstream unavailable".into(),
                    api_error: Some("503".into()),
                };
            }
            self.sent
                .lock()
                .unwrap()
                .push((phone.to_string(), message.to_string()));
            DispatchOutcome::Sent {
                phone: phone.to_string(),
                message: message.to_string(),
                timestamp: Utc::now(),
                api_response: serde_json::Value::Null,
            }
        }
    }

    fn candidate(phone: Option<&str>) -> StaleLead {
        StaleLead {
            id: Uuid::new_v4(),
            sender_name: "Asha Verma".into(),
            phone: phone.map(String::from),
            salesman_email: "ravi@example.com".into(),
        }
    }

    #[tokio::test]
    async fn successful_sends_are_flagged_for_marking() {
        let dispatcher = FakeDispatcher::new(None);
        let leads = vec![candidate(Some("919876543210")), candidate(Some("919876543211"))];

        let (report, nudged) = run_nudges(&dispatcher, &leads).await;

        assert_eq!(report.total, 2);
        assert_eq!(report.processed, 2);
        assert_eq!(report.successful, 2);
        assert_eq!(report.failed, 0);
        assert_eq!(nudged, vec![leads[0].id, leads[1].id]);

        let sent = dispatcher.sent.lock().unwrap();
        assert!(sent[0].1.contains("Asha Verma"));
        assert!(sent[0].1.contains("ravi@example.com"));
    }

    #[tokio::test]
    async fn failed_sends_stay_eligible_and_are_recorded() {
        let dispatcher = FakeDispatcher::new(Some("919876543210"));
        let failing = candidate(Some("919876543210"));
        let passing = candidate(Some("919876543211"));
        let leads = vec![failing.clone(), passing.clone()];

        let (report, nudged) = run_nudges(&dispatcher, &leads).await;

        // Only the successful lead gets its sticky flag set; the failed
        // one is left untouched for the next pass.
        assert_eq!(nudged, vec![passing.id]);
        assert_eq!(report.successful, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains(&failing.id.to_string()));
        assert!(report.errors[0].contains("upstream unavailable"));
    }

    #[tokio::test]
    async fn missing_phone_is_skipped_without_dispatch() {
        let dispatcher = FakeDispatcher::new(None);
        let leads = vec![candidate(None), candidate(Some(""))];

        let (report, nudged) = run_nudges(&dispatcher, &leads).await;

        assert_eq!(report.total, 2);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.processed, 0);
        assert!(nudged.is_empty());
        assert!(dispatcher.sent.lock().unwrap().is_empty());
    }
}
