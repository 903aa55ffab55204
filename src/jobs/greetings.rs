//! Welcome-message pass for freshly imported leads.

use crate::db;
use crate::services::whatsapp::{Dispatcher, RetryPolicy, GREETING_TEMPLATE};
use crate::state::SharedState;
use anyhow::Result;

/// Sends the greeting to every lead that has a phone number and no
/// greeting on record. Dispatch failures leave the flag untouched, so
/// the lead is picked up again on the next cycle.
pub async fn run_greeting_pass(state: &SharedState) -> Result<(usize, usize)> {
    let candidates = db::greeting_candidates(&state.pool).await?;
    let mut sent = 0;
    let mut failed = 0;

    for lead in candidates {
        let Some(phone) = lead.phone.as_deref() else {
            continue;
        };
        let outcome = state
            .whatsapp
            .send_greeting(
                phone,
                &lead.sender_name,
                lead.id,
                GREETING_TEMPLATE,
                RetryPolicy::greeting_default(),
            )
            .await;

        if outcome.is_sent() {
            db::mark_greeting_sent(&state.pool, lead.id).await?;
            sent += 1;
        } else {
            failed += 1;
        }
    }

    if sent > 0 || failed > 0 {
        tracing::info!(sent, failed, "greeting pass finished");
    }
    Ok((sent, failed))
}
