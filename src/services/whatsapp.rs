//! Outbound WhatsApp messages via the third-party scheduling API.
//!
//! Expected failures (invalid phone, upstream error, timeout) come back
//! as a tagged [`DispatchOutcome`], never as `Err`; retry is the
//! caller's choice through [`RetryPolicy`].

use crate::domain::phone::normalize_phone;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::time::Duration;
use uuid::Uuid;

pub const GREETING_TEMPLATE: &str = "Hi {name}! Thank you for your enquiry. \
Our team has received your details and a sales advisor will contact you shortly.";

pub const NUDGE_TEMPLATE: &str = "Hi {name}, we are sorry for the delay in \
getting back to you. Your sales advisor ({salesman}) will reach out within \
the next few hours. Thank you for your patience!";

const DISPATCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Fills the `{name}` (and optional `{salesman}`) placeholders.
pub fn render_template(template: &str, name: &str, salesman: Option<&str>) -> String {
    let mut message = template.replace("{name}", name);
    if let Some(salesman) = salesman {
        message = message.replace("{salesman}", salesman);
    }
    message
}

/// Bounded retry for a periodic job. `delay` applies between attempts.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    /// One attempt, no waiting. Used by the stale-lead sweep, which
    /// retries naturally on its next pass.
    pub const fn once() -> Self {
        Self {
            attempts: 1,
            delay: Duration::ZERO,
        }
    }

    /// Default for the greeting cron wrapper.
    pub const fn greeting_default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub enum DispatchOutcome {
    Sent {
        phone: String,
        message: String,
        timestamp: DateTime<Utc>,
        api_response: serde_json::Value,
    },
    Failed {
        error: String,
        api_error: Option<String>,
    },
}

impl DispatchOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, DispatchOutcome::Sent { .. })
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            DispatchOutcome::Sent { .. } => None,
            DispatchOutcome::Failed { error, .. } => Some(error),
        }
    }
}

/// Outbound message transport. The production implementation talks to
/// the WhatsApp scheduling API; tests substitute an in-memory fake.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Sends one message to `phone`, retrying upstream failures per
    /// `policy`. The phone is normalized first; an unusable number
    /// fails before any network traffic and is never retried.
    async fn send(
        &self,
        phone: &str,
        message: &str,
        lead_id: Uuid,
        policy: RetryPolicy,
    ) -> DispatchOutcome;

    /// Renders the `{name}` placeholder into `template` and sends the
    /// result to `phone`.
    async fn send_greeting(
        &self,
        phone: &str,
        name: &str,
        lead_id: Uuid,
        template: &str,
        policy: RetryPolicy,
    ) -> DispatchOutcome {
        let message = render_template(template, name, None);
        self.send(phone, &message, lead_id, policy).await
    }
}

pub struct WhatsAppDispatcher {
    client: reqwest::Client,
    api_url: String,
}

impl WhatsAppDispatcher {
    pub fn new(api_url: String) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DISPATCH_TIMEOUT)
            .build()?;
        Ok(Self { client, api_url })
    }

    async fn dispatch(&self, phone: &str, message: &str, lead_id: Uuid) -> DispatchOutcome {
        let payload = json!({ "phone": phone, "message": message });

        let response = match self.client.post(&self.api_url).json(&payload).send().await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::error!(%lead_id, phone, error = %e, "whatsapp request failed");
                return DispatchOutcome::Failed {
                    error: e.to_string(),
                    api_error: None,
                };
            }
        };

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            tracing::error!(%lead_id, phone, %status, api_error = %body, "whatsapp API rejected message");
            return DispatchOutcome::Failed {
                error: format!("whatsapp API returned {status}"),
                api_error: Some(body),
            };
        }

        let api_response = serde_json::from_str(&body).unwrap_or(serde_json::Value::String(body));
        let timestamp = Utc::now();
        tracing::info!(
            %lead_id,
            phone,
            %timestamp,
            response = %api_response,
            "whatsapp message sent"
        );

        DispatchOutcome::Sent {
            phone: phone.to_string(),
            message: message.to_string(),
            timestamp,
            api_response,
        }
    }
}

#[async_trait]
impl Dispatcher for WhatsAppDispatcher {
    async fn send(
        &self,
        phone: &str,
        message: &str,
        lead_id: Uuid,
        policy: RetryPolicy,
    ) -> DispatchOutcome {
        let Some(canonical) = normalize_phone(phone) else {
            tracing::warn!(%lead_id, phone, "invalid phone number, dispatch skipped");
            return DispatchOutcome::Failed {
                error: format!("invalid phone number: {phone}"),
                api_error: None,
            };
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            let outcome = self.dispatch(&canonical, message, lead_id).await;
            if outcome.is_sent() || attempt >= policy.attempts.max(1) {
                return outcome;
            }
            tracing::warn!(
                %lead_id,
                attempt,
                max_attempts = policy.attempts,
                "whatsapp dispatch failed, retrying after {:?}",
                policy.delay
            );
            tokio::time::sleep(policy.delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_substitutes_name() {
        let msg = render_template(GREETING_TEMPLATE, "Asha", None);
        assert!(msg.starts_with("Hi Asha!"));
        assert!(!msg.contains("{name}"));
    }

    #[test]
    fn template_substitutes_salesman() {
        let msg = render_template(NUDGE_TEMPLATE, "Asha", Some("ravi@example.com"));
        assert!(msg.contains("ravi@example.com"));
        assert!(!msg.contains("{salesman}"));
    }

    #[tokio::test]
    async fn invalid_phone_fails_without_network() {
        // Unroutable URL: if dispatch tried the network this would hang
        // on the timeout instead of returning immediately.
        let dispatcher = WhatsAppDispatcher::new("http://invalid.test/send".into()).unwrap();
        let outcome = dispatcher
            .send_greeting(
                "abc",
                "Asha",
                Uuid::new_v4(),
                GREETING_TEMPLATE,
                RetryPolicy::once(),
            )
            .await;
        match outcome {
            DispatchOutcome::Failed { error, api_error } => {
                assert!(error.contains("invalid phone"));
                assert!(api_error.is_none());
            }
            DispatchOutcome::Sent { .. } => panic!("expected failure"),
        }
    }

    #[tokio::test]
    async fn retry_skips_permanently_invalid_numbers() {
        let dispatcher = WhatsAppDispatcher::new("http://invalid.test/send".into()).unwrap();
        let started = std::time::Instant::now();
        let outcome = dispatcher
            .send("12", "hello", Uuid::new_v4(), RetryPolicy::greeting_default())
            .await;
        assert!(!outcome.is_sent());
        // No 30s retry delays were served.
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
