//! Mailbox ingestion: turns unseen inbox messages into lead rows.
//!
//! The mailbox protocol lives behind [`MailSource`]; this module only
//! knows about parsed messages. Deduplication is the database's job:
//! the unique `(sender_email, subject)` index makes reimports a no-op.

use crate::db::{self, NewLead};
use crate::domain::phone::extract_phone;
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use sqlx::PgPool;

/// A parsed, not-yet-imported inbox message.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundMail {
    pub id: String,
    pub sender_name: String,
    pub sender_email: String,
    pub subject: String,
    pub body: String,
}

/// Narrow seam for the mailbox. The IMAP/gateway plumbing stays outside
/// the core; tests substitute an in-memory source.
#[async_trait]
pub trait MailSource: Send + Sync {
    async fn fetch_unseen(&self) -> Result<Vec<InboundMail>>;
    async fn mark_seen(&self, ids: &[String]) -> Result<()>;
}

/// Mailbox gateway speaking JSON over HTTP: `GET {base}/unseen` lists
/// parsed messages, `POST {base}/seen` flags them on the remote inbox.
pub struct HttpMailSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpMailSource {
    pub fn new(base_url: String) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self { client, base_url })
    }
}

#[async_trait]
impl MailSource for HttpMailSource {
    async fn fetch_unseen(&self) -> Result<Vec<InboundMail>> {
        let mails = self
            .client
            .get(format!("{}/unseen", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(mails)
    }

    async fn mark_seen(&self, ids: &[String]) -> Result<()> {
        self.client
            .post(format!("{}/seen", self.base_url))
            .json(&json!({ "ids": ids }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Known portal domains, matched against subject and body.
const SOURCE_KEYWORDS: &[(&str, &str)] = &[
    ("magicbricks", "MagicBricks"),
    ("99acres", "99acres"),
    ("housing.com", "Housing"),
    ("nobroker", "NoBroker"),
    ("olx", "OLX"),
    ("justdial", "JustDial"),
];

/// Coarse source tag for a message; falls back to "Website".
pub fn derive_source(subject: &str, body: &str) -> &'static str {
    let haystack = format!("{} {}", subject.to_lowercase(), body.to_lowercase());
    for (keyword, label) in SOURCE_KEYWORDS {
        if haystack.contains(keyword) {
            return label;
        }
    }
    "Website"
}

pub fn draft_from_mail(mail: &InboundMail) -> NewLead {
    NewLead {
        sender_name: mail.sender_name.trim().to_string(),
        sender_email: mail.sender_email.trim().to_lowercase(),
        phone: extract_phone(&mail.body),
        subject: mail.subject.trim().to_string(),
        body: mail.body.clone(),
        source: derive_source(&mail.subject, &mail.body).to_string(),
    }
}

#[derive(Debug, Default)]
pub struct IngestReport {
    pub fetched: usize,
    pub inserted: usize,
    pub duplicates: usize,
    pub errors: usize,
}

/// One ingestion pass: fetch unseen mail, insert each as a lead (the
/// unique index swallows duplicates), then mark everything seen. A
/// fetch failure aborts the pass; the next run starts from scratch.
pub async fn run_ingestion(pool: &PgPool, source: &dyn MailSource) -> Result<IngestReport> {
    let mails = source.fetch_unseen().await?;
    let mut report = IngestReport {
        fetched: mails.len(),
        ..Default::default()
    };

    let mut processed_ids = Vec::with_capacity(mails.len());
    for mail in &mails {
        let draft = draft_from_mail(mail);
        match db::insert_lead(pool, &draft).await {
            Ok(Some(lead)) => {
                report.inserted += 1;
                tracing::info!(
                    lead_id = %lead.id,
                    sender = %draft.sender_email,
                    source = %draft.source,
                    "lead imported from inbox"
                );
            }
            Ok(None) => {
                report.duplicates += 1;
                tracing::debug!(
                    sender = %draft.sender_email,
                    subject = %draft.subject,
                    "duplicate lead skipped"
                );
            }
            Err(e) => {
                report.errors += 1;
                tracing::error!(sender = %draft.sender_email, error = %e, "lead insert failed");
            }
        }
        processed_ids.push(mail.id.clone());
    }

    if !processed_ids.is_empty() {
        source.mark_seen(&processed_ids).await?;
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mail(subject: &str, body: &str) -> InboundMail {
        InboundMail {
            id: "1".into(),
            sender_name: " Asha Verma ".into(),
            sender_email: "Asha@Example.com ".into(),
            subject: subject.into(),
            body: body.into(),
        }
    }

    #[test]
    fn tags_known_portals() {
        assert_eq!(derive_source("New enquiry via MagicBricks", ""), "MagicBricks");
        assert_eq!(derive_source("Re: flat", "found you on 99acres yesterday"), "99acres");
        assert_eq!(derive_source("Hello", "no portal mentioned"), "Website");
    }

    #[test]
    fn draft_normalizes_sender_fields() {
        let draft = draft_from_mail(&mail("2BHK enquiry", "Call me at 9876543210."));
        assert_eq!(draft.sender_name, "Asha Verma");
        assert_eq!(draft.sender_email, "asha@example.com");
        assert_eq!(draft.phone.as_deref(), Some("919876543210"));
        assert_eq!(draft.source, "Website");
    }

    #[test]
    fn draft_without_phone_keeps_none() {
        let draft = draft_from_mail(&mail("2BHK enquiry", "please reply by email"));
        assert_eq!(draft.phone, None);
    }
}
