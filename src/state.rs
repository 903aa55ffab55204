use crate::middleware::RateLimiter;
use crate::services::ingest::MailSource;
use crate::services::whatsapp::Dispatcher;
use sqlx::PgPool;
use std::sync::Arc;

pub struct AppState {
    pub pool: PgPool,
    pub whatsapp: Arc<dyn Dispatcher>,
    /// Absent when no mailbox gateway is configured; ingestion is then
    /// disabled.
    pub mail: Option<Arc<dyn MailSource>>,
    pub session_key: Vec<u8>,
    pub login_limiter: RateLimiter,
}

pub type SharedState = Arc<AppState>;
