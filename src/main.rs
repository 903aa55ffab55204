mod db;
mod domain;
mod jobs;
mod middleware;
mod services;
mod state;
mod web;

use crate::services::ingest::{self, HttpMailSource, MailSource};
use crate::services::whatsapp::{Dispatcher, WhatsAppDispatcher};
use crate::state::SharedState;
use base64::{engine::general_purpose, Engine as _};
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL missing");
    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .map_err(|e| {
            tracing::error!("Failed to connect to database: {}", e);
            e
        })?;

    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;

    let session_key_b64 = std::env::var("SESSION_KEY").expect("SESSION_KEY missing");
    let session_key = general_purpose::STANDARD
        .decode(session_key_b64)
        .expect("SESSION_KEY must be base64");

    let whatsapp_url =
        std::env::var("WHATSAPP_API_URL").expect("WHATSAPP_API_URL missing");
    let whatsapp: Arc<dyn Dispatcher> = Arc::new(WhatsAppDispatcher::new(whatsapp_url)?);

    let mail: Option<Arc<dyn MailSource>> = match std::env::var("MAIL_GATEWAY_URL") {
        Ok(url) => Some(Arc::new(HttpMailSource::new(url)?)),
        Err(_) => {
            tracing::warn!("MAIL_GATEWAY_URL not set, inbox ingestion disabled");
            None
        }
    };

    let shared: SharedState = Arc::new(state::AppState {
        pool,
        whatsapp,
        mail: mail.clone(),
        session_key,
        login_limiter: middleware::RateLimiter::new(5, 60),
    });

    let scheduler = JobScheduler::new().await?;

    // Sweep A: promote overdue pending follow-ups to missed.
    let shared_for_missed = shared.clone();
    scheduler
        .add(Job::new_async("0 */5 * * * *", move |_uuid, _l| {
            let state = shared_for_missed.clone();
            Box::pin(async move {
                if let Err(e) = jobs::sweeps::promote_missed_followups(&state).await {
                    tracing::error!("missed follow-up sweep failed: {}", e);
                }
            })
        })?)
        .await?;

    // Sweep B: nudge leads quiet past the 48-hour SLA.
    let shared_for_nudges = shared.clone();
    scheduler
        .add(Job::new_async("0 0 * * * *", move |_uuid, _l| {
            let state = shared_for_nudges.clone();
            Box::pin(async move {
                match jobs::sweeps::nudge_stale_leads(&state).await {
                    Ok(report) if report.failed > 0 => {
                        tracing::warn!(errors = ?report.errors, "stale-lead sweep had failures");
                    }
                    Ok(_) => {}
                    Err(e) => tracing::error!("stale-lead sweep failed: {}", e),
                }
            })
        })?)
        .await?;

    // Welcome messages for freshly imported leads.
    let shared_for_greetings = shared.clone();
    scheduler
        .add(Job::new_async("0 */10 * * * *", move |_uuid, _l| {
            let state = shared_for_greetings.clone();
            Box::pin(async move {
                if let Err(e) = jobs::greetings::run_greeting_pass(&state).await {
                    tracing::error!("greeting pass failed: {}", e);
                }
            })
        })?)
        .await?;

    // Inbox polling, only when a mailbox gateway is configured.
    if let Some(source) = mail {
        let shared_for_ingest = shared.clone();
        scheduler
            .add(Job::new_async("0 2/10 * * * *", move |_uuid, _l| {
                let state = shared_for_ingest.clone();
                let source = source.clone();
                Box::pin(async move {
                    match ingest::run_ingestion(&state.pool, source.as_ref()).await {
                        Ok(report) => {
                            if report.fetched > 0 {
                                tracing::info!(
                                    fetched = report.fetched,
                                    inserted = report.inserted,
                                    duplicates = report.duplicates,
                                    errors = report.errors,
                                    "inbox ingestion pass finished"
                                );
                            }
                        }
                        Err(e) => tracing::error!("inbox ingestion failed: {}", e),
                    }
                })
            })?)
            .await?;
    }

    // Rate limiter housekeeping: drop idle client entries hourly.
    let shared_for_prune = shared.clone();
    scheduler
        .add(Job::new_async("0 30 * * * *", move |_uuid, _l| {
            let state = shared_for_prune.clone();
            Box::pin(async move {
                state.login_limiter.prune().await;
            })
        })?)
        .await?;

    scheduler.start().await?;
    tracing::info!("Scheduler started:");
    tracing::info!("  - Missed follow-up sweep: every 5 min");
    tracing::info!("  - Stale-lead nudges: hourly");
    tracing::info!("  - Greetings: every 10 min");
    tracing::info!("  - Inbox ingestion: every 10 min (when configured)");
    tracing::info!("  - Rate limiter cleanup: hourly");

    let app = web::routes(shared)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| {
        let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
        format!("0.0.0.0:{}", port)
    });
    tracing::info!("Listening on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
