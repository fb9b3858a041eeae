//! Venue booking server.
//!
//! This binary:
//! - Opens (and migrates) the SQLite database
//! - Selects the console or SMTP mailer
//! - Starts the expired-registration sweeper
//! - Serves the HTTP API until Ctrl+C, then stops the sweeper
//!
//! # Usage
//!
//! ```bash
//! cp .env.example .env   # from the workspace root
//! cargo run --bin server
//! ```

use anyhow::Context;
use booking_core::environment::{Clock, SystemClock};
use booking_runtime::{PeriodicJob, Shutdown};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use venue_booking::aggregates::RandomSecrets;
use venue_booking::app::OtpSweeper;
use venue_booking::auth::SessionKeys;
use venue_booking::config::MailTransport;
use venue_booking::notifications::{ConsoleMailer, Mailer, SmtpMailer};
use venue_booking::server::{build_router, AppState};
use venue_booking::store::SqliteStore;
use venue_booking::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,venue_booking=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting venue booking server...");

    let config = Config::from_env();
    tracing::info!(
        database = %config.database.url,
        mail = ?config.mail.transport,
        cors_origin = %config.server.cors_origin,
        "Configuration loaded"
    );

    let store = Arc::new(
        SqliteStore::connect(&config.database.url, config.database.max_connections)
            .await
            .context("failed to open database")?,
    );

    let mailer: Arc<dyn Mailer> = match config.mail.transport {
        MailTransport::Console => Arc::new(ConsoleMailer::new()),
        MailTransport::Smtp => Arc::new(
            SmtpMailer::new(
                &config.mail.smtp_host,
                config.mail.smtp_port,
                config.mail.smtp_username.clone(),
                config.mail.smtp_password.clone(),
                &config.mail.from_email,
                &config.mail.from_name,
            )
            .context("failed to configure SMTP mailer")?,
        ),
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let sessions = Arc::new(SessionKeys::new(
        config.session.jwt_secret.as_bytes(),
        config.session_ttl(),
        config.session.cookie_secure,
        clock.clone(),
    ));

    let state = AppState::new(
        store.clone(),
        mailer,
        clock.clone(),
        Arc::new(RandomSecrets),
        sessions,
        config.account_policy(),
    );

    let shutdown = Shutdown::new();
    let sweeper = PeriodicJob::spawn(
        Arc::new(OtpSweeper::new(store.clone(), clock)),
        config.sweep_interval(),
        shutdown.subscribe(),
    );
    tracing::info!(interval_secs = config.accounts.otp_sweep_interval_secs, "Sweeper started");

    let app = build_router(state, &config.server);
    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;
    tracing::info!(address = %address, "HTTP server listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async {
            if let Err(error) = tokio::signal::ctrl_c().await {
                tracing::error!(%error, "Failed to listen for Ctrl+C");
            }
            tracing::info!("Shutting down gracefully...");
        })
        .await
        .context("HTTP server failed")?;

    shutdown.trigger();
    match tokio::time::timeout(config.shutdown_timeout(), sweeper.join()).await {
        Ok(stats) => tracing::info!(
            completed = stats.completed,
            failed = stats.failed,
            "Sweeper stopped"
        ),
        Err(_) => tracing::warn!("Sweeper did not stop before the shutdown timeout"),
    }

    Ok(())
}
