#![forbid(unsafe_code)]

//! `review-herald` service binary.
//!
//! Bootstraps configuration and credentials, opens the store, starts the
//! reminder scheduler and janitor, and serves the HTTP endpoints until
//! SIGINT or SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use review_herald::calendar::{BusinessCalendar, SystemClock};
use review_herald::orchestrator::{janitor, reminder};
use review_herald::persistence::db;
use review_herald::server;
use review_herald::slack::client::{ChatGateway, NoopGateway, SlackService};
use review_herald::state::AppState;
use review_herald::{AppError, GlobalConfig, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "review-herald", about = "Pull-request review notifications for Slack", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("review-herald bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = match args.config {
        Some(path) => GlobalConfig::load_from_path(path)?,
        None => GlobalConfig::default(),
    };
    config.apply_env_overrides()?;
    config.load_credentials().await?;
    let config = Arc::new(config);
    info!("configuration loaded");

    // ── Initialize database ─────────────────────────────
    let db = Arc::new(db::connect(&config.database).await?);
    info!(path = %config.database.path.display(), "database connected");

    // ── Chat gateway ────────────────────────────────────
    let chat: Arc<dyn ChatGateway> = if config.slack.test_mode {
        info!("slack test mode; chat calls are not sent");
        Arc::new(NoopGateway::new())
    } else {
        Arc::new(SlackService::new(&config.slack)?)
    };

    let state = Arc::new(AppState {
        calendar: Arc::new(BusinessCalendar::from_config(&config.calendar)),
        config: Arc::clone(&config),
        db,
        chat,
        clock: Arc::new(SystemClock),
    });

    // ── Background loops ────────────────────────────────
    let ct = CancellationToken::new();
    let reminder_handle = reminder::spawn_reminder_task(Arc::clone(&state), ct.clone());
    let janitor_handle = janitor::spawn_janitor_task(Arc::clone(&state), ct.clone());
    info!("reminder scheduler and janitor started");

    // ── HTTP ────────────────────────────────────────────
    let http_ct = ct.clone();
    let http_state = Arc::clone(&state);
    let http_handle = tokio::spawn(async move {
        if let Err(err) = server::serve(http_state, http_ct.clone()).await {
            error!(%err, "http server failed");
            http_ct.cancel();
        }
    });

    // ── Wait for shutdown signal ────────────────────────
    tokio::select! {
        () = shutdown_signal() => info!("shutdown signal received"),
        () = ct.cancelled() => info!("shutting down after server failure"),
    }
    ct.cancel();

    let (http_joined, reminder_joined, janitor_joined) =
        tokio::join!(http_handle, reminder_handle, janitor_handle);
    let joined = [
        ("http", http_joined),
        ("reminder", reminder_joined),
        ("janitor", janitor_joined),
    ];
    for (task, joined) in joined {
        if let Err(err) = joined {
            error!(%err, task, "background task did not exit cleanly");
        }
    }
    info!("review-herald shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
