//! # Aktar API
//!
//! Storefront backend: broken-circle CAPTCHA challenges, single-use
//! verification tokens, and the nickname/password accounts they guard.
//!
//! ## Architecture
//! ```text
//! Storefront client → Aktar API → Challenge store (memory | Redis)
//!                         ↓
//!                   User directory
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod auth;
mod captcha;
mod config;
mod routes;
mod state;

use captcha::{ChallengeStore, store_sweeper};
use config::AppConfig;
use state::AppState;

const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Aktar API - storefront CAPTCHA and auth server
#[derive(Parser, Debug)]
#[command(name = "aktar-api")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/aktar.toml")]
    config: String,

    /// Redis URL (overrides config)
    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,

    /// Listen address (overrides config)
    #[arg(short, long, env = "LISTEN_ADDR")]
    listen: Option<String>,

    /// HMAC secret for session tokens (overrides config)
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    jwt_secret: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "LOG_LEVEL")]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, default_value = "false")]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional
    dotenvy::dotenv().ok();

    let args = Args::parse();

    init_logging(&args.log_level, args.json_logs)?;

    info!("Starting Aktar API v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load(&args.config, &args)?;
    info!(
        backend = ?config.captcha.backend,
        circles = config.captcha.circle_count,
        max_attempts = config.captcha.max_attempts,
        "Configuration loaded from {}",
        args.config
    );

    // Create shutdown broadcast channel
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    let state = AppState::new(config.clone()).await?;

    // Redis expires keys itself; only the memory store needs sweeping
    if let ChallengeStore::Memory(memory) = &state.store {
        let memory = memory.clone();
        let sweeper_shutdown = shutdown_tx.subscribe();
        tokio::spawn(async move {
            store_sweeper(memory, SWEEP_INTERVAL, sweeper_shutdown).await;
        });
    } else {
        info!("Redis connected: {}", config.redis_url);
    }

    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    info!("Aktar API listening on {}", config.listen_addr);

    let shutdown_signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
        }
        info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("Server error")?;

    info!("Aktar API shutdown complete");
    Ok(())
}

/// Initialize structured logging with tracing
fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init();
    }

    Ok(())
}
