//! Process entry point: parse flags, validate the master key, wire up the
//! registry/metrics, and run the API and metrics listeners until a shutdown
//! signal arrives.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use registration_relay::{
    auth::AuthState,
    config::{Args, Config},
    http::{build_router, AppState},
    obs,
    registry::Registry,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

const SHUTDOWN_DRAIN: Duration = Duration::from_secs(180);

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::from_args(args).context("invalid configuration")?;
    init_logging(&config);

    let metrics_handle = obs::install_recorder();

    let shutdown = CancellationToken::new();
    let registry = Arc::new(Registry::new(config.master_key));
    let app_state = AppState { registry, shutdown: shutdown.clone() };
    let auth_state = config.validate_auth_url.as_ref().map(|url| AuthState {
        client: reqwest::Client::new(),
        validate_auth_url: url.clone(),
    });

    let api_router = build_router(app_state, auth_state);
    let metrics_router = obs::build_metrics_router(metrics_handle);

    let api_listener = TcpListener::bind(&config.listen)
        .await
        .with_context(|| format!("binding API listener on {}", config.listen))?;
    let metrics_listener = TcpListener::bind(&config.metrics_listen)
        .await
        .with_context(|| format!("binding metrics listener on {}", config.metrics_listen))?;

    tracing::info!(listen = %config.listen, metrics_listen = %config.metrics_listen, "registration relay starting");

    let api_shutdown = shutdown.clone();
    let api_server = tokio::spawn(async move {
        axum::serve(api_listener, api_router)
            .with_graceful_shutdown(api_shutdown.cancelled_owned())
            .await
    });

    let metrics_shutdown = shutdown.clone();
    let metrics_server = tokio::spawn(async move {
        axum::serve(metrics_listener, metrics_router)
            .with_graceful_shutdown(metrics_shutdown.cancelled_owned())
            .await
    });

    shutdown_signal().await;
    tracing::info!("shutdown signal received, draining connections");
    shutdown.cancel();

    let drain = async {
        let _ = api_server.await;
        let _ = metrics_server.await;
    };
    if tokio::time::timeout(SHUTDOWN_DRAIN, drain).await.is_err() {
        tracing::warn!("shutdown drain exceeded {:?}, exiting anyway", SHUTDOWN_DRAIN);
    }

    Ok(())
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if config.debug { "debug" } else { "info" })
    });
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if config.pretty_logs {
        subscriber.pretty().init();
    } else {
        subscriber.json().init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
