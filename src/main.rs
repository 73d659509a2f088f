// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use relational_auth_gateway::api::router;
use relational_auth_gateway::auth::{
    AuthDependencies, Clock, HttpJwksFetcher, InternalIssuer, IssuerHintRegistry, KeyDirectory,
    SystemClock,
};
use relational_auth_gateway::config::{AuthConfig, LogFormat, ServerConfig, INTERNAL_JWT_SECRET_ENV};
use relational_auth_gateway::state::AppState;

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));

    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init(),
    }
}

#[tokio::main]
async fn main() {
    let server = ServerConfig::from_env();
    init_tracing(server.log_format);

    let auth_config = AuthConfig::from_env();
    info!(config = ?auth_config, "Loaded authentication configuration");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let fetcher = HttpJwksFetcher::new(server.jwks_fetch_timeout)
        .expect("Failed to build JWKS HTTP client");
    let directory = KeyDirectory::new(Arc::new(fetcher), Arc::clone(&clock))
        .with_cache_ttl(server.jwks_cache_ttl)
        .with_fetch_timeout(server.jwks_fetch_timeout);

    let internal = match &server.internal_secret {
        Some(secret) => InternalIssuer::new(secret.as_bytes().to_vec(), Arc::clone(&clock)),
        None => {
            warn!(
                "{INTERNAL_JWT_SECRET_ENV} is not set; internal tokens use a random secret and \
                 will not survive a restart"
            );
            InternalIssuer::ephemeral(Arc::clone(&clock))
        }
    };

    let deps = AuthDependencies {
        directory: Arc::new(directory),
        internal: Arc::new(internal),
        hints: Arc::new(IssuerHintRegistry::new()),
        clock,
    };
    let state = AppState::new(auth_config, deps);
    let app = router(state);

    let addr = server.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind listener");

    info!(%addr, "Relational auth gateway listening");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {e}");
        std::process::exit(1);
    }

    info!("Server shutdown complete");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown"),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown"),
    }
}
