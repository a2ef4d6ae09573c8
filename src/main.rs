//! Evaluation Backend - academic evaluation management API
//!
//! Serves the session-authenticated JSON API:
//! - Users with admin / professor / student roles
//! - Matières with their professor and enrolled students
//! - Evaluations and notes, visible according to role
//!
//! # Security Properties
//!
//! - Session ids rotate on login; CSRF tokens guard every mutating request
//! - Passwords are stored as PBKDF2 hashes and never logged
//! - Internal error details are only returned when `APP_DEBUG` is set

use std::net::SocketAddr;
use std::sync::Arc;

use eval_backend::sweeper::Sweeper;
use eval_backend::{build_router, AppState, Config};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    init_tracing();

    let config = Config::from_env();
    log_startup_info(&config);

    let state = AppState::new(config.clone())?;

    // Start background workers
    Arc::new(Sweeper::new(state.clone())).start();

    let app = build_router(state);
    serve(app, &config).await
}

/// Initialize tracing with environment-based log levels.
fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("eval_backend=debug,tower_http=info")),
        )
        .init();
}

/// Log startup configuration (no secrets).
fn log_startup_info(config: &Config) {
    info!(
        bind_addr = %config.bind_addr,
        port = config.port,
        storage = "memory",
        debug = config.debug,
        cors_enabled = config.cors_enabled,
        rate_limit_enabled = config.rate_limit_enabled,
        session_lifetime_secs = config.session_lifetime.as_secs(),
        csrf_lifetime_secs = config.csrf_token_lifetime.as_secs(),
        "Starting evaluation backend"
    );
    if config.uses_default_admin_password() {
        warn!("ADMIN_PASSWORD is not set; the seeded administrator uses the default password");
    }
}

/// Bind to address and serve the application.
async fn serve(app: axum::Router, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let bind_addr = format!("{}:{}", config.bind_addr, config.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    info!(addr = %bind_addr, "Server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
