//! The HTTP command API.
//!
//! Commands are addressed as `/<handler>/<command>` with parameters in the
//! query string, e.g. `/gpio/write?output=00001111`.

pub mod config;
pub mod handlers;
pub mod router;

pub use config::WebConfig;
pub use handlers::AppState;
pub use router::create_app;

use crate::device::ServiceState;
use crate::error::{Result, ServiceError};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Bind the listener and serve until ctrl-c.
///
/// The service is reported `Up` once the socket is bound and `Down` again
/// after shutdown.
pub async fn start_web_server(config: WebConfig, state: AppState) -> Result<()> {
    let addr = config
        .bind_address()
        .parse::<SocketAddr>()
        .map_err(|e| ServiceError::config_error(format!("Invalid bind address: {}", e)))?;

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| ServiceError::web_server_error(format!("Failed to bind to {}: {}", addr, e)))?;

    let status = state.status.clone();
    let app = create_app(&config, state);

    status.set(ServiceState::Up);
    info!("Listening on http://{}", addr);
    info!("Try http://{}/gpio/read", addr);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ServiceError::web_server_error(format!("Server error: {}", e)));

    status.set(ServiceState::Down);
    served
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Could not listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
