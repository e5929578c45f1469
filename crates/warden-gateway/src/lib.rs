//! WARDEN Gateway - the HTTP surface of the governance control plane
//!
//! One request/response server in front of the core engine: preflight
//! redaction for outbound content, mission lifecycle endpoints, transform
//! apply/verify, FinOps budget and forecasting, and evidence export.
//!
//! Handlers receive explicit component handles through [`AppState`]; there
//! is no global state, and tests construct a fresh state per scenario.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use config::GatewayConfig;
pub use error::{GatewayError, Result};
pub use routes::router;
pub use state::{AppState, DEFAULT_BUDGET_ID};

/// Gateway version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 8780;

/// Default host
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Bind and serve until the process is stopped.
pub async fn serve(config: GatewayConfig) -> Result<()> {
    let addr = config.socket_addr();
    let state = AppState::new(config)?;
    let app = router(state);

    tracing::info!("WARDEN gateway listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .await
        .map_err(|e| GatewayError::Internal(e.to_string()))?;
    Ok(())
}
