//! Router construction and the serve loop.

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::error::DatasheetError;

use super::{
    handlers::{convert_handler, extract_handler, health_handler},
    types::{ApiSizeLimits, ApiState, ServerConfig},
};

/// Comma-separated list of allowed CORS origins. Unset means any origin.
pub const CORS_ORIGINS_ENV: &str = "DATASHEET_CORS_ORIGINS";

fn cors_layer() -> CorsLayer {
    let permissive = || {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    };

    let Ok(origins_str) = std::env::var(CORS_ORIGINS_ENV) else {
        return permissive();
    };

    let origins: Vec<_> = origins_str
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .filter_map(|s| s.trim().parse::<axum::http::HeaderValue>().ok())
        .collect();

    if origins.is_empty() {
        warn!("{CORS_ORIGINS_ENV} set but empty or invalid, allowing all origins");
        return permissive();
    }

    info!("CORS configured with {} allowed origin(s)", origins.len());
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Build the router for both endpoints.
///
/// Each endpoint is mounted at its bare path and under `/api`.
pub fn create_router(state: ApiState, limits: ApiSizeLimits) -> Router {
    Router::new()
        .route("/convert", post(convert_handler))
        .route("/api/convert", post(convert_handler))
        .route("/extract", post(extract_handler))
        .route("/api/extract", post(extract_handler))
        .route("/health", get(health_handler))
        .layer(DefaultBodyLimit::max(limits.max_request_body_bytes))
        .layer(RequestBodyLimitLayer::new(limits.max_request_body_bytes))
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until Ctrl+C or SIGTERM.
///
/// On shutdown the state's token is cancelled, which aborts in-flight model
/// calls, then axum drains open connections.
pub async fn serve(config: ServerConfig, state: ApiState) -> Result<(), DatasheetError> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| DatasheetError::InvalidConfig(format!("bad listen address: {e}")))?;

    let shutdown = state.shutdown.clone();
    let app = create_router(state, config.limits);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| DatasheetError::Internal(format!("cannot bind {addr}: {e}")))?;

    info!(
        %addr,
        max_body_bytes = config.limits.max_request_body_bytes,
        "datasheet server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .map_err(|e| DatasheetError::Internal(format!("server error: {e}")))?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting graceful shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting graceful shutdown..."),
        _ = token.cancelled() => info!("Shutdown requested"),
    }

    token.cancel();
}
