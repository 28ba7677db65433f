use std::sync::Arc;

use {
    axum::{
        Router,
        routing::{get, post},
    },
    sandbar_config::ServerConfig,
    sandbar_jobs::JobRegistry,
    tower_http::{
        cors::{Any, CorsLayer},
        trace::TraceLayer,
    },
    tracing::info,
};

use crate::{
    routes::{context_handler, health_handler, jobs_handler, schedule_handler, status_handler},
    state::GatewayState,
};

/// Build the gateway router (shared between production startup and tests).
pub fn build_gateway_app(state: Arc<GatewayState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/schedule", post(schedule_handler))
        .route("/status/{job_id}", get(status_handler))
        .route("/jobs", get(jobs_handler))
        .route("/context", get(context_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve until Ctrl-C, then stop accepting jobs and drain the in-flight ones.
pub async fn start_gateway(config: &ServerConfig, registry: JobRegistry) -> anyhow::Result<()> {
    let state = GatewayState::new(registry.clone());
    let app = build_gateway_app(state);

    let listener = tokio::net::TcpListener::bind((config.bind.as_str(), config.port)).await?;
    info!(
        addr = %listener.local_addr()?,
        workers = registry.workers(),
        "sandbar gateway listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    registry.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
