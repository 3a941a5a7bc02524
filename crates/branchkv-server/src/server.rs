//! Server startup and lifecycle

use crate::{routes, AppState, ServerConfig};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// Run the server until the process ends
pub async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    run_server_with_shutdown(config, std::future::pending()).await
}

/// Run server with graceful shutdown
pub async fn run_server_with_shutdown(
    config: ServerConfig,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let addr = config.bind_addr();
    let listener = TcpListener::bind(&addr).await?;
    let state = Arc::new(AppState::new(config)?);

    serve(listener, state, shutdown_signal).await
}

/// Serve `state` on an already bound listener
pub async fn serve(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = routes::create_router(Arc::clone(&state));

    info!(
        "branchkv server {} listening on http://{}",
        state.config.self_address,
        listener.local_addr()?
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    info!("Server shutdown complete");

    Ok(())
}
