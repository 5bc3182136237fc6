//! Listener and lifecycle.

use eyre::{Context, Result};

use crate::config::GateConfig;

/// Serve `app` on the configured address until Ctrl+C or SIGTERM.
///
/// # Arguments
///
/// * `app` - The gateway router, usually from [`crate::build_app`].
/// * `config` - Gateway configuration; `server.host` and `server.port` pick the bind address.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails while running.
pub async fn run_server(app: axum::Router, config: &GateConfig) -> Result<()> {
    let addr = config.server.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .wrap_err_with(|| format!("failed to bind to {addr}"))?;

    info!(address = %addr, "txgate listening");
    serve(listener, app).await
}

/// Serve `app` on an already bound listener.
///
/// Returns once a shutdown signal arrives and in-flight requests finish.
///
/// # Arguments
///
/// * `listener` - A bound TCP listener, for example one on port 0 in tests.
/// * `app` - The router to serve.
///
/// # Errors
///
/// Returns an error if accepting or serving connections fails.
pub async fn serve(listener: tokio::net::TcpListener, app: axum::Router) -> Result<()> {
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .wrap_err("server error")?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to register SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT, shutting down gracefully"),
        _ = terminate => info!("Received SIGTERM, shutting down gracefully"),
    }
}
