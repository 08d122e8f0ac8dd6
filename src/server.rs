//! Relay server runner

use std::future::Future;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;

use crate::{
    api::{router, AppState},
    config::AppConfig,
    database::{open_store, LocationStore},
    errors::AppError,
};

/// Open the configured store, serve until a shutdown signal, then close the store
pub async fn run(config: &AppConfig) -> Result<(), AppError> {
    config.validate()?;

    let store = open_store(&config.database).await?;

    info!("Binding to {}", config.server.bind);
    let listener = TcpListener::bind(config.server.bind).await?;
    info!("Server running on {}", listener.local_addr()?);

    let result = serve(listener, store.clone(), shutdown_signal()).await;

    store.close().await;
    info!("Server shut down");
    result
}

/// Serve the relay API on an already bound listener
pub async fn serve<F>(
    listener: TcpListener,
    store: Arc<dyn LocationStore>,
    shutdown: F,
) -> Result<(), AppError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(AppState::new(store));

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on unix
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
