//! HTTP server lifecycle: bind, serve in the background, shut down
//! gracefully.

use std::net::SocketAddr;

use axum::Router;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::ServerError;

/// Configuration for the HTTP server.
pub struct HttpServerConfig {
    /// Address to bind the server to.
    pub addr: SocketAddr,
}

/// A single HTTP server hosting the application router.
pub struct HttpServer {
    config: HttpServerConfig,
    router: Option<Router>,
    local_addr: Option<SocketAddr>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl HttpServer {
    pub fn new(config: HttpServerConfig, router: Router) -> Self {
        Self {
            config,
            router: Some(router),
            local_addr: None,
            shutdown_tx: None,
            handle: None,
        }
    }

    /// Bind the listener and spawn the server task.
    pub async fn start(&mut self) -> Result<SocketAddr, ServerError> {
        let app = self.router.take().ok_or_else(|| ServerError::StartupFailed {
            addr: self.config.addr.to_string(),
            reason: "server already started".to_string(),
        })?;

        let listener = tokio::net::TcpListener::bind(self.config.addr)
            .await
            .map_err(|e| ServerError::StartupFailed {
                addr: self.config.addr.to_string(),
                reason: format!("Failed to bind: {}", e),
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::StartupFailed {
                addr: self.config.addr.to_string(),
                reason: e.to_string(),
            })?;

        tracing::info!("Wishing machine listening on {}", local_addr);

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        self.shutdown_tx = Some(shutdown_tx);
        self.local_addr = Some(local_addr);

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                    tracing::info!("HTTP server shutting down");
                })
                .await
            {
                tracing::error!("HTTP server error: {}", e);
            }
        });

        self.handle = Some(handle);
        Ok(local_addr)
    }

    /// Address actually bound, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Signal graceful shutdown and wait for the server task to finish.
    pub async fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}
