//! Comment server listener
//!
//! Binds the HTTP listener and serves the router until shut down.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::error::Result;
use crate::persistence::CommentStore;
use crate::registry::HubRegistry;
use crate::server::config::ServerConfig;
use crate::server::routes::{self, AppState};

/// Comment server
pub struct CommentServer {
    config: ServerConfig,
    registry: Arc<HubRegistry>,
}

impl CommentServer {
    /// Create a new server whose hubs persist through `store`
    pub fn new(config: ServerConfig, store: Arc<dyn CommentStore>) -> Self {
        let registry = Arc::new(HubRegistry::with_config(store, config.hub.clone()));
        Self { config, registry }
    }

    /// Get a reference to the hub registry
    pub fn registry(&self) -> &Arc<HubRegistry> {
        &self.registry
    }

    /// Build the router served by this server
    pub fn router(&self) -> axum::Router {
        routes::router(AppState::new(
            Arc::clone(&self.registry),
            self.config.max_connections,
        ))
    }

    /// Run the server
    ///
    /// This method blocks until the listener fails.
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(addr = %addr, "Comment server listening");

        let app = self.router();
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            shutdown.await;
            tracing::info!("Shutdown signal received");
        })
        .await?;

        let stats = self.registry.stats().await;
        tracing::info!(
            hubs_created = stats.hubs_created,
            clients_joined = stats.clients_joined,
            "Comment server stopped"
        );

        Ok(())
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }
}
