use std::process::ExitCode;
use std::sync::Arc;

use loudmouth::persistence::PgCommentStore;
use loudmouth::server::{CommentServer, ServerConfig};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Server exited with an error");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> loudmouth::Result<()> {
    let config = ServerConfig::from_env()?;

    let store = PgCommentStore::connect(config.require_database_url()?, config.db_max_connections)
        .await?;
    store.apply_schema().await?;
    tracing::info!("Database schema ready");

    let server = CommentServer::new(config, Arc::new(store));
    server.run_until(shutdown_signal()).await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}
