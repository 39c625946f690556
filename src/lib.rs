pub mod ai;
pub mod chat;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod routes;
pub mod session;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};

use crate::ai::{AIService, ChatModel};
use crate::chat::ConversationDriver;
use crate::config::Config;
use crate::db::{Connector, SchemaCatalog, SnowflakeConnector};
use crate::routes::AppState;
use crate::session::SessionStore;
use anyhow::Context;
use std::sync::Arc;

pub async fn run(config: Config) -> anyhow::Result<()> {
    let connector: Arc<dyn Connector> = Arc::new(SnowflakeConnector::new(
        config.snowflake.clone(),
        config.sso.clone(),
    ));

    let version = db::test_connection(connector.as_ref())
        .await
        .context("Snowflake connectivity check failed")?;
    tracing::info!(
        account = %config.snowflake.account,
        warehouse = %config.snowflake.warehouse,
        %version,
        "connected to Snowflake"
    );

    // Warm the table-context cache so the first session starts quickly
    let catalog = Arc::new(SchemaCatalog::new(connector.clone(), config.schemas.clone()));
    let schema = catalog
        .schema_context()
        .await
        .context("Failed to describe the configured schemas")?;
    let cached = catalog.cached_len().await;
    tracing::info!(tables = schema.tables.len(), cached, "schema context ready");

    let model: Arc<dyn ChatModel> = Arc::new(AIService::new(config.ai.clone()));
    tracing::info!(provider = %config.ai.provider, model = %config.ai.model, "model configured");

    let sessions = Arc::new(SessionStore::new());
    session::spawn_expiry(sessions.clone(), config.session_idle);

    let state = AppState {
        catalog,
        sessions,
        driver: Arc::new(ConversationDriver::new(model, connector)),
    };

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;
    tracing::info!("Snow Bot listening on http://{}", config.bind);

    axum::serve(listener, routes::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Snow Bot stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
