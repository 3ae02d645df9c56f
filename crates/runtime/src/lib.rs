use std::sync::Arc;

use afscheid_assistant::Assistant;
use afscheid_auth::Authenticator;
use afscheid_config::AppConfig;
use afscheid_database::initialize_database;
use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::info;

pub mod telemetry {
    use anyhow::Result;
    use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

    pub fn init_tracing() -> Result<()> {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let subscriber = SubscriberBuilder::default()
            .with_env_filter(env_filter)
            .with_target(true)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .map_err(|error| anyhow::anyhow!("failed to set tracing subscriber: {error}"))
    }
}

#[derive(Clone)]
pub struct BackendServices {
    pub db_pool: SqlitePool,
    pub authenticator: Authenticator,
    pub assistant: Arc<Assistant>,
}

impl BackendServices {
    pub async fn initialise(config: &AppConfig) -> Result<Self> {
        let db_pool = initialize_database(&config.database)
            .await
            .context("failed to initialise database")?;

        let authenticator = Authenticator::new(db_pool.clone(), config.auth.clone());
        let assistant = Arc::new(
            Assistant::new(&config.assistant).context("failed to build assistant client")?,
        );

        info!(
            model = %assistant.model(),
            configured = assistant.is_configured(),
            "assistant ready"
        );

        Ok(Self {
            db_pool,
            authenticator,
            assistant,
        })
    }
}

pub async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(?error, "failed to listen for shutdown signal");
    }
    info!("shutdown signal received");
}
