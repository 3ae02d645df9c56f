use std::sync::Arc;

use afscheid_assistant::Assistant;
use afscheid_auth::{AuthSession, Authenticator, User};
use afscheid_config::AppConfig;
use axum::http::HeaderMap;
use sqlx::SqlitePool;

use crate::storage::{BlobStore, LocalBlobStore};
use crate::util::require_bearer;
use crate::ApiError;

/// Marketplace settings the handlers need at request time.
#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub commission_bps: u32,
    pub currency: String,
    pub max_upload_bytes: u64,
}

impl ApiSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            commission_bps: config.platform.commission_bps,
            currency: config.platform.currency.clone(),
            max_upload_bytes: config.storage.max_upload_bytes,
        }
    }
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

#[derive(Clone)]
pub struct AppState {
    db_pool: SqlitePool,
    authenticator: Authenticator,
    assistant: Arc<Assistant>,
    blobs: Arc<dyn BlobStore>,
    settings: Arc<ApiSettings>,
}

impl AppState {
    pub fn new(
        db_pool: SqlitePool,
        authenticator: Authenticator,
        assistant: Arc<Assistant>,
        blobs: Arc<dyn BlobStore>,
        settings: ApiSettings,
    ) -> Self {
        Self {
            db_pool,
            authenticator,
            assistant,
            blobs,
            settings: Arc::new(settings),
        }
    }

    /// State with a local blob store rooted at `storage.root`.
    pub fn from_config(
        db_pool: SqlitePool,
        authenticator: Authenticator,
        assistant: Arc<Assistant>,
        config: &AppConfig,
    ) -> Self {
        let blobs: Arc<dyn BlobStore> = Arc::new(LocalBlobStore::new(&config.storage.root));
        Self::new(
            db_pool,
            authenticator,
            assistant,
            blobs,
            ApiSettings::from_config(config),
        )
    }

    pub fn db_pool(&self) -> &SqlitePool {
        &self.db_pool
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }

    pub fn assistant(&self) -> &Assistant {
        &self.assistant
    }

    pub fn blobs(&self) -> &dyn BlobStore {
        self.blobs.as_ref()
    }

    pub fn settings(&self) -> &ApiSettings {
        &self.settings
    }

    pub async fn authenticate(&self, token: &str) -> Result<(User, AuthSession), ApiError> {
        self.authenticator
            .authenticate_token(token)
            .await
            .map_err(ApiError::from)
    }

    /// Resolve the bearer token in `headers` to its user.
    pub async fn current_user(&self, headers: &HeaderMap) -> Result<User, ApiError> {
        let token = require_bearer(headers)?;
        let (user, _) = self.authenticate(&token).await?;
        Ok(user)
    }
}
