use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

const DEFAULT_CONFIG_FILES: &[&str] = &[
    "afscheid.toml",
    "config/afscheid.toml",
    "crates/config/afscheid.toml",
    "../afscheid.toml",
    "../config/afscheid.toml",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub assistant: AssistantConfig,
    #[serde(default)]
    pub platform: PlatformConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub address: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 7070,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://afscheid.db".to_string(),
            max_connections: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "AuthConfig::default_session_ttl")]
    pub session_ttl_seconds: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_seconds: Self::default_session_ttl(),
        }
    }
}

impl AuthConfig {
    fn default_session_ttl() -> u64 {
        86_400
    }
}

/// Where uploaded documents are kept and how large they may be.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "StorageConfig::default_root")]
    pub root: String,
    #[serde(default = "StorageConfig::default_max_upload_bytes")]
    pub max_upload_bytes: u64,
}

impl StorageConfig {
    fn default_root() -> String {
        "storage/documents".to_string()
    }

    const fn default_max_upload_bytes() -> u64 {
        10 * 1024 * 1024
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: Self::default_root(),
            max_upload_bytes: Self::default_max_upload_bytes(),
        }
    }
}

/// Connection settings for the external chat-completions endpoint backing the
/// intake assistant.
///
/// ```
/// use afscheid_config::AssistantConfig;
///
/// let assistant = AssistantConfig::default();
/// assert_eq!(assistant.base_url, "https://openrouter.ai/api/v1");
/// assert_eq!(assistant.request_timeout_seconds, 30);
/// assert!(assistant.api_key.is_none());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "AssistantConfig::default_base_url")]
    pub base_url: String,
    #[serde(default = "AssistantConfig::default_model")]
    pub model: String,
    #[serde(default = "AssistantConfig::default_request_timeout")]
    pub request_timeout_seconds: u64,
    #[serde(default)]
    pub referer: Option<String>,
    #[serde(default = "AssistantConfig::default_title")]
    pub title: Option<String>,
}

impl AssistantConfig {
    fn default_base_url() -> String {
        "https://openrouter.ai/api/v1".to_string()
    }

    fn default_model() -> String {
        "openai/gpt-4o-mini".to_string()
    }

    const fn default_request_timeout() -> u64 {
        30
    }

    fn default_title() -> Option<String> {
        Some("Afscheid".to_string())
    }
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: Self::default_base_url(),
            model: Self::default_model(),
            request_timeout_seconds: Self::default_request_timeout(),
            referer: None,
            title: Self::default_title(),
        }
    }
}

/// Marketplace economics. `commission_bps` is in basis points (500 = 5%).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    #[serde(default = "PlatformConfig::default_commission_bps")]
    pub commission_bps: u32,
    #[serde(default = "PlatformConfig::default_currency")]
    pub currency: String,
}

impl PlatformConfig {
    const fn default_commission_bps() -> u32 {
        500
    }

    fn default_currency() -> String {
        "EUR".to_string()
    }
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            commission_bps: Self::default_commission_bps(),
            currency: Self::default_currency(),
        }
    }
}

/// Load the application configuration by combining defaults, files, and environment overrides.
///
/// ```
/// use afscheid_config::load;
///
/// std::env::remove_var("AFSCHEID_CONFIG");
///
/// let config = load().expect("configuration should load with defaults");
/// assert!(!config.http.address.is_empty());
/// ```
pub fn load() -> anyhow::Result<AppConfig> {
    let defaults = AppConfig::default();

    let session_ttl_i64 = i64::try_from(defaults.auth.session_ttl_seconds).unwrap_or(i64::MAX);

    let mut builder = config::Config::builder()
        .set_default("http.address", defaults.http.address.clone())?
        .set_default("http.port", i64::from(defaults.http.port))?
        .set_default("database.url", defaults.database.url.clone())?
        .set_default(
            "database.max_connections",
            i64::from(defaults.database.max_connections),
        )?
        .set_default("auth.session_ttl_seconds", session_ttl_i64)?
        .set_default("storage.root", defaults.storage.root.clone())?
        .set_default(
            "storage.max_upload_bytes",
            i64::try_from(defaults.storage.max_upload_bytes).unwrap_or(i64::MAX),
        )?
        .set_default("assistant.base_url", defaults.assistant.base_url.clone())?
        .set_default("assistant.model", defaults.assistant.model.clone())?
        .set_default(
            "assistant.request_timeout_seconds",
            i64::try_from(defaults.assistant.request_timeout_seconds).unwrap_or(i64::MAX),
        )?
        .set_default(
            "platform.commission_bps",
            i64::from(defaults.platform.commission_bps),
        )?
        .set_default("platform.currency", defaults.platform.currency.clone())?;

    if let Some(title) = defaults.assistant.title.clone() {
        builder = builder.set_default("assistant.title", title)?;
    }

    let environment_overrides = config::Environment::with_prefix("AFSCHEID").separator("__");

    let mut config_file_attached = false;

    if let Ok(path) = std::env::var("AFSCHEID_CONFIG") {
        builder = builder.add_source(config::File::from(PathBuf::from(&path)));
        config_file_attached = true;
        debug!(path, "loading configuration via AFSCHEID_CONFIG");
    } else if let Ok(cwd) = std::env::current_dir() {
        let fallback = DEFAULT_CONFIG_FILES
            .iter()
            .map(|candidate| cwd.join(candidate))
            .find(|path| path.exists());

        if let Some(path) = fallback {
            debug!(path = %path.display(), "loading configuration file");
            builder = builder.add_source(config::File::from(path));
            config_file_attached = true;
        }
    }

    if !config_file_attached {
        debug!("no configuration file found, relying on defaults and environment overrides");
    }

    builder = builder.add_source(environment_overrides);

    let cfg = builder.build().context("unable to build configuration")?;

    let mut config = cfg
        .try_deserialize::<AppConfig>()
        .context("invalid configuration")?;

    if config.auth.session_ttl_seconds > i64::MAX as u64 {
        config.auth.session_ttl_seconds = i64::MAX as u64;
    }

    if config.platform.commission_bps > 10_000 {
        anyhow::bail!(
            "invalid configuration: platform.commission_bps must be at most 10000, got {}",
            config.platform.commission_bps
        );
    }

    debug!(?config, "loaded backend configuration");
    Ok(config)
}
