//! Loader behaviour: defaults, file discovery, environment overrides and
//! validation.

use std::fs;
use std::path::{Path, PathBuf};

use serial_test::serial;
use tempfile::TempDir;

use afscheid_config::{load, AppConfig, AssistantConfig, HttpConfig, PlatformConfig, StorageConfig};

const ENV_VARS_TO_RESET: &[&str] = &[
    "AFSCHEID_CONFIG",
    "AFSCHEID__AUTH__SESSION_TTL_SECONDS",
    "AFSCHEID__DATABASE__MAX_CONNECTIONS",
    "AFSCHEID__DATABASE__URL",
    "AFSCHEID__HTTP__ADDRESS",
    "AFSCHEID__HTTP__PORT",
    "AFSCHEID__STORAGE__ROOT",
    "AFSCHEID__STORAGE__MAX_UPLOAD_BYTES",
    "AFSCHEID__ASSISTANT__API_KEY",
    "AFSCHEID__ASSISTANT__BASE_URL",
    "AFSCHEID__ASSISTANT__MODEL",
    "AFSCHEID__PLATFORM__COMMISSION_BPS",
    "AFSCHEID__PLATFORM__CURRENCY",
];

struct TestContext {
    vars: Vec<(String, Option<String>)>,
    original_dir: Option<PathBuf>,
}

impl TestContext {
    fn new() -> Self {
        Self {
            vars: Vec::new(),
            original_dir: None,
        }
    }

    fn reset_environment(&mut self) {
        for key in ENV_VARS_TO_RESET {
            self.remove_var(key);
        }
    }

    fn set_var(&mut self, key: &str, value: impl AsRef<str>) {
        let previous = std::env::var(key).ok();
        std::env::set_var(key, value.as_ref());
        self.vars.push((key.to_string(), previous));
    }

    fn remove_var(&mut self, key: &str) {
        let previous = std::env::var(key).ok();
        std::env::remove_var(key);
        self.vars.push((key.to_string(), previous));
    }

    fn set_current_dir(&mut self, dir: &Path) {
        if self.original_dir.is_none() {
            self.original_dir =
                Some(std::env::current_dir().expect("failed to capture current directory"));
        }
        std::env::set_current_dir(dir).expect("failed to set current directory");
    }
}

impl Drop for TestContext {
    fn drop(&mut self) {
        if let Some(original) = self.original_dir.take() {
            let _ = std::env::set_current_dir(original);
        }

        while let Some((key, value)) = self.vars.pop() {
            match value {
                Some(val) => std::env::set_var(&key, val),
                None => std::env::remove_var(&key),
            }
        }
    }
}

fn write_config_file(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("failed to create config directories");
    }
    fs::write(path, contents).expect("failed to write config file");
}

fn isolated() -> (TempDir, TestContext) {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let mut ctx = TestContext::new();
    ctx.reset_environment();
    ctx.set_current_dir(temp_dir.path());
    (temp_dir, ctx)
}

#[test]
#[serial]
fn load_uses_default_values_when_no_files_found() {
    let (_temp_dir, _ctx) = isolated();

    let config = load().expect("configuration load should succeed without files");
    let defaults = AppConfig::default();

    assert_eq!(config.http.address, defaults.http.address);
    assert_eq!(config.http.port, defaults.http.port);
    assert_eq!(config.database.url, defaults.database.url);
    assert_eq!(config.database.max_connections, defaults.database.max_connections);
    assert_eq!(config.auth.session_ttl_seconds, defaults.auth.session_ttl_seconds);
    assert_eq!(config.storage.root, defaults.storage.root);
    assert_eq!(config.assistant.model, defaults.assistant.model);
    assert_eq!(config.platform.commission_bps, 500);
    assert_eq!(config.platform.currency, "EUR");
}

#[test]
#[serial]
fn load_picks_first_available_file_in_search_order() {
    let (temp_dir, _ctx) = isolated();

    write_config_file(
        temp_dir.path(),
        "afscheid.toml",
        r#"
        [http]
        port = 4242
        "#,
    );
    write_config_file(
        temp_dir.path(),
        "config/afscheid.toml",
        r#"
        [http]
        port = 5151
        "#,
    );

    let config = load().expect("configuration load should pick the first file");
    assert_eq!(config.http.port, 4242);
}

#[test]
#[serial]
fn load_merges_partial_file_with_defaults() {
    let (temp_dir, _ctx) = isolated();

    write_config_file(
        temp_dir.path(),
        "afscheid.toml",
        r#"
        [http]
        port = 8181

        [platform]
        commission_bps = 750
        "#,
    );

    let config = load().expect("configuration load should succeed");
    let defaults = AppConfig::default();

    assert_eq!(config.http.port, 8181);
    assert_eq!(config.http.address, defaults.http.address);
    assert_eq!(config.platform.commission_bps, 750);
    assert_eq!(config.platform.currency, defaults.platform.currency);
    assert_eq!(config.database.url, defaults.database.url);
}

#[test]
#[serial]
fn load_applies_environment_overrides() {
    let (temp_dir, mut ctx) = isolated();

    write_config_file(
        temp_dir.path(),
        "afscheid.toml",
        r#"
        [http]
        port = 3030
        "#,
    );

    ctx.set_var("AFSCHEID__HTTP__PORT", "8080");
    ctx.set_var("AFSCHEID__STORAGE__ROOT", "/var/lib/afscheid/blobs");

    let config = load().expect("configuration load should honour env overrides");
    assert_eq!(config.http.port, 8080);
    assert_eq!(config.storage.root, "/var/lib/afscheid/blobs");
}

#[test]
#[serial]
fn load_reads_explicit_config_path() {
    let (temp_dir, mut ctx) = isolated();

    write_config_file(
        temp_dir.path(),
        "elsewhere/custom.toml",
        r#"
        [database]
        url = "sqlite://custom.db"
        max_connections = 3
        "#,
    );
    let path = temp_dir.path().join("elsewhere/custom.toml");
    ctx.set_var("AFSCHEID_CONFIG", path.display().to_string());

    let config = load().expect("explicit config path should load");
    assert_eq!(config.database.url, "sqlite://custom.db");
    assert_eq!(config.database.max_connections, 3);
}

#[test]
#[serial]
fn load_accepts_assistant_api_key_from_env() {
    let (_temp_dir, mut ctx) = isolated();

    ctx.set_var("AFSCHEID__ASSISTANT__API_KEY", "sk-test-key");

    let config = load().expect("configuration load should read the assistant API key");
    assert_eq!(config.assistant.api_key.as_deref(), Some("sk-test-key"));
}

#[test]
#[serial]
fn load_rejects_commission_above_one_hundred_percent() {
    let (temp_dir, _ctx) = isolated();

    write_config_file(
        temp_dir.path(),
        "afscheid.toml",
        r#"
        [platform]
        commission_bps = 12000
        "#,
    );

    let error = load().expect_err("commission above 100% must be rejected");
    assert!(error.to_string().contains("commission_bps"));
}

#[test]
#[serial]
fn load_errors_on_invalid_toml_contents() {
    let (temp_dir, _ctx) = isolated();

    write_config_file(
        temp_dir.path(),
        "afscheid.toml",
        r#"
        [http]
        port = "not-a-number
        "#,
    );

    let error = load().expect_err("invalid TOML should cause load to fail");
    let message = error.to_string();
    assert!(
        message.contains("invalid configuration") || message.contains("unable to build configuration"),
        "unexpected error message: {message}"
    );
}

#[test]
fn section_defaults_match_expected_values() {
    assert_eq!(HttpConfig::default().port, 7070);
    assert_eq!(StorageConfig::default().max_upload_bytes, 10 * 1024 * 1024);
    assert_eq!(AssistantConfig::default().title.as_deref(), Some("Afscheid"));
    assert_eq!(PlatformConfig::default().commission_bps, 500);
}
