//! Configuration for courier paths and delivery behaviour.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (COURIER_HOME, COURIER_STORE)
//! 2. Config file (.courier/config.yaml)
//! 3. Defaults (~/.courier)
//!
//! Config file discovery:
//! - Searches current directory and parents for .courier/config.yaml
//! - Paths in config file are relative to the .courier/ directory

pub mod paths;

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub store: Option<StoreConfig>,
    #[serde(default)]
    pub watch: Option<WatchConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Courier state directory (relative to .courier/)
    pub home: Option<String>,
    /// Inbox log file (relative to .courier/)
    pub store: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Keep only this many delivered records after each flush
    pub retain_delivered: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WatchConfig {
    pub debounce_ms: Option<u64>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Absolute path to courier home
    pub home: PathBuf,
    /// Absolute path to the inbox log
    pub store_path: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    /// Delivery settings
    pub delivery: DeliverySettings,
    /// Store watcher debounce
    pub watch_debounce: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct DeliverySettings {
    /// Prune delivered records beyond this count after a drained flush
    pub retain_delivered: Option<usize>,
}

const DEFAULT_WATCH_DEBOUNCE_MS: u64 = 250;

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".courier").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's parent
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Combine env overrides, the parsed file and defaults
fn resolve(config_path: Option<PathBuf>, file: Option<ConfigFile>) -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".courier");

    let courier_dir = config_path
        .as_deref()
        .and_then(Path::parent)
        .unwrap_or(Path::new("."))
        .to_path_buf();

    let home = if let Ok(env_home) = std::env::var("COURIER_HOME") {
        PathBuf::from(env_home)
    } else if let Some(home_path) = file.as_ref().and_then(|f| f.paths.home.as_deref()) {
        resolve_path(&courier_dir, home_path)
    } else {
        default_home
    };

    let store_path = if let Ok(env_store) = std::env::var("COURIER_STORE") {
        PathBuf::from(env_store)
    } else if let Some(store) = file.as_ref().and_then(|f| f.paths.store.as_deref()) {
        resolve_path(&courier_dir, store)
    } else {
        paths::default_store(&home)
    };

    let retain_delivered = file
        .as_ref()
        .and_then(|f| f.store.as_ref())
        .and_then(|s| s.retain_delivered);

    let debounce_ms = file
        .as_ref()
        .and_then(|f| f.watch.as_ref())
        .and_then(|w| w.debounce_ms)
        .unwrap_or(DEFAULT_WATCH_DEBOUNCE_MS);

    Ok(ResolvedConfig {
        home,
        store_path,
        config_file: config_path,
        delivery: DeliverySettings { retain_delivered },
        watch_debounce: Duration::from_millis(debounce_ms),
    })
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    match find_config_file() {
        Some(config_path) => {
            let file = load_config_file(&config_path)?;
            resolve(Some(config_path), Some(file))
        }
        None => resolve(None, None),
    }
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| e.to_string()));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Get the inbox log path
pub fn store_path() -> Result<PathBuf> {
    Ok(config()?.store_path.clone())
}
