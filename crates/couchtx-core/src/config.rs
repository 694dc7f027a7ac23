use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::retry::{BackoffPolicy, DEFAULT_LIMIT};
use crate::store::CouchOptions;
use crate::txn::TransactionOptions;

/// Backoff shape selectable from config.toml.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    #[default]
    Constant,
    Exponential,
}

/// Retry parameters (`[retry]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempt budget per transaction (conflicts do not count).
    pub limit: u32,
    #[serde(default)]
    pub backoff: BackoffKind,
    /// Constant delay, or the exponential base, in milliseconds.
    pub base_delay_ms: u64,
    /// Upper bound for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
    /// Optional wall-clock bound per transaction.
    #[serde(default)]
    pub deadline_secs: Option<u64>,
    #[serde(default)]
    pub create_missing: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            backoff: BackoffKind::Constant,
            base_delay_ms: 300,
            max_delay_ms: 30_000,
            deadline_secs: None,
            create_missing: false,
        }
    }
}

impl RetryConfig {
    pub fn backoff_policy(&self) -> BackoffPolicy {
        let base = Duration::from_millis(self.base_delay_ms);
        match self.backoff {
            BackoffKind::Constant => BackoffPolicy::Constant(base),
            BackoffKind::Exponential => BackoffPolicy::Exponential {
                base,
                max: Duration::from_millis(self.max_delay_ms),
            },
        }
    }
}

/// CouchDB connection (`[couch]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchConfig {
    pub url: String,
    pub database: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    pub connect_timeout_secs: u64,
    pub timeout_secs: u64,
}

impl Default for CouchConfig {
    fn default() -> Self {
        let defaults = CouchOptions::default();
        Self {
            url: defaults.url,
            database: defaults.database,
            username: None,
            password: None,
            connect_timeout_secs: defaults.connect_timeout.as_secs(),
            timeout_secs: defaults.timeout.as_secs(),
        }
    }
}

impl CouchConfig {
    pub fn to_options(&self) -> CouchOptions {
        CouchOptions {
            url: self.url.clone(),
            database: self.database.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

/// Configuration loaded from `~/.config/couchtx/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TxnConfig {
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub couch: CouchConfig,
}

impl TxnConfig {
    pub fn transaction_options(&self) -> TransactionOptions {
        TransactionOptions {
            limit: self.retry.limit,
            backoff: self.retry.backoff_policy(),
            deadline: self.retry.deadline_secs.map(Duration::from_secs),
            create_missing: self.retry.create_missing,
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("couchtx")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<TxnConfig> {
    load_or_init_at(&config_path()?)
}

/// Like [`load_or_init`] for an explicit path.
pub fn load_or_init_at(path: &Path) -> Result<TxnConfig> {
    if !path.exists() {
        let default_cfg = TxnConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }
    load_from(path)
}

pub fn load_from(path: &Path) -> Result<TxnConfig> {
    let data = fs::read_to_string(path)?;
    let cfg: TxnConfig = toml::from_str(&data)?;
    Ok(cfg)
}
