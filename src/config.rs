//! TOML configuration parsing and validation.
//!
//! Only `[db]` is required. `[discovery]` and `[logging]` fall back to
//! the defaults below when omitted.
//!
//! ```toml
//! [db]
//! path = "./data/kbd.sqlite"
//!
//! [discovery]
//! similarity_threshold = 0.3
//! temporal_window_secs = 3600
//! timeout_ms = 5000
//! cache_ttl_secs = 300
//! ingest_priority = 10
//! update_priority = 5
//!
//! [logging]
//! filter = "info"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use kb_discovery_core::fusion::DiscoveryParams;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DiscoveryConfig {
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    #[serde(default = "default_temporal_window_secs")]
    pub temporal_window_secs: i64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_ingest_priority")]
    pub ingest_priority: i32,
    #[serde(default = "default_update_priority")]
    pub update_priority: i32,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            temporal_window_secs: default_temporal_window_secs(),
            timeout_ms: default_timeout_ms(),
            cache_ttl_secs: default_cache_ttl_secs(),
            ingest_priority: default_ingest_priority(),
            update_priority: default_update_priority(),
        }
    }
}

fn default_similarity_threshold() -> f64 {
    kb_discovery_core::lexical::DEFAULT_SIMILARITY_THRESHOLD
}
fn default_temporal_window_secs() -> i64 {
    kb_discovery_core::temporal::DEFAULT_TEMPORAL_WINDOW_SECS
}
fn default_timeout_ms() -> u64 {
    5000
}
fn default_cache_ttl_secs() -> u64 {
    300
}
fn default_ingest_priority() -> i32 {
    10
}
fn default_update_priority() -> i32 {
    5
}

/// Largest accepted `temporal_window_secs` (one year).
pub const MAX_TEMPORAL_WINDOW_SECS: i64 = 365 * 24 * 60 * 60;

impl DiscoveryConfig {
    /// Scoring parameters for the core fusion builder.
    ///
    /// The window is clamped to `0..=MAX_TEMPORAL_WINDOW_SECS` so an
    /// unvalidated config cannot overflow `chrono::Duration`.
    pub fn params(&self) -> DiscoveryParams {
        let window_secs = self.temporal_window_secs.clamp(0, MAX_TEMPORAL_WINDOW_SECS);
        DiscoveryParams {
            similarity_threshold: self.similarity_threshold,
            temporal_window: chrono::Duration::seconds(window_secs),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive, used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Config {
    /// Config pointing at `db_path` with every other section defaulted.
    pub fn with_db_path(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig {
                path: db_path.into(),
            },
            discovery: DiscoveryConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    let d = &config.discovery;

    if !(0.0..=1.0).contains(&d.similarity_threshold) {
        anyhow::bail!("discovery.similarity_threshold must be in [0.0, 1.0]");
    }
    if d.temporal_window_secs <= 0 {
        anyhow::bail!("discovery.temporal_window_secs must be > 0");
    }
    if d.temporal_window_secs > MAX_TEMPORAL_WINDOW_SECS {
        anyhow::bail!(
            "discovery.temporal_window_secs must be <= {}",
            MAX_TEMPORAL_WINDOW_SECS
        );
    }
    if d.timeout_ms == 0 {
        anyhow::bail!("discovery.timeout_ms must be > 0");
    }

    Ok(())
}
