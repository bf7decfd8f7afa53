//! TOML configuration parsing and validation.
//!
//! ```toml
//! [db]
//! path = "./data/steward.sqlite"
//!
//! [engine]
//! threshold = 90
//! batch_size = 50
//! batch_delay_ms = 100
//! lock_ttl_secs = 900
//!
//! [server]
//! bind = "127.0.0.1:7340"
//!
//! [auth]
//! admin_emails = ["ops@example.com"]
//!
//! [content]
//! image_base_url = "https://images.example.com/catalog"
//! ```
//!
//! Only `[db]` is required; every other section has defaults.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use catalog_steward_core::quality::DEFAULT_THRESHOLD;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub content: ContentConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EngineConfig {
    /// Completeness (0–100) below which a record needs standardization.
    #[serde(default = "default_threshold")]
    pub threshold: u8,
    /// Records (or duplicate groups) processed per chunk.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Pause between chunks, in milliseconds.
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
    /// Age after which a category lock is treated as abandoned.
    #[serde(default = "default_lock_ttl_secs")]
    pub lock_ttl_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            batch_size: default_batch_size(),
            batch_delay_ms: default_batch_delay_ms(),
            lock_ttl_secs: default_lock_ttl_secs(),
        }
    }
}

impl EngineConfig {
    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_secs)
    }
}

fn default_threshold() -> u8 {
    DEFAULT_THRESHOLD
}
fn default_batch_size() -> usize {
    50
}
fn default_batch_delay_ms() -> u64 {
    100
}
fn default_lock_ttl_secs() -> u64 {
    900
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7340".to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AuthConfig {
    /// Administrators allowed to call the HTTP API (case-insensitive).
    #[serde(default)]
    pub admin_emails: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ContentConfig {
    #[serde(default = "default_image_base_url")]
    pub image_base_url: String,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            image_base_url: default_image_base_url(),
        }
    }
}

fn default_image_base_url() -> String {
    "https://images.example.invalid/catalog".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.engine.threshold > 100 {
        anyhow::bail!("engine.threshold must be in [0, 100]");
    }

    if config.engine.batch_size == 0 {
        anyhow::bail!("engine.batch_size must be > 0");
    }

    if config.engine.lock_ttl_secs == 0 {
        anyhow::bail!("engine.lock_ttl_secs must be > 0");
    }

    if config.content.image_base_url.trim().is_empty() {
        anyhow::bail!("content.image_base_url must not be empty");
    }

    if config
        .auth
        .admin_emails
        .iter()
        .any(|e| !e.contains('@'))
    {
        anyhow::bail!("auth.admin_emails must contain email addresses");
    }

    Ok(())
}
