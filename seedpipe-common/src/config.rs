//! Configuration loading
//!
//! The config file path resolves by priority: explicit CLI path, then the
//! SEEDPIPE_CONFIG environment variable, then ./seedpipe.toml, then the
//! user config directory. No file means built-in defaults. CLI flags
//! override file values at the call site.

use crate::schema::SchemaRules;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable naming the config file.
pub const CONFIG_ENV_VAR: &str = "SEEDPIPE_CONFIG";

const LOCAL_CONFIG_FILE: &str = "seedpipe.toml";

/// What to do when two records in one run share an identity key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicatePolicy {
    /// The later record (in discovery order) replaces the earlier.
    LastWriteWins,
    /// The earlier record is kept; the later is rejected.
    Reject,
}

impl Default for DuplicatePolicy {
    fn default() -> Self {
        DuplicatePolicy::LastWriteWins
    }
}

impl std::fmt::Display for DuplicatePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DuplicatePolicy::LastWriteWins => write!(f, "last-write-wins"),
            DuplicatePolicy::Reject => write!(f, "reject"),
        }
    }
}

impl std::str::FromStr for DuplicatePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "last-write-wins" => Ok(DuplicatePolicy::LastWriteWins),
            "reject" => Ok(DuplicatePolicy::Reject),
            other => Err(Error::InvalidInput(format!(
                "unknown duplicate policy {:?} (expected last-write-wins or reject)",
                other
            ))),
        }
    }
}

/// Store location and connection settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database file path.
    pub path: PathBuf,
    pub max_connections: u32,
    pub busy_timeout_ms: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            path: PathBuf::from("data/seedpipe.db"),
            max_connections: 20,
            busy_timeout_ms: 5000,
        }
    }
}

/// Defaults for the ingestion pipeline; CLI flags override per run.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Records per write transaction.
    pub batch_size: usize,
    pub on_duplicate: DuplicatePolicy,
    /// Parse worker threads.
    pub parse_workers: usize,
    /// Attempts per storage operation before the run fails.
    pub max_write_attempts: u32,
    /// First retry delay; doubles per attempt.
    pub retry_base_delay_ms: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        IngestConfig {
            batch_size: 500,
            on_duplicate: DuplicatePolicy::default(),
            parse_workers: 4,
            max_write_attempts: 5,
            retry_base_delay_ms: 100,
        }
    }
}

/// Query API settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub default_list_limit: i64,
    pub max_list_limit: i64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            host: "127.0.0.1".to_string(),
            port: 5750,
            default_list_limit: 50,
            max_list_limit: 500,
        }
    }
}

/// Top-level configuration for every seedpipe process.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SeedpipeConfig {
    pub database: DatabaseConfig,
    pub ingest: IngestConfig,
    pub api: ApiConfig,
    /// Field rules; absent means the built-in seed schema.
    pub schema: Option<SchemaRules>,
}

impl SeedpipeConfig {
    /// Load configuration, resolving the file path by priority:
    /// 1. Explicit CLI path (must exist)
    /// 2. SEEDPIPE_CONFIG environment variable
    /// 3. ./seedpipe.toml
    /// 4. User config directory (seedpipe/config.toml)
    /// 5. Built-in defaults
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = cli_path {
            let config = Self::from_file(path)?;
            info!("Loaded configuration from {}", path.display());
            return Ok(config);
        }

        if let Ok(env_path) = std::env::var(CONFIG_ENV_VAR) {
            let path = PathBuf::from(env_path);
            let config = Self::from_file(&path)?;
            info!(
                "Loaded configuration from {} ({})",
                path.display(),
                CONFIG_ENV_VAR
            );
            return Ok(config);
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            let config = Self::from_file(&local)?;
            info!("Loaded configuration from {}", local.display());
            return Ok(config);
        }

        if let Some(user) = dirs::config_dir().map(|d| d.join("seedpipe").join("config.toml")) {
            if user.exists() {
                let config = Self::from_file(&user)?;
                info!("Loaded configuration from {}", user.display());
                return Ok(config);
            }
        }

        debug!("No configuration file found, using defaults");
        Ok(SeedpipeConfig::default())
    }

    /// Parse and validate one file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let config: SeedpipeConfig = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("cannot parse {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.ingest.batch_size == 0 {
            return Err(Error::Config(
                "ingest.batch_size must be at least 1".to_string(),
            ));
        }
        if self.ingest.parse_workers == 0 {
            return Err(Error::Config(
                "ingest.parse_workers must be at least 1".to_string(),
            ));
        }
        if self.ingest.max_write_attempts == 0 {
            return Err(Error::Config(
                "ingest.max_write_attempts must be at least 1".to_string(),
            ));
        }
        if self.api.default_list_limit < 1 {
            return Err(Error::Config(
                "api.default_list_limit must be at least 1".to_string(),
            ));
        }
        if self.api.max_list_limit < self.api.default_list_limit {
            return Err(Error::Config(
                "api.max_list_limit must not be below api.default_list_limit".to_string(),
            ));
        }
        if let Some(schema) = &self.schema {
            schema.validate()?;
        }
        Ok(())
    }

    /// Active rule set: the configured schema or the built-in seed domain.
    pub fn schema_rules(&self) -> SchemaRules {
        self.schema
            .clone()
            .unwrap_or_else(SchemaRules::seed_default)
    }
}
