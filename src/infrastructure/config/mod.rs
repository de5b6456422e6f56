use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::csv::{IngestSettings, DEFAULT_CHUNK_SIZE, DEFAULT_SCHEMA};
use crate::domain::error::{AppError, Result};

pub const DEFAULT_CONFIG_FILE: &str = "csvship.toml";

/// Environment variables recognised on top of the TOML file, with the
/// configuration key each one feeds.
const ENV_KEYS: &[(&str, &str)] = &[
    ("DB_HOST", "database.host"),
    ("DB_PORT", "database.port"),
    ("DB_NAME", "database.name"),
    ("DB_USER", "database.user"),
    ("DB_PASSWORD", "database.password"),
    ("DB_TRUSTED", "database.trusted"),
    ("DB_CONNECT_TIMEOUT", "database.connect_timeout_secs"),
    ("DB_SCHEMA", "ingest.schema"),
    ("CSV_CHUNK_SIZE", "ingest.chunk_size"),
    ("CSV_FILES_DIR", "dirs.ingest"),
    ("CSV_FILES_DIR_SHIP", "dirs.ship"),
    ("CSV_FILES_DIR_DUMPSTER", "dirs.dumpster"),
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Use ambient credentials (PG* variables, .pgpass) instead of user/password
    pub trusted: bool,
    pub connect_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            name: "postgres".to_string(),
            user: None,
            password: None,
            trusted: false,
            connect_timeout_secs: 15,
        }
    }
}

impl DatabaseConfig {
    /// Trusted authentication applies when asked for, or when either
    /// credential is missing.
    pub fn use_trusted(&self) -> bool {
        let blank = |v: &Option<String>| v.as_deref().map_or(true, |s| s.trim().is_empty());
        self.trusted || blank(&self.user) || blank(&self.password)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.host.trim().is_empty() {
            return Err("database.host must not be empty".to_string());
        }
        if self.name.trim().is_empty() {
            return Err("database.name must not be empty".to_string());
        }
        if self.connect_timeout_secs == 0 {
            return Err("database.connect_timeout_secs must be > 0".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub schema: String,
    pub chunk_size: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            schema: DEFAULT_SCHEMA.to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Source directories per command. `ingest` is the fallback for the others.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirsConfig {
    pub ingest: Option<PathBuf>,
    pub ship: Option<PathBuf>,
    pub dumpster: Option<PathBuf>,
}

impl DirsConfig {
    pub fn for_ingest(&self) -> Option<&Path> {
        self.ingest.as_deref()
    }

    pub fn for_ship(&self) -> Option<&Path> {
        self.ship.as_deref().or(self.ingest.as_deref())
    }

    pub fn for_drop(&self) -> Option<&Path> {
        self.dumpster.as_deref().or(self.ingest.as_deref())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub ingest: IngestConfig,
    pub dirs: DirsConfig,
}

impl AppConfig {
    /// Ingestion settings for a run; `ship` forces truncation of existing tables.
    pub fn ingest_settings(&self, ship: bool) -> IngestSettings {
        let base = if ship {
            IngestSettings::ship()
        } else {
            IngestSettings::new()
        };
        IngestSettings {
            schema: self.ingest.schema.clone(),
            chunk_size: self.ingest.chunk_size,
            ..base
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.database.validate().map_err(AppError::ConfigError)?;
        self.ingest_settings(false)
            .validate()
            .map_err(AppError::ConfigError)
    }
}

pub struct ConfigService;

impl ConfigService {
    /// Load defaults, then the TOML file (if present), then the environment.
    /// A `.env` file in the working directory is read first.
    pub fn load(path: Option<&Path>) -> Result<AppConfig> {
        match dotenvy::dotenv() {
            Ok(env_file) => debug!(file = %env_file.display(), "Loaded .env file"),
            Err(e) if e.not_found() => {}
            Err(e) => warn!(error = %e, "Failed to read .env file"),
        }

        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        let config: AppConfig = Self::figment(path)
            .extract()
            .map_err(|e| AppError::ConfigError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    fn figment(path: &Path) -> Figment {
        let names: Vec<&str> = ENV_KEYS.iter().map(|(var, _)| *var).collect();

        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::raw().only(&names).map(|var| {
                ENV_KEYS
                    .iter()
                    .find(|(name, _)| var.as_str().eq_ignore_ascii_case(name))
                    .map(|(_, key)| (*key).into())
                    .unwrap_or_else(|| var.as_str().into())
            }))
    }
}
