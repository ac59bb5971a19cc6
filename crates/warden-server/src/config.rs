use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub admin: AdminConfig,
    pub bootstrap: BootstrapConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub refresh_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    pub superuser: String,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub format: LogFormat,
    pub level: String,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost:5432/warden".to_string(),
            max_connections: 10,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: 100,
        }
    }
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9180,
        }
    }
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            superuser: "warden".to_string(),
            password: None,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Json,
            level: "info".to_string(),
        }
    }
}

impl AppConfig {
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            let contents = std::fs::read_to_string(path)
                .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e.to_string()))?;
            toml::from_str::<AppConfig>(&contents)
                .map_err(|e| ConfigError::ParseToml(e.to_string()))?
        } else {
            AppConfig::default()
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("WARDEN_STORAGE_BACKEND") {
            match v.as_str() {
                "memory" => self.storage.backend = StorageBackend::Memory,
                "postgres" => self.storage.backend = StorageBackend::Postgres,
                _ => {}
            }
        }
        if let Ok(v) = std::env::var("WARDEN_DATABASE_URL") {
            self.database.url = v;
        }
        if let Ok(v) = std::env::var("WARDEN_DATABASE_MAX_CONNECTIONS")
            && let Ok(n) = v.parse()
        {
            self.database.max_connections = n;
        }
        if let Ok(v) = std::env::var("WARDEN_CACHE_REFRESH_INTERVAL_MS")
            && let Ok(n) = v.parse()
        {
            self.cache.refresh_interval_ms = n;
        }
        if let Ok(v) = std::env::var("WARDEN_ADMIN_HOST") {
            self.admin.host = v;
        }
        if let Ok(v) = std::env::var("WARDEN_ADMIN_PORT")
            && let Ok(port) = v.parse()
        {
            self.admin.port = port;
        }
        if let Ok(v) = std::env::var("WARDEN_BOOTSTRAP_SUPERUSER") {
            self.bootstrap.superuser = v;
        }
        if let Ok(v) = std::env::var("WARDEN_BOOTSTRAP_PASSWORD") {
            self.bootstrap.password = Some(v);
        }
        if let Ok(v) = std::env::var("WARDEN_LOG_LEVEL") {
            self.log.level = v;
        }
        if let Ok(v) = std::env::var("WARDEN_LOG_FORMAT") {
            match v.as_str() {
                "json" => self.log.format = LogFormat::Json,
                "pretty" => self.log.format = LogFormat::Pretty,
                _ => {}
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.refresh_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "cache.refresh_interval_ms must be non-zero".to_string(),
            ));
        }
        if self.admin.port == 0 {
            return Err(ConfigError::Validation(
                "admin.port must be non-zero".to_string(),
            ));
        }
        if self.storage.backend == StorageBackend::Postgres && self.database.max_connections == 0 {
            return Err(ConfigError::Validation(
                "database.max_connections must be non-zero".to_string(),
            ));
        }
        if self.bootstrap.superuser.trim().is_empty() {
            return Err(ConfigError::Validation(
                "bootstrap.superuser must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.cache.refresh_interval_ms)
    }

    pub fn admin_addr(&self) -> String {
        format!("{}:{}", self.admin.host, self.admin.port)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file '{0}': {1}")]
    ReadFile(String, String),

    #[error("failed to parse TOML config: {0}")]
    ParseToml(String),

    #[error("config validation failed: {0}")]
    Validation(String),
}
