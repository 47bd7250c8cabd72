use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    /// Embedded cache database, used when no remote cache is configured
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,

    /// Redis connection URL (`redis://...`)
    #[serde(default)]
    pub remote_cache_url: Option<String>,

    #[serde(default)]
    pub omdb_api_key: Option<String>,

    /// Bearer token for the /admin routes; admin is disabled when unset
    #[serde(default)]
    pub admin_token: Option<String>,

    #[serde(default = "default_review_ttl_secs")]
    pub review_ttl_secs: u64,

    #[serde(default = "default_lookup_ttl_secs")]
    pub lookup_ttl_secs: u64,

    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    #[serde(default = "default_fetch_max_attempts")]
    pub fetch_max_attempts: u32,

    /// Reject title-only lookups whose identifier cannot be resolved
    #[serde(default)]
    pub strict_identity: bool,

    /// Mirror INFO+ log events into the cache store's log list
    #[serde(default = "default_persist_logs")]
    pub persist_logs: bool,

    /// Problems found while loading, reported once logging is up
    #[serde(skip)]
    pub load_warnings: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

fn default_sqlite_path() -> String {
    "cache.sqlite".to_string()
}

fn default_review_ttl_secs() -> u64 {
    60 * 60 * 24 * 30
}

fn default_lookup_ttl_secs() -> u64 {
    60 * 60 * 24 * 365
}

fn default_http_timeout_secs() -> u64 {
    20
}

fn default_fetch_max_attempts() -> u32 {
    5
}

fn default_persist_logs() -> bool {
    true
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            log_dir: default_log_dir(),
            sqlite_path: default_sqlite_path(),
            remote_cache_url: None,
            omdb_api_key: None,
            admin_token: None,
            review_ttl_secs: default_review_ttl_secs(),
            lookup_ttl_secs: default_lookup_ttl_secs(),
            http_timeout_secs: default_http_timeout_secs(),
            fetch_max_attempts: default_fetch_max_attempts(),
            strict_identity: false,
            persist_logs: default_persist_logs(),
            load_warnings: Vec::new(),
        }
    }
}

impl BackendConfig {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: BackendConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Reads `path` if it exists, falls back to defaults otherwise, then
    /// applies environment overrides.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path).with_context(|| format!("Failed to parse config file {}", path))?
        } else {
            let mut config = Self::default();
            config
                .load_warnings
                .push(format!("Config file {} not found, using defaults", path));
            config
        };
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Overrides fields from environment-style variables.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty("OMDB_API_KEY") {
            self.omdb_api_key = Some(key);
        }
        if let Some(url) = non_empty("KV_URL") {
            self.remote_cache_url = Some(url);
        }
        if let Some(path) = non_empty("SQLITE_DB_PATH") {
            self.sqlite_path = path;
        }
        if let Some(token) = non_empty("ADMIN_TOKEN") {
            self.admin_token = Some(token);
        }
        if let Some(level) = non_empty("PGUIDE_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(port) = non_empty("PGUIDE_PORT") {
            match port.parse() {
                Ok(port) => self.port = port,
                Err(_) => self
                    .load_warnings
                    .push(format!("Ignoring invalid PGUIDE_PORT '{}'", port)),
            }
        }
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn review_ttl(&self) -> Duration {
        Duration::from_secs(self.review_ttl_secs)
    }

    pub fn lookup_ttl(&self) -> Duration {
        Duration::from_secs(self.lookup_ttl_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

pub static CONFIG: OnceLock<BackendConfig> = OnceLock::new();

pub fn read_config(path: &str) -> anyhow::Result<&'static BackendConfig> {
    let config = BackendConfig::load(path)?;
    Ok(CONFIG.get_or_init(|| config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults_from_empty_toml() {
        let config: BackendConfig = toml::from_str("").unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.review_ttl(), Duration::from_secs(2_592_000));
        assert_eq!(config.lookup_ttl_secs, 31_536_000);
        assert_eq!(config.fetch_max_attempts, 5);
        assert!(config.remote_cache_url.is_none());
        assert!(!config.strict_identity);
        assert!(config.persist_logs);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "port = 9000\nremote_cache_url = \"redis://127.0.0.1:6379\"\nstrict_identity = true"
        )
        .unwrap();

        let config = BackendConfig::from_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.remote_cache_url.as_deref(), Some("redis://127.0.0.1:6379"));
        assert!(config.strict_identity);
        assert_eq!(config.server_address(), "0.0.0.0:9000");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let config = BackendConfig::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.load_warnings.len(), 1);
        assert!(config.load_warnings[0].contains("absent.toml"));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("OMDB_API_KEY", "k123"),
            ("KV_URL", "redis://cache:6379"),
            ("SQLITE_DB_PATH", ""),
            ("PGUIDE_PORT", "not-a-port"),
        ]);

        let mut config = BackendConfig::default();
        config.apply_env(|name| env.get(name).map(|v| v.to_string()));

        assert_eq!(config.omdb_api_key.as_deref(), Some("k123"));
        assert_eq!(config.remote_cache_url.as_deref(), Some("redis://cache:6379"));
        assert_eq!(config.sqlite_path, "cache.sqlite");
        assert_eq!(config.port, 8080);
        assert_eq!(config.load_warnings, vec!["Ignoring invalid PGUIDE_PORT 'not-a-port'"]);
    }
}
