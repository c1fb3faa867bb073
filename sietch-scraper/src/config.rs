use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    #[serde(default)]
    pub scraper: PageConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub schedule: ScheduleConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

/// Where the status page lives and how long to wait for it to render
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageConfig {
    #[serde(default = "default_url")]
    pub url: String,

    /// CSS selector whose presence marks the page as rendered
    #[serde(default = "default_ready_selector")]
    pub ready_selector: String,

    #[serde(default = "default_ready_timeout_secs")]
    pub ready_timeout_secs: u64,

    /// Extra wait after the ready selector (or its timeout)
    #[serde(default = "default_settle_delay_secs")]
    pub settle_delay_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Chromium binary; auto-detected when unset
    #[serde(default)]
    pub chrome_path: Option<PathBuf>,

    /// Dump every rendered page here for offline debugging
    #[serde(default)]
    pub debug_html_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    #[serde(default = "default_db_name")]
    pub name: String,

    #[serde(default = "default_db_user")]
    pub user: String,

    #[serde(default = "default_db_password")]
    pub password: String,

    #[serde(default = "default_db_host")]
    pub host: String,

    #[serde(default = "default_db_port")]
    pub port: u16,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Minutes between scheduled passes; 0 disables the scheduler
    #[serde(default)]
    pub interval_minutes: u64,

    #[serde(default)]
    pub run_on_startup: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_url() -> String {
    "https://dune.gaming.tools/server-status".to_string()
}

fn default_ready_selector() -> String {
    ".text-2xl".to_string()
}

fn default_ready_timeout_secs() -> u64 {
    20
}

fn default_settle_delay_secs() -> u64 {
    5
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string()
}

fn default_db_name() -> String {
    "sietch_tracker".to_string()
}

fn default_db_user() -> String {
    "postgres".to_string()
}

fn default_db_password() -> String {
    "postgres".to_string()
}

fn default_db_host() -> String {
    "localhost".to_string()
}

fn default_db_port() -> u16 {
    5432
}

fn default_max_connections() -> u32 {
    5
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            log_level: default_log_level(),
            log_dir: default_log_dir(),
            scraper: PageConfig::default(),
            database: DatabaseConfig::default(),
            schedule: ScheduleConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            ready_selector: default_ready_selector(),
            ready_timeout_secs: default_ready_timeout_secs(),
            settle_delay_secs: default_settle_delay_secs(),
            user_agent: default_user_agent(),
            chrome_path: None,
            debug_html_path: None,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            name: default_db_name(),
            user: default_db_user(),
            password: default_db_password(),
            host: default_db_host(),
            port: default_db_port(),
            max_connections: default_max_connections(),
        }
    }
}

impl PageConfig {
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }
}

impl ScraperConfig {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let config: ScraperConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {:?}", path))?;
        Ok(config)
    }

    /// Read `path` if it exists (defaults otherwise), then apply environment overrides.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            Self::from_file(path)?
        } else {
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Override settings from `DB_*`, `SCRAPER_URL` and `LOG_LEVEL`.
    pub fn apply_env<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(name) = lookup("DB_NAME") {
            self.database.name = name;
        }
        if let Some(user) = lookup("DB_USER") {
            self.database.user = user;
        }
        if let Some(password) = lookup("DB_PASSWORD") {
            self.database.password = password;
        }
        if let Some(host) = lookup("DB_HOST") {
            self.database.host = host;
        }
        if let Some(port) = lookup("DB_PORT") {
            self.database.port = port
                .trim()
                .parse()
                .with_context(|| format!("Invalid DB_PORT '{}'", port))?;
        }
        if let Some(url) = lookup("SCRAPER_URL") {
            self.scraper.url = url;
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            self.log_level = level;
        }
        Ok(())
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
