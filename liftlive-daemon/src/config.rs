//! Configuration management

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use liftlive_gateway::GatewayConfig;

/// Rest-period video feed configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShortsConfig {
    /// How long a fetched queue is served before refilling (seconds)
    pub cache_ttl_secs: u64,

    /// Curated video ids, served before the built-in fallbacks
    pub video_ids: Vec<String>,
}

impl Default for ShortsConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 900,
            video_ids: Vec::new(),
        }
    }
}

/// Daemon configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Path to configuration file
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Listen address
    pub bind_address: IpAddr,

    /// Listen port (HTTP and WebSocket share it)
    pub port: u16,

    /// Allowed CORS origin (None = any origin)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frontend_origin: Option<String>,

    /// Expire an active set after this long without activity (0 = never)
    pub active_set_timeout_secs: u64,

    /// Broadcast a live `setUpdate` after every rep
    pub live_set_updates: bool,

    /// Push rest-period shorts and music cues around sets
    pub rest_cues: bool,

    /// Number of shorts pushed after each set
    pub rest_queue_size: usize,

    /// History database (None = `<data_dir>/db/history.db`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_db_path: Option<PathBuf>,

    pub shorts: ShortsConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            config_path: Self::default_config_path(),
            bind_address: IpAddr::from([0, 0, 0, 0]),
            port: 3001,
            frontend_origin: None,
            active_set_timeout_secs: 600,
            live_set_updates: true,
            rest_cues: true,
            rest_queue_size: 10,
            history_db_path: None,
            shorts: ShortsConfig::default(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from the default location, or create it
    pub fn load() -> Result<Self> {
        Self::load_from(Self::default_config_path())
    }

    /// Load configuration from `path`, writing defaults there if missing
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let config_path = liftlive_paths::expand_home(path)?;

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config file {}", config_path.display()))?;

            let mut config: DaemonConfig =
                toml::from_str(&contents).context("Failed to parse config file")?;

            config.config_path = config_path;
            Ok(config)
        } else {
            let config = Self {
                config_path,
                ..Self::default()
            };
            config.save().context("Failed to save default config")?;
            Ok(config)
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&self.config_path, contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Apply `PORT` and `FRONTEND_URL` from the process environment
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Apply environment overrides read through `lookup`
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT") {
            self.port = port
                .trim()
                .parse()
                .with_context(|| format!("Invalid PORT value '{}'", port))?;
        }
        if let Some(origin) = lookup("FRONTEND_URL") {
            let origin = origin.trim();
            if !origin.is_empty() {
                self.frontend_origin = Some(origin.to_string());
            }
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    pub fn active_set_timeout(&self) -> Option<Duration> {
        match self.active_set_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            idle_timeout: self.active_set_timeout(),
            live_set_updates: self.live_set_updates,
            ..GatewayConfig::default()
        }
    }

    /// Resolved history database location
    pub fn history_db_path(&self) -> Result<PathBuf> {
        match &self.history_db_path {
            Some(path) => liftlive_paths::expand_home(path),
            None => liftlive_paths::get_history_db_path(),
        }
    }

    fn default_config_path() -> PathBuf {
        liftlive_paths::get_config_file_path().unwrap_or_else(|_| PathBuf::from("config.toml"))
    }
}
