use crate::core::error::{Error, Result};
use crate::core::models::ResourceKind;
use crate::core::schedule::Scheduler;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_ACCOUNT_ID: &str = "OCTOPUS_ACCOUNT_ID";
pub const ENV_API_KEY: &str = "OCTOPUS_API_KEY";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub account: AccountSettings,
    pub monitor: MonitorSettings,
    pub notifications: NotificationSettings,
    pub cache: CacheSettings,
    pub api: ApiSettings,
    pub debug: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountSettings {
    pub id: String,
    pub api_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    /// Sessions rewarding fewer OctoPoints are left alone. 0 joins everything.
    pub min_points: i64,
    pub smart_intervals: bool,
    pub check_interval_minutes: u64,
    pub auto_spin: bool,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            min_points: 0,
            smart_intervals: true,
            check_interval_minutes: 15,
            auto_spin: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
    pub enabled: bool,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Resources that fall back to their last value when a refresh fails.
    pub serve_stale: Vec<ResourceKind>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub base_url: String,
    pub graphql_url: String,
    pub backend_graphql_url: String,
    pub free_electricity_url: String,
    pub timeout_secs: u64,
    pub min_interval_ms: u64,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.octopus.energy/v1".to_string(),
            graphql_url: "https://api.octopus.energy/v1/graphql/".to_string(),
            backend_graphql_url: "https://api.backend.octopus.energy/v1/graphql/".to_string(),
            free_electricity_url: "https://oe-api.davidskendall.co.uk/free_electricity.json"
                .to_string(),
            timeout_secs: 30,
            min_interval_ms: 1000,
            max_retries: 3,
            backoff_base_ms: 1000,
        }
    }
}

impl ApiSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }
}

/// Values given on the command line. They win over everything else.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub account_id: Option<String>,
    pub api_key: Option<String>,
    pub min_points: Option<i64>,
    pub no_smart_intervals: bool,
    pub debug: bool,
}

impl Settings {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("octojoin").join("config.toml"))
    }

    /// Reads the settings file. An explicitly given path must exist; the
    /// default location is optional.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let (path, explicit) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (
                Self::config_path().context("Could not determine config directory")?,
                false,
            ),
        };

        if !path.exists() {
            if explicit {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            tracing::info!(?path, "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let settings: Settings = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        tracing::info!(?path, "Loaded config");
        Ok(settings)
    }

    /// File, then environment, then command line, without validation.
    pub fn merge(path: Option<&Path>, overrides: &Overrides) -> anyhow::Result<Self> {
        let mut settings = Self::load(path)?;
        settings.apply_env(|key| std::env::var(key).ok());
        settings.apply_overrides(overrides);
        Ok(settings)
    }

    pub fn resolve(path: Option<&Path>, overrides: &Overrides) -> anyhow::Result<Self> {
        let settings = Self::merge(path, overrides)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(id) = lookup(ENV_ACCOUNT_ID).filter(|v| !v.is_empty()) {
            self.account.id = id;
        }
        if let Some(key) = lookup(ENV_API_KEY).filter(|v| !v.is_empty()) {
            self.account.api_key = key;
        }
    }

    pub fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(id) = &overrides.account_id {
            self.account.id = id.clone();
        }
        if let Some(key) = &overrides.api_key {
            self.account.api_key = key.clone();
        }
        if let Some(min_points) = overrides.min_points {
            self.monitor.min_points = min_points;
        }
        if overrides.no_smart_intervals {
            self.monitor.smart_intervals = false;
        }
        if overrides.debug {
            self.debug = true;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.account.id.trim().is_empty() {
            return Err(Error::validation(
                "account.id",
                format!("account id is required (set it in the config file, {ENV_ACCOUNT_ID} or --account)"),
            ));
        }
        if self.account.api_key.trim().is_empty() {
            return Err(Error::validation(
                "account.api_key",
                format!("API key is required (set it in the config file, {ENV_API_KEY} or --key)"),
            ));
        }
        if self.monitor.min_points < 0 {
            return Err(Error::validation(
                "monitor.min_points",
                format!("must not be negative, got {}", self.monitor.min_points),
            ));
        }
        if self.monitor.check_interval_minutes == 0 {
            return Err(Error::validation(
                "monitor.check_interval_minutes",
                "must be greater than zero",
            ));
        }
        let urls = [
            ("api.base_url", &self.api.base_url),
            ("api.graphql_url", &self.api.graphql_url),
            ("api.backend_graphql_url", &self.api.backend_graphql_url),
            ("api.free_electricity_url", &self.api.free_electricity_url),
        ];
        for (field, url) in urls {
            if url.trim().is_empty() {
                return Err(Error::validation(field, "endpoint URL must not be empty"));
            }
        }
        Ok(())
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.monitor.check_interval_minutes * 60)
    }

    pub fn scheduler(&self) -> Scheduler {
        Scheduler::new(self.monitor.smart_intervals, self.check_interval())
    }
}
