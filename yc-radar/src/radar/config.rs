/*!
Configuration management for the radar
*/

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::radar::error::RadarError;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RadarConfig {
    /// Remote directory query settings
    pub catalog: CatalogConfig,
    /// State persistence settings
    pub state: StateConfig,
    /// Webhook delivery settings
    pub delivery: DeliveryConfig,
    /// Backoff shared by catalog queries and webhook posts
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub app_id: String,
    pub api_key: String,
    /// Index used for counts, facets and partition fetches
    pub primary_index: String,
    /// Index sorted by launch date, used for window queries
    pub launch_index: String,
    /// Facet with bounded cardinality used to split full enumerations
    pub partition_facet: String,
    /// Maximum hits a single query may return
    pub page_cap: usize,
    pub partition_pause_ms: u64,
    pub request_timeout_secs: u64,
    /// Prefix for company profile links in notifications
    pub profile_base_url: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StateConfig {
    pub data_dir: PathBuf,
    pub state_file: String,
    pub pending_file: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DeliveryConfig {
    pub webhook_url: Option<String>,
    /// Sent as `Authorization: Bearer <token>` when set
    pub auth_token: Option<String>,
    /// Pause between two consecutive webhook posts
    pub item_pause_ms: u64,
    /// Value of the `event` field in every payload
    pub event: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts including the first one
    pub max_attempts: u32,
    /// Wait after attempt `n` is `base_delay_ms * 2^n`
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: bool,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            app_id: "45BWZJ1SGC".to_string(),
            api_key: concat!(
                "ZjA3NWMwMmNhMzEwZmMxOThkZDlkMjFmNDAwNTNjNjdkZjdhNWJkOWRjMThiODQwMjUyZTVkYjA4",
                "YjFlMmU2YnJlc3RyaWN0SW5kaWNlcz0lNUIlMjJZQ0NvbXBhbnlfcHJvZHVjdGlvbiUyMiUyQyUy",
                "MllDQ29tcGFueV9CeV9MYXVuY2hfRGF0ZV9wcm9kdWN0aW9uJTIyJTVEJnRhZ0ZpbHRlcnM9JTVC",
                "JTIyeWNkY19wdWJsaWMlMjIlNUQmYW5hbHl0aWNzVGFncz0lNUIlMjJ5Y2RjJTIyJTVE",
            )
            .to_string(),
            primary_index: "YCCompany_production".to_string(),
            launch_index: "YCCompany_By_Launch_Date_production".to_string(),
            partition_facet: "batch".to_string(),
            page_cap: 1000,
            partition_pause_ms: 100,
            request_timeout_secs: 30,
            profile_base_url: "https://www.ycombinator.com/companies".to_string(),
        }
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            state_file: "known_companies.json".to_string(),
            pending_file: "pending_webhook.json".to_string(),
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            auth_token: None,
            item_pause_ms: 200,
            event: "new_yc_company".to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 60_000,
            jitter: false,
        }
    }
}

impl CatalogConfig {
    pub fn partition_pause(&self) -> Duration {
        Duration::from_millis(self.partition_pause_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl StateConfig {
    pub fn state_path(&self) -> PathBuf {
        self.data_dir.join(&self.state_file)
    }

    pub fn pending_path(&self) -> PathBuf {
        self.data_dir.join(&self.pending_file)
    }
}

impl DeliveryConfig {
    pub fn item_pause(&self) -> Duration {
        Duration::from_millis(self.item_pause_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Environment overrides recognised on top of the file config
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub webhook_url: Option<String>,
    pub auth_token: Option<String>,
    pub data_dir: Option<PathBuf>,
    pub app_id: Option<String>,
    pub api_key: Option<String>,
}

impl EnvOverrides {
    /// Reads overrides from the process environment. Empty values are ignored.
    pub fn from_env() -> Self {
        let var = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        Self {
            webhook_url: var("WEBHOOK_URL"),
            auth_token: var("WEBHOOK_AUTH_TOKEN"),
            data_dir: var("DATA_DIR").map(PathBuf::from),
            app_id: var("ALGOLIA_APP_ID"),
            api_key: var("ALGOLIA_API_KEY"),
        }
    }
}

impl RadarConfig {
    /// Parse a TOML document. Missing sections and fields keep their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, RadarError> {
        toml::from_str(content).map_err(|e| RadarError::Config(e.to_string()))
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, RadarError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| RadarError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// `<config_dir>/yc-radar/config.toml`, when the platform has a config dir
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("yc-radar").join("config.toml"))
    }

    pub fn apply_env(&mut self, env: EnvOverrides) {
        if let Some(url) = env.webhook_url {
            self.delivery.webhook_url = Some(url);
        }
        if let Some(token) = env.auth_token {
            self.delivery.auth_token = Some(token);
        }
        if let Some(dir) = env.data_dir {
            self.state.data_dir = dir;
        }
        if let Some(app_id) = env.app_id {
            self.catalog.app_id = app_id;
        }
        if let Some(api_key) = env.api_key {
            self.catalog.api_key = api_key;
        }
    }

    /// Webhook URL if one is configured and non-blank
    pub fn webhook_url(&self) -> Option<&str> {
        self.delivery
            .webhook_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}
