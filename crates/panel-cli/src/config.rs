use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use panel_core::{HealthConfig, OrchestratorConfig};

/// Environment variable that overrides `backend.base_url`
pub const API_URL_ENV: &str = "PANEL_API_URL";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PanelConfig {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub health: HealthCliConfig,
    #[serde(default)]
    pub display: DisplayConfig,
}

// ── Backend ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,
    #[serde(default = "default_available_timeout")]
    pub available_timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:8080/api".to_string()
}

fn default_call_timeout() -> u64 {
    120
}

fn default_available_timeout() -> u64 {
    120
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            call_timeout_secs: default_call_timeout(),
            available_timeout_secs: default_available_timeout(),
        }
    }
}

// ── Health ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCliConfig {
    #[serde(default = "default_health_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_health_timeout")]
    pub timeout_secs: u64,
}

fn default_health_interval() -> u64 {
    30
}

fn default_health_timeout() -> u64 {
    5
}

impl Default for HealthCliConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_health_interval(),
            timeout_secs: default_health_timeout(),
        }
    }
}

// ── Display ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_true")]
    pub show_metadata: bool,
    /// Show rate-limit "remaining" counters even when they are 0
    #[serde(default = "default_true")]
    pub show_zero_remaining: bool,
}

fn default_true() -> bool {
    true
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            show_metadata: true,
            show_zero_remaining: true,
        }
    }
}

pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".panel")
}

impl PanelConfig {
    /// Load the effective configuration.
    ///
    /// An explicit `--config` path must exist. The default path is optional;
    /// built-in defaults apply when it is missing.
    pub fn load(custom_path: &Option<PathBuf>) -> Result<Self> {
        let path = custom_path
            .clone()
            .unwrap_or_else(|| config_dir().join("config.toml"));

        let mut config = if custom_path.is_none() && !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            Self::default()
        } else {
            Self::from_file(&path)?
        };

        if let Ok(url) = std::env::var(API_URL_ENV)
            && !url.trim().is_empty()
        {
            debug!("Base URL overridden by {}", API_URL_ENV);
            config.backend.base_url = url.trim().to_string();
        }

        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).with_context(|| {
            format!(
                "Failed to read config at {}. Run `panel init` to create one.",
                path.display()
            )
        })?;

        let api_url = std::env::var(API_URL_ENV).unwrap_or_default();
        let expanded = expand_env_vars(&content, &api_url);

        toml::from_str(&expanded)
            .with_context(|| format!("Failed to parse config at {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.backend.base_url)
            .with_context(|| format!("Invalid backend.base_url '{}'", self.backend.base_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!(
                "backend.base_url must be an http(s) URL, got scheme '{}'",
                url.scheme()
            );
        }

        let positive = [
            ("backend.call_timeout_secs", self.backend.call_timeout_secs),
            ("backend.available_timeout_secs", self.backend.available_timeout_secs),
            ("health.interval_secs", self.health.interval_secs),
            ("health.timeout_secs", self.health.timeout_secs),
        ];
        for (name, value) in positive {
            if value == 0 {
                bail!("{} must be greater than 0", name);
            }
        }

        if self.health.timeout_secs > self.health.interval_secs {
            warn!(
                "health.timeout_secs ({}) exceeds health.interval_secs ({}); polls will be skipped",
                self.health.timeout_secs, self.health.interval_secs
            );
        }

        Ok(())
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            call_timeout: Duration::from_secs(self.backend.call_timeout_secs),
        }
    }

    pub fn health_config(&self) -> HealthConfig {
        HealthConfig {
            interval: Duration::from_secs(self.health.interval_secs),
            probe_timeout: Duration::from_secs(self.health.timeout_secs),
        }
    }

    pub fn available_timeout(&self) -> Duration {
        Duration::from_secs(self.backend.available_timeout_secs)
    }
}

/// Substitute `${PANEL_API_URL}` in the raw config text. It is the only
/// variable the file may reference; anything else is left as written.
fn expand_env_vars(content: &str, api_url: &str) -> String {
    let placeholder = format!("${{{}}}", API_URL_ENV);
    let expanded = content.replace(&placeholder, api_url);
    if expanded.contains("${") {
        warn!(
            "Config references env vars other than {}; they are left unexpanded",
            API_URL_ENV
        );
    }
    expanded
}
