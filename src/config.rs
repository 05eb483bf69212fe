use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tl_auth::{AuthConfig, FileTokenStore};
use tl_session::SessionConfig;
use tracing::{debug, info, instrument};
use url::Url;

pub const CONFIG_FILE: &str = "tunelink.toml";

/// File name of the local fallback store inside the storage directory
pub const FALLBACK_FILE: &str = "fallback.json";

/// Contents of `tunelink.toml`; every field is optional
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub auth: AuthSection,
    pub storage: StorageSection,
    pub session: SessionSection,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSection {
    pub client_id: Option<String>,
    pub token_url: Option<String>,
    pub probe_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    pub device_name: Option<String>,
    pub interval_secs: Option<u64>,
    pub probe_connectivity: Option<bool>,
}

impl AppConfig {
    /// Platform config location of `tunelink.toml`
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "tunelink").map(|dirs| dirs.config_dir().join(CONFIG_FILE))
    }

    /// Load the config file; a missing file yields the defaults
    #[instrument(level = "debug")]
    pub async fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path.map(Path::to_path_buf).or_else(Self::default_path) else {
            debug!("No config directory on this platform; using defaults");
            return Ok(Self::default());
        };

        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            debug!("Config file {} not found; using defaults", path.display());
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn auth_config(&self) -> anyhow::Result<AuthConfig> {
        let mut config = AuthConfig::default();
        if let Some(url) = &self.auth.token_url {
            config.token_url = Url::parse(url).context("Invalid auth.token_url")?;
        }
        if let Some(url) = &self.auth.probe_url {
            config.probe_url = Url::parse(url).context("Invalid auth.probe_url")?;
        }
        Ok(config)
    }

    pub fn session_config(&self) -> SessionConfig {
        let defaults = SessionConfig::default();
        SessionConfig {
            device_name: self
                .session
                .device_name
                .clone()
                .unwrap_or(defaults.device_name),
            status_interval: self
                .session
                .interval_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.status_interval),
            probe_connectivity: self
                .session
                .probe_connectivity
                .unwrap_or(defaults.probe_connectivity),
        }
    }

    /// Directory holding the durable token files and the fallback store
    pub fn storage_dir(&self) -> anyhow::Result<PathBuf> {
        match &self.storage.dir {
            Some(dir) => Ok(dir.clone()),
            None => FileTokenStore::default_storage_dir()
                .context("Failed to resolve the token storage directory"),
        }
    }
}
