use crate::error::ConfigError;
use crate::session::RetryPolicy;
use crate::transport::TransportConfig;
use camshare_core::model::MediaConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Delay before a viewer redials a camera whose call closed.
pub const VIEWER_RECONNECT_DELAY: Duration = Duration::from_secs(3);

pub const DEFAULT_REGISTRY_ENTRIES: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CamshareConfig {
    pub transport: TransportConfig,
    /// Re-registration after the signaling service drops a session.
    pub session_retry: RetryPolicy,
    /// Redialing a camera after its call closed.
    pub viewer_retry: RetryPolicy,
    pub share: ShareConfig,
    pub registry: RegistryConfig,
    /// Defaults for new broadcasts.
    pub media: MediaConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShareConfig {
    pub origin: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub path: PathBuf,
    pub max_entries: usize,
}

impl Default for CamshareConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            session_retry: RetryPolicy::default(),
            viewer_retry: RetryPolicy::unbounded(VIEWER_RECONNECT_DELAY),
            share: ShareConfig::default(),
            registry: RegistryConfig::default(),
            media: MediaConfig::default(),
        }
    }
}

impl Default for ShareConfig {
    fn default() -> Self {
        Self {
            origin: "http://localhost:5173".to_owned(),
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("saved-cameras.json"),
            max_entries: DEFAULT_REGISTRY_ENTRIES,
        }
    }
}

impl CamshareConfig {
    /// Loads configuration from a TOML file. A missing file yields defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: CamshareConfig = toml::from_str(&contents)?;
        config.validate()?;

        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents).map_err(write_err)?;

        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    pub fn default_path() -> PathBuf {
        PathBuf::from("camshare.toml")
    }

    pub fn load_or_default() -> Self {
        Self::load_from_file(Self::default_path()).unwrap_or_else(|e| {
            warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.registry.max_entries == 0 {
            return Err(ConfigError::Invalid(
                "registry.max_entries must be at least 1".to_owned(),
            ));
        }
        if self.share.origin.trim().is_empty() {
            return Err(ConfigError::Invalid("share.origin must not be empty".to_owned()));
        }
        for policy in [&self.session_retry, &self.viewer_retry] {
            if !policy.backoff_factor.is_finite() || policy.backoff_factor < 1.0 {
                return Err(ConfigError::Invalid(
                    "retry backoff_factor must be a finite number >= 1".to_owned(),
                ));
            }
        }
        Ok(())
    }
}
