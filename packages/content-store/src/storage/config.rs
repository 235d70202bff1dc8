// Store configuration management
use crate::placement::{PlacementService, Scheme};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;

/// Environment variable overriding the store root
pub const ROOT_ENV: &str = "CONTENT_STORE_ROOT";

/// Store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Root directory for content and the record database
    pub root: PathBuf,

    /// Storage type (currently only "local" is supported)
    #[serde(default = "default_storage_type")]
    pub storage_type: String,

    /// Scheme used to place new content
    #[serde(default = "default_placement")]
    pub placement: Scheme,

    /// Scheme probed on read misses, for content placed by an earlier scheme
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legacy_placement: Option<Scheme>,
}

fn default_storage_type() -> String {
    "local".to_string()
}

fn default_placement() -> Scheme {
    Scheme::Identity
}

impl StoreConfig {
    /// Load configuration with the following priority:
    /// 1. CONTENT_STORE_ROOT environment variable
    /// 2. config.toml file
    /// 3. Default: ~/.cache/content-store
    pub async fn load() -> Result<Self> {
        if let Ok(env_path) = std::env::var(ROOT_ENV) {
            return Ok(Self {
                root: PathBuf::from(env_path),
                ..Self::default()
            });
        }

        if let Some(config_path) = Self::config_file_path() {
            if config_path.exists() {
                let content = fs::read_to_string(&config_path).await.with_context(|| {
                    format!("Failed to read config file: {}", config_path.display())
                })?;

                return Self::from_toml(&content).with_context(|| {
                    format!("Failed to parse config file: {}", config_path.display())
                });
            }
        }

        Ok(Self::default())
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: StoreConfig = toml::from_str(content)?;
        if config.storage_type != "local" {
            anyhow::bail!("Unsupported storage type: {}", config.storage_type);
        }
        Ok(config)
    }

    /// Get the config file path (~/.config/content-store/config.toml)
    fn config_file_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("content-store").join("config.toml"))
    }

    /// Save configuration to config file
    pub async fn save(&self) -> Result<()> {
        let config_path =
            Self::config_file_path().context("Failed to determine config directory")?;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(&config_path, content)
            .await
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    /// Get the content directory path
    pub fn content_path(&self) -> PathBuf {
        self.root.join("content")
    }

    /// Get the record database path
    pub fn db_path(&self) -> PathBuf {
        self.root.join("records.db")
    }

    /// Placement service for the configured schemes
    pub fn placement_service(&self) -> PlacementService {
        let service = PlacementService::new(self.placement.strategy());
        match self.legacy_placement {
            Some(legacy) if legacy != self.placement => service.with_legacy(legacy.strategy()),
            _ => service,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        let root = dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("content-store");

        Self {
            root,
            storage_type: default_storage_type(),
            placement: default_placement(),
            legacy_placement: None,
        }
    }
}
