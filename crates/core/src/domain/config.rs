//! Configuration management for Ambroute
//!
//! This module provides:
//! - Configuration structs for the resolver, the applicator and the catalog
//! - TOML loading and saving of the main configuration
//! - Loading of custom layout catalogs from TOML files
//! - A configuration manager with factory defaults and corrupt-file backup

use crate::domain::layout::{CatalogError, ChannelLayout, LayoutCatalog, PhysicalChannel};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, error, info, instrument};

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur during configuration operations
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Invalid layout catalog: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// What to do with a subordinate whose conflicts are only with other subordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubordinateFallback {
    /// Leave the conflict in the report for manual resolution
    #[default]
    Leave,
    /// The earlier container keeps its routing, the later one moves its
    /// contested channels to unused physical channels
    ShiftToFreeChannels,
}

/// Resolver settings
///
/// The master threshold is not configurable, see
/// [`MASTER_MIN_CHANNELS`](crate::domain::resolver::MASTER_MIN_CHANNELS).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub subordinate_fallback: SubordinateFallback,

    /// Highest physical channel the shift fallback may use
    pub max_physical_channels: PhysicalChannel,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            subordinate_fallback: SubordinateFallback::Leave,
            max_physical_channels: 64,
        }
    }
}

/// Resolution applicator settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplyConfig {
    /// Name of the host undo transaction
    pub transaction_label: String,

    /// Ask the host to redraw once the transaction is complete
    pub refresh_view: bool,
}

impl Default for ApplyConfig {
    fn default() -> Self {
        Self {
            transaction_label: "Resolve channel routing conflicts".to_string(),
            refresh_view: true,
        }
    }
}

/// Layout catalog source
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// TOML file replacing the built-in catalog (None = built-in)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// On-disk layout catalog
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogFile {
    #[serde(default)]
    pub layouts: Vec<ChannelLayout>,
}

impl CatalogFile {
    pub fn into_catalog(self) -> Result<LayoutCatalog> {
        if self.layouts.is_empty() {
            return Err(ConfigError::Invalid(
                "layout catalog declares no layouts".to_string(),
            ));
        }
        Ok(LayoutCatalog::new(self.layouts)?)
    }
}

impl From<&LayoutCatalog> for CatalogFile {
    fn from(catalog: &LayoutCatalog) -> Self {
        Self {
            layouts: catalog.layouts().cloned().collect(),
        }
    }
}

/// Load and validate a layout catalog from a TOML file
#[instrument(skip(path))]
pub async fn load_catalog_file<P: AsRef<Path>>(path: P) -> Result<LayoutCatalog> {
    let path = path.as_ref();
    info!(path = %path.display(), "Loading layout catalog");

    let contents = fs::read_to_string(path).await?;
    let file: CatalogFile = toml::from_str(&contents)?;
    let catalog = file.into_catalog()?;

    debug!(layouts = catalog.len(), "Layout catalog loaded");
    Ok(catalog)
}

/// Complete Ambroute configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmbrouteConfig {
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub apply: ApplyConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
}

impl AmbrouteConfig {
    /// Load configuration from TOML file
    #[instrument(skip(path))]
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = fs::read_to_string(path).await?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;

        debug!("Configuration loaded successfully");
        Ok(config)
    }

    /// Save configuration to TOML file
    #[instrument(skip(self, path))]
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        info!(path = %path.display(), "Saving configuration");

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let toml_str = toml::to_string_pretty(self)?;
        fs::write(path, toml_str).await?;

        debug!("Configuration saved successfully");
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.resolver.max_physical_channels == 0 {
            return Err(ConfigError::Invalid(
                "resolver.max_physical_channels must be at least 1".to_string(),
            ));
        }
        if self.apply.transaction_label.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "apply.transaction_label must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Catalog selected by this configuration
    pub async fn load_catalog(&self) -> Result<LayoutCatalog> {
        match &self.catalog.path {
            Some(path) => load_catalog_file(path).await,
            None => Ok(LayoutCatalog::builtin()),
        }
    }
}

/// Manages the main configuration file at `<config dir>/ambroute/config.toml`
pub struct ConfigManager {
    config_dir: PathBuf,
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new(config_dir: PathBuf) -> Self {
        let config_path = config_dir.join("config.toml");
        Self {
            config_dir,
            config_path,
        }
    }

    /// Get the default config directory path
    ///
    /// Returns `~/.config/ambroute` on Linux, the platform equivalent elsewhere
    pub fn default_config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|p| p.join("ambroute"))
            .ok_or_else(|| ConfigError::Invalid("Could not determine config directory".to_string()))
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load configuration from file
    ///
    /// If the config file doesn't exist, writes and returns the factory default.
    /// If the config file is corrupt, backs it up and returns the factory default.
    #[instrument(skip(self))]
    pub async fn load(&self) -> AmbrouteConfig {
        if !self.config_path.exists() {
            info!(
                path = %self.config_path.display(),
                "Config file not found, creating factory default"
            );

            let config = AmbrouteConfig::default();
            if let Err(e) = config.save_to_file(&self.config_path).await {
                error!(
                    path = %self.config_path.display(),
                    error = %e,
                    "Failed to save factory default config"
                );
            }
            return config;
        }

        match AmbrouteConfig::load_from_file(&self.config_path).await {
            Ok(config) => config,
            Err(e) => {
                error!(
                    path = %self.config_path.display(),
                    error = %e,
                    "Failed to load config, using factory default"
                );

                let backup_path = self.config_path.with_extension("toml.corrupt");
                if let Err(copy_err) = fs::copy(&self.config_path, &backup_path).await {
                    error!(
                        path = %backup_path.display(),
                        error = %copy_err,
                        "Failed to backup corrupt config"
                    );
                }

                AmbrouteConfig::default()
            }
        }
    }

    #[instrument(skip(self, config))]
    pub async fn save(&self, config: &AmbrouteConfig) -> Result<()> {
        fs::create_dir_all(&self.config_dir).await?;
        config.save_to_file(&self.config_path).await
    }

    pub fn exists(&self) -> bool {
        self.config_path.exists()
    }
}
