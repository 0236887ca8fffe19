//! Groups and containers of an ambient soundscape
//!
//! The in-memory container/group store. Containers own their routing record
//! (layout, variant, custom override) and a regeneration flag. Sessions are
//! stored as TOML.

use crate::domain::config::{ConfigError, Result};
use crate::domain::layout::{LayoutId, PhysicalChannel, VariantId};
use crate::domain::routing::{ContainerDescriptor, ContainerKey, ContainerRouting, RoutingStore};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info, instrument};

/// Sound source with its own channel routing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub name: String,
    #[serde(default)]
    pub layout: LayoutId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<VariantId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_routing: Option<Vec<PhysicalChannel>>,
    #[serde(default)]
    pub needs_regeneration: bool,
}

impl Container {
    pub fn new(name: impl Into<String>, layout: LayoutId) -> Self {
        Self {
            name: name.into(),
            layout,
            variant: None,
            custom_routing: None,
            needs_regeneration: false,
        }
    }

    pub fn with_variant(mut self, variant: VariantId) -> Self {
        self.variant = Some(variant);
        self
    }

    pub fn with_custom_routing(mut self, routing: Vec<PhysicalChannel>) -> Self {
        self.custom_routing = Some(routing);
        self
    }

    pub fn routing(&self) -> ContainerRouting {
        ContainerRouting {
            layout: self.layout,
            variant: self.variant,
            custom_routing: self.custom_routing.clone(),
        }
    }
}

/// Named collection of containers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub name: String,
    #[serde(default)]
    pub containers: Vec<Container>,
}

impl Group {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            containers: Vec::new(),
        }
    }

    pub fn with_container(mut self, container: Container) -> Self {
        self.containers.push(container);
        self
    }
}

/// Ordered groups of containers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Soundscape {
    #[serde(default)]
    pub groups: Vec<Group>,
}

impl Soundscape {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_group(mut self, group: Group) -> Self {
        self.groups.push(group);
        self
    }

    pub fn container(&self, key: &ContainerKey) -> Option<&Container> {
        self.groups
            .iter()
            .find(|g| g.name == key.group)?
            .containers
            .iter()
            .find(|c| c.name == key.container)
    }

    pub fn container_mut(&mut self, key: &ContainerKey) -> Option<&mut Container> {
        self.groups
            .iter_mut()
            .find(|g| g.name == key.group)?
            .containers
            .iter_mut()
            .find(|c| c.name == key.container)
    }

    /// Keys of every container flagged for regeneration
    pub fn pending_regeneration(&self) -> Vec<ContainerKey> {
        self.groups
            .iter()
            .flat_map(|g| {
                g.containers
                    .iter()
                    .filter(|c| c.needs_regeneration)
                    .map(move |c| ContainerKey::new(&g.name, &c.name))
            })
            .collect()
    }

    /// Drop a container's custom override and fall back to its layout routing
    pub fn reset_routing(&mut self, key: &ContainerKey) -> bool {
        self.clear_custom_routing(key)
    }

    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for group in &self.groups {
            for container in &group.containers {
                if !seen.insert((group.name.as_str(), container.name.as_str())) {
                    return Err(ConfigError::Invalid(format!(
                        "duplicate container '{}' in group '{}'",
                        container.name, group.name
                    )));
                }
            }
        }
        Ok(())
    }

    #[instrument(skip(path))]
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading session");

        let contents = fs::read_to_string(path).await?;
        let soundscape: Self = toml::from_str(&contents)?;
        soundscape.validate()?;

        debug!(groups = soundscape.groups.len(), "Session loaded");
        Ok(soundscape)
    }

    #[instrument(skip(self, path))]
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        info!(path = %path.display(), "Saving session");

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, toml::to_string_pretty(self)?).await?;
        Ok(())
    }
}

impl RoutingStore for Soundscape {
    fn descriptors(&self) -> Vec<ContainerDescriptor> {
        self.groups
            .iter()
            .flat_map(|g| {
                g.containers.iter().map(move |c| {
                    ContainerDescriptor::new(ContainerKey::new(&g.name, &c.name), c.routing())
                })
            })
            .collect()
    }

    fn set_custom_routing(&mut self, key: &ContainerKey, routing: Vec<PhysicalChannel>) -> bool {
        match self.container_mut(key) {
            Some(container) => {
                debug!(container = %key, ?routing, "Custom routing set");
                container.custom_routing = Some(routing);
                true
            }
            None => false,
        }
    }

    fn clear_custom_routing(&mut self, key: &ContainerKey) -> bool {
        match self.container_mut(key) {
            Some(container) => {
                container.custom_routing = None;
                true
            }
            None => false,
        }
    }

    fn mark_needs_regeneration(&mut self, key: &ContainerKey) -> bool {
        match self.container_mut(key) {
            Some(container) => {
                container.needs_regeneration = true;
                true
            }
            None => false,
        }
    }

    fn clear_needs_regeneration(&mut self, key: &ContainerKey) -> bool {
        match self.container_mut(key) {
            Some(container) => {
                container.needs_regeneration = false;
                true
            }
            None => false,
        }
    }

    fn needs_regeneration(&self, key: &ContainerKey) -> bool {
        self.container(key).is_some_and(|c| c.needs_regeneration)
    }
}
