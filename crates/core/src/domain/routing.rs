//! Per-container routing model
//!
//! Each container records its chosen layout, chosen variant and an optional
//! custom routing override. The override, once set by an accepted
//! resolution, takes precedence over the layout/variant routing.

use crate::domain::layout::{ChannelLabel, LayoutCatalog, LayoutId, PhysicalChannel, VariantId};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Reasons a container cannot take part in routing analysis
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    #[error("Container has no multi-channel routing")]
    NoLayout,

    #[error("Unknown channel layout {0}")]
    UnknownLayout(LayoutId),

    #[error("Layout {layout} has no variant {variant}")]
    UnknownVariant { layout: LayoutId, variant: VariantId },

    #[error("Custom routing has {found} channels, layout expects {expected}")]
    OverrideLength { expected: usize, found: usize },

    #[error("Custom routing uses channel 0, physical channels are 1-based")]
    ZeroChannel,
}

/// Composite key identifying a container inside its group
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContainerKey {
    pub group: String,
    pub container: String,
}

impl ContainerKey {
    pub fn new(group: impl Into<String>, container: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            container: container.into(),
        }
    }
}

impl fmt::Display for ContainerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / {}", self.group, self.container)
    }
}

/// Routing record of one container
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRouting {
    pub layout: LayoutId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<VariantId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_routing: Option<Vec<PhysicalChannel>>,
}

impl ContainerRouting {
    pub fn new(layout: LayoutId) -> Self {
        Self {
            layout,
            variant: None,
            custom_routing: None,
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

    pub fn is_multichannel(&self) -> bool {
        !self.layout.is_none()
    }

    /// Resolve the routing actually in effect against a catalog
    ///
    /// Custom override first, else variant routing, else layout default.
    pub fn resolve(&self, catalog: &LayoutCatalog) -> Result<ActiveRouting, RoutingError> {
        if self.layout.is_none() {
            return Err(RoutingError::NoLayout);
        }

        let config = catalog
            .active_config(self.layout, self.variant)
            .ok_or_else(|| match (catalog.layout(self.layout), self.variant) {
                (Some(_), Some(variant)) => RoutingError::UnknownVariant {
                    layout: self.layout,
                    variant,
                },
                _ => RoutingError::UnknownLayout(self.layout),
            })?;

        let channel_count = config.channel_count();
        let routing = match &self.custom_routing {
            Some(custom) if custom.len() != channel_count => {
                return Err(RoutingError::OverrideLength {
                    expected: channel_count,
                    found: custom.len(),
                });
            }
            Some(custom) if custom.contains(&0) => return Err(RoutingError::ZeroChannel),
            Some(custom) => custom.clone(),
            None => config.routing.to_vec(),
        };

        Ok(ActiveRouting {
            layout: self.layout,
            variant: config.variant.map(|v| v.id),
            channel_count,
            labels: config.labels.to_vec(),
            routing,
            custom: self.custom_routing.is_some(),
        })
    }
}

/// Owned snapshot of a container's active labels and routing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveRouting {
    pub layout: LayoutId,
    pub variant: Option<VariantId>,
    pub channel_count: usize,
    pub labels: Vec<ChannelLabel>,
    pub routing: Vec<PhysicalChannel>,
    pub custom: bool,
}

impl ActiveRouting {
    /// (label, physical channel) pairs in label order
    pub fn pairs(&self) -> impl Iterator<Item = (&ChannelLabel, PhysicalChannel)> {
        self.labels.iter().zip(self.routing.iter().copied())
    }
}

/// Input record for a detection pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerDescriptor {
    pub key: ContainerKey,
    pub routing: ContainerRouting,
}

impl ContainerDescriptor {
    pub fn new(key: ContainerKey, routing: ContainerRouting) -> Self {
        Self { key, routing }
    }
}

/// Container/group store owned by the application state
///
/// Setters return `false` when the container does not exist.
pub trait RoutingStore {
    /// All containers in group order, then container order
    fn descriptors(&self) -> Vec<ContainerDescriptor>;

    fn set_custom_routing(&mut self, key: &ContainerKey, routing: Vec<PhysicalChannel>) -> bool;

    fn clear_custom_routing(&mut self, key: &ContainerKey) -> bool;

    fn mark_needs_regeneration(&mut self, key: &ContainerKey) -> bool;

    fn clear_needs_regeneration(&mut self, key: &ContainerKey) -> bool;

    fn needs_regeneration(&self, key: &ContainerKey) -> bool;
}
