//! Channel layout catalog
//!
//! A process-wide, read-only table of named channel configurations (stereo,
//! quad, 5.0, 7.0). Each layout carries per-channel semantic labels, a
//! default physical routing and optional variants that reorder the same
//! channels (ITU vs. SMPTE ordering).
//!
//! Layouts are validated when the catalog is built, so every lookup can rely
//! on `labels.len() == routing.len() == channel_count`.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use thiserror::Error;
use tracing::debug;

pub type Result<T> = std::result::Result<T, CatalogError>;

/// 1-based physical channel number on the shared channel space
pub type PhysicalChannel = u32;

/// Errors raised while building a layout catalog
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("Layout id 0 is reserved for containers without multi-channel routing")]
    ReservedId,

    #[error("Duplicate layout id: {0}")]
    DuplicateLayout(LayoutId),

    #[error("Layout {0} declares zero channels")]
    EmptyLayout(LayoutId),

    #[error("{context}: expected {expected} labels, found {found}")]
    LabelCount {
        context: String,
        expected: usize,
        found: usize,
    },

    #[error("{context}: expected {expected} routing entries, found {found}")]
    RoutingCount {
        context: String,
        expected: usize,
        found: usize,
    },

    #[error("{context}: physical channels are 1-based, found channel 0")]
    ZeroChannel { context: String },

    #[error("{context}: physical channel {channel} is routed twice")]
    DuplicateChannel {
        context: String,
        channel: PhysicalChannel,
    },

    #[error("Layout {layout}: duplicate variant id {variant}")]
    DuplicateVariant { layout: LayoutId, variant: VariantId },
}

/// Identifier of a channel layout. `0` means "no multi-channel routing".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayoutId(u32);

impl LayoutId {
    pub const NONE: LayoutId = LayoutId(0);
    pub const STEREO: LayoutId = LayoutId(2);
    pub const QUAD: LayoutId = LayoutId(4);
    pub const SURROUND_5_0: LayoutId = LayoutId(5);
    pub const SURROUND_7_0: LayoutId = LayoutId(7);

    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    pub fn is_none(&self) -> bool {
        self.0 == 0
    }
}

impl Default for LayoutId {
    fn default() -> Self {
        Self::NONE
    }
}

impl fmt::Display for LayoutId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a layout variant, unique within its layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariantId(u32);

impl VariantId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for VariantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Semantic label of a channel (`L`, `R`, `C`, `LS`, `RS`, ...)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelLabel(String);

impl ChannelLabel {
    pub const LEFT: &'static str = "L";
    pub const RIGHT: &'static str = "R";
    pub const CENTER: &'static str = "C";
    pub const LEFT_SURROUND: &'static str = "LS";
    pub const RIGHT_SURROUND: &'static str = "RS";
    pub const LEFT_BACK: &'static str = "LB";
    pub const RIGHT_BACK: &'static str = "RB";

    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_surround(&self) -> bool {
        self.0 == Self::LEFT_SURROUND || self.0 == Self::RIGHT_SURROUND
    }
}

impl fmt::Display for ChannelLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelLabel {
    fn from(label: &str) -> Self {
        Self::new(label)
    }
}

/// Alternate label/routing ordering of a layout, same channel count
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutVariant {
    pub id: VariantId,
    pub name: String,
    pub labels: Vec<ChannelLabel>,
    pub routing: Vec<PhysicalChannel>,
}

impl LayoutVariant {
    pub fn new(id: u32, name: &str, labels: &[&str], routing: &[PhysicalChannel]) -> Self {
        Self {
            id: VariantId::new(id),
            name: name.to_string(),
            labels: labels.iter().map(|l| ChannelLabel::new(*l)).collect(),
            routing: routing.to_vec(),
        }
    }
}

/// Named channel configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelLayout {
    pub id: LayoutId,
    pub name: String,
    pub channels: usize,
    pub labels: Vec<ChannelLabel>,
    pub routing: Vec<PhysicalChannel>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variants: Vec<LayoutVariant>,
}

impl ChannelLayout {
    pub fn new(id: u32, name: &str, labels: &[&str], routing: &[PhysicalChannel]) -> Self {
        Self {
            id: LayoutId::new(id),
            name: name.to_string(),
            channels: labels.len(),
            labels: labels.iter().map(|l| ChannelLabel::new(*l)).collect(),
            routing: routing.to_vec(),
            variants: Vec::new(),
        }
    }

    pub fn with_variant(mut self, variant: LayoutVariant) -> Self {
        self.variants.push(variant);
        self
    }

    pub fn has_variants(&self) -> bool {
        !self.variants.is_empty()
    }

    pub fn variant(&self, id: VariantId) -> Option<&LayoutVariant> {
        self.variants.iter().find(|v| v.id == id)
    }

    fn validate(&self) -> Result<()> {
        if self.id.is_none() {
            return Err(CatalogError::ReservedId);
        }
        if self.channels == 0 {
            return Err(CatalogError::EmptyLayout(self.id));
        }

        let context = format!("Layout {} ({})", self.id, self.name);
        validate_channels(&context, self.channels, &self.labels, &self.routing)?;

        let mut seen = HashSet::new();
        for variant in &self.variants {
            if !seen.insert(variant.id) {
                return Err(CatalogError::DuplicateVariant {
                    layout: self.id,
                    variant: variant.id,
                });
            }
            let context = format!("Layout {} variant {} ({})", self.id, variant.id, variant.name);
            // Variants only reorder; the base layout owns the channel count.
            validate_channels(&context, self.channels, &variant.labels, &variant.routing)?;
        }

        Ok(())
    }
}

fn validate_channels(
    context: &str,
    expected: usize,
    labels: &[ChannelLabel],
    routing: &[PhysicalChannel],
) -> Result<()> {
    if labels.len() != expected {
        return Err(CatalogError::LabelCount {
            context: context.to_string(),
            expected,
            found: labels.len(),
        });
    }
    if routing.len() != expected {
        return Err(CatalogError::RoutingCount {
            context: context.to_string(),
            expected,
            found: routing.len(),
        });
    }

    let mut used = HashSet::new();
    for &channel in routing {
        if channel == 0 {
            return Err(CatalogError::ZeroChannel {
                context: context.to_string(),
            });
        }
        if !used.insert(channel) {
            return Err(CatalogError::DuplicateChannel {
                context: context.to_string(),
                channel,
            });
        }
    }

    Ok(())
}

/// Flattened view of the configuration in effect for a layout/variant pair
///
/// Borrowed from the catalog; building it never mutates the stored layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveConfig<'a> {
    pub layout: &'a ChannelLayout,
    pub variant: Option<&'a LayoutVariant>,
    pub labels: &'a [ChannelLabel],
    pub routing: &'a [PhysicalChannel],
}

impl ActiveConfig<'_> {
    /// Channel count, always taken from the base layout
    pub fn channel_count(&self) -> usize {
        self.layout.channels
    }

    pub fn name(&self) -> &str {
        self.variant
            .map(|v| v.name.as_str())
            .unwrap_or(self.layout.name.as_str())
    }
}

/// Read-only table of channel layouts keyed by id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutCatalog {
    layouts: BTreeMap<LayoutId, ChannelLayout>,
}

impl LayoutCatalog {
    /// Build a catalog, validating every layout and variant
    pub fn new(layouts: Vec<ChannelLayout>) -> Result<Self> {
        let mut map = BTreeMap::new();
        for layout in layouts {
            layout.validate()?;
            let id = layout.id;
            if map.insert(id, layout).is_some() {
                return Err(CatalogError::DuplicateLayout(id));
            }
        }

        debug!(count = map.len(), "Layout catalog built");
        Ok(Self { layouts: map })
    }

    /// The catalog shipped with the application
    pub fn builtin() -> Self {
        let layouts = vec![
            ChannelLayout::new(2, "Stereo", &["L", "R"], &[1, 2]),
            ChannelLayout::new(4, "Quad", &["L", "R", "LS", "RS"], &[1, 2, 3, 4]),
            ChannelLayout::new(5, "5.0", &["L", "R", "C", "LS", "RS"], &[1, 2, 3, 4, 5])
                .with_variant(LayoutVariant::new(
                    0,
                    "5.0 ITU/Dolby",
                    &["L", "R", "C", "LS", "RS"],
                    &[1, 2, 3, 4, 5],
                ))
                .with_variant(LayoutVariant::new(
                    1,
                    "5.0 SMPTE/Film",
                    &["L", "C", "R", "LS", "RS"],
                    &[1, 2, 3, 4, 5],
                )),
            ChannelLayout::new(
                7,
                "7.0",
                &["L", "R", "C", "LS", "RS", "LB", "RB"],
                &[1, 2, 3, 4, 5, 6, 7],
            )
            .with_variant(LayoutVariant::new(
                0,
                "7.0 ITU/Dolby",
                &["L", "R", "C", "LS", "RS", "LB", "RB"],
                &[1, 2, 3, 4, 5, 6, 7],
            ))
            .with_variant(LayoutVariant::new(
                1,
                "7.0 SMPTE/Film",
                &["L", "C", "R", "LS", "RS", "LB", "RB"],
                &[1, 2, 3, 4, 5, 6, 7],
            )),
        ];

        let layouts = layouts.into_iter().map(|l| (l.id, l)).collect();
        Self { layouts }
    }

    pub fn layout(&self, id: LayoutId) -> Option<&ChannelLayout> {
        self.layouts.get(&id)
    }

    pub fn variant(&self, id: LayoutId, variant: VariantId) -> Option<&LayoutVariant> {
        self.layout(id)?.variant(variant)
    }

    /// Project the active configuration for a layout and optional variant
    ///
    /// Returns `None` for unknown layouts, and for layouts with variants when
    /// the requested variant does not exist. A layout with variants and no
    /// requested variant uses its base labels and routing; a variant id on a
    /// layout without variants is ignored.
    pub fn active_config(
        &self,
        id: LayoutId,
        variant: Option<VariantId>,
    ) -> Option<ActiveConfig<'_>> {
        let layout = self.layout(id)?;

        let variant = match variant {
            Some(variant_id) if layout.has_variants() => Some(layout.variant(variant_id)?),
            _ => None,
        };

        let (labels, routing) = match variant {
            Some(v) => (v.labels.as_slice(), v.routing.as_slice()),
            None => (layout.labels.as_slice(), layout.routing.as_slice()),
        };

        Some(ActiveConfig {
            layout,
            variant,
            labels,
            routing,
        })
    }

    /// All layouts in id order
    pub fn layouts(&self) -> impl Iterator<Item = &ChannelLayout> {
        self.layouts.values()
    }

    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }
}

impl Default for LayoutCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
