//! Domain entities and business rules

pub mod apply;
pub mod config;
pub mod conflict;
pub mod layout;
pub mod resolver;
pub mod routing;
pub mod soundscape;

// Re-export specific items to avoid ambiguous glob imports
pub use apply::{
    apply_resolutions, ApplyError, ApplyOutcome, Regenerator, SendHandle, SendInfo, TrackGraph,
    TrackGraphError, TrackHandle,
};
pub use config::{
    AmbrouteConfig, ApplyConfig, CatalogConfig, ConfigError, ConfigManager, ResolverConfig,
    SubordinateFallback,
};
pub use conflict::{
    detect_conflicts, ChannelConflict, ChannelUsage, ConflictPair, ConflictReport,
    ConflictingChannel, ContainerRoutingInfo,
};
pub use layout::{
    ActiveConfig, CatalogError, ChannelLabel, ChannelLayout, LayoutCatalog, LayoutId,
    LayoutVariant, PhysicalChannel, VariantId,
};
pub use resolver::{
    find_intelligent_routing, match_channels_by_label, ChangeReason, ChannelChange, ContainerRole,
    Resolution, Resolver, MASTER_MIN_CHANNELS,
};
pub use routing::{
    ActiveRouting, ContainerDescriptor, ContainerKey, ContainerRouting, RoutingError,
    RoutingStore,
};
pub use soundscape::{Container, Group, Soundscape};
