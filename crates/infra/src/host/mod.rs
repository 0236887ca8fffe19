//! In-memory host track graph
//!
//! Stands in for a DAW's track API:
//! - `MemoryTrackGraph` keeps ordered tracks, folder flags and sends
//! - `TrackBuilder` lays out group/container/channel tracks for a soundscape
//! - `TrackRegenerator` rebuilds containers flagged for regeneration

pub mod builder;
pub mod regenerate;
pub mod track_graph;

pub use builder::*;
pub use regenerate::*;
pub use track_graph::*;
