//! Lays out host tracks for a soundscape
//!
//! Each group becomes a top-level folder. A container with a resolvable
//! layout becomes a folder with one child per channel, each child sending
//! mono into the container track on its routed channel. Everything else
//! becomes a plain track.

use super::track_graph::MemoryTrackGraph;
use ambroute_core::domain::{
    ContainerKey, ContainerRouting, LayoutCatalog, RoutingError, RoutingStore, TrackGraph,
    TrackHandle,
};
use tracing::{debug, info, warn};

/// Track counts produced by a build pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildSummary {
    pub groups: usize,
    pub containers: usize,
    pub channel_tracks: usize,
}

pub struct TrackBuilder<'a> {
    catalog: &'a LayoutCatalog,
}

impl<'a> TrackBuilder<'a> {
    pub fn new(catalog: &'a LayoutCatalog) -> Self {
        Self { catalog }
    }

    /// Build tracks for every container in the store
    pub fn build<S: RoutingStore + ?Sized>(
        &self,
        store: &S,
        graph: &mut MemoryTrackGraph,
    ) -> BuildSummary {
        let mut summary = BuildSummary::default();

        for descriptor in store.descriptors() {
            let existed = graph.find_track_by_name(&descriptor.key.group).is_some();
            let group = self.group_track(graph, &descriptor.key.group);
            if !existed {
                summary.groups += 1;
            }

            summary.channel_tracks +=
                self.build_container(graph, group, &descriptor.key, &descriptor.routing);
            summary.containers += 1;
        }

        info!(
            groups = summary.groups,
            containers = summary.containers,
            channel_tracks = summary.channel_tracks,
            "Tracks built"
        );
        summary
    }

    /// Find or create the top-level folder for a group
    pub fn group_track(&self, graph: &mut MemoryTrackGraph, name: &str) -> TrackHandle {
        match graph.find_track_by_name(name) {
            Some(track) => track,
            None => graph.add_track(name, None, true),
        }
    }

    /// Build one container under `group`, returning the number of channel tracks
    pub fn build_container(
        &self,
        graph: &mut MemoryTrackGraph,
        group: TrackHandle,
        key: &ContainerKey,
        routing: &ContainerRouting,
    ) -> usize {
        let active = match routing.resolve(self.catalog) {
            Ok(active) => active,
            Err(RoutingError::NoLayout) => {
                graph.add_track(&key.container, Some(group), false);
                return 0;
            }
            Err(e) => {
                warn!(container = %key, error = %e, "Unusable routing, building a plain track");
                graph.add_track(&key.container, Some(group), false);
                return 0;
            }
        };

        let container = graph.add_track(&key.container, Some(group), true);
        let mut built = 0;
        for (label, channel) in active.pairs() {
            let name = format!("{} {}", key.container, label);
            let child = graph.add_track(&name, Some(container), false);
            match graph.add_send(child, container, channel - 1, true) {
                Ok(_) => built += 1,
                Err(e) => warn!(container = %key, error = %e, "Failed to add channel send"),
            }
        }

        debug!(container = %key, channels = built, "Container tracks built");
        built
    }
}
