//! Rebuilds container tracks flagged for regeneration

use super::builder::TrackBuilder;
use super::track_graph::MemoryTrackGraph;
use ambroute_core::domain::{LayoutCatalog, Regenerator, RoutingStore, TrackGraph};
use tracing::{debug, info, warn};

/// Regenerator that drops a flagged container's tracks and lays them out again
pub struct TrackRegenerator<'a> {
    builder: TrackBuilder<'a>,
}

impl<'a> TrackRegenerator<'a> {
    pub fn new(catalog: &'a LayoutCatalog) -> Self {
        Self {
            builder: TrackBuilder::new(catalog),
        }
    }
}

impl<S: RoutingStore + ?Sized> Regenerator<S, MemoryTrackGraph> for TrackRegenerator<'_> {
    fn regenerate_all(&mut self, store: &mut S, graph: &mut MemoryTrackGraph) -> usize {
        let mut rebuilt = 0;

        for descriptor in store.descriptors() {
            let key = &descriptor.key;
            if !store.needs_regeneration(key) {
                continue;
            }

            let group = self.builder.group_track(graph, &key.group);
            if let Some(stale) = graph.find_child_container_track(group, &key.container) {
                if let Err(e) = graph.remove_track(stale) {
                    warn!(container = %key, error = %e, "Failed to remove stale tracks");
                    continue;
                }
            }

            let channels = self
                .builder
                .build_container(graph, group, key, &descriptor.routing);
            store.clear_needs_regeneration(key);
            debug!(container = %key, channels, "Container regenerated");
            rebuilt += 1;
        }

        if rebuilt > 0 {
            info!(rebuilt, "Regenerated container tracks");
        }
        rebuilt
    }
}
