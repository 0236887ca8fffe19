//! Resolution applicator and host track-graph bridge
//!
//! Applying resolutions persists each new routing as the container's custom
//! override, then rewires the live tracks of the host. Containers whose
//! tracks cannot be found are flagged for regeneration, and a single
//! regeneration pass runs at the end. Everything happens inside one host
//! undo transaction.

use crate::domain::config::ApplyConfig;
use crate::domain::layout::{LayoutCatalog, PhysicalChannel};
use crate::domain::resolver::Resolution;
use crate::domain::routing::{ContainerKey, RoutingError, RoutingStore};
use serde::Serialize;
use std::fmt;
use thiserror::Error;
use tracing::{debug, info, warn};

pub type Result<T> = std::result::Result<T, ApplyError>;

/// Invalid arguments to [`apply_resolutions`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApplyError {
    #[error("Resolution has an empty group or container name")]
    EmptyKey,

    #[error("Resolution for {container}: original routing has {original} channels, new routing has {new}")]
    RoutingLength {
        container: ContainerKey,
        original: usize,
        new: usize,
    },

    #[error("Resolution for {container}: physical channels are 1-based, found channel 0")]
    ZeroChannel { container: ContainerKey },

    #[error("Resolution for {container} does not fit the stored layout: {source}")]
    LayoutMismatch {
        container: ContainerKey,
        #[source]
        source: RoutingError,
    },
}

/// Host-side failures of a single track operation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackGraphError {
    #[error("Unknown track {0}")]
    UnknownTrack(TrackHandle),

    #[error("Unknown send {0}")]
    UnknownSend(SendHandle),
}

/// Opaque reference to a host track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackHandle(pub u64);

impl fmt::Display for TrackHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Opaque reference to an outbound send of a host track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SendHandle {
    pub track: TrackHandle,
    pub index: usize,
}

impl fmt::Display for SendHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/send{}", self.track, self.index)
    }
}

/// Outbound send as reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendInfo {
    pub handle: SendHandle,
    /// `None` when the host reports a send without a destination track
    pub destination: Option<TrackHandle>,
    /// Zero-based destination channel
    pub destination_channel: u32,
}

/// Thin bridge over the host's track API
pub trait TrackGraph {
    /// Top-level track with this name
    fn find_track_by_name(&self, name: &str) -> Option<TrackHandle>;

    /// Container track directly beneath a group track
    fn find_child_container_track(&self, parent: TrackHandle, name: &str) -> Option<TrackHandle>;

    fn is_folder_track(&self, track: TrackHandle) -> bool;

    /// Direct children in track order
    fn direct_children(&self, track: TrackHandle) -> Vec<TrackHandle>;

    fn outbound_sends(&self, track: TrackHandle) -> Vec<SendInfo>;

    /// Route a send, mono, to a zero-based destination channel
    fn set_send_destination_channel(
        &mut self,
        send: SendHandle,
        channel: u32,
    ) -> std::result::Result<(), TrackGraphError>;

    fn begin_transaction(&mut self, label: &str);

    fn end_transaction(&mut self, label: &str);

    fn refresh_view(&mut self);
}

/// Rebuilds tracks for containers flagged `needs_regeneration`
///
/// Must be safe to call repeatedly. Returns the number of rebuilt containers.
pub trait Regenerator<S: ?Sized, G: ?Sized> {
    fn regenerate_all(&mut self, store: &mut S, graph: &mut G) -> usize;
}

/// Summary of an apply pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplyOutcome {
    pub any_failed: bool,
    /// Containers whose custom routing was persisted
    pub persisted: Vec<ContainerKey>,
    /// Containers whose live sends were rewired
    pub rewired: Vec<ContainerKey>,
    /// Containers flagged for regeneration because their tracks are missing
    pub needs_regeneration: Vec<ContainerKey>,
    /// Resolutions that name a container absent from the store
    pub missing_containers: Vec<ContainerKey>,
    pub sends_rewritten: usize,
    /// Containers rebuilt by the regeneration pass (None = no pass ran)
    pub regenerated: Option<usize>,
}

enum LiveUpdate {
    Rewired(usize),
    NotFolder,
    TracksMissing,
}

fn validate(resolution: &Resolution) -> Result<()> {
    let key = &resolution.container;
    if key.group.is_empty() || key.container.is_empty() {
        return Err(ApplyError::EmptyKey);
    }
    if resolution.original_routing.len() != resolution.new_routing.len() {
        return Err(ApplyError::RoutingLength {
            container: key.clone(),
            original: resolution.original_routing.len(),
            new: resolution.new_routing.len(),
        });
    }
    if resolution.new_routing.contains(&0) {
        return Err(ApplyError::ZeroChannel {
            container: key.clone(),
        });
    }
    Ok(())
}

/// The new routing must be a valid override for the container's stored layout.
/// Containers absent from the store are reported by the apply pass itself.
fn validate_against_store<S: RoutingStore + ?Sized>(
    resolutions: &[Resolution],
    catalog: &LayoutCatalog,
    store: &S,
) -> Result<()> {
    let descriptors = store.descriptors();
    for resolution in resolutions {
        let key = &resolution.container;
        let Some(descriptor) = descriptors.iter().find(|d| &d.key == key) else {
            continue;
        };
        descriptor
            .routing
            .clone()
            .with_custom_routing(resolution.new_routing.clone())
            .resolve(catalog)
            .map_err(|source| ApplyError::LayoutMismatch {
                container: key.clone(),
                source,
            })?;
    }
    Ok(())
}

/// Commit resolutions to the routing store and the live track graph
///
/// Arguments are validated before the host transaction opens, including each
/// new routing against the container's stored layout. Once the transaction is
/// open, every failure is recorded in the outcome instead of returned.
pub fn apply_resolutions<S, G, R>(
    resolutions: &[Resolution],
    catalog: &LayoutCatalog,
    store: &mut S,
    graph: &mut G,
    regenerator: &mut R,
    config: &ApplyConfig,
) -> Result<ApplyOutcome>
where
    S: RoutingStore + ?Sized,
    G: TrackGraph + ?Sized,
    R: Regenerator<S, G> + ?Sized,
{
    for resolution in resolutions {
        validate(resolution)?;
    }
    validate_against_store(resolutions, catalog, store)?;

    let mut outcome = ApplyOutcome::default();
    graph.begin_transaction(&config.transaction_label);

    for resolution in resolutions {
        let key = &resolution.container;

        if store.set_custom_routing(key, resolution.new_routing.clone()) {
            outcome.persisted.push(key.clone());
        } else {
            warn!(container = %key, "Container not found, routing not persisted");
            outcome.missing_containers.push(key.clone());
            outcome.any_failed = true;
            continue;
        }

        match update_live_tracks(graph, key, &resolution.new_routing) {
            LiveUpdate::Rewired(sends) => {
                debug!(container = %key, sends, "Live sends rewired");
                outcome.sends_rewritten += sends;
                outcome.rewired.push(key.clone());
            }
            LiveUpdate::NotFolder => {
                debug!(container = %key, "No channel tracks to rewire");
            }
            LiveUpdate::TracksMissing => {
                warn!(container = %key, "Live tracks missing, flagging for regeneration");
                store.mark_needs_regeneration(key);
                outcome.needs_regeneration.push(key.clone());
                outcome.any_failed = true;
            }
        }
    }

    if outcome.any_failed {
        let rebuilt = regenerator.regenerate_all(store, graph);
        outcome.regenerated = Some(rebuilt);
    }

    if config.refresh_view {
        graph.refresh_view();
    }
    graph.end_transaction(&config.transaction_label);

    info!(
        persisted = outcome.persisted.len(),
        rewired = outcome.rewired.len(),
        flagged = outcome.needs_regeneration.len(),
        any_failed = outcome.any_failed,
        "Resolutions applied"
    );
    Ok(outcome)
}

fn update_live_tracks<G: TrackGraph + ?Sized>(
    graph: &mut G,
    key: &ContainerKey,
    new_routing: &[PhysicalChannel],
) -> LiveUpdate {
    let Some(group_track) = graph.find_track_by_name(&key.group) else {
        return LiveUpdate::TracksMissing;
    };
    let Some(container_track) = graph.find_child_container_track(group_track, &key.container)
    else {
        return LiveUpdate::TracksMissing;
    };

    if !graph.is_folder_track(container_track) {
        return LiveUpdate::NotFolder;
    }

    let mut rewritten = 0;
    for (child, &channel) in graph
        .direct_children(container_track)
        .into_iter()
        .zip(new_routing.iter())
    {
        for send in graph.outbound_sends(child) {
            match send.destination {
                None => {
                    warn!(send = %send.handle, "Send without destination track, skipping");
                }
                Some(destination) if destination == container_track => {
                    match graph.set_send_destination_channel(send.handle, channel - 1) {
                        Ok(()) => rewritten += 1,
                        Err(e) => warn!(send = %send.handle, error = %e, "Failed to rewire send"),
                    }
                }
                Some(_) => {}
            }
        }
    }

    LiveUpdate::Rewired(rewritten)
}
