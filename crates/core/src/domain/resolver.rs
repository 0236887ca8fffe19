//! Conflict classification and resolution
//!
//! Conflicting containers are split into masters (5 channels or more) and
//! subordinates (fewer). Each subordinate that conflicts with a master gets a
//! proposed routing that aligns its channels with the master's, using label
//! matching with a few fixed fallbacks for `L` and `R`.
//!
//! The matcher is greedy and per-channel: layouts are small and semantically
//! named, so label equality is a strong enough signal.

use crate::domain::config::{ResolverConfig, SubordinateFallback};
use crate::domain::conflict::{ConflictReport, ContainerRoutingInfo};
use crate::domain::layout::{ChannelLabel, PhysicalChannel};
use crate::domain::routing::ContainerKey;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use tracing::{debug, info, trace};

/// Active channel count from which a container is treated as a master
pub const MASTER_MIN_CHANNELS: usize = 5;

/// Role of a conflicting container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ContainerRole {
    Master,
    Subordinate,
}

impl ContainerRole {
    pub fn of(info: &ContainerRoutingInfo) -> Self {
        if info.is_master() {
            ContainerRole::Master
        } else {
            ContainerRole::Subordinate
        }
    }
}

/// Why a channel ended up where it did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChangeReason {
    MatchedMaster { master: String, label: ChannelLabel },
    MatchedSurround { master: String, label: ChannelLabel },
    StandardLeft,
    RightAfterCenter,
    StandardRight,
    KeepOriginal,
    ShiftedToFreeChannel { winner: ContainerKey },
    NoFreeChannel,
}

impl fmt::Display for ChangeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeReason::MatchedMaster { master, label } => {
                write!(f, "Match {} {}", master, label)
            }
            ChangeReason::MatchedSurround { master, label } => {
                write!(f, "Surround {} from {}", label, master)
            }
            ChangeReason::StandardLeft => f.write_str("Standard L position"),
            ChangeReason::RightAfterCenter => f.write_str("R after C (L-C-R layout)"),
            ChangeReason::StandardRight => f.write_str("Standard R position (L-R-C layout)"),
            ChangeReason::KeepOriginal => f.write_str("Keep original"),
            ChangeReason::ShiftedToFreeChannel { winner } => {
                write!(f, "Shifted to free channel, {} keeps its routing", winner)
            }
            ChangeReason::NoFreeChannel => f.write_str("No free channel"),
        }
    }
}

/// Outcome for a single channel of a subordinate
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelChange {
    pub label: ChannelLabel,
    pub old_channel: PhysicalChannel,
    pub new_channel: PhysicalChannel,
    pub reason: ChangeReason,
}

impl ChannelChange {
    pub fn is_change(&self) -> bool {
        self.old_channel != self.new_channel
    }
}

/// Proposed re-routing of one subordinate container
///
/// Only produced when at least one channel actually moves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub container: ContainerKey,
    pub affected_by: ContainerKey,
    pub original_routing: Vec<PhysicalChannel>,
    pub new_routing: Vec<PhysicalChannel>,
    pub changes: Vec<ChannelChange>,
}

impl Resolution {
    fn from_changes(
        container: &ContainerKey,
        affected_by: &ContainerKey,
        changes: Vec<ChannelChange>,
    ) -> Option<Self> {
        if !changes.iter().any(ChannelChange::is_change) {
            return None;
        }

        Some(Self {
            container: container.clone(),
            affected_by: affected_by.clone(),
            original_routing: changes.iter().map(|c| c.old_channel).collect(),
            new_routing: changes.iter().map(|c| c.new_channel).collect(),
            changes,
        })
    }

    /// Channels whose physical destination changes
    pub fn moved(&self) -> impl Iterator<Item = &ChannelChange> {
        self.changes.iter().filter(|c| c.is_change())
    }
}

/// Computes resolutions from a conflict report
#[derive(Debug, Clone, Default)]
pub struct Resolver {
    config: ResolverConfig,
}

impl Resolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Propose a routing for every subordinate that can be resolved
    pub fn find_intelligent_routing(&self, report: &ConflictReport) -> Vec<Resolution> {
        let mut resolutions: Vec<Resolution> = Vec::new();
        let mut unresolved = 0usize;

        // Channels in use, including those handed out earlier in this pass
        let mut taken: HashSet<PhysicalChannel> = report.channel_usage().keys().copied().collect();

        for info in report.conflicting_containers() {
            if ContainerRole::of(info) == ContainerRole::Master {
                continue;
            }

            let resolution = match first_master(report, info) {
                Some(master) => match_channels_by_label(info, master),
                None => match self.config.subordinate_fallback {
                    SubordinateFallback::Leave => {
                        debug!(container = %info.key, "No conflicting master, leaving conflict");
                        None
                    }
                    SubordinateFallback::ShiftToFreeChannels => shift_to_free_channels(
                        report,
                        info,
                        &taken,
                        self.config.max_physical_channels,
                    ),
                },
            };

            match resolution {
                Some(resolution) => {
                    taken.extend(resolution.new_routing.iter().copied());
                    resolutions.push(resolution);
                }
                None => unresolved += 1,
            }
        }

        info!(
            resolved = resolutions.len(),
            unresolved, "Routing resolution computed"
        );
        resolutions
    }
}

/// Resolve a report with the default resolver configuration
pub fn find_intelligent_routing(report: &ConflictReport) -> Vec<Resolution> {
    Resolver::default().find_intelligent_routing(report)
}

/// First master among a container's conflict entries, in channel order
fn first_master<'a>(
    report: &'a ConflictReport,
    info: &ContainerRoutingInfo,
) -> Option<&'a ContainerRoutingInfo> {
    info.conflict_entries()
        .filter_map(|(_, conflict)| report.container(&conflict.container))
        .find(|other| other.is_master())
}

/// Align a subordinate's channels with a master's by label
///
/// Per channel, first match wins:
/// 1. the master routes the same label: use its channel
/// 2. `L`: channel 1
/// 3. `R`: channel 3 when the master has `C` on channel 2, else channel 2
/// 4. otherwise keep the current channel
///
/// Returns `None` when no channel would move.
pub fn match_channels_by_label(
    subordinate: &ContainerRoutingInfo,
    master: &ContainerRoutingInfo,
) -> Option<Resolution> {
    let master_name = master.key.container.as_str();
    let master_map: HashMap<&str, PhysicalChannel> = master
        .labels
        .iter()
        .zip(master.routing.iter())
        .map(|(label, channel)| (label.as_str(), *channel))
        .collect();
    let center_on_two = master_map.get(ChannelLabel::CENTER) == Some(&2);

    let changes: Vec<ChannelChange> = subordinate
        .labels
        .iter()
        .zip(subordinate.routing.iter())
        .map(|(label, &old_channel)| {
            let (new_channel, reason) = if let Some(&channel) = master_map.get(label.as_str()) {
                let reason = if label.is_surround() {
                    ChangeReason::MatchedSurround {
                        master: master_name.to_string(),
                        label: label.clone(),
                    }
                } else {
                    ChangeReason::MatchedMaster {
                        master: master_name.to_string(),
                        label: label.clone(),
                    }
                };
                (channel, reason)
            } else if label.as_str() == ChannelLabel::LEFT {
                (1, ChangeReason::StandardLeft)
            } else if label.as_str() == ChannelLabel::RIGHT {
                if center_on_two {
                    (3, ChangeReason::RightAfterCenter)
                } else {
                    (2, ChangeReason::StandardRight)
                }
            } else {
                (old_channel, ChangeReason::KeepOriginal)
            };

            trace!(label = %label, old_channel, new_channel, %reason, "Channel matched");
            ChannelChange {
                label: label.clone(),
                old_channel,
                new_channel,
                reason,
            }
        })
        .collect();

    let resolution = Resolution::from_changes(&subordinate.key, &master.key, changes);
    if resolution.is_none() {
        debug!(
            container = %subordinate.key,
            master = %master.key,
            "Label matching left every channel in place"
        );
    }
    resolution
}

/// Move a subordinate's contested channels onto channels nobody uses
///
/// Only applies to the later-scanned side of a conflict pair; the earlier
/// container keeps its routing. `taken` holds every channel already in use,
/// including targets of resolutions proposed earlier in the same pass.
fn shift_to_free_channels(
    report: &ConflictReport,
    subordinate: &ContainerRoutingInfo,
    taken: &HashSet<PhysicalChannel>,
    max_physical_channels: PhysicalChannel,
) -> Option<Resolution> {
    let key = &subordinate.key;
    let winner = &report.pairs().iter().find(|p| &p.second == key)?.first;

    let contested: BTreeSet<PhysicalChannel> = report
        .pairs()
        .iter()
        .filter(|p| &p.second == key)
        .flat_map(|p| p.channels.iter().map(|c| c.channel))
        .collect();

    let mut taken = taken.clone();
    taken.extend(subordinate.routing.iter().copied());

    let changes: Vec<ChannelChange> = subordinate
        .labels
        .iter()
        .zip(subordinate.routing.iter())
        .map(|(label, &old_channel)| {
            let (new_channel, reason) = if contested.contains(&old_channel) {
                match (1..=max_physical_channels).find(|c| !taken.contains(c)) {
                    Some(free) => {
                        taken.insert(free);
                        (
                            free,
                            ChangeReason::ShiftedToFreeChannel {
                                winner: winner.clone(),
                            },
                        )
                    }
                    None => (old_channel, ChangeReason::NoFreeChannel),
                }
            } else {
                (old_channel, ChangeReason::KeepOriginal)
            };

            ChannelChange {
                label: label.clone(),
                old_channel,
                new_channel,
                reason,
            }
        })
        .collect();

    Resolution::from_changes(key, winner, changes)
}
