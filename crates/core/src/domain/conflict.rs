//! Conflict detection over the shared physical channel space
//!
//! A detection pass scans every multi-channel container in group order, then
//! container order, records which label each container puts on each physical
//! channel, and registers a conflict pair whenever two containers put
//! different labels on the same channel.
//!
//! Detection is a pure read: it never touches the routing store or the host.

use crate::domain::layout::{ChannelLabel, LayoutCatalog, LayoutId, PhysicalChannel, VariantId};
use crate::domain::resolver::MASTER_MIN_CHANNELS;
use crate::domain::routing::{ContainerDescriptor, ContainerKey, RoutingError};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, trace, warn};

/// One label placed on a physical channel by a container
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelUsage {
    pub label: ChannelLabel,
    pub container: ContainerKey,
}

/// The other side of a conflict, as seen from one container
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelConflict {
    /// Label the other container puts on the channel
    pub label: ChannelLabel,
    pub container: ContainerKey,
}

/// Routing snapshot of one container for a single detection pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerRoutingInfo {
    pub key: ContainerKey,
    pub layout: LayoutId,
    pub variant: Option<VariantId>,
    pub channel_count: usize,
    pub labels: Vec<ChannelLabel>,
    pub routing: Vec<PhysicalChannel>,
    pub custom_routing: bool,
    pub conflicts: BTreeMap<PhysicalChannel, Vec<ChannelConflict>>,
}

impl ContainerRoutingInfo {
    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }

    pub fn is_master(&self) -> bool {
        self.channel_count >= MASTER_MIN_CHANNELS
    }

    /// Conflict entries in channel order
    pub fn conflict_entries(&self) -> impl Iterator<Item = (PhysicalChannel, &ChannelConflict)> {
        self.conflicts
            .iter()
            .flat_map(|(channel, entries)| entries.iter().map(move |e| (*channel, e)))
    }

    /// Physical channel carrying `label`, last occurrence wins
    pub fn channel_for(&self, label: &str) -> Option<PhysicalChannel> {
        self.labels
            .iter()
            .zip(self.routing.iter())
            .filter(|(l, _)| l.as_str() == label)
            .map(|(_, c)| *c)
            .last()
    }
}

/// A single channel on which two containers disagree
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictingChannel {
    pub channel: PhysicalChannel,
    pub first_label: ChannelLabel,
    pub second_label: ChannelLabel,
}

/// All conflicting channels between two containers
///
/// `first` is the container scanned earlier, `second` the later one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictPair {
    pub first: ContainerKey,
    pub second: ContainerKey,
    pub channels: Vec<ConflictingChannel>,
}

impl ConflictPair {
    pub fn involves(&self, key: &ContainerKey) -> bool {
        &self.first == key || &self.second == key
    }

    pub fn other(&self, key: &ContainerKey) -> Option<&ContainerKey> {
        if &self.first == key {
            Some(&self.second)
        } else if &self.second == key {
            Some(&self.first)
        } else {
            None
        }
    }
}

/// Result of a detection pass that found at least one conflict
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictReport {
    containers: Vec<ContainerRoutingInfo>,
    pairs: Vec<ConflictPair>,
    channel_usage: BTreeMap<PhysicalChannel, Vec<ChannelUsage>>,
    #[serde(skip)]
    index: HashMap<ContainerKey, usize>,
}

impl ConflictReport {
    /// Every scanned multi-channel container, in scan order
    pub fn containers(&self) -> &[ContainerRoutingInfo] {
        &self.containers
    }

    pub fn container(&self, key: &ContainerKey) -> Option<&ContainerRoutingInfo> {
        self.index.get(key).map(|&i| &self.containers[i])
    }

    /// Conflict pairs in registration order
    pub fn pairs(&self) -> &[ConflictPair] {
        &self.pairs
    }

    /// Pair between two containers, in either order
    pub fn pair(&self, a: &ContainerKey, b: &ContainerKey) -> Option<&ConflictPair> {
        self.pairs
            .iter()
            .find(|p| (&p.first == a && &p.second == b) || (&p.first == b && &p.second == a))
    }

    /// Usages per physical channel, in scan order
    pub fn channel_usage(&self) -> &BTreeMap<PhysicalChannel, Vec<ChannelUsage>> {
        &self.channel_usage
    }

    pub fn conflicting_containers(&self) -> impl Iterator<Item = &ContainerRoutingInfo> {
        self.containers.iter().filter(|c| c.has_conflicts())
    }

    pub fn conflicting_channel_count(&self) -> usize {
        self.pairs.iter().map(|p| p.channels.len()).sum()
    }
}

/// Scan containers and report every pair that disagrees on a physical channel
///
/// Returns `None` when no conflict pair exists. Containers without a layout,
/// with an unknown layout or variant, or with a malformed override are
/// skipped.
pub fn detect_conflicts(
    catalog: &LayoutCatalog,
    containers: &[ContainerDescriptor],
) -> Option<ConflictReport> {
    let mut infos: Vec<ContainerRoutingInfo> = Vec::new();
    let mut index: HashMap<ContainerKey, usize> = HashMap::new();
    let mut pairs: Vec<ConflictPair> = Vec::new();
    let mut channel_usage: BTreeMap<PhysicalChannel, Vec<ChannelUsage>> = BTreeMap::new();

    for descriptor in containers {
        let key = &descriptor.key;

        let active = match descriptor.routing.resolve(catalog) {
            Ok(active) => active,
            Err(RoutingError::NoLayout) => continue,
            Err(e) => {
                warn!(container = %key, error = %e, "Skipping container with malformed routing");
                continue;
            }
        };

        if index.contains_key(key) {
            warn!(container = %key, "Skipping duplicate container key");
            continue;
        }

        let current = infos.len();
        index.insert(key.clone(), current);
        infos.push(ContainerRoutingInfo {
            key: key.clone(),
            layout: active.layout,
            variant: active.variant,
            channel_count: active.channel_count,
            labels: active.labels.clone(),
            routing: active.routing.clone(),
            custom_routing: active.custom,
            conflicts: BTreeMap::new(),
        });

        for (label, channel) in active.pairs() {
            let prior: Vec<ChannelUsage> = channel_usage
                .get(&channel)
                .map(|usages| {
                    usages
                        .iter()
                        .filter(|u| &u.container != key && &u.label != label)
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();

            for usage in prior {
                trace!(
                    channel,
                    first = %usage.container,
                    first_label = %usage.label,
                    second = %key,
                    second_label = %label,
                    "Channel conflict"
                );

                register_pair(&mut pairs, &usage, key, label, channel);

                let first = index[&usage.container];
                record_conflict(
                    &mut infos[first],
                    channel,
                    ChannelConflict {
                        label: label.clone(),
                        container: key.clone(),
                    },
                );
                record_conflict(
                    &mut infos[current],
                    channel,
                    ChannelConflict {
                        label: usage.label,
                        container: usage.container,
                    },
                );
            }

            channel_usage.entry(channel).or_default().push(ChannelUsage {
                label: label.clone(),
                container: key.clone(),
            });
        }
    }

    if pairs.is_empty() {
        debug!(containers = infos.len(), "No routing conflicts");
        return None;
    }

    info!(
        containers = infos.len(),
        pairs = pairs.len(),
        "Routing conflicts detected"
    );

    Some(ConflictReport {
        containers: infos,
        pairs,
        channel_usage,
        index,
    })
}

/// A self-overlapping container can meet the same entry twice on one channel
fn record_conflict(
    info: &mut ContainerRoutingInfo,
    channel: PhysicalChannel,
    conflict: ChannelConflict,
) {
    let entries = info.conflicts.entry(channel).or_default();
    if !entries.contains(&conflict) {
        entries.push(conflict);
    }
}

/// Add a conflicting channel to the pair, one entry per physical channel
fn register_pair(
    pairs: &mut Vec<ConflictPair>,
    usage: &ChannelUsage,
    current: &ContainerKey,
    label: &ChannelLabel,
    channel: PhysicalChannel,
) {
    let conflict = ConflictingChannel {
        channel,
        first_label: usage.label.clone(),
        second_label: label.clone(),
    };

    match pairs
        .iter_mut()
        .find(|p| p.first == usage.container && &p.second == current)
    {
        Some(pair) => {
            if !pair.channels.iter().any(|c| c.channel == channel) {
                pair.channels.push(conflict);
            }
        }
        None => pairs.push(ConflictPair {
            first: usage.container.clone(),
            second: current.clone(),
            channels: vec![conflict],
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::routing::ContainerRouting;
    use proptest::prelude::*;

    fn descriptor(group: &str, name: &str, routing: ContainerRouting) -> ContainerDescriptor {
        ContainerDescriptor::new(ContainerKey::new(group, name), routing)
    }

    fn quad_and_five() -> Vec<ContainerDescriptor> {
        vec![
            descriptor("Forest", "Amb_Quad", ContainerRouting::new(LayoutId::QUAD)),
            descriptor("Forest", "Amb_5_0", ContainerRouting::new(LayoutId::SURROUND_5_0)),
        ]
    }

    #[test]
    fn test_quad_against_five_zero() {
        let catalog = LayoutCatalog::builtin();
        let report = detect_conflicts(&catalog, &quad_and_five()).unwrap();

        assert_eq!(report.pairs().len(), 1);
        let pair = &report.pairs()[0];
        assert_eq!(pair.first.container, "Amb_Quad");
        assert_eq!(pair.second.container, "Amb_5_0");

        let channels: Vec<_> = pair.channels.iter().map(|c| c.channel).collect();
        assert_eq!(channels, vec![3, 4]);
        assert_eq!(pair.channels[0].first_label.as_str(), "LS");
        assert_eq!(pair.channels[0].second_label.as_str(), "C");

        // L/R agree
        let quad = report.container(&ContainerKey::new("Forest", "Amb_Quad")).unwrap();
        assert!(!quad.conflicts.contains_key(&1));
        assert!(!quad.conflicts.contains_key(&2));
    }

    #[test]
    fn test_identical_stereo_does_not_conflict() {
        let catalog = LayoutCatalog::builtin();
        let containers = vec![
            descriptor("Rain", "Drops", ContainerRouting::new(LayoutId::STEREO)),
            descriptor("Rain", "Gutter", ContainerRouting::new(LayoutId::STEREO)),
        ];
        assert!(detect_conflicts(&catalog, &containers).is_none());
    }

    #[test]
    fn test_custom_routing_avoids_conflict() {
        let catalog = LayoutCatalog::builtin();
        let containers = vec![
            descriptor(
                "Forest",
                "Amb_Quad",
                ContainerRouting::new(LayoutId::QUAD).with_custom_routing(vec![1, 2, 4, 5]),
            ),
            descriptor("Forest", "Amb_5_0", ContainerRouting::new(LayoutId::SURROUND_5_0)),
        ];
        assert!(detect_conflicts(&catalog, &containers).is_none());
    }

    #[test]
    fn test_malformed_containers_are_skipped() {
        let catalog = LayoutCatalog::builtin();
        let mut containers = quad_and_five();
        containers.push(descriptor("Forest", "Ghost", ContainerRouting::new(LayoutId::new(42))));
        containers.push(descriptor("Forest", "Mono", ContainerRouting::new(LayoutId::NONE)));
        containers.push(descriptor(
            "Forest",
            "BadVariant",
            ContainerRouting::new(LayoutId::SURROUND_7_0).with_variant(VariantId::new(5)),
        ));

        let report = detect_conflicts(&catalog, &containers).unwrap();
        assert_eq!(report.containers().len(), 2);
        assert!(report.container(&ContainerKey::new("Forest", "Ghost")).is_none());
    }

    #[test]
    fn test_channel_usage_keeps_scan_order() {
        let catalog = LayoutCatalog::builtin();
        let report = detect_conflicts(&catalog, &quad_and_five()).unwrap();

        let usage = &report.channel_usage()[&3];
        assert_eq!(usage.len(), 2);
        assert_eq!(usage[0].container.container, "Amb_Quad");
        assert_eq!(usage[0].label.as_str(), "LS");
        assert_eq!(usage[1].container.container, "Amb_5_0");
        assert_eq!(usage[1].label.as_str(), "C");
    }

    #[test]
    fn test_self_overlap_is_not_a_pair() {
        let catalog = LayoutCatalog::builtin();
        let containers = vec![descriptor(
            "Wind",
            "Folded",
            ContainerRouting::new(LayoutId::STEREO).with_custom_routing(vec![1, 1]),
        )];
        assert!(detect_conflicts(&catalog, &containers).is_none());
    }

    #[test]
    fn test_self_overlap_against_other_container() {
        let catalog = LayoutCatalog::builtin();
        let containers = vec![
            descriptor("Forest", "Amb_Quad", ContainerRouting::new(LayoutId::QUAD)),
            descriptor(
                "Wind",
                "Folded",
                ContainerRouting::new(LayoutId::STEREO).with_custom_routing(vec![3, 3]),
            ),
        ];
        let report = detect_conflicts(&catalog, &containers).unwrap();

        let quad = ContainerKey::new("Forest", "Amb_Quad");
        let folded = ContainerKey::new("Wind", "Folded");

        let pair = report.pair(&quad, &folded).unwrap();
        assert_eq!(pair.channels.len(), 1);
        assert_eq!(pair.channels[0].channel, 3);
        assert_eq!(pair.channels[0].second_label.as_str(), "L");
        assert_eq!(report.conflicting_channel_count(), 1);

        // Folded sees LS once, the quad sees both folded labels
        assert_eq!(report.container(&folded).unwrap().conflicts[&3].len(), 1);
        assert_eq!(report.container(&quad).unwrap().conflicts[&3].len(), 2);
    }

    #[test]
    fn test_duplicate_keys_are_skipped() {
        let catalog = LayoutCatalog::builtin();
        let mut containers = quad_and_five();
        containers.push(descriptor(
            "Forest",
            "Amb_Quad",
            ContainerRouting::new(LayoutId::STEREO).with_custom_routing(vec![5, 4]),
        ));

        let report = detect_conflicts(&catalog, &containers).unwrap();
        assert_eq!(report.containers().len(), 2);
        assert_eq!(report.pairs().len(), 1);

        let quad = report.container(&ContainerKey::new("Forest", "Amb_Quad")).unwrap();
        assert_eq!(quad.layout, LayoutId::QUAD);
        assert_eq!(report.channel_usage()[&5].len(), 1);
    }

    #[test]
    fn test_pairs_accumulate_channels() {
        let catalog = LayoutCatalog::builtin();
        let containers = vec![
            descriptor("A", "Quad", ContainerRouting::new(LayoutId::QUAD)),
            descriptor("B", "Seven", ContainerRouting::new(LayoutId::SURROUND_7_0)),
            descriptor(
                "C",
                "Smpte",
                ContainerRouting::new(LayoutId::SURROUND_5_0).with_variant(VariantId::new(1)),
            ),
        ];
        let report = detect_conflicts(&catalog, &containers).unwrap();

        let quad = ContainerKey::new("A", "Quad");
        let seven = ContainerKey::new("B", "Seven");
        let smpte = ContainerKey::new("C", "Smpte");

        assert_eq!(report.pair(&seven, &quad).unwrap().channels.len(), 2);
        // SMPTE L C R against quad L R LS RS: channels 2, 3, 4
        assert_eq!(report.pair(&quad, &smpte).unwrap().channels.len(), 3);
        // SMPTE against ITU 7.0: C/R swapped on 2 and 3
        assert_eq!(report.pair(&seven, &smpte).unwrap().channels.len(), 2);
        assert_eq!(report.conflicting_channel_count(), 7);
    }

    fn layout_strategy() -> impl Strategy<Value = ContainerRouting> {
        prop_oneof![
            Just(ContainerRouting::new(LayoutId::STEREO)),
            Just(ContainerRouting::new(LayoutId::QUAD)),
            Just(ContainerRouting::new(LayoutId::SURROUND_5_0)),
            Just(ContainerRouting::new(LayoutId::SURROUND_5_0).with_variant(VariantId::new(1))),
            Just(ContainerRouting::new(LayoutId::SURROUND_7_0)),
            Just(ContainerRouting::new(LayoutId::SURROUND_7_0).with_variant(VariantId::new(1))),
        ]
    }

    fn containers_strategy() -> impl Strategy<Value = Vec<ContainerDescriptor>> {
        prop::collection::vec((layout_strategy(), 0u32..6), 1..8).prop_map(|entries| {
            entries
                .into_iter()
                .enumerate()
                .map(|(i, (routing, offset))| {
                    let routing = match routing.layout {
                        LayoutId::STEREO => routing.with_custom_routing(vec![1 + offset, 2 + offset]),
                        _ => routing,
                    };
                    descriptor("Group", &format!("Container{}", i), routing)
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_detection_is_idempotent(containers in containers_strategy()) {
            let catalog = LayoutCatalog::builtin();
            prop_assert_eq!(
                detect_conflicts(&catalog, &containers),
                detect_conflicts(&catalog, &containers)
            );
        }

        #[test]
        fn prop_disjoint_routings_never_conflict(count in 1usize..10) {
            let catalog = LayoutCatalog::builtin();
            let containers: Vec<_> = (0..count)
                .map(|i| {
                    let base = (i as u32) * 4 + 1;
                    descriptor(
                        "Group",
                        &format!("Quad{}", i),
                        ContainerRouting::new(LayoutId::QUAD)
                            .with_custom_routing(vec![base, base + 1, base + 2, base + 3]),
                    )
                })
                .collect();
            prop_assert!(detect_conflicts(&catalog, &containers).is_none());
        }

        #[test]
        fn prop_conflicts_are_symmetric(containers in containers_strategy()) {
            let catalog = LayoutCatalog::builtin();
            if let Some(report) = detect_conflicts(&catalog, &containers) {
                for pair in report.pairs() {
                    let first = report.container(&pair.first).unwrap();
                    let second = report.container(&pair.second).unwrap();
                    for channel in &pair.channels {
                        prop_assert!(first.conflicts[&channel.channel]
                            .iter()
                            .any(|c| c.container == pair.second));
                        prop_assert!(second.conflicts[&channel.channel]
                            .iter()
                            .any(|c| c.container == pair.first));
                    }
                }
            }
        }
    }
}
