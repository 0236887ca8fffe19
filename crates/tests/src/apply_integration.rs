//! Applying resolutions to a soundscape and its live track graph

use ambroute_core::domain::{
    apply_resolutions, detect_conflicts, find_intelligent_routing, ApplyConfig, ApplyError,
    Container, ContainerKey, Group, LayoutCatalog, LayoutId, Regenerator, Resolution,
    RoutingStore, Soundscape, TrackGraph,
};
use ambroute_infra::host::{MemoryTrackGraph, TrackBuilder, TrackRegenerator};
use tempfile::TempDir;

/// Regenerator that only records how often it ran
#[derive(Default)]
struct CountingRegenerator {
    calls: usize,
}

impl<S: RoutingStore + ?Sized> Regenerator<S, MemoryTrackGraph> for CountingRegenerator {
    fn regenerate_all(&mut self, _store: &mut S, _graph: &mut MemoryTrackGraph) -> usize {
        self.calls += 1;
        0
    }
}

/// Wraps the real regenerator to count passes
struct TrackingRegenerator<'a> {
    inner: TrackRegenerator<'a>,
    calls: usize,
}

impl<S: RoutingStore + ?Sized> Regenerator<S, MemoryTrackGraph> for TrackingRegenerator<'_> {
    fn regenerate_all(&mut self, store: &mut S, graph: &mut MemoryTrackGraph) -> usize {
        self.calls += 1;
        self.inner.regenerate_all(store, graph)
    }
}

fn key(group: &str, container: &str) -> ContainerKey {
    ContainerKey::new(group, container)
}

fn forest() -> Soundscape {
    Soundscape::new().with_group(
        Group::new("Forest")
            .with_container(Container::new("Amb_5_0", LayoutId::SURROUND_5_0))
            .with_container(Container::new("Birds", LayoutId::QUAD))
            .with_container(Container::new("Leaves", LayoutId::QUAD))
            .with_container(Container::new("Creek", LayoutId::QUAD)),
    )
}

fn resolve(catalog: &LayoutCatalog, soundscape: &Soundscape) -> Vec<Resolution> {
    detect_conflicts(catalog, &soundscape.descriptors())
        .map(|report| find_intelligent_routing(&report))
        .unwrap_or_default()
}

fn built_graph(catalog: &LayoutCatalog, soundscape: &Soundscape) -> MemoryTrackGraph {
    let mut graph = MemoryTrackGraph::new();
    TrackBuilder::new(catalog).build(soundscape, &mut graph);
    graph
}

fn remove_container_tracks(graph: &mut MemoryTrackGraph, key: &ContainerKey) {
    let group = graph.find_track_by_name(&key.group).unwrap();
    let container = graph.find_child_container_track(group, &key.container).unwrap();
    graph.remove_track(container).unwrap();
}

fn send_channels(graph: &MemoryTrackGraph, key: &ContainerKey) -> Vec<u32> {
    let group = graph.find_track_by_name(&key.group).unwrap();
    let container = graph.find_child_container_track(group, &key.container).unwrap();
    graph
        .direct_children(container)
        .into_iter()
        .flat_map(|child| graph.outbound_sends(child))
        .map(|send| send.destination_channel)
        .collect()
}

#[test]
fn test_missing_tracks_trigger_single_regeneration() {
    let catalog = LayoutCatalog::builtin();
    let mut soundscape = forest();
    let mut graph = built_graph(&catalog, &soundscape);
    let resolutions = resolve(&catalog, &soundscape);
    assert_eq!(resolutions.len(), 3);

    remove_container_tracks(&mut graph, &key("Forest", "Birds"));
    remove_container_tracks(&mut graph, &key("Forest", "Creek"));

    let mut regenerator = CountingRegenerator::default();
    let outcome = apply_resolutions(
        &resolutions,
        &catalog,
        &mut soundscape,
        &mut graph,
        &mut regenerator,
        &ApplyConfig::default(),
    )
    .unwrap();

    assert!(outcome.any_failed);
    assert_eq!(regenerator.calls, 1);
    assert_eq!(outcome.regenerated, Some(0));
    assert_eq!(
        outcome.needs_regeneration,
        vec![key("Forest", "Birds"), key("Forest", "Creek")]
    );

    for name in ["Birds", "Creek"] {
        let container = soundscape.container(&key("Forest", name)).unwrap();
        assert_eq!(container.custom_routing, Some(vec![1, 2, 4, 5]));
        assert!(container.needs_regeneration);
    }
}

#[test]
fn test_partial_failure_keeps_other_resolutions() {
    let catalog = LayoutCatalog::builtin();
    let mut soundscape = forest();
    let mut graph = built_graph(&catalog, &soundscape);
    let resolutions = resolve(&catalog, &soundscape);

    remove_container_tracks(&mut graph, &key("Forest", "Leaves"));

    let mut regenerator = CountingRegenerator::default();
    let outcome = apply_resolutions(
        &resolutions,
        &catalog,
        &mut soundscape,
        &mut graph,
        &mut regenerator,
        &ApplyConfig::default(),
    )
    .unwrap();

    assert_eq!(outcome.persisted.len(), 3);
    assert_eq!(outcome.rewired, vec![key("Forest", "Birds"), key("Forest", "Creek")]);
    assert_eq!(outcome.needs_regeneration, vec![key("Forest", "Leaves")]);
    assert_eq!(outcome.sends_rewritten, 8);

    assert_eq!(send_channels(&graph, &key("Forest", "Birds")), vec![0, 1, 3, 4]);
    assert_eq!(send_channels(&graph, &key("Forest", "Creek")), vec![0, 1, 3, 4]);
    assert!(!soundscape.needs_regeneration(&key("Forest", "Birds")));
}

#[test]
fn test_regeneration_rebuilds_missing_tracks() {
    let catalog = LayoutCatalog::builtin();
    let mut soundscape = forest();
    let mut graph = built_graph(&catalog, &soundscape);
    let resolutions = resolve(&catalog, &soundscape);
    let leaves = key("Forest", "Leaves");

    remove_container_tracks(&mut graph, &leaves);

    let mut regenerator = TrackingRegenerator {
        inner: TrackRegenerator::new(&catalog),
        calls: 0,
    };
    let outcome = apply_resolutions(
        &resolutions,
        &catalog,
        &mut soundscape,
        &mut graph,
        &mut regenerator,
        &ApplyConfig::default(),
    )
    .unwrap();

    assert_eq!(regenerator.calls, 1);
    assert_eq!(outcome.regenerated, Some(1));
    assert!(!soundscape.needs_regeneration(&leaves));
    assert_eq!(send_channels(&graph, &leaves), vec![0, 1, 3, 4]);

    assert_eq!(graph.history().len(), 1);
    assert_eq!(graph.history()[0].label, ApplyConfig::default().transaction_label);
    assert_eq!(graph.refresh_count(), 1);
    assert!(detect_conflicts(&catalog, &soundscape.descriptors()).is_none());
}

#[test]
fn test_clean_apply_skips_regeneration() {
    let catalog = LayoutCatalog::builtin();
    let mut soundscape = forest();
    let mut graph = built_graph(&catalog, &soundscape);
    let resolutions = resolve(&catalog, &soundscape);

    let mut regenerator = CountingRegenerator::default();
    let outcome = apply_resolutions(
        &resolutions,
        &catalog,
        &mut soundscape,
        &mut graph,
        &mut regenerator,
        &ApplyConfig::default(),
    )
    .unwrap();

    assert!(!outcome.any_failed);
    assert_eq!(regenerator.calls, 0);
    assert_eq!(outcome.regenerated, None);
    assert!(resolve(&catalog, &soundscape).is_empty());
}

#[test]
fn test_invalid_resolution_leaves_everything_untouched() {
    let catalog = LayoutCatalog::builtin();
    let mut soundscape = forest();
    let mut graph = built_graph(&catalog, &soundscape);
    let mut resolutions = resolve(&catalog, &soundscape);
    resolutions[1].new_routing.pop();

    let mut regenerator = CountingRegenerator::default();
    let result = apply_resolutions(
        &resolutions,
        &catalog,
        &mut soundscape,
        &mut graph,
        &mut regenerator,
        &ApplyConfig::default(),
    );

    assert!(matches!(result, Err(ApplyError::RoutingLength { .. })));
    assert!(graph.history().is_empty());
    assert_eq!(soundscape, forest());
}

#[test]
fn test_override_shorter_than_layout_is_rejected() {
    let catalog = LayoutCatalog::builtin();
    let mut soundscape = forest();
    let mut graph = built_graph(&catalog, &soundscape);
    let mut resolutions = resolve(&catalog, &soundscape);
    resolutions[0].original_routing.pop();
    resolutions[0].new_routing.pop();

    let mut regenerator = CountingRegenerator::default();
    let result = apply_resolutions(
        &resolutions,
        &catalog,
        &mut soundscape,
        &mut graph,
        &mut regenerator,
        &ApplyConfig::default(),
    );

    match result {
        Err(ApplyError::LayoutMismatch { container, .. }) => {
            assert_eq!(container, resolutions[0].container)
        }
        other => panic!("unexpected result: {:?}", other),
    }
    assert!(graph.history().is_empty());
    assert_eq!(soundscape, forest());
    assert_eq!(regenerator.calls, 0);
}

#[tokio::test]
async fn test_applied_session_round_trips_through_disk() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("forest.toml");
    forest().save_to_file(&path).await.unwrap();

    let catalog = LayoutCatalog::builtin();
    let mut soundscape = Soundscape::load_from_file(&path).await.unwrap();
    let mut graph = built_graph(&catalog, &soundscape);
    let resolutions = resolve(&catalog, &soundscape);
    remove_container_tracks(&mut graph, &key("Forest", "Creek"));

    let mut regenerator = CountingRegenerator::default();
    apply_resolutions(
        &resolutions,
        &catalog,
        &mut soundscape,
        &mut graph,
        &mut regenerator,
        &ApplyConfig::default(),
    )
    .unwrap();
    soundscape.save_to_file(&path).await.unwrap();

    let reloaded = Soundscape::load_from_file(&path).await.unwrap();
    assert_eq!(reloaded, soundscape);
    assert_eq!(reloaded.pending_regeneration(), vec![key("Forest", "Creek")]);
    assert!(detect_conflicts(&catalog, &reloaded.descriptors()).is_none());
}
