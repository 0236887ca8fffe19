//! Detection and resolution scenarios on realistic soundscapes

use ambroute_core::domain::{
    detect_conflicts, find_intelligent_routing, ChannelLabel, Container, ContainerKey,
    ContainerRole, Group, LayoutCatalog, LayoutId, Resolver, ResolverConfig, RoutingStore,
    Soundscape, SubordinateFallback, VariantId,
};

fn key(group: &str, container: &str) -> ContainerKey {
    ContainerKey::new(group, container)
}

fn quad_and_surround() -> Soundscape {
    Soundscape::new().with_group(
        Group::new("Forest")
            .with_container(Container::new("Amb_Quad", LayoutId::QUAD))
            .with_container(Container::new("Amb_5_0", LayoutId::SURROUND_5_0)),
    )
}

#[test]
fn test_quad_against_surround_is_matched_to_master() {
    let catalog = LayoutCatalog::builtin();
    let soundscape = quad_and_surround();
    let quad = key("Forest", "Amb_Quad");
    let surround = key("Forest", "Amb_5_0");

    let report = detect_conflicts(&catalog, &soundscape.descriptors()).unwrap();

    let quad_info = report.container(&quad).unwrap();
    assert_eq!(quad_info.conflicts.keys().copied().collect::<Vec<_>>(), vec![3, 4]);
    assert!(!quad_info.conflicts.contains_key(&1));
    assert!(!quad_info.conflicts.contains_key(&2));

    let pair = report.pair(&quad, &surround).unwrap();
    assert_eq!(pair.channels.len(), 2);
    assert_eq!(pair.channels[0].first_label, ChannelLabel::new("LS"));
    assert_eq!(pair.channels[0].second_label, ChannelLabel::new("C"));

    assert_eq!(ContainerRole::of(report.container(&surround).unwrap()), ContainerRole::Master);
    assert_eq!(ContainerRole::of(quad_info), ContainerRole::Subordinate);

    let resolutions = find_intelligent_routing(&report);
    assert_eq!(resolutions.len(), 1);
    let resolution = &resolutions[0];
    assert_eq!(resolution.container, quad);
    assert_eq!(resolution.affected_by, surround);
    assert_eq!(resolution.original_routing, vec![1, 2, 3, 4]);
    assert_eq!(resolution.new_routing, vec![1, 2, 4, 5]);
}

#[test]
fn test_identical_stereo_containers_do_not_conflict() {
    let catalog = LayoutCatalog::builtin();
    let soundscape = Soundscape::new().with_group(
        Group::new("Birds")
            .with_container(Container::new("Near", LayoutId::STEREO))
            .with_container(Container::new("Far", LayoutId::STEREO)),
    );

    assert!(detect_conflicts(&catalog, &soundscape.descriptors()).is_none());
}

#[test]
fn test_custom_routing_clears_default_collision() {
    let catalog = LayoutCatalog::builtin();
    let mut soundscape = quad_and_surround();
    assert!(detect_conflicts(&catalog, &soundscape.descriptors()).is_some());

    soundscape.set_custom_routing(&key("Forest", "Amb_Quad"), vec![1, 2, 4, 5]);
    assert!(detect_conflicts(&catalog, &soundscape.descriptors()).is_none());

    assert!(soundscape.reset_routing(&key("Forest", "Amb_Quad")));
    assert!(detect_conflicts(&catalog, &soundscape.descriptors()).is_some());
}

#[test]
fn test_smpte_master_moves_right_channel() {
    let catalog = LayoutCatalog::builtin();
    let soundscape = Soundscape::new()
        .with_group(
            Group::new("Film").with_container(
                Container::new("Amb_7_0", LayoutId::SURROUND_7_0).with_variant(VariantId::new(1)),
            ),
        )
        .with_group(Group::new("Wind").with_container(Container::new("Gusts", LayoutId::STEREO)));

    let report = detect_conflicts(&catalog, &soundscape.descriptors()).unwrap();
    let resolutions = find_intelligent_routing(&report);

    assert_eq!(resolutions.len(), 1);
    assert_eq!(resolutions[0].container, key("Wind", "Gusts"));
    assert_eq!(resolutions[0].new_routing, vec![1, 3]);
}

#[test]
fn test_resolutions_remove_master_conflicts() {
    let catalog = LayoutCatalog::builtin();
    let mut soundscape = Soundscape::new()
        .with_group(
            Group::new("Forest")
                .with_container(Container::new("Amb_5_0", LayoutId::SURROUND_5_0))
                .with_container(Container::new("Birds", LayoutId::QUAD))
                .with_container(Container::new("Leaves", LayoutId::QUAD)),
        )
        .with_group(Group::new("Rain").with_container(Container::new("Drops", LayoutId::NONE)));

    let report = detect_conflicts(&catalog, &soundscape.descriptors()).unwrap();
    let resolutions = find_intelligent_routing(&report);
    assert_eq!(resolutions.len(), 2);

    for resolution in &resolutions {
        soundscape.set_custom_routing(&resolution.container, resolution.new_routing.clone());
    }
    assert!(detect_conflicts(&catalog, &soundscape.descriptors()).is_none());
}

#[test]
fn test_subordinates_only_left_by_default() {
    let catalog = LayoutCatalog::builtin();
    let soundscape = Soundscape::new().with_group(
        Group::new("Birds")
            .with_container(Container::new("Near", LayoutId::STEREO))
            .with_container(Container::new("Far", LayoutId::STEREO).with_custom_routing(vec![2, 1])),
    );

    let report = detect_conflicts(&catalog, &soundscape.descriptors()).unwrap();
    assert!(find_intelligent_routing(&report).is_empty());
}

#[test]
fn test_subordinates_only_shift_when_configured() {
    let catalog = LayoutCatalog::builtin();
    let mut soundscape = Soundscape::new().with_group(
        Group::new("Birds")
            .with_container(Container::new("Near", LayoutId::STEREO))
            .with_container(Container::new("Far", LayoutId::STEREO).with_custom_routing(vec![2, 1])),
    );

    let resolver = Resolver::new(ResolverConfig {
        subordinate_fallback: SubordinateFallback::ShiftToFreeChannels,
        ..ResolverConfig::default()
    });
    let report = detect_conflicts(&catalog, &soundscape.descriptors()).unwrap();
    let resolutions = resolver.find_intelligent_routing(&report);

    assert_eq!(resolutions.len(), 1);
    assert_eq!(resolutions[0].container, key("Birds", "Far"));
    assert_eq!(resolutions[0].affected_by, key("Birds", "Near"));

    let resolution = &resolutions[0];
    soundscape.set_custom_routing(&resolution.container, resolution.new_routing.clone());
    assert!(detect_conflicts(&catalog, &soundscape.descriptors()).is_none());
}
