//! Example walking through detection and resolution on a small soundscape
//!
//! Run with: cargo run --package ambroute-core --example routing_demo

use ambroute_core::domain::{
    detect_conflicts, AmbrouteConfig, Container, Group, LayoutCatalog, LayoutId, Resolver,
    RoutingStore, Soundscape, VariantId,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("ambroute_core=debug,info")
        .init();

    println!("=== Ambroute Routing Demo ===\n");

    // 1. Built-in catalog
    println!("1. Built-in layouts:");
    let config = AmbrouteConfig::default();
    let catalog = config.load_catalog().await?;
    for layout in catalog.layouts() {
        println!("   {} - {} ({} ch)", layout.id, layout.name, layout.channels);
    }

    // 2. Session with a 5.0 bed, a quad and a stereo source
    println!("\n2. Building session...");
    let mut soundscape = Soundscape::new()
        .with_group(
            Group::new("Forest")
                .with_container(Container::new("Bed", LayoutId::SURROUND_5_0))
                .with_container(Container::new("Wide", LayoutId::QUAD)),
        )
        .with_group(
            Group::new("Film")
                .with_container(
                    Container::new("Score", LayoutId::SURROUND_7_0).with_variant(VariantId::new(1)),
                )
                .with_container(Container::new("Birds", LayoutId::STEREO)),
        );
    println!("   ✓ {} containers", soundscape.descriptors().len());

    // 3. Detection
    println!("\n3. Detecting conflicts...");
    let Some(report) = detect_conflicts(&catalog, &soundscape.descriptors()) else {
        println!("   ✓ No conflicts");
        return Ok(());
    };
    for pair in report.pairs() {
        let channels: Vec<String> = pair.channels.iter().map(|c| c.channel.to_string()).collect();
        println!("   {} <-> {} on [{}]", pair.first, pair.second, channels.join(", "));
    }

    // 4. Resolution
    println!("\n4. Resolving...");
    let resolutions = Resolver::new(config.resolver.clone()).find_intelligent_routing(&report);
    for resolution in &resolutions {
        println!(
            "   {} {:?} -> {:?}",
            resolution.container, resolution.original_routing, resolution.new_routing
        );
        for change in resolution.moved() {
            println!("     {} {} -> {} ({})", change.label, change.old_channel, change.new_channel, change.reason);
        }
        soundscape.set_custom_routing(&resolution.container, resolution.new_routing.clone());
    }

    // 5. Re-check
    println!("\n5. Re-checking...");
    match detect_conflicts(&catalog, &soundscape.descriptors()) {
        Some(report) => println!("   ✗ {} conflicting channels remain", report.conflicting_channel_count()),
        None => println!("   ✓ All conflicts resolved"),
    }

    // 6. Persist the session
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("session.toml");
    soundscape.save_to_file(&path).await?;
    println!("\n6. Session saved to {}", path.display());

    println!("\n=== Demo Complete ===");
    Ok(())
}
