use ambroute_core::domain::{
    apply_resolutions, detect_conflicts, AmbrouteConfig, ConfigManager, ConflictReport,
    ContainerRole, LayoutCatalog, Resolution, Resolver, RoutingStore, Soundscape,
};
use ambroute_infra::host::{MemoryTrackGraph, TrackBuilder, TrackRegenerator};
use anyhow::Context;
use serde_json::json;
use std::path::Path;
use std::process::ExitCode;
use tracing::{debug, info};

/// Exit status of `check` when the session has conflicts
const EXIT_CONFLICTS: u8 = 2;

pub async fn load_config(path: Option<&Path>) -> anyhow::Result<AmbrouteConfig> {
    match path {
        Some(path) => AmbrouteConfig::load_from_file(path)
            .await
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => {
            let manager = ConfigManager::new(ConfigManager::default_config_dir()?);
            debug!(path = %manager.config_path().display(), "Using default config");
            Ok(manager.load().await)
        }
    }
}

async fn load_catalog(config: &AmbrouteConfig) -> anyhow::Result<LayoutCatalog> {
    config
        .load_catalog()
        .await
        .context("Failed to load layout catalog")
}

async fn load_session(path: &Path) -> anyhow::Result<Soundscape> {
    Soundscape::load_from_file(path)
        .await
        .with_context(|| format!("Failed to load session {}", path.display()))
}

fn join<T: ToString>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

pub async fn layouts(config: &AmbrouteConfig) -> anyhow::Result<ExitCode> {
    let catalog = load_catalog(config).await?;

    for layout in catalog.layouts() {
        println!(
            "{:>3}  {:<8} {} ch  [{}] -> [{}]",
            layout.id.value(),
            layout.name,
            layout.channels,
            join(&layout.labels),
            join(&layout.routing)
        );
        for variant in &layout.variants {
            println!(
                "       variant {} {:<12} [{}] -> [{}]",
                variant.id.value(),
                variant.name,
                join(&variant.labels),
                join(&variant.routing)
            );
        }
    }

    Ok(ExitCode::SUCCESS)
}

pub async fn check(config: &AmbrouteConfig, session: &Path, json: bool) -> anyhow::Result<ExitCode> {
    let catalog = load_catalog(config).await?;
    let soundscape = load_session(session).await?;
    let report = detect_conflicts(&catalog, &soundscape.descriptors());

    if json {
        let value = json!({
            "has_conflicts": report.is_some(),
            "report": report,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        match &report {
            Some(report) => print_report(report),
            None => println!("No routing conflicts"),
        }
    }

    Ok(match report {
        Some(_) => ExitCode::from(EXIT_CONFLICTS),
        None => ExitCode::SUCCESS,
    })
}

fn print_report(report: &ConflictReport) {
    println!(
        "{} conflicting channel(s) between {} container pair(s)",
        report.conflicting_channel_count(),
        report.pairs().len()
    );

    for pair in report.pairs() {
        println!("  {} <-> {}", pair.first, pair.second);
        for channel in &pair.channels {
            println!(
                "    ch {:>2}: {} vs {}",
                channel.channel, channel.first_label, channel.second_label
            );
        }
    }

    println!();
    for info in report.conflicting_containers() {
        let role = match ContainerRole::of(info) {
            ContainerRole::Master => "master",
            ContainerRole::Subordinate => "subordinate",
        };
        println!(
            "  {} [{}, {} ch{}]  [{}] -> [{}]",
            info.key,
            role,
            info.channel_count,
            if info.custom_routing { ", custom" } else { "" },
            join(&info.labels),
            join(&info.routing)
        );
    }
}

fn print_resolution(resolution: &Resolution) {
    println!("{} (conflicts with {})", resolution.container, resolution.affected_by);
    println!(
        "  [{}] -> [{}]",
        join(&resolution.original_routing),
        join(&resolution.new_routing)
    );
    for change in &resolution.changes {
        let marker = if change.is_change() { "*" } else { " " };
        println!(
            "  {} {:<3} {:>2} -> {:<2} {}",
            marker,
            change.label.as_str(),
            change.old_channel,
            change.new_channel,
            change.reason
        );
    }
}

pub async fn resolve(
    config: &AmbrouteConfig,
    session: &Path,
    json: bool,
    apply: bool,
    output: Option<&Path>,
) -> anyhow::Result<ExitCode> {
    let catalog = load_catalog(config).await?;
    let mut soundscape = load_session(session).await?;

    let resolutions = match detect_conflicts(&catalog, &soundscape.descriptors()) {
        Some(report) => Resolver::new(config.resolver.clone()).find_intelligent_routing(&report),
        None => Vec::new(),
    };

    if !apply {
        if json {
            println!("{}", serde_json::to_string_pretty(&resolutions)?);
        } else if resolutions.is_empty() {
            println!("Nothing to resolve");
        } else {
            resolutions.iter().for_each(print_resolution);
        }
        return Ok(ExitCode::SUCCESS);
    }

    let mut graph = MemoryTrackGraph::new();
    TrackBuilder::new(&catalog).build(&soundscape, &mut graph);
    let mut regenerator = TrackRegenerator::new(&catalog);

    let outcome = apply_resolutions(
        &resolutions,
        &catalog,
        &mut soundscape,
        &mut graph,
        &mut regenerator,
        &config.apply,
    )
    .context("Failed to apply resolutions")?;

    let target = output.unwrap_or(session);
    soundscape
        .save_to_file(target)
        .await
        .with_context(|| format!("Failed to write session {}", target.display()))?;
    info!(path = %target.display(), "Session updated");

    if json {
        let value = json!({
            "resolutions": resolutions,
            "outcome": outcome,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        resolutions.iter().for_each(print_resolution);
        println!(
            "Applied {} resolution(s), {} send(s) rewired{}",
            outcome.persisted.len(),
            outcome.sends_rewritten,
            if outcome.any_failed { ", with failures" } else { "" }
        );
        for key in &outcome.missing_containers {
            println!("  missing container: {}", key);
        }
        for key in &outcome.needs_regeneration {
            println!("  flagged for regeneration: {}", key);
        }
    }

    Ok(ExitCode::SUCCESS)
}

