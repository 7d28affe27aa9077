//! CLI command implementations

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use fanout::{
    suggest_routing, ApplyReport, BuildPlan, Catalog, EffectChain, GainReport, MonitorSampler,
    OutputChannel, PipelineService, PlanBuilder, Reconciler, RoutingMode, RoutingSuggestion,
    RoutingTarget, StopReport, TeardownSequence,
};
use fanoutconf::FanoutConfig;
use owo_colors::OwoColorize;
use serde::Serialize;
use tracing::warn;

use crate::{PipelineArgs, RoutingArgs};

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Run a catalog query on the blocking pool.
async fn query<T, F>(catalog: &Catalog, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&Catalog) -> T + Send + 'static,
{
    let catalog = catalog.clone();
    tokio::task::spawn_blocking(move || f(&catalog))
        .await
        .context("Catalog query panicked")
}

fn effect_chain(config: &FanoutConfig, args: &PipelineArgs) -> Result<EffectChain> {
    let mut chain = match args.preset {
        Some(preset) => preset.chain(),
        None => EffectChain::from_defaults(&config.effects).context("Invalid effect defaults")?,
    };
    for kind in &args.enable {
        chain.set_enabled(*kind, true);
    }
    for kind in &args.disable {
        chain.set_enabled(*kind, false);
    }
    Ok(chain)
}

async fn routing_targets(
    config: &FanoutConfig,
    catalog: &Catalog,
    args: &RoutingArgs,
) -> Result<Vec<RoutingTarget>> {
    let suggestion = if args.auto {
        let hints = config.hints.clone();
        query(catalog, move |c| suggest_routing(&c.list_output_devices(), &hints)).await?
    } else {
        RoutingSuggestion::default()
    };

    let device = |explicit: &Option<String>, channel: OutputChannel| {
        explicit
            .clone()
            .or_else(|| suggestion.device_for(channel).map(str::to_string))
    };

    let rear_volume = args.rear_volume.unwrap_or(config.routing.rear_volume);
    let rear_balance = args.rear_balance.unwrap_or(config.routing.rear_balance);
    let target = |channel: OutputChannel, device: Option<String>| match device {
        Some(d) => RoutingTarget::new(channel, d),
        None => RoutingTarget::disabled(channel),
    };

    Ok(vec![
        target(OutputChannel::Front, device(&args.front, OutputChannel::Front))
            .with_volume(args.front_volume.unwrap_or(config.routing.front_volume))
            .with_balance(args.front_balance),
        target(OutputChannel::RearLeft, device(&args.rear_left, OutputChannel::RearLeft))
            .with_volume(rear_volume)
            .with_balance(rear_balance),
        target(OutputChannel::RearRight, device(&args.rear_right, OutputChannel::RearRight))
            .with_volume(rear_volume)
            .with_balance(rear_balance),
    ])
}

async fn build_plan(reconciler: &Reconciler, args: &PipelineArgs) -> Result<BuildPlan> {
    let config = reconciler.config();
    let chain = effect_chain(config, args)?;
    let targets = routing_targets(config, reconciler.catalog(), &args.routing).await?;
    let mode = if args.upmix || config.routing.upmix {
        RoutingMode::Upmix
    } else {
        RoutingMode::Stereo
    };

    reconciler
        .plan(&chain, &targets, mode)
        .context("No pipeline to build; pass --front, --rear-left, --rear-right or --auto")
}

#[derive(Serialize)]
struct DeviceRow {
    name: String,
    description: Option<String>,
    state: fanout::DeviceState,
}

#[derive(Serialize)]
struct DeviceListing {
    devices: Vec<DeviceRow>,
    suggestion: RoutingSuggestion,
}

/// List output devices and what auto-selection would pick
pub async fn devices(config: &FanoutConfig, json: bool) -> Result<()> {
    let catalog = Reconciler::from_config(config.clone()).catalog().clone();
    let hints = config.hints.clone();
    let listing = query(&catalog, move |c| {
        let devices = c.list_output_devices();
        let mut names = c.display_names();
        let suggestion = suggest_routing(&devices, &hints);
        DeviceListing {
            devices: devices
                .into_iter()
                .map(|d| DeviceRow {
                    description: names.remove(&d.name),
                    name: d.name,
                    state: d.state,
                })
                .collect(),
            suggestion,
        }
    })
    .await?;

    if json {
        return print_json(&listing);
    }

    if listing.devices.is_empty() {
        println!("{}", "No output devices found".yellow());
        return Ok(());
    }

    for row in &listing.devices {
        let picks: Vec<&str> = OutputChannel::ALL
            .iter()
            .filter(|ch| listing.suggestion.device_for(**ch) == Some(row.name.as_str()))
            .map(|ch| ch.as_str())
            .collect();
        println!(
            "{} {} {}",
            row.description.as_deref().unwrap_or(&row.name).bold(),
            format!("({:?})", row.state).dimmed(),
            picks.join(",").bright_cyan()
        );
        println!("  {}", row.name.dimmed());
    }
    Ok(())
}

/// List loaded modules, optionally only the pipeline's own
pub async fn modules(config: &FanoutConfig, ours: bool, json: bool) -> Result<()> {
    let catalog = Reconciler::from_config(config.clone()).catalog().clone();
    let mut blocks = query(&catalog, |c| c.list_active_modules().iter().collect::<Vec<_>>()).await?;

    if ours {
        let sequence = TeardownSequence::default_for(&config.names);
        blocks.retain(|block| {
            sequence
                .steps
                .iter()
                .any(|step| step.patterns.iter().all(|p| block.text.contains(p.as_str())))
        });
    }

    if json {
        return print_json(&blocks);
    }

    for block in &blocks {
        let argument = block
            .text
            .lines()
            .find_map(|l| l.trim().strip_prefix("Argument:"))
            .map(str::trim)
            .unwrap_or_default();
        println!("{:>5} {} {}", block.id.bright_yellow(), block.name.bold(), argument.dimmed());
    }
    Ok(())
}

/// Show what apply would create
pub async fn plan(config: &FanoutConfig, args: &PipelineArgs, json: bool) -> Result<()> {
    let reconciler = Reconciler::from_config(config.clone());
    let plan = build_plan(&reconciler, args).await?;

    if json {
        return print_json(&plan);
    }

    for node in &plan.nodes {
        println!(
            "{} {} {}",
            format!("{:<14}", node.kind.as_str()).bright_cyan(),
            node.name.bold(),
            node.master
                .as_deref()
                .map(|m| format!("<- {m}"))
                .unwrap_or_default()
                .dimmed()
        );
        println!("    {} {}", node.kind.module_name(), node.module_arguments().join(" "));
        for (name, value) in node.parameters() {
            println!("      {} = {}", name.dimmed(), value);
        }
    }
    if let Some(entry) = plan.entry_sink() {
        println!("{} {}", "entry sink:".dimmed(), entry.bright_green());
    }
    Ok(())
}

fn print_stop(report: &StopReport) {
    println!("{} {} modules", "unloaded".bright_green(), report.unloaded_count());
    for step in &report.steps {
        for (id, error) in &step.failed {
            println!("  {} module {}: {}", "failed".bright_red(), id, error);
        }
    }
    for ambiguity in report.ambiguities.iter().filter(|a| a.is_unexpected()) {
        println!("  {} {}", "ambiguous".yellow(), ambiguity);
    }
}

fn print_gains(report: &GainReport) {
    for command in &report.applied {
        println!("  {} {:?}", "volume".dimmed(), command);
    }
    for (device, error) in &report.failed {
        println!("  {} {}: {}", "volume failed".bright_red(), device, error);
    }
}

fn print_apply(report: &ApplyReport) {
    println!(
        "{} generation {} with {} nodes",
        "pipeline live:".bright_green().bold(),
        report.generation,
        report.created.len()
    );
    for node in &report.created {
        let module = node
            .module
            .as_ref()
            .map(|id| id.to_string())
            .unwrap_or_else(|| "reused".to_string());
        println!("  {:>6} {} {}", module.bright_yellow(), node.spec.kind, node.spec.name.bold());
    }
    if let Some(base) = &report.reused_base {
        println!("  {} {}", "reused base sink".dimmed(), base);
    }
    if let Some(sink) = &report.default_sink {
        println!("  {} {}", "default sink".dimmed(), sink.bright_cyan());
    }
    print_gains(&report.gains);
}

/// Replace the running pipeline. Ctrl-C waits for the build, then tears it down.
pub async fn apply(config: FanoutConfig, args: &PipelineArgs, json: bool) -> Result<()> {
    let reconciler = Reconciler::from_config(config);
    let plan = build_plan(&reconciler, args).await?;
    let service = PipelineService::new(reconciler);

    let result = tokio::select! {
        result = service.apply(plan) => result,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, cancelling");
            let report = service.cancel().await;
            if !json {
                print_stop(&report);
            }
            bail!("Interrupted");
        }
    };

    let report = result.context("Failed to apply pipeline")?;
    if json {
        print_json(&report)
    } else {
        print_apply(&report);
        Ok(())
    }
}

pub async fn stop(config: FanoutConfig, json: bool) -> Result<()> {
    let service = PipelineService::new(Reconciler::from_config(config));
    let report = service.stop().await;

    if json {
        return print_json(&report);
    }
    print_stop(&report);
    Ok(())
}

/// Re-apply volumes without rebuilding
pub async fn gain(config: FanoutConfig, args: &RoutingArgs, json: bool) -> Result<()> {
    let reconciler = Reconciler::from_config(config);
    let targets = routing_targets(reconciler.config(), reconciler.catalog(), args).await?;
    PlanBuilder::validate_targets(&targets).context("Nothing to set; pass a device or --auto")?;

    let service = PipelineService::new(reconciler);
    let report = service.set_gains(targets).await?;

    if json {
        return print_json(&report);
    }
    print_gains(&report);
    if !report.failed.is_empty() {
        bail!("{} volume changes failed", report.failed.len());
    }
    Ok(())
}

fn level_bar(level: f64) -> String {
    let width = (level.clamp(0.0, 150.0) / 5.0).round() as usize;
    "#".repeat(width)
}

/// Print the base sink monitor level until interrupted or `duration_secs` passes
pub async fn monitor(config: &FanoutConfig, interval_ms: u64, duration_secs: u64, json: bool) -> Result<()> {
    if interval_ms == 0 {
        bail!("Interval must be at least 1ms");
    }
    let catalog = Reconciler::from_config(config.clone()).catalog().clone();
    let sampler = MonitorSampler::for_base(catalog, &config.names)
        .with_interval(Duration::from_millis(interval_ms));
    let (mut rx, handle) = sampler.spawn();

    let deadline = async {
        if duration_secs == 0 {
            std::future::pending::<()>().await
        } else {
            tokio::time::sleep(Duration::from_secs(duration_secs)).await
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let Some(sample) = rx.borrow_and_update().latest().cloned() else {
                    continue;
                };
                if json {
                    println!("{}", serde_json::to_string(&sample)?);
                } else if sample.snapshot.is_none() {
                    println!("{} {}", sample.at.format("%H:%M:%S%.3f"), "no signal source".dimmed());
                } else {
                    let level = sample.level();
                    println!(
                        "{} {:>6.1}% {} {}",
                        sample.at.format("%H:%M:%S%.3f"),
                        level,
                        sample.source.as_deref().unwrap_or_default().dimmed(),
                        level_bar(level).bright_green()
                    );
                }
            }
            _ = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    drop(rx);
    handle.await.context("Sampler task failed")?;
    Ok(())
}

/// Print the merged configuration
pub fn show_config(path: Option<&Path>, sources: bool, json: bool) -> Result<()> {
    let (config, loaded) =
        FanoutConfig::load_with_sources_from(path).context("Failed to load config")?;

    if json {
        return print_json(&config);
    }

    if sources {
        for file in &loaded.files {
            println!("# file: {}", file.display());
        }
        for var in &loaded.env_overrides {
            println!("# env: {}", var);
        }
        if loaded.files.is_empty() && loaded.env_overrides.is_empty() {
            println!("# defaults only");
        }
        println!();
    }
    print!("{}", config.to_toml());
    Ok(())
}
