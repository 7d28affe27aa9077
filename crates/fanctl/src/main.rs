//! fanctl - drive fan-out audio pipelines from the shell
//!
//! Subcommands:
//! - `fanctl devices` - List output devices and the suggested routing
//! - `fanctl modules` - List loaded server modules
//! - `fanctl plan` - Show what `apply` would build
//! - `fanctl apply` - Replace the running pipeline
//! - `fanctl stop` - Tear the pipeline down
//! - `fanctl gain` - Re-apply output volumes without rebuilding
//! - `fanctl monitor` - Watch the pipeline's output level
//! - `fanctl config` - Print the effective configuration

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use fanout::{EffectKind, Preset};
use fanoutconf::FanoutConfig;

mod commands;
mod telemetry;

#[derive(Parser)]
#[command(name = "fanctl")]
#[command(about = "Fan one audio stream out to several output devices")]
#[command(version)]
struct Cli {
    /// Config file to load in place of ./fanout.toml
    #[arg(short, long, global = true, env = "FANOUT_CONFIG")]
    config: Option<PathBuf>,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List output devices with display names and suggested routing
    Devices,

    /// List loaded server modules
    Modules {
        /// Only show modules that belong to the pipeline
        #[arg(long)]
        ours: bool,
    },

    /// Show the nodes `apply` would create, without touching the server
    Plan {
        #[command(flatten)]
        pipeline: PipelineArgs,
    },

    /// Tear down whatever is running and build a new pipeline
    Apply {
        #[command(flatten)]
        pipeline: PipelineArgs,
    },

    /// Unload every pipeline module
    Stop,

    /// Set output volumes on the running pipeline
    Gain {
        #[command(flatten)]
        routing: RoutingArgs,
    },

    /// Sample the output level of the base sink
    Monitor {
        /// Sampling interval in milliseconds
        #[arg(short, long, default_value = "100")]
        interval: u64,

        /// Stop after this many seconds (0 runs until interrupted)
        #[arg(short, long, default_value = "0")]
        duration: u64,
    },

    /// Print the effective configuration as TOML
    Config {
        /// Also list the files and environment variables it came from
        #[arg(long)]
        sources: bool,
    },
}

/// Effect chain selection plus routing.
#[derive(Args, Clone)]
pub struct PipelineArgs {
    /// Start from a named preset instead of the configured effect defaults
    #[arg(short, long)]
    preset: Option<Preset>,

    /// Turn an effect on (limiter, equalizer, compressor, multiband)
    #[arg(short, long = "enable")]
    enable: Vec<EffectKind>,

    /// Turn an effect off
    #[arg(short = 'x', long = "disable")]
    disable: Vec<EffectKind>,

    /// Feed both rear outputs from a mono downmix
    #[arg(long)]
    upmix: bool,

    #[command(flatten)]
    routing: RoutingArgs,
}

/// Which device each output goes to, and how loud.
#[derive(Args, Clone)]
pub struct RoutingArgs {
    /// Front (stereo) output device
    #[arg(long)]
    front: Option<String>,

    /// Rear left output device
    #[arg(long)]
    rear_left: Option<String>,

    /// Rear right output device
    #[arg(long)]
    rear_right: Option<String>,

    /// Fill unset devices from the configured selection hints
    #[arg(short, long)]
    auto: bool,

    /// Front volume in percent
    #[arg(long)]
    front_volume: Option<f64>,

    /// Front balance, -100 (left) to 100 (right)
    #[arg(long, default_value = "0", allow_hyphen_values = true)]
    front_balance: f64,

    /// Rear volume in percent
    #[arg(long)]
    rear_volume: Option<f64>,

    /// Rear balance, -100 (left) to 100 (right)
    #[arg(long, allow_hyphen_values = true)]
    rear_balance: Option<f64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = FanoutConfig::load_from(cli.config.as_deref()).context("Failed to load config")?;
    telemetry::init(&config.telemetry.log_level);

    let json = cli.json;
    match cli.command {
        Commands::Devices => commands::devices(&config, json).await?,
        Commands::Modules { ours } => commands::modules(&config, ours, json).await?,
        Commands::Plan { pipeline } => commands::plan(&config, &pipeline, json).await?,
        Commands::Apply { pipeline } => commands::apply(config, &pipeline, json).await?,
        Commands::Stop => commands::stop(config, json).await?,
        Commands::Gain { routing } => commands::gain(config, &routing, json).await?,
        Commands::Monitor { interval, duration } => {
            commands::monitor(&config, interval, duration, json).await?
        }
        Commands::Config { sources } => commands::show_config(cli.config.as_deref(), sources, json)?,
    }

    Ok(())
}
