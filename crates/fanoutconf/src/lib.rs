//! Configuration loading for the fanout pipeline tools.
//!
//! Kept free of runtime dependencies so both the core library and the CLI can
//! import it. The core never reads files itself: it receives a validated
//! [`FanoutConfig`] at construction.
//!
//! # Configuration Philosophy
//!
//! - **Infrastructure** ([`ServerConfig`], [`NamesConfig`], [`PluginsConfig`],
//!   [`TelemetryConfig`]): how to reach the sound server and what the pipeline's
//!   modules are called. Changing these while a pipeline is live orphans it.
//!
//! - **Bootstrap** ([`EffectDefaults`], [`RoutingDefaults`], [`SelectionHints`],
//!   card profiles): starting values for a chain and its routing. Every apply
//!   may override them.
//!
//! # Usage
//!
//! ```rust,no_run
//! use fanoutconf::FanoutConfig;
//!
//! let config = FanoutConfig::load().expect("Failed to load config");
//! println!("pactl: {}", config.server.pactl.display());
//! println!("base sink: {}", config.names.base_sink);
//! ```
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins, tables merge key by key):
//! 1. `/etc/fanout/config.toml` (system)
//! 2. `~/.config/fanout/config.toml` (user)
//! 3. `./fanout.toml` or an explicit `--config` path
//! 4. Environment variables (`FANOUT_*`, `RUST_LOG`)
//!
//! # Example Config
//!
//! ```toml
//! [server]
//! latency_msec = 50
//! max_volume_percent = 150.0
//!
//! [names]
//! base_sink = "splitter"
//! fallback_base_sinks = ["null"]
//!
//! [effects.compressor]
//! threshold_db = -20.0
//! ratio = 4.0
//!
//! [effects.multiband]
//! enabled = true
//! crossover_low_hz = 250.0
//!
//! [hints]
//! front = ["iec958", "digital", "spdif"]
//!
//! [[profiles]]
//! card = "alsa_card.pci-0000_03_00.1"
//! profile = "output:hdmi-stereo"
//! ```

pub mod bootstrap;
pub mod infra;
pub mod loader;

pub use bootstrap::{
    BandDefaults, CardProfile, CompressorDefaults, EffectDefaults, EqualizerDefaults,
    LimiterDefaults, MultibandDefaults, RoutingDefaults, SelectionHints, EQ_BANDS_HZ,
};
pub use infra::{NamesConfig, PluginRef, PluginsConfig, ServerConfig, TelemetryConfig};
pub use loader::{discover_config_files_with_override, ConfigSources};

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: String, reason: String },
}

impl ConfigError {
    fn invalid(field: &str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// Complete fanout configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FanoutConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub names: NamesConfig,

    #[serde(default)]
    pub plugins: PluginsConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,

    #[serde(default)]
    pub effects: EffectDefaults,

    #[serde(default)]
    pub routing: RoutingDefaults,

    #[serde(default)]
    pub hints: SelectionHints,

    #[serde(default)]
    pub profiles: Vec<CardProfile>,
}

impl FanoutConfig {
    /// Load configuration from all sources.
    ///
    /// Load order (later wins):
    /// 1. Compiled defaults
    /// 2. `/etc/fanout/config.toml`
    /// 3. `~/.config/fanout/config.toml`
    /// 4. `./fanout.toml`
    /// 5. Environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load configuration with an explicit file in place of `./fanout.toml`.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration and return information about sources.
    pub fn load_with_sources() -> Result<(Self, ConfigSources), ConfigError> {
        Self::load_with_sources_from(None)
    }

    /// Load configuration from optional path and return information about sources.
    pub fn load_with_sources_from(
        config_path: Option<&Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut merged = toml::Table::new();

        for path in loader::discover_config_files_with_override(config_path) {
            let table = loader::load_table(&path)?;
            loader::merge_tables(&mut merged, table);
            sources.files.push(path);
        }

        let origin = sources
            .files
            .last()
            .cloned()
            .unwrap_or_else(|| PathBuf::from("<defaults>"));
        let mut config = loader::from_table(merged, &origin)?;

        loader::apply_env_overrides(&mut config, &mut sources)?;
        config.validate()?;

        Ok((config, sources))
    }

    /// Check cross-field constraints serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.pactl.as_os_str().is_empty() {
            return Err(ConfigError::invalid("server.pactl", "must not be empty"));
        }
        if self.server.latency_msec == 0 {
            return Err(ConfigError::invalid("server.latency_msec", "must be positive"));
        }
        if !(self.server.max_volume_percent.is_finite() && self.server.max_volume_percent > 0.0) {
            return Err(ConfigError::invalid(
                "server.max_volume_percent",
                format!("must be a positive number, got {}", self.server.max_volume_percent),
            ));
        }

        let mut seen = HashSet::new();
        for name in self.names.owned_names() {
            if name.is_empty() || name.chars().any(char::is_whitespace) {
                return Err(ConfigError::invalid(
                    "names",
                    format!("{name:?} is not a usable module name"),
                ));
            }
            if !seen.insert(name) {
                return Err(ConfigError::invalid("names", format!("{name} is used twice")));
            }
        }
        if self.names.fallback_base_sinks.contains(&self.names.base_sink) {
            return Err(ConfigError::invalid(
                "names.fallback_base_sinks",
                "must not contain the base sink itself",
            ));
        }

        for (field, plugin) in [
            ("plugins.limiter", &self.plugins.limiter),
            ("plugins.equalizer", &self.plugins.equalizer),
            ("plugins.compressor", &self.plugins.compressor),
            ("plugins.multiband", &self.plugins.multiband),
        ] {
            if plugin.plugin.is_empty() || plugin.label.is_empty() {
                return Err(ConfigError::invalid(field, "plugin and label are required"));
            }
        }

        if self.effects.equalizer.gains_db.len() != EQ_BANDS_HZ.len() {
            return Err(ConfigError::invalid(
                "effects.equalizer.gains_db",
                format!(
                    "expected {} bands, got {}",
                    EQ_BANDS_HZ.len(),
                    self.effects.equalizer.gains_db.len()
                ),
            ));
        }
        if self.effects.compressor.ratio < 1.0 {
            return Err(ConfigError::invalid("effects.compressor.ratio", "must be at least 1"));
        }
        let multiband = &self.effects.multiband;
        let (low, high) = (multiband.crossover_low_hz, multiband.crossover_high_hz);
        if !(0.0 < low && low < high) {
            return Err(ConfigError::invalid(
                "effects.multiband",
                "crossovers must satisfy 0 < crossover_low_hz < crossover_high_hz",
            ));
        }
        for (field, band) in ["low", "mid", "high"].into_iter().zip(multiband.bands()) {
            if band.ratio < 1.0 {
                return Err(ConfigError::invalid(
                    &format!("effects.multiband.{field}.ratio"),
                    "must be at least 1",
                ));
            }
        }

        if !(-100.0..=100.0).contains(&self.routing.rear_balance) {
            return Err(ConfigError::invalid(
                "routing.rear_balance",
                format!("{} is outside -100..=100", self.routing.rear_balance),
            ));
        }
        if self.routing.front_volume < 0.0 || self.routing.rear_volume < 0.0 {
            return Err(ConfigError::invalid("routing", "volumes must not be negative"));
        }

        Ok(())
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> String {
        let body = toml::to_string_pretty(self).unwrap_or_else(|e| format!("# unrenderable: {e}\n"));
        format!("# fanout configuration\n\n{body}")
    }
}
