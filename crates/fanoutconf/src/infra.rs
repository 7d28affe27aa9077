//! Infrastructure configuration - things that cannot change while a pipeline is live.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How to reach the sound server and how loopbacks are tuned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Control binary used for every external call.
    /// Default: pactl (resolved through PATH)
    #[serde(default = "ServerConfig::default_pactl")]
    pub pactl: PathBuf,

    /// Loopback latency passed to every loopback module.
    /// Default: 50
    #[serde(default = "ServerConfig::default_latency_msec")]
    pub latency_msec: u32,

    /// Make the chain entry point the server's default sink after apply.
    /// Default: true
    #[serde(default = "ServerConfig::default_set_default_sink")]
    pub set_default_sink: bool,

    /// Ceiling for volumes sent to a shared stereo device, in percent.
    /// Default: 150
    #[serde(default = "ServerConfig::default_max_volume_percent")]
    pub max_volume_percent: f64,
}

impl ServerConfig {
    fn default_pactl() -> PathBuf {
        PathBuf::from("pactl")
    }

    fn default_latency_msec() -> u32 {
        50
    }

    fn default_set_default_sink() -> bool {
        true
    }

    fn default_max_volume_percent() -> f64 {
        150.0
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            pactl: Self::default_pactl(),
            latency_msec: Self::default_latency_msec(),
            set_default_sink: Self::default_set_default_sink(),
            max_volume_percent: Self::default_max_volume_percent(),
        }
    }
}

/// Names given to the modules this system creates.
///
/// These double as discovery patterns: teardown finds leftovers from earlier
/// runs by searching module arguments for them, so changing a name while a
/// pipeline is live orphans the old modules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamesConfig {
    #[serde(default = "NamesConfig::default_base_sink")]
    pub base_sink: String,

    /// Description shown by mixers for a freshly created base sink.
    #[serde(default = "NamesConfig::default_base_description")]
    pub base_description: String,

    /// Pre-existing generic sinks that may be adopted as the base sink when the
    /// conventional one is absent. Never unloaded by teardown.
    #[serde(default = "NamesConfig::default_fallback_base_sinks")]
    pub fallback_base_sinks: Vec<String>,

    #[serde(default = "NamesConfig::default_left_source")]
    pub left_source: String,

    #[serde(default = "NamesConfig::default_right_source")]
    pub right_source: String,

    /// Downmixed source feeding rear outputs in upmix mode.
    #[serde(default = "NamesConfig::default_mix_source")]
    pub mix_source: String,

    #[serde(default = "NamesConfig::default_limiter_sink")]
    pub limiter_sink: String,

    #[serde(default = "NamesConfig::default_equalizer_sink")]
    pub equalizer_sink: String,

    #[serde(default = "NamesConfig::default_compressor_sink")]
    pub compressor_sink: String,

    /// Per-band dynamics sink.
    #[serde(default = "NamesConfig::default_multiband_sink")]
    pub multiband_sink: String,
}

impl NamesConfig {
    fn default_base_sink() -> String {
        "splitter".to_string()
    }

    fn default_base_description() -> String {
        "AudioSplitter".to_string()
    }

    fn default_fallback_base_sinks() -> Vec<String> {
        vec!["null".to_string()]
    }

    fn default_left_source() -> String {
        "splitter_left".to_string()
    }

    fn default_right_source() -> String {
        "splitter_right".to_string()
    }

    fn default_mix_source() -> String {
        "splitter_mix".to_string()
    }

    fn default_limiter_sink() -> String {
        "limiter".to_string()
    }

    fn default_equalizer_sink() -> String {
        "eq".to_string()
    }

    fn default_compressor_sink() -> String {
        "compressor".to_string()
    }

    fn default_multiband_sink() -> String {
        "multicomp".to_string()
    }

    /// Sink names that belong to the pipeline rather than to real hardware.
    pub fn reserved_sinks(&self) -> Vec<String> {
        let mut reserved = vec![
            self.base_sink.clone(),
            self.limiter_sink.clone(),
            self.equalizer_sink.clone(),
            self.compressor_sink.clone(),
            self.multiband_sink.clone(),
        ];
        reserved.extend(self.fallback_base_sinks.iter().cloned());
        reserved
    }

    /// Every module name this system owns, used for uniqueness checks.
    pub fn owned_names(&self) -> Vec<&str> {
        vec![
            self.base_sink.as_str(),
            self.left_source.as_str(),
            self.right_source.as_str(),
            self.mix_source.as_str(),
            self.limiter_sink.as_str(),
            self.equalizer_sink.as_str(),
            self.compressor_sink.as_str(),
            self.multiband_sink.as_str(),
        ]
    }
}

impl Default for NamesConfig {
    fn default() -> Self {
        Self {
            base_sink: Self::default_base_sink(),
            base_description: Self::default_base_description(),
            fallback_base_sinks: Self::default_fallback_base_sinks(),
            left_source: Self::default_left_source(),
            right_source: Self::default_right_source(),
            mix_source: Self::default_mix_source(),
            limiter_sink: Self::default_limiter_sink(),
            equalizer_sink: Self::default_equalizer_sink(),
            compressor_sink: Self::default_compressor_sink(),
            multiband_sink: Self::default_multiband_sink(),
        }
    }
}

/// A LADSPA plugin addressed by library name and label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginRef {
    pub plugin: String,
    pub label: String,
}

impl PluginRef {
    pub fn new(plugin: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            plugin: plugin.into(),
            label: label.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginsConfig {
    #[serde(default = "PluginsConfig::default_limiter")]
    pub limiter: PluginRef,

    #[serde(default = "PluginsConfig::default_equalizer")]
    pub equalizer: PluginRef,

    #[serde(default = "PluginsConfig::default_compressor")]
    pub compressor: PluginRef,

    /// Three-band compressor.
    #[serde(default = "PluginsConfig::default_multiband")]
    pub multiband: PluginRef,
}

impl PluginsConfig {
    fn default_limiter() -> PluginRef {
        PluginRef::new("fast_lookahead_limiter_1913", "fastLookaheadLimiter")
    }

    fn default_equalizer() -> PluginRef {
        PluginRef::new("mbeq_1197", "mbeq")
    }

    fn default_compressor() -> PluginRef {
        PluginRef::new("sc4_1882", "sc4")
    }

    fn default_multiband() -> PluginRef {
        PluginRef::new("ZaMultiCompX2-ladspa", "ZaMultiCompX2")
    }
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            limiter: Self::default_limiter(),
            equalizer: Self::default_equalizer(),
            compressor: Self::default_compressor(),
            multiband: Self::default_multiband(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log filter (trace, debug, info, warn, error, or an EnvFilter directive).
    /// Default: info
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,
}

impl TelemetryConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
        }
    }
}
