//! Bootstrap configuration - seeds the chain and routing the first time a
//! pipeline is applied. Callers override any of it per invocation.

use serde::{Deserialize, Serialize};

/// Centre frequencies of the 15-band equalizer, in Hz.
pub const EQ_BANDS_HZ: [u32; 15] = [
    50, 100, 156, 220, 311, 440, 622, 880, 1250, 1750, 2500, 3500, 5000, 10000, 20000,
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimiterDefaults {
    #[serde(default = "LimiterDefaults::default_enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub input_gain_db: f64,

    /// Ceiling in dBFS.
    /// Default: -0.1
    #[serde(default = "LimiterDefaults::default_limit_db")]
    pub limit_db: f64,

    /// Default: 0.05
    #[serde(default = "LimiterDefaults::default_release_s")]
    pub release_s: f64,
}

impl LimiterDefaults {
    fn default_enabled() -> bool {
        true
    }

    fn default_limit_db() -> f64 {
        -0.1
    }

    fn default_release_s() -> f64 {
        0.05
    }
}

impl Default for LimiterDefaults {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            input_gain_db: 0.0,
            limit_db: Self::default_limit_db(),
            release_s: Self::default_release_s(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EqualizerDefaults {
    /// A flat curve is a no-op, so the stage starts disabled.
    #[serde(default)]
    pub enabled: bool,

    /// One gain per entry of [`EQ_BANDS_HZ`], in dB.
    #[serde(default = "EqualizerDefaults::default_gains_db")]
    pub gains_db: Vec<f64>,
}

impl EqualizerDefaults {
    fn default_gains_db() -> Vec<f64> {
        vec![0.0; EQ_BANDS_HZ.len()]
    }
}

impl Default for EqualizerDefaults {
    fn default() -> Self {
        Self {
            enabled: false,
            gains_db: Self::default_gains_db(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressorDefaults {
    #[serde(default = "CompressorDefaults::default_enabled")]
    pub enabled: bool,

    #[serde(default = "CompressorDefaults::default_threshold_db")]
    pub threshold_db: f64,

    #[serde(default = "CompressorDefaults::default_ratio")]
    pub ratio: f64,

    #[serde(default = "CompressorDefaults::default_knee_db")]
    pub knee_db: f64,

    #[serde(default = "CompressorDefaults::default_attack_ms")]
    pub attack_ms: f64,

    #[serde(default = "CompressorDefaults::default_release_ms")]
    pub release_ms: f64,

    #[serde(default)]
    pub makeup_db: f64,
}

impl CompressorDefaults {
    fn default_enabled() -> bool {
        true
    }

    fn default_threshold_db() -> f64 {
        -20.0
    }

    fn default_ratio() -> f64 {
        4.0
    }

    fn default_knee_db() -> f64 {
        6.0
    }

    fn default_attack_ms() -> f64 {
        5.0
    }

    fn default_release_ms() -> f64 {
        100.0
    }
}

impl Default for CompressorDefaults {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            threshold_db: Self::default_threshold_db(),
            ratio: Self::default_ratio(),
            knee_db: Self::default_knee_db(),
            attack_ms: Self::default_attack_ms(),
            release_ms: Self::default_release_ms(),
            makeup_db: 0.0,
        }
    }
}

/// One band of the three-band compressor. Band tables are read whole: every
/// field is required when a band is overridden.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandDefaults {
    pub enabled: bool,
    pub threshold_db: f64,
    pub ratio: f64,
    pub knee_db: f64,
    pub attack_ms: f64,
    pub release_ms: f64,
    pub makeup_db: f64,
}

/// Per-band dynamics: low, mid and high bands split at two crossovers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultibandDefaults {
    #[serde(default)]
    pub enabled: bool,

    /// Default: 200
    #[serde(default = "MultibandDefaults::default_crossover_low_hz")]
    pub crossover_low_hz: f64,

    /// Default: 2000
    #[serde(default = "MultibandDefaults::default_crossover_high_hz")]
    pub crossover_high_hz: f64,

    #[serde(default = "MultibandDefaults::default_low")]
    pub low: BandDefaults,

    #[serde(default = "MultibandDefaults::default_mid")]
    pub mid: BandDefaults,

    #[serde(default = "MultibandDefaults::default_high")]
    pub high: BandDefaults,

    #[serde(default)]
    pub master_trim_db: f64,

    /// Link detection across both channels.
    /// Default: true
    #[serde(default = "MultibandDefaults::default_stereo_detection")]
    pub stereo_detection: bool,
}

impl MultibandDefaults {
    fn default_crossover_low_hz() -> f64 {
        200.0
    }

    fn default_crossover_high_hz() -> f64 {
        2000.0
    }

    fn default_low() -> BandDefaults {
        BandDefaults {
            enabled: true,
            threshold_db: -15.0,
            ratio: 4.0,
            knee_db: 2.0,
            attack_ms: 25.0,
            release_ms: 125.0,
            makeup_db: 0.0,
        }
    }

    fn default_mid() -> BandDefaults {
        BandDefaults {
            enabled: true,
            threshold_db: -12.0,
            ratio: 3.0,
            knee_db: 2.0,
            attack_ms: 15.0,
            release_ms: 80.0,
            makeup_db: 0.0,
        }
    }

    fn default_high() -> BandDefaults {
        BandDefaults {
            enabled: true,
            threshold_db: -10.0,
            ratio: 2.0,
            knee_db: 1.0,
            attack_ms: 5.0,
            release_ms: 50.0,
            makeup_db: 0.0,
        }
    }

    fn default_stereo_detection() -> bool {
        true
    }

    pub fn bands(&self) -> [&BandDefaults; 3] {
        [&self.low, &self.mid, &self.high]
    }
}

impl Default for MultibandDefaults {
    fn default() -> Self {
        Self {
            enabled: false,
            crossover_low_hz: Self::default_crossover_low_hz(),
            crossover_high_hz: Self::default_crossover_high_hz(),
            low: Self::default_low(),
            mid: Self::default_mid(),
            high: Self::default_high(),
            master_trim_db: 0.0,
            stereo_detection: Self::default_stereo_detection(),
        }
    }
}

/// Starting values for each effect stage.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EffectDefaults {
    #[serde(default)]
    pub limiter: LimiterDefaults,

    #[serde(default)]
    pub equalizer: EqualizerDefaults,

    #[serde(default)]
    pub compressor: CompressorDefaults,

    #[serde(default)]
    pub multiband: MultibandDefaults,
}

/// Starting gains for the output channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDefaults {
    #[serde(default = "RoutingDefaults::default_volume")]
    pub front_volume: f64,

    #[serde(default = "RoutingDefaults::default_volume")]
    pub rear_volume: f64,

    /// -100 (full left) to 100 (full right).
    #[serde(default)]
    pub rear_balance: f64,

    /// Feed both rear outputs from a downmix instead of discrete channels.
    #[serde(default)]
    pub upmix: bool,
}

impl RoutingDefaults {
    fn default_volume() -> f64 {
        100.0
    }
}

impl Default for RoutingDefaults {
    fn default() -> Self {
        Self {
            front_volume: Self::default_volume(),
            rear_volume: Self::default_volume(),
            rear_balance: 0.0,
            upmix: false,
        }
    }
}

/// Substrings used to pre-select an output device for each channel.
///
/// Matching is case-insensitive and the first hint that hits wins, so order
/// hints from most to least specific.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionHints {
    #[serde(default = "SelectionHints::default_front")]
    pub front: Vec<String>,

    #[serde(default = "SelectionHints::default_rear_left")]
    pub rear_left: Vec<String>,

    #[serde(default = "SelectionHints::default_rear_right")]
    pub rear_right: Vec<String>,
}

impl SelectionHints {
    fn default_front() -> Vec<String> {
        ["iec958", "digital", "spdif"].map(String::from).to_vec()
    }

    fn default_rear_left() -> Vec<String> {
        ["pci-0000_03_00.1", "Navi", "HDMI"].map(String::from).to_vec()
    }

    fn default_rear_right() -> Vec<String> {
        ["pci-0000_00_1f.3", "PCH", "HDMI"].map(String::from).to_vec()
    }
}

impl Default for SelectionHints {
    fn default() -> Self {
        Self {
            front: Self::default_front(),
            rear_left: Self::default_rear_left(),
            rear_right: Self::default_rear_right(),
        }
    }
}

/// A card profile to switch to before the pipeline is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardProfile {
    pub card: String,
    pub profile: String,
}
