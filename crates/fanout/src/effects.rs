//! Effect stages and their plugin control layouts.
//!
//! Plugins are opaque: each one is addressed by plugin/label and fed an ordered
//! list of numeric controls. The order of that list is a contract with the
//! plugin, versioned by [`CONTROL_LAYOUT_VERSION`] and pinned by golden tests
//! below. Reordering a layout is a breaking change.

use fanoutconf::{BandDefaults, EffectDefaults, NamesConfig, PluginRef, PluginsConfig, EQ_BANDS_HZ};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigurationError;

pub const CONTROL_LAYOUT_VERSION: u32 = 2;

pub const EQ_BAND_COUNT: usize = EQ_BANDS_HZ.len();

/// Band suffixes of the three-band compressor, lowest first.
pub const MULTIBAND_BANDS: [&str; 3] = ["low", "mid", "high"];

/// Effects in the order the chain applies them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    Limiter,
    Equalizer,
    Compressor,
    /// Per-band dynamics.
    Multiband,
}

impl EffectKind {
    pub const ALL: [EffectKind; 4] = [
        Self::Limiter,
        Self::Equalizer,
        Self::Compressor,
        Self::Multiband,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Limiter => "limiter",
            Self::Equalizer => "equalizer",
            Self::Compressor => "compressor",
            Self::Multiband => "multiband",
        }
    }

    pub fn plugin<'a>(&self, plugins: &'a PluginsConfig) -> &'a PluginRef {
        match self {
            Self::Limiter => &plugins.limiter,
            Self::Equalizer => &plugins.equalizer,
            Self::Compressor => &plugins.compressor,
            Self::Multiband => &plugins.multiband,
        }
    }

    pub fn sink_name<'a>(&self, names: &'a NamesConfig) -> &'a str {
        match self {
            Self::Limiter => &names.limiter_sink,
            Self::Equalizer => &names.equalizer_sink,
            Self::Compressor => &names.compressor_sink,
            Self::Multiband => &names.multiband_sink,
        }
    }

    /// Names of the controls, in the order the plugin expects them.
    pub fn control_names(&self) -> Vec<String> {
        match self {
            Self::Limiter => ["input_gain_db", "limit_db", "release_s"]
                .map(String::from)
                .to_vec(),
            Self::Equalizer => EQ_BANDS_HZ.iter().map(|hz| format!("gain_{hz}hz")).collect(),
            Self::Compressor => [
                "rms_peak",
                "attack_ms",
                "release_ms",
                "threshold_db",
                "ratio",
                "knee_db",
                "makeup_gain_db",
            ]
            .map(String::from)
            .to_vec(),
            Self::Multiband => {
                let per_band = [
                    "attack_ms",
                    "release_ms",
                    "knee_db",
                    "ratio",
                    "threshold_db",
                    "makeup_db",
                ];
                let mut names: Vec<String> = per_band
                    .iter()
                    .flat_map(|p| MULTIBAND_BANDS.map(|b| format!("{p}_{b}")))
                    .collect();
                names.extend(
                    ["crossover_low_hz", "crossover_high_hz", "master_trim_db", "stereo_detection"]
                        .map(String::from),
                );
                names.extend(MULTIBAND_BANDS.map(|b| format!("enable_{b}")));
                names.extend(MULTIBAND_BANDS.map(|b| format!("listen_{b}")));
                names
            }
        }
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EffectKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "limiter" => Ok(Self::Limiter),
            "equalizer" | "eq" => Ok(Self::Equalizer),
            "compressor" => Ok(Self::Compressor),
            "multiband" | "multicomp" => Ok(Self::Multiband),
            _ => Err(format!("Unknown effect: {}", s)),
        }
    }
}

/// Brick-wall lookahead limiter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LimiterSettings {
    pub input_gain_db: f64,
    pub limit_db: f64,
    pub release_s: f64,
}

impl Default for LimiterSettings {
    fn default() -> Self {
        Self {
            input_gain_db: 0.0,
            limit_db: -0.1,
            release_s: 0.05,
        }
    }
}

/// Fixed-band graphic equalizer, one gain per [`EQ_BANDS_HZ`] entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EqualizerSettings {
    pub gains_db: [f64; EQ_BAND_COUNT],
}

impl EqualizerSettings {
    pub fn flat() -> Self {
        Self {
            gains_db: [0.0; EQ_BAND_COUNT],
        }
    }

    pub fn from_gains(gains: &[f64]) -> Result<Self, ConfigurationError> {
        let gains_db = gains
            .try_into()
            .map_err(|_| ConfigurationError::EqualizerBands {
                expected: EQ_BAND_COUNT,
                got: gains.len(),
            })?;
        Ok(Self { gains_db })
    }

    /// Set every band whose centre frequency satisfies `pick`.
    pub fn with_bands(mut self, pick: impl Fn(u32) -> bool, gain_db: f64) -> Self {
        for (gain, hz) in self.gains_db.iter_mut().zip(EQ_BANDS_HZ) {
            if pick(hz) {
                *gain = gain_db;
            }
        }
        self
    }
}

impl Default for EqualizerSettings {
    fn default() -> Self {
        Self::flat()
    }
}

/// SC4-style RMS compressor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompressorSettings {
    pub threshold_db: f64,
    pub ratio: f64,
    pub knee_db: f64,
    pub attack_ms: f64,
    pub release_ms: f64,
    pub makeup_db: f64,
}

impl Default for CompressorSettings {
    fn default() -> Self {
        Self {
            threshold_db: -20.0,
            ratio: 4.0,
            knee_db: 6.0,
            attack_ms: 5.0,
            release_ms: 100.0,
            makeup_db: 0.0,
        }
    }
}

/// One band of [`MultibandSettings`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandSettings {
    pub enabled: bool,
    pub threshold_db: f64,
    pub ratio: f64,
    pub knee_db: f64,
    pub attack_ms: f64,
    pub release_ms: f64,
    pub makeup_db: f64,
}

impl From<&BandDefaults> for BandSettings {
    fn from(band: &BandDefaults) -> Self {
        Self {
            enabled: band.enabled,
            threshold_db: band.threshold_db,
            ratio: band.ratio,
            knee_db: band.knee_db,
            attack_ms: band.attack_ms,
            release_ms: band.release_ms,
            makeup_db: band.makeup_db,
        }
    }
}

/// Three-band compressor (ZaMultiCompX2-style), bands ordered low, mid, high.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MultibandSettings {
    pub crossover_low_hz: f64,
    pub crossover_high_hz: f64,
    pub bands: [BandSettings; 3],
    pub master_trim_db: f64,
    pub stereo_detection: bool,
}

impl MultibandSettings {
    /// Apply `update` to the bands selected by index (0 = low).
    pub fn with_bands(
        mut self,
        pick: impl Fn(usize) -> bool,
        update: impl Fn(&mut BandSettings),
    ) -> Self {
        for (i, band) in self.bands.iter_mut().enumerate() {
            if pick(i) {
                update(band);
            }
        }
        self
    }
}

impl Default for MultibandSettings {
    fn default() -> Self {
        let defaults = fanoutconf::MultibandDefaults::default();
        Self {
            crossover_low_hz: defaults.crossover_low_hz,
            crossover_high_hz: defaults.crossover_high_hz,
            bands: defaults.bands().map(BandSettings::from),
            master_trim_db: defaults.master_trim_db,
            stereo_detection: defaults.stereo_detection,
        }
    }
}

fn flag(on: bool) -> f64 {
    if on {
        1.0
    } else {
        0.0
    }
}

/// Settings for one effect instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EffectSettings {
    Limiter(LimiterSettings),
    Equalizer(EqualizerSettings),
    Compressor(CompressorSettings),
    Multiband(MultibandSettings),
}

impl EffectSettings {
    pub fn kind(&self) -> EffectKind {
        match self {
            Self::Limiter(_) => EffectKind::Limiter,
            Self::Equalizer(_) => EffectKind::Equalizer,
            Self::Compressor(_) => EffectKind::Compressor,
            Self::Multiband(_) => EffectKind::Multiband,
        }
    }

    /// Control values in layout order.
    pub fn controls(&self) -> Vec<f64> {
        match self {
            Self::Limiter(l) => vec![l.input_gain_db, l.limit_db, l.release_s],
            Self::Equalizer(eq) => eq.gains_db.to_vec(),
            // rms_peak is pinned to 1 (RMS detection)
            Self::Compressor(c) => vec![
                1.0,
                c.attack_ms,
                c.release_ms,
                c.threshold_db,
                c.ratio,
                c.knee_db,
                c.makeup_db,
            ],
            // per-band parameters grouped by parameter, listen ports pinned off
            Self::Multiband(m) => {
                let per_band: [fn(&BandSettings) -> f64; 6] = [
                    |b| b.attack_ms,
                    |b| b.release_ms,
                    |b| b.knee_db,
                    |b| b.ratio,
                    |b| b.threshold_db,
                    |b| b.makeup_db,
                ];
                let mut values: Vec<f64> = per_band
                    .iter()
                    .flat_map(|get| m.bands.iter().map(get))
                    .collect();
                values.extend([
                    m.crossover_low_hz,
                    m.crossover_high_hz,
                    m.master_trim_db,
                    flag(m.stereo_detection),
                ]);
                values.extend(m.bands.iter().map(|b| flag(b.enabled)));
                values.extend([0.0; 3]);
                values
            }
        }
    }

    /// Every control must be a finite number.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let kind = self.kind();
        let bad = self
            .controls()
            .into_iter()
            .zip(kind.control_names())
            .find(|(value, _)| !value.is_finite());
        match bad {
            Some((value, control)) => Err(ConfigurationError::NonFiniteControl {
                effect: kind.to_string(),
                control,
                value,
            }),
            None => Ok(()),
        }
    }

    /// Comma-joined controls, as the plugin host expects them.
    pub fn control_string(&self) -> String {
        format_controls(&self.controls())
    }
}

pub fn format_controls(values: &[f64]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EffectStage<T> {
    pub enabled: bool,
    pub settings: T,
}

impl<T> EffectStage<T> {
    pub fn on(settings: T) -> Self {
        Self {
            enabled: true,
            settings,
        }
    }

    pub fn off(settings: T) -> Self {
        Self {
            enabled: false,
            settings,
        }
    }
}

/// The desired chain: one optional stage per effect kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectChain {
    pub limiter: EffectStage<LimiterSettings>,
    pub equalizer: EffectStage<EqualizerSettings>,
    pub compressor: EffectStage<CompressorSettings>,
    pub multiband: EffectStage<MultibandSettings>,
}

impl EffectChain {
    /// A chain with every stage disabled; the base sink feeds outputs directly.
    pub fn bypass() -> Self {
        Self {
            limiter: EffectStage::off(LimiterSettings::default()),
            equalizer: EffectStage::off(EqualizerSettings::default()),
            compressor: EffectStage::off(CompressorSettings::default()),
            multiband: EffectStage::off(MultibandSettings::default()),
        }
    }

    pub fn from_defaults(defaults: &EffectDefaults) -> Result<Self, ConfigurationError> {
        let l = &defaults.limiter;
        let c = &defaults.compressor;
        let m = &defaults.multiband;
        Ok(Self {
            limiter: EffectStage {
                enabled: l.enabled,
                settings: LimiterSettings {
                    input_gain_db: l.input_gain_db,
                    limit_db: l.limit_db,
                    release_s: l.release_s,
                },
            },
            equalizer: EffectStage {
                enabled: defaults.equalizer.enabled,
                settings: EqualizerSettings::from_gains(&defaults.equalizer.gains_db)?,
            },
            compressor: EffectStage {
                enabled: c.enabled,
                settings: CompressorSettings {
                    threshold_db: c.threshold_db,
                    ratio: c.ratio,
                    knee_db: c.knee_db,
                    attack_ms: c.attack_ms,
                    release_ms: c.release_ms,
                    makeup_db: c.makeup_db,
                },
            },
            multiband: EffectStage {
                enabled: m.enabled,
                settings: MultibandSettings {
                    crossover_low_hz: m.crossover_low_hz,
                    crossover_high_hz: m.crossover_high_hz,
                    bands: m.bands().map(BandSettings::from),
                    master_trim_db: m.master_trim_db,
                    stereo_detection: m.stereo_detection,
                },
            },
        })
    }

    /// Enabled stages in domain order.
    pub fn enabled(&self) -> Vec<EffectSettings> {
        let mut stages = Vec::new();
        if self.limiter.enabled {
            stages.push(EffectSettings::Limiter(self.limiter.settings));
        }
        if self.equalizer.enabled {
            stages.push(EffectSettings::Equalizer(self.equalizer.settings));
        }
        if self.compressor.enabled {
            stages.push(EffectSettings::Compressor(self.compressor.settings));
        }
        if self.multiband.enabled {
            stages.push(EffectSettings::Multiband(self.multiband.settings));
        }
        stages
    }

    pub fn set_enabled(&mut self, kind: EffectKind, enabled: bool) {
        match kind {
            EffectKind::Limiter => self.limiter.enabled = enabled,
            EffectKind::Equalizer => self.equalizer.enabled = enabled,
            EffectKind::Compressor => self.compressor.enabled = enabled,
            EffectKind::Multiband => self.multiband.enabled = enabled,
        }
    }
}

impl Default for EffectChain {
    fn default() -> Self {
        Self {
            limiter: EffectStage::on(LimiterSettings::default()),
            equalizer: EffectStage::off(EqualizerSettings::default()),
            compressor: EffectStage::on(CompressorSettings::default()),
            multiband: EffectStage::off(MultibandSettings::default()),
        }
    }
}
