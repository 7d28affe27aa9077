//! Named chains for common listening situations. Every preset runs the
//! limiter, the equalizer and per-band dynamics; the broadband compressor is
//! left off.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::effects::{
    BandSettings, CompressorSettings, EffectChain, EffectStage, EqualizerSettings,
    LimiterSettings, MultibandSettings,
};

const MID: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    /// Heavy compression and a softened top end for quiet listening.
    Night,
    /// Transparent: catch peaks, leave tone alone.
    Mastering,
    /// Midrange presence boost.
    Vocal,
}

impl Preset {
    pub const ALL: [Preset; 3] = [Self::Night, Self::Mastering, Self::Vocal];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Night => "night",
            Self::Mastering => "mastering",
            Self::Vocal => "vocal",
        }
    }

    pub fn chain(&self) -> EffectChain {
        let (limiter, equalizer, multiband) = match self {
            Self::Night => (
                LimiterSettings {
                    input_gain_db: 3.0,
                    limit_db: -1.0,
                    release_s: 0.1,
                },
                EqualizerSettings::flat()
                    .with_bands(|hz| hz >= 5000, -3.0)
                    .with_bands(|hz| hz <= 100, -2.0),
                MultibandSettings::default().with_bands(
                    |_| true,
                    |b| {
                        set_band(b, -25.0, 6.0, 3.0);
                        (b.attack_ms, b.release_ms) = (5.0, 100.0);
                    },
                ),
            ),
            Self::Mastering => (
                LimiterSettings {
                    input_gain_db: 0.0,
                    limit_db: -0.1,
                    release_s: 0.05,
                },
                EqualizerSettings::flat(),
                MultibandSettings::default().with_bands(
                    |_| true,
                    |b| {
                        set_band(b, -15.0, 2.5, 0.0);
                        (b.attack_ms, b.release_ms) = (10.0, 150.0);
                    },
                ),
            ),
            // mid band carries the compression, attack and release stay per band
            Self::Vocal => (
                LimiterSettings {
                    input_gain_db: 1.0,
                    limit_db: -0.5,
                    release_s: 0.08,
                },
                EqualizerSettings::flat()
                    .with_bands(|hz| (1000..=3500).contains(&hz), 3.0)
                    .with_bands(|hz| hz == 220 || hz == 311, 2.0)
                    .with_bands(|hz| hz >= 10000, 2.0),
                MultibandSettings::default()
                    .with_bands(|i| i == MID, |b| set_band(b, -18.0, 4.0, 2.0))
                    .with_bands(|i| i != MID, |b| set_band(b, -20.0, 2.0, 0.0)),
            ),
        };

        EffectChain {
            limiter: EffectStage::on(limiter),
            equalizer: EffectStage::on(equalizer),
            compressor: EffectStage::off(CompressorSettings::default()),
            multiband: EffectStage::on(multiband),
        }
    }
}

fn set_band(band: &mut BandSettings, threshold_db: f64, ratio: f64, makeup_db: f64) {
    band.enabled = true;
    band.threshold_db = threshold_db;
    band.ratio = ratio;
    band.makeup_db = makeup_db;
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Preset {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "night" => Ok(Self::Night),
            "mastering" => Ok(Self::Mastering),
            "vocal" => Ok(Self::Vocal),
            _ => Err(format!("Unknown preset: {}", s)),
        }
    }
}
