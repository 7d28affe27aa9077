//! Per-device gain from volume, balance and routing layout.

use serde::Serialize;
use tracing::{debug, warn};

use crate::server::ModuleControl;
use crate::types::{OutputChannel, RoutingTarget};

/// Attenuation for (left, right) at a balance in -100..=100.
///
/// Positive balance pulls the left side down, negative pulls the right side
/// down; the favoured side always stays at 1.0.
pub fn balance_factors(balance: f64) -> (f64, f64) {
    let balance = balance.clamp(-100.0, 100.0);
    let left = if balance > 0.0 { 1.0 - balance / 100.0 } else { 1.0 };
    let right = if balance < 0.0 { 1.0 + balance / 100.0 } else { 1.0 };
    (left, right)
}

/// How a channel's gain reaches hardware.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GainMode {
    /// One stereo device carrying both sides; each side clamped to `max_percent`.
    SharedStereo { max_percent: f64 },
    /// Two single-side devices set independently, unclamped.
    IndependentPair,
}

/// Volumes for the left and right side, in percent.
pub fn side_volumes(volume_percent: f64, balance: f64, mode: GainMode) -> (f64, f64) {
    let (lf, rf) = balance_factors(balance);
    let (left, right) = (volume_percent * lf, volume_percent * rf);
    match mode {
        GainMode::SharedStereo { max_percent } => (left.min(max_percent), right.min(max_percent)),
        GainMode::IndependentPair => (left, right),
    }
}

/// One volume-set call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VolumeCommand {
    Stereo { device: String, left: u32, right: u32 },
    Mono { device: String, percent: u32 },
}

impl VolumeCommand {
    pub fn device(&self) -> &str {
        match self {
            Self::Stereo { device, .. } | Self::Mono { device, .. } => device,
        }
    }

    fn percents(&self) -> Vec<u32> {
        match self {
            Self::Stereo { left, right, .. } => vec![*left, *right],
            Self::Mono { percent, .. } => vec![*percent],
        }
    }
}

fn to_percent(value: f64) -> u32 {
    value.max(0.0).round() as u32
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GainReport {
    pub applied: Vec<VolumeCommand>,
    pub failed: Vec<(String, String)>,
}

pub struct ChannelRouter {
    control: ModuleControl,
    max_volume_percent: f64,
}

impl ChannelRouter {
    pub fn new(control: ModuleControl, max_volume_percent: f64) -> Self {
        Self {
            control,
            max_volume_percent,
        }
    }

    /// Volume calls for every enabled target. The front output is one stereo
    /// device; each rear output is a single side of an independent pair.
    pub fn commands(&self, targets: &[RoutingTarget]) -> Vec<VolumeCommand> {
        targets
            .iter()
            .filter_map(|target| {
                let device = target.enabled_device()?.to_string();
                let command = match target.channel {
                    OutputChannel::Front => {
                        let (left, right) = side_volumes(
                            target.volume_percent,
                            target.balance,
                            GainMode::SharedStereo {
                                max_percent: self.max_volume_percent,
                            },
                        );
                        VolumeCommand::Stereo {
                            device,
                            left: to_percent(left),
                            right: to_percent(right),
                        }
                    }
                    OutputChannel::RearLeft | OutputChannel::RearRight => {
                        let (left, right) = side_volumes(
                            target.volume_percent,
                            target.balance,
                            GainMode::IndependentPair,
                        );
                        let side = if target.channel == OutputChannel::RearLeft {
                            left
                        } else {
                            right
                        };
                        VolumeCommand::Mono {
                            device,
                            percent: to_percent(side),
                        }
                    }
                };
                Some(command)
            })
            .collect()
    }

    /// Issue the calls. Failures are logged and reported, never raised.
    pub fn apply(&self, targets: &[RoutingTarget]) -> GainReport {
        let mut report = GainReport::default();
        for command in self.commands(targets) {
            match self.control.set_sink_volume(command.device(), &command.percents()) {
                Ok(()) => {
                    debug!(?command, "volume set");
                    report.applied.push(command);
                }
                Err(e) => {
                    warn!(device = command.device(), error = %e, "volume set failed");
                    report.failed.push((command.device().to_string(), e.to_string()));
                }
            }
        }
        report
    }
}
