use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Server-assigned module index. Opaque; only ever handed back to the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ModuleId(pub String);

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ModuleId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ModuleId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    BaseSink,
    EffectSink,
    ChannelSource,
    Loopback,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BaseSink => "base_sink",
            Self::EffectSink => "effect_sink",
            Self::ChannelSource => "channel_source",
            Self::Loopback => "loopback",
        }
    }

    /// Server module that implements this kind of node.
    pub fn module_name(&self) -> &'static str {
        match self {
            Self::BaseSink => "module-null-sink",
            Self::EffectSink => "module-ladspa-sink",
            Self::ChannelSource => "module-remap-source",
            Self::Loopback => "module-loopback",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputChannel {
    Front,
    RearLeft,
    RearRight,
}

impl OutputChannel {
    pub const ALL: [OutputChannel; 3] = [Self::Front, Self::RearLeft, Self::RearRight];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Front => "front",
            Self::RearLeft => "rear_left",
            Self::RearRight => "rear_right",
        }
    }

    pub fn is_rear(&self) -> bool {
        matches!(self, Self::RearLeft | Self::RearRight)
    }
}

impl fmt::Display for OutputChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OutputChannel {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "front" => Ok(Self::Front),
            "rear_left" | "rear-left" => Ok(Self::RearLeft),
            "rear_right" | "rear-right" => Ok(Self::RearRight),
            _ => Err(format!("Unknown output channel: {}", s)),
        }
    }
}

/// Which part of the stereo monitor feed a channel source extracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelTap {
    Left,
    Right,
    /// Both channels folded to mono.
    Mix,
}

impl ChannelTap {
    /// Channel-map expression passed to the remap module.
    pub fn channel_map_args(&self) -> Vec<String> {
        let mut args = vec!["channels=1".to_string(), "channel_map=mono".to_string()];
        match self {
            Self::Left => args.push("master_channel_map=front-left".to_string()),
            Self::Right => args.push("master_channel_map=front-right".to_string()),
            Self::Mix => args.push("remix=yes".to_string()),
        }
        args
    }
}

/// Where one logical output channel goes and how loud.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingTarget {
    pub channel: OutputChannel,
    /// None disables the target.
    pub device: Option<String>,
    pub volume_percent: f64,
    /// -100 (full left) to 100 (full right).
    #[serde(default)]
    pub balance: f64,
}

impl RoutingTarget {
    pub fn new(channel: OutputChannel, device: impl Into<String>) -> Self {
        Self {
            channel,
            device: Some(device.into()),
            volume_percent: 100.0,
            balance: 0.0,
        }
    }

    pub fn disabled(channel: OutputChannel) -> Self {
        Self {
            channel,
            device: None,
            volume_percent: 100.0,
            balance: 0.0,
        }
    }

    pub fn with_volume(mut self, volume_percent: f64) -> Self {
        self.volume_percent = volume_percent;
        self
    }

    pub fn with_balance(mut self, balance: f64) -> Self {
        self.balance = balance;
        self
    }

    pub fn enabled_device(&self) -> Option<&str> {
        self.device.as_deref().filter(|d| !d.is_empty())
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled_device().is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingMode {
    /// Rear outputs carry the discrete left and right channels.
    #[default]
    Stereo,
    /// Rear outputs both carry a mono downmix.
    Upmix,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceState {
    Running,
    Idle,
    Suspended,
    Unknown,
}

impl DeviceState {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "RUNNING" => Self::Running,
            "IDLE" => Self::Idle,
            "SUSPENDED" => Self::Suspended,
            _ => Self::Unknown,
        }
    }
}

/// A sink as reported by the short sink listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputDevice {
    pub id: String,
    pub name: String,
    pub state: DeviceState,
}

/// One module instance from the module listing, with its raw descriptor text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleBlock {
    pub id: ModuleId,
    pub name: String,
    pub text: String,
}

/// Point-in-time reading of a source's level controls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSnapshot {
    pub name: String,
    pub state: DeviceState,
    /// Per-channel volume in percent, in channel order.
    pub volumes: Vec<f64>,
    pub muted: bool,
}

impl SourceSnapshot {
    pub fn peak_volume(&self) -> f64 {
        self.volumes.iter().copied().fold(0.0, f64::max)
    }
}
