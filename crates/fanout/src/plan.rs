//! Pipeline graph and build plans.
//!
//! A plan is a list of nodes in creation order. Every node except the base
//! sink hangs off exactly one master that appears earlier in the list, so the
//! list is a topological order of a forest rooted at the base sink. The graph
//! uses petgraph's StableGraph to enforce that while nodes are added.

use std::collections::HashMap;

use fanoutconf::{FanoutConfig, NamesConfig, PluginRef, PluginsConfig};
use petgraph::algo::toposort;
use petgraph::stable_graph::{NodeIndex, StableGraph};
use petgraph::Direction;
use serde::{Deserialize, Serialize};

use crate::effects::{EffectChain, EffectSettings};
use crate::error::ConfigurationError;
use crate::types::{ChannelTap, NodeKind, OutputChannel, RoutingMode, RoutingTarget};

/// Kind-specific parameters of a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeSettings {
    Base {
        description: String,
    },
    Effect {
        plugin: PluginRef,
        settings: EffectSettings,
    },
    Channel {
        tap: ChannelTap,
    },
    Loopback {
        device: String,
        channel: OutputChannel,
        latency_msec: u32,
    },
}

/// One module to create.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub kind: NodeKind,
    pub name: String,
    pub master: Option<String>,
    pub settings: NodeSettings,
}

impl NodeSpec {
    /// `key=value` arguments that follow the module name in a load call.
    pub fn module_arguments(&self) -> Vec<String> {
        let master = self.master.as_deref().unwrap_or_default();
        match &self.settings {
            NodeSettings::Base { description } => vec![
                format!("sink_name={}", self.name),
                format!("sink_properties=device.description={}", description),
            ],
            NodeSettings::Effect { plugin, settings } => vec![
                format!("sink_name={}", self.name),
                format!("sink_master={}", master),
                format!("plugin={}", plugin.plugin),
                format!("label={}", plugin.label),
                format!("control={}", settings.control_string()),
            ],
            NodeSettings::Channel { tap } => {
                let mut args = vec![
                    format!("source_name={}", self.name),
                    format!("master={}.monitor", master),
                ];
                args.extend(tap.channel_map_args());
                args
            }
            NodeSettings::Loopback {
                device,
                latency_msec,
                ..
            } => vec![
                format!("source={}", master),
                format!("sink={}", device),
                format!("latency_msec={}", latency_msec),
                "source_dont_move=true".to_string(),
                "sink_dont_move=true".to_string(),
            ],
        }
    }

    /// Ordered named controls, for display. Empty for nodes without controls.
    pub fn parameters(&self) -> Vec<(String, f64)> {
        match &self.settings {
            NodeSettings::Effect { settings, .. } => settings
                .kind()
                .control_names()
                .into_iter()
                .zip(settings.controls())
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Dependency graph of the nodes in a plan. Edges point from master to dependent.
pub struct PipelineGraph {
    inner: StableGraph<NodeSpec, ()>,
    index_map: HashMap<String, NodeIndex>,
}

impl PipelineGraph {
    pub fn new() -> Self {
        Self {
            inner: StableGraph::new(),
            index_map: HashMap::new(),
        }
    }

    /// Add a node. Its master must already be in the graph.
    pub fn add_node(&mut self, node: NodeSpec) -> Result<NodeIndex, ConfigurationError> {
        if self.index_map.contains_key(&node.name) {
            return Err(ConfigurationError::DuplicateNodeName(node.name));
        }

        let master_idx = match &node.master {
            Some(master) => Some(self.index_map.get(master).copied().ok_or_else(|| {
                ConfigurationError::MissingMaster {
                    node: node.name.clone(),
                    master: master.clone(),
                }
            })?),
            None => None,
        };

        let name = node.name.clone();
        let index = self.inner.add_node(node);
        self.index_map.insert(name, index);
        if let Some(master_idx) = master_idx {
            self.inner.add_edge(master_idx, index, ());
        }
        Ok(index)
    }

    pub fn node(&self, name: &str) -> Option<&NodeSpec> {
        let index = self.index_map.get(name)?;
        self.inner.node_weight(*index)
    }

    pub fn node_count(&self) -> usize {
        self.inner.node_count()
    }

    /// Names of the nodes fed directly by `name`.
    pub fn dependents(&self, name: &str) -> Vec<String> {
        let Some(index) = self.index_map.get(name) else {
            return vec![];
        };
        let mut names: Vec<String> = self
            .inner
            .neighbors_directed(*index, Direction::Outgoing)
            .filter_map(|idx| self.inner.node_weight(idx))
            .map(|n| n.name.clone())
            .collect();
        names.sort();
        names
    }

    /// Nodes in insertion order, checked to be a valid creation order.
    pub fn into_creation_order(self) -> Result<Vec<NodeSpec>, ConfigurationError> {
        toposort(&self.inner, None).map_err(|_| ConfigurationError::CycleDetected)?;

        let mut inner = self.inner;
        let indices: Vec<NodeIndex> = inner.node_indices().collect();
        Ok(indices
            .into_iter()
            .filter_map(|idx| inner.remove_node(idx))
            .collect())
    }
}

impl Default for PipelineGraph {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything `apply` needs: nodes in creation order plus the routing they serve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildPlan {
    pub nodes: Vec<NodeSpec>,
    pub targets: Vec<RoutingTarget>,
    pub mode: RoutingMode,
}

impl BuildPlan {
    pub fn base(&self) -> Option<&NodeSpec> {
        self.nodes.iter().find(|n| n.kind == NodeKind::BaseSink)
    }

    /// Sink applications should play into: the last effect, or the base sink.
    pub fn entry_sink(&self) -> Option<&str> {
        self.nodes
            .iter()
            .rev()
            .find(|n| matches!(n.kind, NodeKind::EffectSink | NodeKind::BaseSink))
            .map(|n| n.name.as_str())
    }

    pub fn nodes_of(&self, kind: NodeKind) -> impl Iterator<Item = &NodeSpec> {
        self.nodes.iter().filter(move |n| n.kind == kind)
    }

    pub fn enabled_targets(&self) -> impl Iterator<Item = &RoutingTarget> {
        self.targets.iter().filter(|t| t.is_enabled())
    }

    /// Point the plan at an existing sink in place of the planned base sink.
    pub fn rebind_base(&mut self, actual: &str) {
        let Some(planned) = self.base().map(|b| b.name.clone()) else {
            return;
        };
        if planned == actual {
            return;
        }
        for node in &mut self.nodes {
            if node.name == planned {
                node.name = actual.to_string();
            }
            if node.master.as_deref() == Some(planned.as_str()) {
                node.master = Some(actual.to_string());
            }
        }
    }
}

/// Turns a desired chain and routing table into a [`BuildPlan`].
#[derive(Debug, Clone)]
pub struct PlanBuilder {
    names: NamesConfig,
    plugins: PluginsConfig,
    latency_msec: u32,
}

impl PlanBuilder {
    pub fn new(config: &FanoutConfig) -> Self {
        Self {
            names: config.names.clone(),
            plugins: config.plugins.clone(),
            latency_msec: config.server.latency_msec,
        }
    }

    /// Check a routing table without building anything.
    pub fn validate_targets(targets: &[RoutingTarget]) -> Result<(), ConfigurationError> {
        if !targets.iter().any(RoutingTarget::is_enabled) {
            return Err(ConfigurationError::NoEnabledTargets);
        }
        for target in targets {
            if !(-100.0..=100.0).contains(&target.balance) {
                return Err(ConfigurationError::BalanceOutOfRange(target.balance));
            }
            if !target.volume_percent.is_finite() || target.volume_percent < 0.0 {
                return Err(ConfigurationError::VolumeOutOfRange(target.volume_percent));
            }
        }
        Ok(())
    }

    /// Reject effect controls the plugin host cannot take.
    pub fn validate_chain(chain: &EffectChain) -> Result<(), ConfigurationError> {
        chain.enabled().iter().try_for_each(EffectSettings::validate)
    }

    /// Everything checked before the first external call of an apply.
    pub fn validate(plan: &BuildPlan) -> Result<(), ConfigurationError> {
        Self::validate_targets(&plan.targets)?;
        for node in &plan.nodes {
            if let NodeSettings::Effect { settings, .. } = &node.settings {
                settings.validate()?;
            }
        }
        Ok(())
    }

    pub fn build(
        &self,
        chain: &EffectChain,
        targets: &[RoutingTarget],
        mode: RoutingMode,
    ) -> Result<BuildPlan, ConfigurationError> {
        Self::validate_targets(targets)?;
        Self::validate_chain(chain)?;

        let mut graph = PipelineGraph::new();
        let base = self.names.base_sink.clone();

        graph.add_node(NodeSpec {
            kind: NodeKind::BaseSink,
            name: base.clone(),
            master: None,
            settings: NodeSettings::Base {
                description: self.names.base_description.clone(),
            },
        })?;

        let mut tail = base.clone();
        for settings in chain.enabled() {
            let kind = settings.kind();
            let name = kind.sink_name(&self.names).to_string();
            graph.add_node(NodeSpec {
                kind: NodeKind::EffectSink,
                name: name.clone(),
                master: Some(tail),
                settings: NodeSettings::Effect {
                    plugin: kind.plugin(&self.plugins).clone(),
                    settings,
                },
            })?;
            tail = name;
        }

        // Effect sinks write their output into their master, so the processed
        // signal always surfaces on the base sink's monitor.
        let upmix_rear = mode == RoutingMode::Upmix
            && targets.iter().any(|t| t.is_enabled() && t.channel.is_rear());
        let mut taps = vec![ChannelTap::Left, ChannelTap::Right];
        if upmix_rear {
            taps.push(ChannelTap::Mix);
        }
        for tap in taps {
            graph.add_node(NodeSpec {
                kind: NodeKind::ChannelSource,
                name: self.source_name(tap).to_string(),
                master: Some(base.clone()),
                settings: NodeSettings::Channel { tap },
            })?;
        }

        for target in targets {
            let Some(device) = target.enabled_device() else {
                continue;
            };
            for tap in self.taps_for(target.channel, mode) {
                let source = self.source_name(tap).to_string();
                graph.add_node(NodeSpec {
                    kind: NodeKind::Loopback,
                    name: format!("{}->{}", source, target.channel),
                    master: Some(source),
                    settings: NodeSettings::Loopback {
                        device: device.to_string(),
                        channel: target.channel,
                        latency_msec: self.latency_msec,
                    },
                })?;
            }
        }

        Ok(BuildPlan {
            nodes: graph.into_creation_order()?,
            targets: targets.to_vec(),
            mode,
        })
    }

    fn source_name(&self, tap: ChannelTap) -> &str {
        match tap {
            ChannelTap::Left => &self.names.left_source,
            ChannelTap::Right => &self.names.right_source,
            ChannelTap::Mix => &self.names.mix_source,
        }
    }

    fn taps_for(&self, channel: OutputChannel, mode: RoutingMode) -> Vec<ChannelTap> {
        match (channel, mode) {
            (OutputChannel::Front, _) => vec![ChannelTap::Left, ChannelTap::Right],
            (OutputChannel::RearLeft, RoutingMode::Stereo) => vec![ChannelTap::Left],
            (OutputChannel::RearRight, RoutingMode::Stereo) => vec![ChannelTap::Right],
            (_, RoutingMode::Upmix) => vec![ChannelTap::Mix],
        }
    }
}
