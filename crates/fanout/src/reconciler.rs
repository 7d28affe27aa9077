//! Idempotent apply/stop against shared server state.
//!
//! There are no transactions on the server side. Apply always tears down
//! whatever matches our patterns first, builds in dependency order, and on a
//! creation failure tears everything down again before reporting.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use fanoutconf::FanoutConfig;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::catalog::Catalog;
use crate::effects::EffectChain;
use crate::error::{ConfigurationError, PipelineError};
use crate::matcher::ModuleLocator;
use crate::plan::{BuildPlan, NodeSpec, PlanBuilder};
use crate::prerequisites::{CardProfiles, NoPrerequisites, Prerequisites};
use crate::router::{ChannelRouter, GainReport};
use crate::server::{CommandRunner, ModuleControl, PactlRunner};
use crate::teardown::{StopReport, TeardownSequence, TeardownSequencer};
use crate::types::{ModuleId, NodeKind, RoutingMode, RoutingTarget};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationState {
    Stopped,
    Building,
    Live,
    /// Rolling back after a failed build. Never observed once apply returns.
    Degraded,
}

/// A node that exists on the server as part of the live generation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreatedNode {
    pub spec: NodeSpec,
    /// None when an existing sink was adopted instead of created.
    pub module: Option<ModuleId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Generation {
    pub id: u64,
    pub nodes: Vec<CreatedNode>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApplyReport {
    pub generation: u64,
    pub created: Vec<CreatedNode>,
    /// Name of the pre-existing sink used as the base, if any.
    pub reused_base: Option<String>,
    pub default_sink: Option<String>,
    pub stopped: StopReport,
    pub gains: GainReport,
}

pub struct Reconciler {
    config: FanoutConfig,
    catalog: Catalog,
    control: ModuleControl,
    planner: PlanBuilder,
    teardown: TeardownSequencer,
    sequence: TeardownSequence,
    router: ChannelRouter,
    prerequisites: Box<dyn Prerequisites>,
    state: GenerationState,
    next_generation: u64,
    current: Option<Generation>,
}

impl Reconciler {
    pub fn new(config: FanoutConfig, runner: Arc<dyn CommandRunner>) -> Self {
        let catalog = Catalog::new(runner.clone(), config.names.reserved_sinks());
        let control = ModuleControl::new(runner);
        let teardown = TeardownSequencer::new(
            ModuleLocator::new(catalog.list_active_modules()),
            control.clone(),
        );

        Self {
            planner: PlanBuilder::new(&config),
            sequence: TeardownSequence::default_for(&config.names),
            router: ChannelRouter::new(control.clone(), config.server.max_volume_percent),
            prerequisites: Box::new(NoPrerequisites),
            state: GenerationState::Stopped,
            next_generation: 1,
            current: None,
            config,
            catalog,
            control,
            teardown,
        }
    }

    /// Talk to the configured `pactl` and apply configured card profiles.
    pub fn from_config(config: FanoutConfig) -> Self {
        let runner = Arc::new(PactlRunner::new(config.server.pactl.clone()));
        let profiles = config.profiles.clone();
        let reconciler = Self::new(config, runner);
        if profiles.is_empty() {
            reconciler
        } else {
            reconciler.with_prerequisites(Box::new(CardProfiles::new(profiles)))
        }
    }

    pub fn with_prerequisites(mut self, prerequisites: Box<dyn Prerequisites>) -> Self {
        self.prerequisites = prerequisites;
        self
    }

    pub fn config(&self) -> &FanoutConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn state(&self) -> GenerationState {
        self.state
    }

    pub fn current(&self) -> Option<&Generation> {
        self.current.as_ref()
    }

    pub fn plan(
        &self,
        chain: &EffectChain,
        targets: &[RoutingTarget],
        mode: RoutingMode,
    ) -> Result<BuildPlan, ConfigurationError> {
        self.planner.build(chain, targets, mode)
    }

    /// Replace whatever is running with `plan`.
    ///
    /// Returns only after the server is either running the full plan or has
    /// been cleaned up again.
    pub fn apply(&mut self, plan: &BuildPlan) -> Result<ApplyReport, PipelineError> {
        PlanBuilder::validate(plan)?;

        info!(nodes = plan.nodes.len(), "applying pipeline");
        let stopped = self.stop();
        self.state = GenerationState::Building;

        if let Err(e) = self.prerequisites.ensure(&self.control) {
            warn!(error = %e, "prerequisites not met, building anyway");
        }

        let mut plan = plan.clone();
        let reused_base = self.resolve_base(&mut plan);

        let mut created: Vec<CreatedNode> = Vec::with_capacity(plan.nodes.len());
        for node in &plan.nodes {
            if node.kind == NodeKind::BaseSink && reused_base.is_some() {
                created.push(CreatedNode {
                    spec: node.clone(),
                    module: None,
                });
                continue;
            }

            match self.control.load_module(node) {
                Ok(id) => created.push(CreatedNode {
                    spec: node.clone(),
                    module: Some(id),
                }),
                Err(source) => {
                    let completed: Vec<ModuleId> =
                        created.iter().filter_map(|n| n.module.clone()).collect();
                    error!(node = %node.name, error = %source, created = completed.len(), "pipeline build failed, rolling back");

                    self.state = GenerationState::Degraded;
                    let rollback = self.teardown.run(&self.sequence);
                    if !rollback.is_clean() {
                        warn!("rollback left modules behind");
                    }
                    self.state = GenerationState::Stopped;
                    self.current = None;

                    return Err(PipelineError::PartialPipeline {
                        stage: node.name.clone(),
                        completed,
                        source,
                    });
                }
            }
        }

        let mut default_sink = None;
        if self.config.server.set_default_sink {
            if let Some(sink) = plan.entry_sink() {
                match self.control.set_default_sink(sink) {
                    Ok(()) => default_sink = Some(sink.to_string()),
                    Err(e) => warn!(sink, error = %e, "could not set default sink"),
                }
            }
        }

        let gains = self.router.apply(&plan.targets);

        let generation = Generation {
            id: self.next_generation,
            nodes: created.clone(),
            created_at: Utc::now(),
        };
        self.next_generation += 1;
        self.state = GenerationState::Live;
        info!(generation = generation.id, nodes = created.len(), "pipeline live");
        let id = generation.id;
        self.current = Some(generation);

        Ok(ApplyReport {
            generation: id,
            created,
            reused_base,
            default_sink,
            stopped,
            gains,
        })
    }

    /// Unload everything matching our patterns. Never fails.
    pub fn stop(&mut self) -> StopReport {
        let report = self.teardown.run(&self.sequence);
        self.stopped(report)
    }

    /// Like [`Reconciler::stop`], with caller-supplied predicate groups.
    pub fn stop_with(&mut self, sequence: &TeardownSequence) -> StopReport {
        let report = self.teardown.run(sequence);
        self.stopped(report)
    }

    fn stopped(&mut self, report: StopReport) -> StopReport {
        self.current = None;
        self.state = GenerationState::Stopped;
        report
    }

    /// Re-apply gains without rebuilding.
    pub fn set_gains(&self, targets: &[RoutingTarget]) -> GainReport {
        self.router.apply(targets)
    }

    /// Pick the base sink: the conventional one if it exists, else the first
    /// fallback that exists, else none (create it). Rebinds the plan to
    /// whatever was adopted.
    fn resolve_base(&self, plan: &mut BuildPlan) -> Option<String> {
        let planned = plan.base()?.name.clone();
        let existing = self
            .catalog
            .existing_base_sink(&planned, &self.config.names.fallback_base_sinks)?;

        if existing == planned {
            debug!(sink = %planned, "reusing existing base sink");
        } else {
            info!(sink = %existing, "adopting fallback sink as base");
            plan.rebind_base(&existing);
        }
        Some(existing)
    }
}
