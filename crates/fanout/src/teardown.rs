//! Ordered teardown by discovery.
//!
//! The server keeps no record of which modules belong to us, so stop finds
//! them by pattern every time. That also catches leftovers from a run that
//! crashed before it could clean up.

use fanoutconf::NamesConfig;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::effects::EffectKind;
use crate::error::{ConfigurationError, DiscoveryAmbiguity};
use crate::matcher::ModuleLocator;
use crate::server::ModuleControl;
use crate::types::{ModuleId, NodeKind};

/// Each channel source feeds at most two outputs: Front plus one rear, or
/// both rears from the mix.
const LOOPBACKS_PER_SOURCE: usize = 2;

/// Substrings that must all appear in a module's descriptor for it to be ours.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveryPredicate {
    pub kind: NodeKind,
    pub patterns: Vec<String>,
    /// Matches a healthy pipeline can leave; anything beyond is warned about.
    pub max_matches: usize,
}

impl DiscoveryPredicate {
    /// The module name for `kind` plus one argument.
    pub fn new(kind: NodeKind, argument: String) -> Self {
        Self {
            kind,
            patterns: vec![kind.module_name().to_string(), argument],
            max_matches: 1,
        }
    }

    /// Explicit patterns. A group with no non-empty pattern would match every
    /// module on the server, so it is refused.
    pub fn from_patterns(kind: NodeKind, patterns: Vec<String>) -> Result<Self, ConfigurationError> {
        if patterns.iter().all(|p| p.is_empty()) {
            return Err(ConfigurationError::EmptyPredicate(kind));
        }
        Ok(Self {
            kind,
            patterns,
            max_matches: 1,
        })
    }

    pub fn allowing(mut self, max_matches: usize) -> Self {
        self.max_matches = max_matches;
        self
    }
}

/// Predicate groups in the order they must be unloaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeardownSequence {
    pub steps: Vec<DiscoveryPredicate>,
}

impl TeardownSequence {
    pub fn new(steps: Vec<DiscoveryPredicate>) -> Self {
        Self { steps }
    }

    /// Loopbacks, then channel sources, then effect sinks from the chain's
    /// entry back towards the base, then the base sink. Adopted fallback sinks
    /// are never listed, so they survive.
    pub fn default_for(names: &NamesConfig) -> Self {
        let sources = [&names.left_source, &names.right_source, &names.mix_source];
        let mut steps = Vec::new();

        for source in sources {
            steps.push(
                DiscoveryPredicate::new(NodeKind::Loopback, format!("source={source}"))
                    .allowing(LOOPBACKS_PER_SOURCE),
            );
        }
        for source in sources {
            steps.push(DiscoveryPredicate::new(
                NodeKind::ChannelSource,
                format!("source_name={source}"),
            ));
        }
        for kind in EffectKind::ALL.iter().rev() {
            steps.push(DiscoveryPredicate::new(
                NodeKind::EffectSink,
                format!("sink_name={}", kind.sink_name(names)),
            ));
        }
        steps.push(DiscoveryPredicate::new(
            NodeKind::BaseSink,
            format!("sink_name={}", names.base_sink),
        ));

        Self { steps }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub kind: Option<NodeKind>,
    pub patterns: Vec<String>,
    pub matched: Vec<ModuleId>,
    pub unloaded: Vec<ModuleId>,
    pub failed: Vec<(ModuleId, String)>,
}

/// What a stop did. Stop never fails; this is how callers learn about trouble.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StopReport {
    pub steps: Vec<StepReport>,
    pub ambiguities: Vec<DiscoveryAmbiguity>,
}

impl StopReport {
    pub fn unloaded(&self) -> impl Iterator<Item = &ModuleId> {
        self.steps.iter().flat_map(|s| s.unloaded.iter())
    }

    pub fn unloaded_count(&self) -> usize {
        self.unloaded().count()
    }

    /// Every matched module was unloaded.
    pub fn is_clean(&self) -> bool {
        self.steps.iter().all(|s| s.failed.is_empty())
    }
}

pub struct TeardownSequencer {
    locator: ModuleLocator,
    control: ModuleControl,
}

impl TeardownSequencer {
    pub fn new(locator: ModuleLocator, control: ModuleControl) -> Self {
        Self { locator, control }
    }

    pub fn run(&self, sequence: &TeardownSequence) -> StopReport {
        let mut report = StopReport::default();

        for predicate in &sequence.steps {
            let step = self.run_step(predicate, &mut report.ambiguities);
            report.steps.push(step);
        }

        info!(
            unloaded = report.unloaded_count(),
            clean = report.is_clean(),
            "teardown finished"
        );
        report
    }

    fn run_step(
        &self,
        predicate: &DiscoveryPredicate,
        ambiguities: &mut Vec<DiscoveryAmbiguity>,
    ) -> StepReport {
        let matched: Vec<ModuleId> = self
            .locator
            .find_matching_module_ids(&predicate.patterns)
            .into_iter()
            .collect();

        if matched.len() != 1 {
            let ambiguity = DiscoveryAmbiguity {
                predicates: predicate.patterns.clone(),
                matches: matched.clone(),
                expected: predicate.max_matches,
            };
            if ambiguity.is_missing() {
                debug!(%ambiguity, "nothing to unload");
            } else if ambiguity.is_unexpected() {
                warn!(%ambiguity, "unloading every match");
            } else {
                debug!(%ambiguity, "unloading every match");
            }
            ambiguities.push(ambiguity);
        }

        let mut step = StepReport {
            kind: Some(predicate.kind),
            patterns: predicate.patterns.clone(),
            matched: matched.clone(),
            ..StepReport::default()
        };

        for id in matched {
            match self.control.unload_module(&id) {
                Ok(()) => {
                    debug!(%id, kind = %predicate.kind, "unloaded");
                    step.unloaded.push(id);
                }
                Err(e) => {
                    warn!(%id, error = %e, "unload failed");
                    step.failed.push((id, e.to_string()));
                }
            }
        }

        step
    }
}
