//! Error types for pipeline reconciliation.

use thiserror::Error;

use crate::types::{ModuleId, NodeKind};

/// A call to the sound server control binary went wrong.
///
/// Always caught somewhere: catalog queries degrade to empty results, teardown
/// logs and moves on, and node creation turns it into a [`PipelineError::PartialPipeline`].
#[derive(Debug, Clone, Error)]
pub enum ExternalCallFailure {
    #[error("failed to run `{command}`: {reason}")]
    Spawn { command: String, reason: String },

    #[error("`{command}` exited with {status}: {stderr}")]
    NonZeroExit {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("`{command}` returned unexpected output: {output:?}")]
    MalformedOutput { command: String, output: String },
}

/// The requested pipeline can never be built. Raised before any external call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("no routing target is enabled")]
    NoEnabledTargets,

    #[error("balance {0} is outside -100..=100")]
    BalanceOutOfRange(f64),

    #[error("volume {0} must be a non-negative number")]
    VolumeOutOfRange(f64),

    #[error("equalizer needs {expected} band gains, got {got}")]
    EqualizerBands { expected: usize, got: usize },

    #[error("node {node} names missing master {master}")]
    MissingMaster { node: String, master: String },

    #[error("node name {0} is used twice")]
    DuplicateNodeName(String),

    #[error("cycle detected in pipeline graph")]
    CycleDetected,

    #[error("{effect} control {control} is {value}, expected a finite number")]
    NonFiniteControl {
        effect: String,
        control: String,
        value: f64,
    },

    #[error("discovery predicate for {0} has no patterns")]
    EmptyPredicate(NodeKind),
}

/// Terminal outcome of a failed `apply`.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// Node creation failed part way; everything created so far has already
    /// been rolled back when this is returned.
    #[error("pipeline failed while creating {stage} after {} nodes: {source}", completed.len())]
    PartialPipeline {
        stage: String,
        completed: Vec<ModuleId>,
        #[source]
        source: ExternalCallFailure,
    },

    #[error("pipeline worker failed: {0}")]
    Worker(String),
}

/// Discovery found something other than exactly one match. Never fatal; kept
/// in reports so callers can tell a clean stop from a messy one.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct DiscoveryAmbiguity {
    pub predicates: Vec<String>,
    pub matches: Vec<ModuleId>,
    /// Most matches a healthy pipeline produces for these predicates.
    pub expected: usize,
}

impl DiscoveryAmbiguity {
    pub fn is_missing(&self) -> bool {
        self.matches.is_empty()
    }

    /// More matches than any pipeline we build would leave behind.
    pub fn is_unexpected(&self) -> bool {
        self.matches.len() > self.expected
    }
}

impl std::fmt::Display for DiscoveryAmbiguity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} modules match [{}]",
            self.matches.len(),
            self.predicates.join(" & ")
        )
    }
}
